use crate::config::Config;
use crate::group::{GroupOptions, TransportKind};
use crate::mqtt::MqttPublisher;
use crate::probe;
use crate::session::SessionController;
use crate::sink::{HttpSink, MqttSink};
use std::sync::Arc;

pub type Controller = SessionController<HttpSink, MqttSink>;

/// Whether a transport came up at session start, and why not if it didn't.
#[derive(Debug, Clone)]
pub struct TransportNotice {
    pub kind: TransportKind,
    pub problem: Option<String>,
}

impl TransportNotice {
    pub fn is_active(&self) -> bool {
        self.problem.is_none()
    }
}

/// One operator session: the controller plus the connections it owns.
pub struct Simulator {
    pub controller: Controller,
    pub notices: Vec<TransportNotice>,
    mqtt: Option<MqttPublisher>,
}

impl Simulator {
    /// Brings up both transports. A transport that is misconfigured or
    /// unreachable is disabled for the session; the other stays usable.
    pub async fn open(config: &Config) -> Self {
        let http_client = reqwest::Client::new();

        let (http_sink, http_problem) = match config.http_settings() {
            Ok(settings) => {
                match probe::check_ingest_health(&http_client, &settings.health_url, settings.connect_timeout).await {
                    Ok(()) => {
                        tracing::info!(endpoint=%settings.ingest_url, "HTTP ingest reachable");
                        (Some(Arc::new(HttpSink::new(http_client, settings.ingest_url))), None)
                    }
                    Err(err) => (None, Some(format!("{err:#}"))),
                }
            }
            Err(err) => (None, Some(err.to_string())),
        };

        let (mqtt, mqtt_sink, mqtt_problem) = match config.mqtt_settings() {
            Ok(settings) => match MqttPublisher::connect(&settings).await {
                Ok(publisher) => {
                    let sink = MqttSink::new(publisher.client(), settings.site.clone());
                    (Some(publisher), Some(Arc::new(sink)), None)
                }
                Err(err) => (None, None, Some(format!("{err:#}"))),
            },
            Err(err) => (None, None, Some(err.to_string())),
        };

        let notices = vec![
            TransportNotice {
                kind: TransportKind::Http,
                problem: http_problem,
            },
            TransportNotice {
                kind: TransportKind::Mqtt,
                problem: mqtt_problem,
            },
        ];
        for notice in &notices {
            if let Some(problem) = &notice.problem {
                tracing::warn!(kind=%notice.kind, error=%problem, "transport disabled for this session");
            }
        }

        let options = GroupOptions {
            send_timeout: config.send_timeout(),
        };
        Self {
            controller: SessionController::new(http_sink, mqtt_sink, options),
            notices,
            mqtt,
        }
    }

    /// Stops every group, waits for them to exit, then drops the broker connection.
    pub async fn close(mut self) {
        self.controller.shutdown_all();
        self.controller.drain().await;
        if let Some(mut publisher) = self.mqtt.take() {
            publisher.disconnect().await;
        }
    }
}
