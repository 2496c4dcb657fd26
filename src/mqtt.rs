use crate::config::MqttSettings;
use anyhow::{anyhow, Context, Result};
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, Incoming, MqttOptions, Outgoing, QoS};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const REQUEST_CAPACITY: usize = 256;
const DISCONNECT_GRACE: Duration = Duration::from_millis(250);

/// Session-owned broker connection. Sinks borrow clones of the client and
/// never close it; only [`MqttPublisher::disconnect`] does.
#[derive(Debug)]
pub struct MqttPublisher {
    client: AsyncClient,
    cancel: CancellationToken,
    driver: Option<JoinHandle<()>>,
}

impl MqttPublisher {
    /// Connects and waits for the broker's CONNACK before handing the event
    /// loop to a background driver task.
    pub async fn connect(settings: &MqttSettings) -> Result<Self> {
        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_keep_alive(settings.keepalive);
        if let Some(username) = &settings.username {
            options.set_credentials(username.clone(), settings.password.clone().unwrap_or_default());
        }

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        tokio::time::timeout(settings.connect_timeout, wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| anyhow!("timed out waiting for CONNACK from {}:{}", settings.host, settings.port))?
            .with_context(|| format!("failed to connect to MQTT broker {}:{}", settings.host, settings.port))?;

        tracing::info!(host=%settings.host, port=settings.port, client_id=%settings.client_id, "MQTT connected");

        let cancel = CancellationToken::new();
        let driver = spawn_driver(eventloop, cancel.clone());
        let publisher = Self {
            client,
            cancel,
            driver: Some(driver),
        };

        if let Some((topic, message)) = &settings.test_message {
            match publisher
                .client
                .publish(topic.as_str(), QoS::AtMostOnce, false, message.clone().into_bytes())
                .await
            {
                Ok(()) => tracing::info!(topic=%topic, "published MQTT test message"),
                Err(err) => tracing::warn!(topic=%topic, error=%err, "failed to publish MQTT test message"),
            }
        } else {
            tracing::debug!("MQTT_TEST_TOPIC or MQTT_TEST_MESSAGE not set; skipping test message");
        }

        Ok(publisher)
    }

    pub fn client(&self) -> AsyncClient {
        self.client.clone()
    }

    /// Sends DISCONNECT once and stops the driver. Later calls are no-ops.
    pub async fn disconnect(&mut self) {
        let Some(mut driver) = self.driver.take() else {
            return;
        };
        if let Err(err) = self.client.try_disconnect() {
            tracing::debug!(error=%err, "failed to queue MQTT disconnect");
        }
        if tokio::time::timeout(DISCONNECT_GRACE, &mut driver).await.is_err() {
            self.cancel.cancel();
            driver.abort();
        }
        tracing::info!("MQTT client disconnected");
    }
}

impl Drop for MqttPublisher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<()> {
    loop {
        match eventloop.poll().await? {
            Event::Incoming(Incoming::ConnAck(ack)) => {
                if ack.code == ConnectReturnCode::Success {
                    return Ok(());
                }
                return Err(anyhow!("broker refused connection: {:?}", ack.code));
            }
            _ => continue,
        }
    }
}

fn spawn_driver(mut eventloop: EventLoop, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = eventloop.poll() => {
                    match event {
                        Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                        Ok(_) => {}
                        Err(err) => {
                            tracing::warn!(error=%err, "MQTT event loop error; reconnecting");
                            tokio::select! {
                                _ = cancel.cancelled() => break,
                                _ = tokio::time::sleep(Duration::from_secs(2)) => {}
                            }
                        }
                    }
                }
            }
        }
    })
}
