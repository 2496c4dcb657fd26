use crate::error::ConfigError;
use anyhow::{Context, Result};
use std::env;
use std::time::Duration;
use url::Url;

const DEFAULT_INGEST_URL: &str = "http://localhost:8080/ingest";
const DEFAULT_SITE: &str = "pune";

#[derive(Debug, Clone)]
pub struct Config {
    pub ingest_url: String,
    pub health_url: Option<String>,

    pub mqtt_broker: Option<String>,
    pub mqtt_client_id: Option<String>,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_site: String,
    pub mqtt_keepalive_secs: u64,
    pub mqtt_test_topic: Option<String>,
    pub mqtt_test_message: Option<String>,

    pub send_timeout_ms: Option<u64>,
    pub connect_timeout_ms: u64,
}

/// Validated settings for the HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub ingest_url: Url,
    pub health_url: Url,
    pub connect_timeout: Duration,
}

/// Validated settings for the MQTT transport.
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub site: String,
    pub keepalive: Duration,
    pub connect_timeout: Duration,
    pub test_message: Option<(String, String)>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        load_dotenv();

        let ingest_url =
            env_optional("SIM_HTTP_INGEST_URL").unwrap_or_else(|| DEFAULT_INGEST_URL.to_string());
        let health_url = env_optional("SIM_HTTP_HEALTH_URL");

        let mqtt_broker = env_optional("MQTT_BROKER");
        let mqtt_client_id = env_optional("MQTT_CLIENT_ID");
        let mqtt_username = env_optional("MQTT_USERNAME");
        let mqtt_password = env_optional("MQTT_PASSWORD");
        let mqtt_site = env_optional("MQTT_SITE").unwrap_or_else(|| DEFAULT_SITE.to_string());
        let mqtt_keepalive_secs = env_u64("MQTT_KEEPALIVE_SECS", 30)?;
        let mqtt_test_topic = env_optional("MQTT_TEST_TOPIC");
        let mqtt_test_message = env_optional("MQTT_TEST_MESSAGE");

        let send_timeout_ms = match env_optional("SIM_SEND_TIMEOUT_MS") {
            Some(raw) => Some(
                raw.parse::<u64>()
                    .context("invalid SIM_SEND_TIMEOUT_MS")?,
            ),
            None => None,
        };
        let connect_timeout_ms = env_u64("SIM_CONNECT_TIMEOUT_MS", 5000)?;

        Ok(Self {
            ingest_url,
            health_url,
            mqtt_broker,
            mqtt_client_id,
            mqtt_username,
            mqtt_password,
            mqtt_site,
            mqtt_keepalive_secs,
            mqtt_test_topic,
            mqtt_test_message,
            send_timeout_ms,
            connect_timeout_ms,
        })
    }

    pub fn send_timeout(&self) -> Option<Duration> {
        self.send_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Without `SIM_HTTP_HEALTH_URL` the health check targets `/health` on the
    /// ingest URL's origin; its path, query and fragment are dropped.
    pub fn http_settings(&self) -> Result<HttpSettings, ConfigError> {
        let ingest_url = parse_http_url("SIM_HTTP_INGEST_URL", &self.ingest_url)?;
        let health_url = match self.health_url.as_deref() {
            Some(raw) => parse_http_url("SIM_HTTP_HEALTH_URL", raw)?,
            None => {
                let mut url = ingest_url.clone();
                url.set_path("/health");
                url.set_query(None);
                url.set_fragment(None);
                url
            }
        };
        Ok(HttpSettings {
            ingest_url,
            health_url,
            connect_timeout: self.connect_timeout(),
        })
    }

    pub fn mqtt_settings(&self) -> Result<MqttSettings, ConfigError> {
        let broker = self
            .mqtt_broker
            .as_deref()
            .ok_or(ConfigError::Missing("MQTT_BROKER"))?;
        let client_id = self
            .mqtt_client_id
            .clone()
            .ok_or(ConfigError::Missing("MQTT_CLIENT_ID"))?;
        let (host, port) = parse_broker(broker)?;
        let test_message = match (&self.mqtt_test_topic, &self.mqtt_test_message) {
            (Some(topic), Some(message)) => Some((topic.clone(), message.clone())),
            _ => None,
        };
        Ok(MqttSettings {
            host,
            port,
            client_id,
            username: self.mqtt_username.clone(),
            password: self.mqtt_password.clone(),
            site: self.mqtt_site.clone(),
            keepalive: Duration::from_secs(self.mqtt_keepalive_secs.max(5)),
            connect_timeout: self.connect_timeout(),
            test_message,
        })
    }
}

fn load_dotenv() {
    if env::var("ENV").map(|v| v == "production").unwrap_or(false) {
        return;
    }
    if let Err(err) = dotenvy::dotenv() {
        tracing::warn!(error=%err, ".env file not found, continuing without it");
    }
}

fn parse_http_url(key: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|err| ConfigError::Invalid {
        key,
        reason: err.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::Invalid {
            key,
            reason: format!("unsupported scheme {other}"),
        }),
    }
}

/// Accepts `tcp://host:port`, `mqtt://host:port` or a bare `host[:port]`.
fn parse_broker(raw: &str) -> Result<(String, u16), ConfigError> {
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("tcp://{raw}")
    };
    let url = Url::parse(&with_scheme).map_err(|err| ConfigError::Invalid {
        key: "MQTT_BROKER",
        reason: err.to_string(),
    })?;
    match url.scheme() {
        "tcp" | "mqtt" => {}
        other => {
            return Err(ConfigError::Invalid {
                key: "MQTT_BROKER",
                reason: format!("unsupported scheme {other}"),
            })
        }
    }
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ConfigError::Invalid {
            key: "MQTT_BROKER",
            reason: "missing host".to_string(),
        })?
        .to_string();
    Ok((host, url.port().unwrap_or(1883)))
}

fn env_u64(key: &str, default: u64) -> Result<u64> {
    match env_optional(key) {
        Some(value) => value
            .parse::<u64>()
            .with_context(|| format!("invalid {key}")),
        None => Ok(default),
    }
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
