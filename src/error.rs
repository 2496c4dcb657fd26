use crate::group::TransportKind;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} environment variable is not set")]
    Missing(&'static str),

    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// A single failed delivery attempt. Emitters absorb these and keep cycling.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("failed to serialize sample: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("MQTT publish failed: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("send timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("{0} transport is not active for this session")]
    TransportDisabled(TransportKind),
}
