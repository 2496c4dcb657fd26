use crate::error::SendError;
use crate::sample::CncSample;
use reqwest::header::CONTENT_TYPE;
use rumqttc::{AsyncClient, QoS};
use std::future::Future;
use url::Url;

/// Where an emitter delivers its samples.
///
/// Implementations must tolerate concurrent calls from every emitter of a
/// group; each emitter only ever has one send in flight.
pub trait TelemetrySink: Send + Sync + 'static {
    fn send(&self, sample: &CncSample) -> impl Future<Output = Result<(), SendError>> + Send;
}

/// POSTs each sample as JSON to the ingest endpoint.
///
/// Only connection-level failures count as errors. The response status is
/// not inspected and the body is never read.
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpSink {
    pub fn new(client: reqwest::Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }
}

impl TelemetrySink for HttpSink {
    async fn send(&self, sample: &CncSample) -> Result<(), SendError> {
        let payload = sample.to_json()?;
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await?;
        tracing::trace!(machine_id=%sample.machine_id, status=%response.status(), "posted sample");
        Ok(())
    }
}

/// Publishes each sample to `factory/<site>/cnc/<machine_id>/data` at QoS 0.
#[derive(Debug, Clone)]
pub struct MqttSink {
    client: AsyncClient,
    site: String,
}

impl MqttSink {
    pub fn new(client: AsyncClient, site: impl Into<String>) -> Self {
        Self {
            client,
            site: site.into(),
        }
    }
}

impl TelemetrySink for MqttSink {
    async fn send(&self, sample: &CncSample) -> Result<(), SendError> {
        let payload = sample.to_json()?;
        let topic = telemetry_topic(&self.site, &sample.machine_id);
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await?;
        Ok(())
    }
}

pub fn telemetry_topic(site: &str, machine_id: &str) -> String {
    format!("factory/{site}/cnc/{machine_id}/data")
}
