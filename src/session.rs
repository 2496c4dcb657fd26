use crate::error::SessionError;
use crate::group::{EmitterGroup, GroupOptions, TransportKind};
use crate::sink::TelemetrySink;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportStatus {
    pub kind: TransportKind,
    pub enabled: bool,
    /// Set while a group of this kind is running.
    pub count: Option<NonZeroUsize>,
}

impl TransportStatus {
    pub fn is_running(&self) -> bool {
        self.count.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Started(NonZeroUsize),
    Stopped,
    /// No count was given; nothing started.
    Abandoned,
}

/// Per-kind bookkeeping: the active cohort plus cancelled cohorts that may
/// still be winding down.
struct Slot<S> {
    kind: TransportKind,
    sink: Option<Arc<S>>,
    active: Option<EmitterGroup>,
    retired: Vec<EmitterGroup>,
}

impl<S: TelemetrySink> Slot<S> {
    fn new(kind: TransportKind, sink: Option<Arc<S>>) -> Self {
        Self {
            kind,
            sink,
            active: None,
            retired: Vec::new(),
        }
    }

    fn status(&self) -> TransportStatus {
        TransportStatus {
            kind: self.kind,
            enabled: self.sink.is_some(),
            count: self.active.as_ref().map(EmitterGroup::count),
        }
    }

    async fn start(&mut self, count: NonZeroUsize, options: GroupOptions) -> Result<(), SessionError> {
        let Some(sink) = self.sink.clone() else {
            return Err(SessionError::TransportDisabled(self.kind));
        };
        self.stop();
        self.drain().await;
        self.active = Some(EmitterGroup::start(self.kind, count, sink, options));
        Ok(())
    }

    fn stop(&mut self) -> bool {
        self.retired.retain(|group| !group.is_drained());
        match self.active.take() {
            Some(group) => {
                group.cancel();
                self.retired.push(group);
                true
            }
            None => false,
        }
    }

    async fn drain(&mut self) {
        for group in &self.retired {
            if !group.is_drained() {
                tracing::debug!(kind=%self.kind, live=group.live(), "waiting for previous group to drain");
            }
            group.drained().await;
        }
        self.retired.clear();
    }

    fn live(&self) -> usize {
        self.active.iter().chain(self.retired.iter()).map(EmitterGroup::live).sum()
    }
}

/// Tracks which emitter groups are running and mediates every start, stop
/// and restart request from the operator layer.
///
/// At most one group per transport kind is active, and a new group only
/// starts after the previous one of that kind has fully exited.
pub struct SessionController<H, M> {
    http: Slot<H>,
    mqtt: Slot<M>,
    options: GroupOptions,
    started_at: Instant,
}

impl<H: TelemetrySink, M: TelemetrySink> SessionController<H, M> {
    /// A `None` sink disables that transport for the whole session.
    pub fn new(http: Option<Arc<H>>, mqtt: Option<Arc<M>>, options: GroupOptions) -> Self {
        Self {
            http: Slot::new(TransportKind::Http, http),
            mqtt: Slot::new(TransportKind::Mqtt, mqtt),
            options,
            started_at: Instant::now(),
        }
    }

    pub fn status(&self, kind: TransportKind) -> TransportStatus {
        match kind {
            TransportKind::Http => self.http.status(),
            TransportKind::Mqtt => self.mqtt.status(),
        }
    }

    pub fn is_enabled(&self, kind: TransportKind) -> bool {
        self.status(kind).enabled
    }

    pub fn is_running(&self, kind: TransportKind) -> bool {
        self.status(kind).is_running()
    }

    /// Emitter tasks of `kind` still alive, including ones being drained.
    pub fn live_emitters(&self, kind: TransportKind) -> usize {
        match kind {
            TransportKind::Http => self.http.live(),
            TransportKind::Mqtt => self.mqtt.live(),
        }
    }

    pub fn active_group(&self, kind: TransportKind) -> Option<&EmitterGroup> {
        match kind {
            TransportKind::Http => self.http.active.as_ref(),
            TransportKind::Mqtt => self.mqtt.active.as_ref(),
        }
    }

    pub async fn start(&mut self, kind: TransportKind, count: NonZeroUsize) -> Result<(), SessionError> {
        let options = self.options;
        match kind {
            TransportKind::Http => self.http.start(count, options).await,
            TransportKind::Mqtt => self.mqtt.start(count, options).await,
        }
    }

    /// Cancels the running group of `kind`, if any. Does not wait for it.
    pub fn stop(&mut self, kind: TransportKind) -> bool {
        match kind {
            TransportKind::Http => self.http.stop(),
            TransportKind::Mqtt => self.mqtt.stop(),
        }
    }

    /// Stops a running group, or asks `request_count` for a size and starts
    /// one when stopped. The count of a stopped group is forgotten, so every
    /// start asks again. `request_count` is never called on the stop path or
    /// for a disabled transport; an answer of `None` leaves the kind stopped.
    pub async fn toggle<F, Fut, E>(&mut self, kind: TransportKind, request_count: F) -> Result<ToggleOutcome, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<NonZeroUsize>, E>>,
        E: From<SessionError>,
    {
        if self.stop(kind) {
            return Ok(ToggleOutcome::Stopped);
        }
        if !self.is_enabled(kind) {
            return Err(SessionError::TransportDisabled(kind).into());
        }
        let Some(count) = request_count().await? else {
            return Ok(ToggleOutcome::Abandoned);
        };
        self.start(kind, count).await?;
        Ok(ToggleOutcome::Started(count))
    }

    pub async fn toggle_http<F, Fut, E>(&mut self, request_count: F) -> Result<ToggleOutcome, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<NonZeroUsize>, E>>,
        E: From<SessionError>,
    {
        self.toggle(TransportKind::Http, request_count).await
    }

    pub async fn toggle_mqtt<F, Fut, E>(&mut self, request_count: F) -> Result<ToggleOutcome, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<NonZeroUsize>, E>>,
        E: From<SessionError>,
    {
        self.toggle(TransportKind::Mqtt, request_count).await
    }

    /// Replaces the running group of `kind` with a fresh one of the same size.
    /// Returns `false` when nothing was running.
    pub async fn restart(&mut self, kind: TransportKind) -> Result<bool, SessionError> {
        let Some(count) = self.status(kind).count else {
            return Ok(false);
        };
        self.start(kind, count).await?;
        Ok(true)
    }

    /// Cancels every active group. Safe to call any number of times.
    pub fn shutdown_all(&mut self) {
        for kind in TransportKind::ALL {
            self.stop(kind);
        }
    }

    /// Waits for every cancelled group to exit.
    pub async fn drain(&mut self) {
        self.http.drain().await;
        self.mqtt.drain().await;
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}
