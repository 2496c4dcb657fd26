use crate::emitter::{Emitter, EmitterState, EmitterStats};
use crate::sink::TelemetrySink;
use rand::Rng;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

pub const INTERVAL_MS: (u64, u64) = (500, 2_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Http,
    Mqtt,
}

impl TransportKind {
    pub const ALL: [TransportKind; 2] = [TransportKind::Http, TransportKind::Mqtt];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Http => "HTTP",
            TransportKind::Mqtt => "MQTT",
        }
    }

    /// Machine id prefix; distinct per kind so concurrent cohorts never collide.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            TransportKind::Http => "CNC",
            TransportKind::Mqtt => "CNC-MQTT",
        }
    }

    pub fn machine_id(&self, ordinal: usize) -> String {
        format!("{}-{}", self.id_prefix(), ordinal)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GroupOptions {
    pub send_timeout: Option<Duration>,
}

/// Cancellation point for a whole cohort. Cancelling twice, or after the
/// cohort already exited, does nothing.
#[derive(Debug, Clone, Default)]
pub struct GroupHandle {
    cancel: CancellationToken,
}

impl GroupHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[derive(Debug, Clone)]
pub struct EmitterInfo {
    pub machine_id: String,
    pub interval: Duration,
    state: watch::Receiver<EmitterState>,
}

impl EmitterInfo {
    pub fn state(&self) -> EmitterState {
        *self.state.borrow()
    }
}

/// `count` emitters of one transport kind, started together and stopped
/// through a single [`GroupHandle`]. Dropping the group cancels it.
pub struct EmitterGroup {
    kind: TransportKind,
    count: NonZeroUsize,
    handle: GroupHandle,
    tracker: TaskTracker,
    emitters: Vec<EmitterInfo>,
    stats: Arc<EmitterStats>,
}

impl EmitterGroup {
    /// Spawns every emitter onto the current tokio runtime.
    pub fn start<S: TelemetrySink>(
        kind: TransportKind,
        count: NonZeroUsize,
        sink: Arc<S>,
        options: GroupOptions,
    ) -> Self {
        let handle = GroupHandle::default();
        let tracker = TaskTracker::new();
        let stats = Arc::new(EmitterStats::new());
        let mut rng = rand::thread_rng();

        let emitters = (1..=count.get())
            .map(|ordinal| {
                let interval = Duration::from_millis(rng.gen_range(INTERVAL_MS.0..=INTERVAL_MS.1));
                let emitter = Emitter::new(kind.machine_id(ordinal), interval, sink.clone())
                    .with_send_timeout(options.send_timeout)
                    .with_stats(stats.clone());
                let info = EmitterInfo {
                    machine_id: emitter.machine_id().to_string(),
                    interval: emitter.interval(),
                    state: emitter.subscribe(),
                };
                tracker.spawn(emitter.run(handle.cancel.clone()));
                info
            })
            .collect();
        tracker.close();

        tracing::info!(kind=%kind, count=count.get(), "started emitter group");

        Self {
            kind,
            count,
            handle,
            tracker,
            emitters,
            stats,
        }
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn count(&self) -> NonZeroUsize {
        self.count
    }

    pub fn handle(&self) -> GroupHandle {
        self.handle.clone()
    }

    pub fn cancel(&self) {
        if !self.handle.is_cancelled() {
            tracing::info!(kind=%self.kind, count=self.count.get(), "stopping emitter group");
        }
        self.handle.cancel();
    }

    pub fn emitters(&self) -> &[EmitterInfo] {
        &self.emitters
    }

    pub fn stats(&self) -> &EmitterStats {
        &self.stats
    }

    /// Emitter tasks that have not exited yet.
    pub fn live(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_drained(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Resolves once every emitter has exited. Diagnostic only.
    pub async fn drained(&self) {
        self.tracker.wait().await;
    }
}

impl Drop for EmitterGroup {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}

impl fmt::Debug for EmitterGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmitterGroup")
            .field("kind", &self.kind)
            .field("count", &self.count)
            .field("cancelled", &self.handle.is_cancelled())
            .field("live", &self.live())
            .finish()
    }
}
