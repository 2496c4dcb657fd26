use crate::error::SendError;
use crate::sample::{self, CncSample};
use crate::sink::TelemetrySink;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitterState {
    Idle,
    Running,
    Stopped,
}

/// Per-group diagnostics. Never consulted by the send loop itself.
#[derive(Debug, Default)]
pub struct EmitterStats {
    pub cycles: AtomicU64,
    pub sent: AtomicU64,
    pub failed: AtomicU64,
}

impl EmitterStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// One simulated machine: generate, send, sleep, repeat until cancelled.
pub struct Emitter<S> {
    machine_id: String,
    interval: Duration,
    sink: Arc<S>,
    send_timeout: Option<Duration>,
    stats: Arc<EmitterStats>,
    state: watch::Sender<EmitterState>,
}

impl<S: TelemetrySink> Emitter<S> {
    pub fn new(machine_id: impl Into<String>, interval: Duration, sink: Arc<S>) -> Self {
        let (state, _) = watch::channel(EmitterState::Idle);
        Self {
            machine_id: machine_id.into(),
            interval,
            sink,
            send_timeout: None,
            stats: Arc::new(EmitterStats::new()),
            state,
        }
    }

    pub fn with_send_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_stats(mut self, stats: Arc<EmitterStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn subscribe(&self) -> watch::Receiver<EmitterState> {
        self.state.subscribe()
    }

    /// Runs the send loop. Returns once `cancel` fires; the emitter is then
    /// `Stopped` for good.
    pub async fn run(self, cancel: CancellationToken) {
        self.state.send_replace(EmitterState::Running);
        tracing::trace!(machine_id=%self.machine_id, interval_ms=self.interval.as_millis() as u64, "emitter running");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let sample = sample::generate(&self.machine_id);
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = self.deliver(&sample) => outcome,
            };
            match outcome {
                Ok(()) => {
                    self.stats.sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(machine_id=%self.machine_id, error=%err, "dropped sample");
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
            self.stats.cycles.fetch_add(1, Ordering::Relaxed);
        }

        self.state.send_replace(EmitterState::Stopped);
        tracing::trace!(machine_id=%self.machine_id, "emitter stopped");
    }

    async fn deliver(&self, sample: &CncSample) -> Result<(), SendError> {
        match self.send_timeout {
            Some(limit) => tokio::time::timeout(limit, self.sink.send(sample))
                .await
                .map_err(|_| SendError::Timeout(limit))?,
            None => self.sink.send(sample).await,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every sample; optionally fails every send.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub(crate) fail: bool,
        pub(crate) hang: bool,
        pub(crate) samples: Mutex<Vec<CncSample>>,
        pub(crate) attempts: AtomicU64,
    }

    impl RecordingSink {
        pub(crate) fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub(crate) fn hanging() -> Self {
            Self {
                hang: true,
                ..Self::default()
            }
        }

        pub(crate) fn attempts(&self) -> u64 {
            self.attempts.load(Ordering::SeqCst)
        }

        pub(crate) fn machine_ids(&self) -> Vec<String> {
            self.samples
                .lock()
                .unwrap()
                .iter()
                .map(|s| s.machine_id.clone())
                .collect()
        }
    }

    impl TelemetrySink for RecordingSink {
        async fn send(&self, sample: &CncSample) -> Result<(), SendError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                std::future::pending::<()>().await;
            }
            if self.fail {
                return Err(SendError::Timeout(Duration::ZERO));
            }
            self.samples.lock().unwrap().push(sample.clone());
            Ok(())
        }
    }

    async fn wait_for_attempts(sink: &RecordingSink, n: u64) {
        while sink.attempts() < n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sends_immediately_then_on_interval() {
        let sink = Arc::new(RecordingSink::default());
        let emitter = Emitter::new("CNC-1", Duration::from_millis(500), sink.clone());
        let stats = emitter.stats.clone();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(emitter.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(sink.attempts(), 1);

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(sink.attempts(), 3);
        assert_eq!(stats.sent(), 3);

        cancel.cancel();
        task.await.unwrap();
        assert!(sink.machine_ids().iter().all(|id| id == "CNC-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn failing_sends_do_not_stop_the_loop() {
        let sink = Arc::new(RecordingSink::failing());
        let emitter = Emitter::new("CNC-1", Duration::from_millis(750), sink.clone());
        let stats = emitter.stats.clone();
        let mut state = emitter.subscribe();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(emitter.run(cancel.clone()));

        wait_for_attempts(&sink, 11).await;
        assert!(stats.cycles() >= 10);
        assert_eq!(stats.sent(), 0);
        assert!(stats.failed() >= 10);
        assert_eq!(*state.borrow(), EmitterState::Running);

        cancel.cancel();
        state
            .wait_for(|s| *s == EmitterState::Stopped)
            .await
            .unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_sleep() {
        let sink = Arc::new(RecordingSink::default());
        let emitter = Emitter::new("CNC-1", Duration::from_millis(2_000), sink.clone());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(emitter.run(cancel.clone()));

        wait_for_attempts(&sink, 1).await;
        let started = tokio::time::Instant::now();
        cancel.cancel();
        task.await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(2_000));
        assert_eq!(sink.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn send_timeout_bounds_a_stalled_send() {
        let sink = Arc::new(RecordingSink::hanging());
        let emitter = Emitter::new("CNC-1", Duration::from_millis(500), sink.clone())
            .with_send_timeout(Some(Duration::from_millis(100)));
        let stats = emitter.stats.clone();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(emitter.run(cancel.clone()));

        wait_for_attempts(&sink, 3).await;
        assert!(stats.failed() >= 2);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_before_start_never_sends() {
        let sink = Arc::new(RecordingSink::default());
        let emitter = Emitter::new("CNC-1", Duration::from_millis(500), sink.clone());
        let state = emitter.subscribe();
        assert_eq!(*state.borrow(), EmitterState::Idle);

        let cancel = CancellationToken::new();
        cancel.cancel();
        emitter.run(cancel).await;
        assert_eq!(sink.attempts(), 0);
        assert_eq!(*state.borrow(), EmitterState::Stopped);
    }
}
