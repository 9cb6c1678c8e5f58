//! Lower-body producers running on their own OS threads.
//!
//! Pose estimation blocks for tens of milliseconds per frame, so sources never
//! run on the async listener. Each source gets a thread that pushes its
//! snapshots into the shared workspace.

pub mod replay;

pub use replay::ReplaySource;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::config::ProducerConfig;
use crate::pose::PoseSnapshot;
use crate::workspace::FusionWorkspace;

/// Blocking source of lower-body snapshots (camera pipeline, replay file, ...).
pub trait LowerBodySource: Send + 'static {
    /// Next snapshot. `Ok(None)` ends the producer; `Err` is logged and retried.
    fn next_snapshot(&mut self) -> Result<Option<PoseSnapshot>>;
}

impl<F> LowerBodySource for F
where
    F: FnMut() -> Result<Option<PoseSnapshot>> + Send + 'static,
{
    fn next_snapshot(&mut self) -> Result<Option<PoseSnapshot>> {
        self()
    }
}

/// Handle to a producer thread. Dropping it stops and joins the thread.
pub struct ProducerThread {
    name: String,
    running: Arc<AtomicBool>,
    produced: Arc<AtomicU64>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ProducerThread {
    pub fn spawn<S: LowerBodySource>(
        name: &str,
        mut source: S,
        workspace: Arc<FusionWorkspace>,
        config: &ProducerConfig,
    ) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let produced = Arc::new(AtomicU64::new(0));
        let running_ref = Arc::clone(&running);
        let produced_ref = Arc::clone(&produced);
        let interval = (config.interval_ms > 0).then(|| Duration::from_millis(config.interval_ms));
        let retry_delay = Duration::from_millis(config.retry_delay_ms);
        let tag = name.to_string();

        let handle = thread::Builder::new()
            .name(format!("producer-{}", name))
            .spawn(move || {
                info!("[{}] producer started", tag);
                while running_ref.load(Ordering::Relaxed) {
                    let start = Instant::now();
                    match source.next_snapshot() {
                        Ok(Some(snapshot)) => {
                            workspace.update_lower_body(snapshot);
                            produced_ref.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(None) => {
                            info!("[{}] source exhausted", tag);
                            break;
                        }
                        Err(e) => {
                            warn!("[{}] source error: {:#}, retrying", tag, e);
                            thread::sleep(retry_delay);
                            continue;
                        }
                    }
                    if let Some(interval) = interval {
                        let elapsed = start.elapsed();
                        if elapsed < interval {
                            thread::sleep(interval - elapsed);
                        }
                    }
                }
                running_ref.store(false, Ordering::Relaxed);
                debug!(
                    "[{}] producer stopped after {} snapshots",
                    tag,
                    produced_ref.load(Ordering::Relaxed)
                );
            })
            .with_context(|| format!("failed to spawn producer thread {}", name))?;

        Ok(Self {
            name: name.to_string(),
            running,
            produced,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshots delivered to the workspace so far.
    pub fn produced(&self) -> u64 {
        self.produced.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
            && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Ask the thread to stop after the current snapshot.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Wait for the thread to end on its own (source exhausted or stopped).
    pub fn join(mut self) -> u64 {
        self.wait();
        self.produced()
    }

    fn wait(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("[{}] producer thread panicked", self.name);
            }
        }
    }
}

impl Drop for ProducerThread {
    fn drop(&mut self) {
        self.stop();
        self.wait();
    }
}
