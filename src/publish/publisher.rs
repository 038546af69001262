use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::debug;

use crate::analysis::FrameFeatures;
use crate::config::{PublisherConfig, ReportMode};
use crate::http_client;
use crate::publish::payload::MetricsPayload;
use crate::segment::SegmentResult;

/// Most recent per-frame features plus the host transport position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub features: FrameFeatures,
    pub playhead_secs: f64,
}

/// Single-slot handoff cell between the audio thread and the publisher.
///
/// Overwrite semantics on both slots: the publisher only ever observes the
/// most recent value, never a backlog.
#[derive(Default)]
struct MetricsCell {
    snapshot: Option<Snapshot>,
    pending_segment: Option<SegmentResult>,
}

struct Shared {
    cell: Mutex<MetricsCell>,
    wake: Condvar,
    stop: AtomicBool,
}

fn lock(cell: &Mutex<MetricsCell>) -> MutexGuard<'_, MetricsCell> {
    cell.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Background reporting task.
///
/// The audio thread writes a handful of scalars under a short critical
/// section; this thread wakes on its period (or a segment handoff), copies
/// the cell out, releases the lock, and only then talks to the network.
pub struct MetricsPublisher {
    shared: Arc<Shared>,
    join: Option<JoinHandle<()>>,
}

impl MetricsPublisher {
    pub fn spawn(config: PublisherConfig) -> Self {
        let shared = Arc::new(Shared {
            cell: Mutex::new(MetricsCell::default()),
            wake: Condvar::new(),
            stop: AtomicBool::new(false),
        });
        let worker_shared = Arc::clone(&shared);
        let join = thread::spawn(move || publisher_loop(worker_shared, config));
        Self {
            shared,
            join: Some(join),
        }
    }

    /// Overwrite the latest snapshot. Called from the audio thread once per
    /// completed frame; does not wake the publisher, which paces itself.
    pub fn update_snapshot(&self, features: FrameFeatures, playhead_secs: f64) {
        let mut cell = lock(&self.shared.cell);
        cell.snapshot = Some(Snapshot {
            features,
            playhead_secs,
        });
    }

    /// Hand off a completed segment and wake the publisher so it goes out
    /// promptly rather than on the next period tick.
    pub fn submit_segment(&self, result: SegmentResult) {
        let mut cell = lock(&self.shared.cell);
        cell.pending_segment = Some(result);
        drop(cell);
        self.shared.wake.notify_one();
    }

    pub fn latest_snapshot(&self) -> Option<Snapshot> {
        lock(&self.shared.cell).snapshot
    }

    /// Stop and join the background thread. In-flight posts finish on their
    /// own short timeout; nothing is force-cancelled.
    pub fn stop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        self.shared.wake.notify_all();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for MetricsPublisher {
    fn drop(&mut self) {
        self.stop();
    }
}

enum Work {
    Segment(SegmentResult),
    Snapshot(Snapshot),
}

fn publisher_loop(shared: Arc<Shared>, config: PublisherConfig) {
    // The agent lives and dies with this thread; the audio thread never
    // touches it.
    let agent = http_client::build_agent();
    let period = config.period();
    let mut cell = lock(&shared.cell);
    loop {
        if shared.stop.load(Ordering::Acquire) {
            break;
        }
        cell = match shared.wake.wait_timeout(cell, period) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        };
        if shared.stop.load(Ordering::Acquire) {
            break;
        }
        // Copy the work item out under the lock; serialize and send after
        // releasing it.
        let work = match config.mode {
            ReportMode::PerSegment => cell.pending_segment.take().map(Work::Segment),
            ReportMode::Continuous => cell.snapshot.map(Work::Snapshot),
        };
        if let Some(work) = work {
            drop(cell);
            let payload = match work {
                Work::Segment(segment) => {
                    MetricsPayload::new(&segment.means, segment.started_at, segment.ended_at)
                }
                Work::Snapshot(snapshot) => MetricsPayload::new(
                    &snapshot.features,
                    snapshot.playhead_secs,
                    snapshot.playhead_secs,
                ),
            };
            post(&agent, &config.endpoint, &payload);
            cell = lock(&shared.cell);
        }
    }
}

/// Best-effort delivery: failures are dropped, never retried, and never
/// surfaced to the audio path.
fn post(agent: &ureq::Agent, endpoint: &str, payload: &MetricsPayload) {
    if let Err(err) = agent.post(endpoint).send_json(payload) {
        debug!("Dropped metrics publish to {endpoint}: {err}");
    }
}
