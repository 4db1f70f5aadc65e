//! Deadlines for related-document lookups.
//!
//! Inside a tokio runtime the tokio timer is used. Elsewhere a single shared
//! background thread fires the deadlines, so callers driving the engine with
//! `futures::executor::block_on` or another executor still get bounded
//! lookups.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::pin;
use std::sync::{Condvar, Mutex, OnceLock, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use futures::channel::oneshot;
use futures::future::{self, Either};

const MIN_PRUNE_LEN: usize = 1024;

/// Runs `fut` until it completes or `timeout` elapses. Returns `None` on
/// expiry.
pub(crate) async fn with_timeout<F>(timeout: Duration, fut: F) -> Option<F::Output>
where
    F: Future,
{
    if tokio::runtime::Handle::try_current().is_ok() {
        return tokio::time::timeout(timeout, fut).await.ok();
    }

    let expired = DeadlineTimer::global().schedule(Instant::now() + timeout);
    match future::select(pin!(fut), expired).await {
        Either::Left((output, _)) => Some(output),
        // A dropped sender means the timer is unavailable; treat as expired.
        Either::Right(_) => None,
    }
}

struct Deadline {
    at: Instant,
    fire: oneshot::Sender<()>,
}

impl PartialEq for Deadline {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at
    }
}

impl Eq for Deadline {}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Deadline {
    // Earliest deadline at the top of the max-heap.
    fn cmp(&self, other: &Self) -> Ordering {
        other.at.cmp(&self.at)
    }
}

struct Queue {
    deadlines: BinaryHeap<Deadline>,
    prune_at: usize,
}

struct DeadlineTimer {
    queue: Mutex<Queue>,
    wake: Condvar,
    running: bool,
}

impl DeadlineTimer {
    fn global() -> &'static DeadlineTimer {
        static TIMER: OnceLock<DeadlineTimer> = OnceLock::new();
        TIMER.get_or_init(|| {
            let spawned = thread::Builder::new()
                .name("course-guard-timer".to_string())
                .spawn(|| DeadlineTimer::global().run());
            let running = match spawned {
                Ok(_) => true,
                Err(err) => {
                    tracing::error!(error = %err, "lookup timer thread failed to start");
                    false
                }
            };
            DeadlineTimer {
                queue: Mutex::new(Queue {
                    deadlines: BinaryHeap::new(),
                    prune_at: MIN_PRUNE_LEN,
                }),
                wake: Condvar::new(),
                running,
            }
        })
    }

    fn schedule(&self, at: Instant) -> oneshot::Receiver<()> {
        let (fire, expired) = oneshot::channel();
        if !self.running {
            return expired;
        }

        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        if queue.deadlines.len() >= queue.prune_at {
            // Lookups that finished in time drop their receiver.
            queue.deadlines.retain(|deadline| !deadline.fire.is_canceled());
            queue.prune_at = (queue.deadlines.len() * 2).max(MIN_PRUNE_LEN);
        }
        let earliest = queue.deadlines.peek().is_none_or(|next| at < next.at);
        queue.deadlines.push(Deadline { at, fire });
        drop(queue);

        if earliest {
            self.wake.notify_one();
        }
        expired
    }

    fn run(&self) {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            let now = Instant::now();
            while queue.deadlines.peek().is_some_and(|next| next.at <= now) {
                if let Some(deadline) = queue.deadlines.pop() {
                    let _ = deadline.fire.send(());
                }
            }
            let wait = queue
                .deadlines
                .peek()
                .map(|next| next.at.saturating_duration_since(now));
            queue = match wait {
                Some(wait) => {
                    self.wake
                        .wait_timeout(queue, wait)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .wake
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }
}
