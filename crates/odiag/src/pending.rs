//! Fan-out/fan-in join for asynchronous child requests.
//!
//! Every outstanding operation is represented by a [`PendingToken`]. A token
//! is only created from the counter or from another live token, so the count
//! cannot reach zero while a parent is still handing out children. Releasing a
//! token (explicitly or by dropping it) decrements the count; the transition to
//! zero runs the completion callback exactly once.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

type OnZero = Box<dyn FnOnce() + Send>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PendingStats {
    pub outstanding: usize,
    pub increments: u64,
    pub decrements: u64,
    pub completed: bool,
}

struct Inner {
    outstanding: AtomicUsize,
    increments: AtomicU64,
    decrements: AtomicU64,
    completed: AtomicBool,
    on_zero: Mutex<Option<OnZero>>,
}

impl Inner {
    fn acquire(&self) {
        self.increments.fetch_add(1, Ordering::SeqCst);
        self.outstanding.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self) {
        let previous = self
            .outstanding
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match previous {
            Ok(previous) => {
                self.decrements.fetch_add(1, Ordering::SeqCst);
                if previous == 1 {
                    self.fire();
                }
            }
            Err(_) => {
                tracing::error!(target: "odiag.explore", "pending-operation counter underflow");
                debug_assert!(false, "pending-operation counter underflow");
            }
        }
    }

    fn fire(&self) {
        if self.completed.swap(true, Ordering::SeqCst) {
            return;
        }
        let callback = self.on_zero.lock().take();
        if let Some(callback) = callback {
            callback();
        }
    }
}

/// Shared counter of outstanding operations for one snapshot.
#[derive(Clone)]
pub struct PendingOps {
    inner: Arc<Inner>,
}

impl PendingOps {
    pub fn new(on_zero: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                outstanding: AtomicUsize::new(0),
                increments: AtomicU64::new(0),
                decrements: AtomicU64::new(0),
                completed: AtomicBool::new(false),
                on_zero: Mutex::new(Some(Box::new(on_zero))),
            }),
        }
    }

    /// Starts a top-level operation.
    pub fn begin(&self) -> PendingToken {
        self.inner.acquire();
        PendingToken {
            inner: self.inner.clone(),
        }
    }

    pub fn stats(&self) -> PendingStats {
        PendingStats {
            outstanding: self.inner.outstanding.load(Ordering::SeqCst),
            increments: self.inner.increments.load(Ordering::SeqCst),
            decrements: self.inner.decrements.load(Ordering::SeqCst),
            completed: self.inner.completed.load(Ordering::SeqCst),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.inner.completed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for PendingOps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingOps")
            .field("stats", &self.stats())
            .finish()
    }
}

/// One outstanding operation. Released exactly once, on [`PendingToken::complete`]
/// or drop.
#[must_use = "dropping a token releases it immediately"]
pub struct PendingToken {
    inner: Arc<Inner>,
}

impl PendingToken {
    /// Registers a nested operation. The count includes it before `self` can
    /// be released.
    pub fn child(&self) -> PendingToken {
        self.inner.acquire();
        PendingToken {
            inner: self.inner.clone(),
        }
    }

    pub fn complete(self) {
        drop(self);
    }
}

impl Drop for PendingToken {
    fn drop(&mut self) {
        self.inner.release();
    }
}

impl fmt::Debug for PendingToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingToken")
            .field(
                "outstanding",
                &self.inner.outstanding.load(Ordering::SeqCst),
            )
            .finish()
    }
}
