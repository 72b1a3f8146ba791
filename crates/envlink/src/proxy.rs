//! Cross-thread submission proxy for an environment.
//!
//! The proxy is the only path from an arbitrary caller thread to the
//! environment's owner thread. Submissions are delivered in order through a
//! single unbounded channel, so a teardown callback submitted last is
//! guaranteed to run after all previously queued work.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::env::Env;
use crate::error::{Error, Result};

/// A task to run on the environment's owner thread.
pub(crate) type EnvTask = Box<dyn FnOnce(&mut Env) + Send + 'static>;

/// Reference-counted handle for submitting work onto an owner thread.
///
/// The thread count tracks how many threads are currently permitted to
/// submit. It exists so the detaching thread can certify, at release time,
/// that no other submission is concurrently in flight.
pub struct EnvProxy {
    task_tx: mpsc::UnboundedSender<EnvTask>,
    thread_cnt: AtomicUsize,
    released: AtomicBool,
}

impl EnvProxy {
    /// Create a proxy over a worker's task channel. The creating thread
    /// counts as the first holder.
    pub(crate) fn new(task_tx: mpsc::UnboundedSender<EnvTask>) -> Arc<Self> {
        Arc::new(Self {
            task_tx,
            thread_cnt: AtomicUsize::new(1),
            released: AtomicBool::new(false),
        })
    }

    /// Register the calling thread as an additional submitter.
    pub fn acquire(self: &Arc<Self>) -> Result<Arc<Self>> {
        if self.released.load(Ordering::SeqCst) {
            return Err(Error::ProxyReleased);
        }
        self.thread_cnt.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(self))
    }

    /// Deregister a thread previously added with [`acquire`](Self::acquire).
    pub fn retire(&self) {
        let prev = self.thread_cnt.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(prev > 1, "retire would drop the last holder");
    }

    /// Number of threads currently permitted to submit.
    pub fn thread_cnt(&self) -> usize {
        self.thread_cnt.load(Ordering::SeqCst)
    }

    /// Submit a callback to run on the owner thread with exclusive access
    /// to the environment.
    ///
    /// Callbacks execute in submission order. With `synchronous` set, the
    /// call blocks until the callback has completed on the owner thread;
    /// otherwise it returns once the callback is queued.
    pub fn notify<F>(&self, callback: F, synchronous: bool) -> Result<()>
    where
        F: FnOnce(&mut Env) + Send + 'static,
    {
        if self.released.load(Ordering::SeqCst) {
            return Err(Error::ProxyReleased);
        }

        if synchronous {
            let (done_tx, done_rx) = std::sync::mpsc::sync_channel::<()>(1);
            self.task_tx
                .send(Box::new(move |env: &mut Env| {
                    callback(env);
                    let _ = done_tx.send(());
                }))
                .map_err(|_| Error::ChannelClosed)?;
            done_rx.recv().map_err(|_| Error::ChannelClosed)
        } else {
            self.task_tx
                .send(Box::new(callback))
                .map_err(|_| Error::ChannelClosed)
        }
    }

    /// Mark the proxy unusable for future submissions.
    ///
    /// Must be called exactly once, by the last holder. Tasks already moved
    /// into the channel are unaffected: the owner thread drains them before
    /// it stops.
    pub fn release(&self) -> Result<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Err(Error::ProxyReleased);
        }
        tracing::debug!("proxy released");
        Ok(())
    }
}
