//! Owner-thread spawning.
//!
//! `spawn_env_worker` creates the dedicated thread for one environment and
//! hands back an [`EnvWorker`] link. The spawn blocks until the environment
//! has been constructed on its owner thread, so a returned worker is always
//! ready to accept tasks.

use std::thread;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use crate::error::{Error, Result};
use crate::proxy::EnvTask;
use crate::worker::run_worker;

/// Link to a spawned owner thread.
///
/// Holds the task-channel sender that proxies are minted from, the shutdown
/// signal, and the join handle. Dropping the worker signals shutdown and
/// waits for the thread to finish.
pub(crate) struct EnvWorker {
    task_tx: Mutex<Option<mpsc::UnboundedSender<EnvTask>>>,
    shutdown_tx: watch::Sender<bool>,
    thread_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl EnvWorker {
    /// Clone the task sender, if the channel has not been closed yet.
    pub(crate) fn task_sender(&self) -> Option<mpsc::UnboundedSender<EnvTask>> {
        self.task_tx.lock().as_ref().cloned()
    }

    /// Drop this side's task sender. Once every proxy clone is gone too,
    /// the owner thread drains its queue and stops.
    pub(crate) fn close_task_channel(&self) {
        self.task_tx.lock().take();
    }

    /// Signal the owner thread to stop without draining its queue.
    pub(crate) fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for the owner thread to finish.
    pub(crate) fn join(&self) -> Result<()> {
        if let Some(handle) = self.thread_handle.lock().take() {
            handle.join().map_err(|_| Error::WorkerPanic)?;
        }
        Ok(())
    }
}

impl Drop for EnvWorker {
    fn drop(&mut self) {
        self.close_task_channel();
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.thread_handle.lock().take() {
            let _ = handle.join();
        }
    }
}

/// Spawn the owner thread for a new environment.
pub(crate) fn spawn_env_worker(name: String) -> Result<EnvWorker> {
    let (task_tx, task_rx) = mpsc::unbounded_channel::<EnvTask>();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Init handshake: the worker signals once the environment exists.
    let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel::<()>(1);

    let thread_name = name.clone();
    let thread_handle = thread::Builder::new().name(name.clone()).spawn(move || {
        tracing::debug!("[env_worker:{}] Thread started", thread_name);

        let rt = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                tracing::error!("[env_worker:{}] Failed to build runtime: {}", thread_name, e);
                return;
            }
        };

        rt.block_on(run_worker(
            thread_name.clone(),
            task_rx,
            shutdown_rx,
            ready_tx,
        ));

        rt.shutdown_background();
        tracing::debug!("[env_worker:{}] Thread exiting", thread_name);
    })?;

    ready_rx.recv().map_err(|_| Error::ChannelClosed)?;
    tracing::debug!("[spawn_env_worker] {} is ready", name);

    Ok(EnvWorker {
        task_tx: Mutex::new(Some(task_tx)),
        shutdown_tx,
        thread_handle: Mutex::new(Some(thread_handle)),
    })
}
