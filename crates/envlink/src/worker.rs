//! Owner-thread task loop.
//!
//! Each environment gets a dedicated thread running this loop inside a
//! current-thread tokio runtime. The loop owns the [`Env`] outright; tasks
//! arrive through one channel and run with exclusive access, which is what
//! upholds the single-writer rule.

use tokio::sync::{mpsc, watch};

use crate::env::Env;
use crate::proxy::EnvTask;

/// The main task loop that runs inside the spawned owner thread.
///
/// Exits when the task channel fully closes (all senders gone, queue
/// drained) or when the shutdown signal fires. The channel-close path is
/// the orderly one: every task that was accepted gets to run before the
/// loop stops.
pub(crate) async fn run_worker(
    name: String,
    mut task_rx: mpsc::UnboundedReceiver<EnvTask>,
    mut shutdown_rx: watch::Receiver<bool>,
    ready_tx: std::sync::mpsc::SyncSender<()>,
) {
    // Constructed here so the owner-thread token binds to this thread.
    let mut env = Env::new(name.clone());
    let _ = ready_tx.send(());

    loop {
        tokio::select! {
            biased;

            res = shutdown_rx.changed() => {
                if res.is_err() || *shutdown_rx.borrow() {
                    tracing::debug!("[env_worker:{}] Shutdown signal received", name);
                    break;
                }
            }

            task = task_rx.recv() => {
                match task {
                    Some(task) => task(&mut env),
                    None => {
                        tracing::debug!("[env_worker:{}] Task channel closed", name);
                        break;
                    }
                }
            }
        }
    }

    tracing::debug!("[env_worker:{}] Worker finished", name);
}
