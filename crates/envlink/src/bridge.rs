//! Lifecycle bridge between a foreign-runtime handle and its environment.
//!
//! The bridge enforces the init/deinit handshake that bounds an
//! environment's usable lifetime: init before deinit, deinit exactly once,
//! and nothing after close. Every entry point starts by asking for a
//! liveness guard, so a call that arrives after the bridge has begun
//! closing becomes a defined no-op instead of a use of cleared state.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::env::Env;
use crate::error::{protocol_violation, Error, Result};
use crate::proxy::EnvProxy;
use crate::spawn::{spawn_env_worker, EnvWorker};

/// Lifecycle phase of a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BridgePhase {
    /// Owner-side init work still running; no proxy yet.
    Initializing = 0,
    /// Proxy live; submissions admitted.
    Open = 1,
    /// Deinit handshake claimed; detach in progress.
    DeinitRequested = 2,
    /// Terminal. The proxy is gone and every entry point is a no-op.
    Closed = 3,
}

impl BridgePhase {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => BridgePhase::Initializing,
            1 => BridgePhase::Open,
            2 => BridgePhase::DeinitRequested,
            _ => BridgePhase::Closed,
        }
    }
}

/// Admission token for a guarded bridge entry point.
///
/// Holding one proves the bridge had not begun closing when the call was
/// admitted. Entry points that are refused a guard return through the same
/// early exit without touching the proxy slot.
pub struct LivenessGuard<'a> {
    bridge: &'a EnvBridge,
}

impl LivenessGuard<'_> {
    /// Phase of the bridge this guard admitted into.
    pub fn phase(&self) -> BridgePhase {
        self.bridge.phase()
    }
}

/// Pairs a foreign-runtime handle with its environment/proxy pair.
///
/// Entry points may be called from any thread. The phase machine is a
/// single atomic; the `Open -> DeinitRequested` transition is claimed with
/// a compare-exchange so the deinit handshake runs at most once even under
/// concurrent callers.
pub struct EnvBridge {
    name: String,
    phase: AtomicU8,
    worker: EnvWorker,
    proxy: Mutex<Option<Arc<EnvProxy>>>,
}

impl EnvBridge {
    /// Create a bridge with a freshly spawned owner thread, in the
    /// `Initializing` phase.
    pub fn new(name: impl Into<String>) -> Result<Arc<Self>> {
        let name = name.into();
        let worker = spawn_env_worker(name.clone())?;
        Ok(Arc::new(Self {
            name,
            phase: AtomicU8::new(BridgePhase::Initializing as u8),
            worker,
            proxy: Mutex::new(None),
        }))
    }

    /// Name of the bridged environment.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> BridgePhase {
        BridgePhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    /// Admit a call only while the bridge has not begun closing.
    fn liveness(&self) -> Option<LivenessGuard<'_>> {
        match self.phase() {
            BridgePhase::DeinitRequested | BridgePhase::Closed => None,
            _ => Some(LivenessGuard { bridge: self }),
        }
    }

    /// Owner-side initialization has completed: create the proxy and open
    /// the bridge.
    ///
    /// Must be called exactly once, while the bridge is `Initializing`.
    /// Calling it twice is a protocol violation; calling it after close is
    /// ignored.
    pub fn on_init_done(&self) {
        let Some(_live) = self.liveness() else {
            tracing::warn!("[bridge:{}] on_init_done after close, ignoring", self.name);
            return;
        };

        if self
            .phase
            .compare_exchange(
                BridgePhase::Initializing as u8,
                BridgePhase::Open as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            protocol_violation("on_init_done called twice");
        }

        let Some(task_tx) = self.worker.task_sender() else {
            protocol_violation("owner thread channel gone before init completed");
        };
        let proxy = EnvProxy::new(task_tx);

        // The ready mark goes through the same queue ordinary work uses,
        // so it is ordered before everything submitted after this call.
        if proxy.notify(|env: &mut Env| env.mark_ready(), false).is_err() {
            protocol_violation("owner thread gone before init completed");
        }

        *self.proxy.lock() = Some(proxy);
        tracing::debug!("[bridge:{}] open", self.name);
    }

    /// The foreign-runtime side of teardown has finished: release the
    /// native side.
    ///
    /// Idempotent once the bridge has begun closing. The deinit callback is
    /// submitted asynchronously and the proxy is detached immediately
    /// after, without waiting for the owner thread. The queued callback
    /// stays valid regardless: it was moved into the owner thread's task
    /// channel, which outlives the bridge's own fields.
    pub fn on_deinit_done(&self) {
        let Some(_live) = self.liveness() else {
            tracing::warn!(
                "[bridge:{}] on_deinit_done after close, ignoring",
                self.name
            );
            return;
        };

        // Claim the close. A racing second call loses the exchange and
        // treats the handshake as already handled.
        match self.phase.compare_exchange(
            BridgePhase::Open as u8,
            BridgePhase::DeinitRequested as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => {}
            Err(cur) if cur == BridgePhase::Initializing as u8 => {
                protocol_violation("on_deinit_done before on_init_done");
            }
            Err(_) => return,
        }

        // The handshake invariant guarantees the proxy exists here: it was
        // created by on_init_done and nothing else takes it.
        let taken = self.proxy.lock().take();
        let Some(proxy) = taken else {
            protocol_violation("bridge open without a proxy");
        };

        // Deinit rides the same queue as ordinary work, so it runs after
        // everything submitted before the handshake.
        if proxy
            .notify(|env: &mut Env| env.finish_deinit(), false)
            .is_err()
        {
            protocol_violation("deinit submission failed");
        }

        // Detach immediately. The count check certifies no other thread is
        // mid-submission while the proxy is being released.
        if proxy.thread_cnt() != 1 {
            protocol_violation("proxy detached while other threads hold it");
        }
        if proxy.release().is_err() {
            protocol_violation("proxy released twice");
        }
        drop(proxy);
        self.worker.close_task_channel();

        self.phase.store(BridgePhase::Closed as u8, Ordering::SeqCst);
        tracing::debug!("[bridge:{}] closed", self.name);
    }

    /// Submit ordinary work to the environment's owner thread.
    ///
    /// Returns [`Error::BridgeClosed`] once the bridge has begun closing
    /// and [`Error::NotOpen`] before `on_init_done`.
    pub fn post<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce(&mut Env) + Send + 'static,
    {
        let Some(_live) = self.liveness() else {
            return Err(Error::BridgeClosed);
        };

        let proxy = self.proxy.lock().as_ref().map(Arc::clone);
        match proxy {
            Some(proxy) => proxy.notify(callback, false),
            None => Err(Error::NotOpen),
        }
    }

    /// Snapshot of the live proxy, for callers that need to register
    /// additional submitter threads via [`EnvProxy::acquire`].
    pub fn proxy(&self) -> Option<Arc<EnvProxy>> {
        self.proxy.lock().as_ref().map(Arc::clone)
    }

    /// Wait for the owner thread to finish. Meaningful after the deinit
    /// handshake has closed the bridge.
    pub fn join(&self) -> Result<()> {
        self.worker.join()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::EnvPhase;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .try_init();
    }

    #[test]
    fn test_full_lifecycle_ordering() {
        init_tracing();

        let bridge = EnvBridge::new("lifecycle").unwrap();
        assert_eq!(bridge.phase(), BridgePhase::Initializing);

        bridge.on_init_done();
        assert_eq!(bridge.phase(), BridgePhase::Open);

        // Three ordinary callbacks before the handshake. Each records its
        // index and the phase it observed; all must see `Ready`, proving
        // they ran before the deinit callback.
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let seen = Arc::clone(&seen);
            bridge
                .post(move |env| seen.lock().push((i, env.phase())))
                .unwrap();
        }

        bridge.on_deinit_done();
        assert_eq!(bridge.phase(), BridgePhase::Closed);

        // Second handshake call is a no-op.
        bridge.on_deinit_done();
        assert_eq!(bridge.phase(), BridgePhase::Closed);

        bridge.join().unwrap();
        assert_eq!(
            *seen.lock(),
            vec![
                (0, EnvPhase::Ready),
                (1, EnvPhase::Ready),
                (2, EnvPhase::Ready)
            ]
        );
    }

    #[test]
    fn test_deinit_with_no_prior_work() {
        let bridge = EnvBridge::new("empty-deinit").unwrap();
        bridge.on_init_done();
        bridge.on_deinit_done();
        bridge.join().unwrap();
        assert_eq!(bridge.phase(), BridgePhase::Closed);
    }

    #[test]
    fn test_post_after_close_is_rejected_without_touching_state() {
        let bridge = EnvBridge::new("post-after-close").unwrap();
        bridge.on_init_done();
        bridge.on_deinit_done();

        let result = bridge.post(|_env| {});
        assert!(matches!(result, Err(Error::BridgeClosed)));
        assert!(bridge.proxy().is_none());
    }

    #[test]
    fn test_post_before_init_is_rejected() {
        let bridge = EnvBridge::new("post-before-init").unwrap();
        let result = bridge.post(|_env| {});
        assert!(matches!(result, Err(Error::NotOpen)));
    }

    #[test]
    #[should_panic(expected = "on_deinit_done before on_init_done")]
    fn test_deinit_before_init_is_a_protocol_violation() {
        let bridge = EnvBridge::new("early-deinit").unwrap();
        bridge.on_deinit_done();
    }

    #[test]
    #[should_panic(expected = "on_init_done called twice")]
    fn test_double_init_is_a_protocol_violation() {
        let bridge = EnvBridge::new("double-init").unwrap();
        bridge.on_init_done();
        bridge.on_init_done();
    }

    #[test]
    #[should_panic(expected = "proxy detached while other threads hold it")]
    fn test_detach_with_concurrent_holder_is_a_protocol_violation() {
        let bridge = EnvBridge::new("contended-detach").unwrap();
        bridge.on_init_done();

        // A second thread registers as a submitter and never retires.
        let proxy = bridge.proxy().unwrap();
        let held = std::thread::spawn(move || proxy.acquire().unwrap())
            .join()
            .unwrap();
        assert_eq!(held.thread_cnt(), 2);

        bridge.on_deinit_done();
    }

    #[test]
    fn test_liveness_guard_reports_admitted_phase() {
        let bridge = EnvBridge::new("guard-phase").unwrap();
        let guard = bridge.liveness().unwrap();
        assert_eq!(guard.phase(), BridgePhase::Initializing);

        bridge.on_init_done();
        bridge.on_deinit_done();
        assert!(bridge.liveness().is_none());
    }

    #[test]
    fn test_concurrent_deinit_runs_once() {
        let bridge = EnvBridge::new("racing-deinit").unwrap();
        bridge.on_init_done();

        let mut joins = Vec::new();
        for _ in 0..4 {
            let bridge = Arc::clone(&bridge);
            joins.push(std::thread::spawn(move || bridge.on_deinit_done()));
        }
        for join in joins {
            join.join().unwrap();
        }

        assert_eq!(bridge.phase(), BridgePhase::Closed);
        bridge.join().unwrap();
    }
}
