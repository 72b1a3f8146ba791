//! The thread-affine plugin environment.
//!
//! An [`Env`] is only ever read or mutated on the thread that created it.
//! Every other thread must go through [`EnvProxy`](crate::EnvProxy), which
//! delivers closures onto the owner thread. The owner-thread rule is the
//! system's core data-race defense, so the environment carries an explicit
//! owning-thread token and checks it on every direct access in debug builds.

use std::thread::{self, ThreadId};

/// Lifecycle phase of an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvPhase {
    /// Constructed, owner-side init work not yet confirmed.
    Initializing,
    /// Accepting ordinary work.
    Ready,
    /// Teardown has run; terminal.
    Deinitialized,
}

/// A stateful plugin environment owned by a single thread.
pub struct Env {
    name: String,
    owner: ThreadId,
    phase: EnvPhase,
}

impl Env {
    /// Bind a new environment to the calling thread.
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            owner: thread::current().id(),
            phase: EnvPhase::Initializing,
        }
    }

    fn check_owner(&self) {
        debug_assert_eq!(
            thread::current().id(),
            self.owner,
            "Env '{}' accessed off its owner thread",
            self.name
        );
    }

    /// Name of this environment (also the owner thread's name).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle phase. Owner thread only.
    pub fn phase(&self) -> EnvPhase {
        self.check_owner();
        self.phase
    }

    /// Owner-thread side of the init handshake.
    pub(crate) fn mark_ready(&mut self) {
        self.check_owner();
        self.phase = EnvPhase::Ready;
        tracing::debug!("[env:{}] ready", self.name);
    }

    /// Owner-thread side of the deinit handshake.
    ///
    /// Delivered through the proxy queue, so it runs after everything
    /// submitted before the handshake.
    pub fn finish_deinit(&mut self) {
        self.check_owner();
        self.phase = EnvPhase::Deinitialized;
        tracing::debug!("[env:{}] deinitialized", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_thread_can_access() {
        let mut env = Env::new("test-env".to_string());
        assert_eq!(env.phase(), EnvPhase::Initializing);
        env.mark_ready();
        assert_eq!(env.phase(), EnvPhase::Ready);
        env.finish_deinit();
        assert_eq!(env.phase(), EnvPhase::Deinitialized);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "accessed off its owner thread")]
    fn test_foreign_thread_access_is_caught() {
        let env = thread::spawn(|| Env::new("foreign".to_string()))
            .join()
            .unwrap();
        // Debug-build owner token check fires here.
        let _ = env.phase();
    }
}
