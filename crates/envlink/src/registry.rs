//! Process-global handle registry for bridges.
//!
//! The foreign-runtime adapter addresses bridges by opaque numeric handle;
//! this module is the resolver side of that contract, plus the two
//! handle-style lifecycle entry points it dispatches to. Entry points have
//! no return value: lifecycle misuse is a protocol violation, not a
//! recoverable condition, while calls that arrive after close are absorbed
//! by the bridge's liveness guard.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;

use crate::bridge::EnvBridge;
use crate::error::protocol_violation;

static BRIDGES: LazyLock<DashMap<u64, Arc<EnvBridge>>> = LazyLock::new(DashMap::new);
static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Register a bridge and return its opaque handle.
pub fn register_bridge(bridge: Arc<EnvBridge>) -> u64 {
    let handle = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
    tracing::debug!("registered bridge '{}' as handle {}", bridge.name(), handle);
    BRIDGES.insert(handle, bridge);
    handle
}

/// Resolve a handle to its bridge, if still registered.
pub fn resolve_bridge(handle: u64) -> Option<Arc<EnvBridge>> {
    BRIDGES.get(&handle).map(|entry| Arc::clone(entry.value()))
}

/// Remove a bridge from the registry. Called when the foreign-runtime
/// object is collected; the bridge itself may already be closed.
pub fn unregister_bridge(handle: u64) -> Option<Arc<EnvBridge>> {
    BRIDGES.remove(&handle).map(|(_, bridge)| bridge)
}

/// Foreign-runtime entry point: owner-side init has finished.
pub fn notify_on_init_done(handle: u64) {
    let Some(bridge) = resolve_bridge(handle) else {
        protocol_violation("notify_on_init_done: unknown bridge handle");
    };
    bridge.on_init_done();
}

/// Foreign-runtime entry point: foreign-side teardown has finished.
///
/// Safe to call more than once; repeats are no-ops thanks to the bridge's
/// liveness guard.
pub fn notify_on_deinit_done(handle: u64) {
    let Some(bridge) = resolve_bridge(handle) else {
        protocol_violation("notify_on_deinit_done: unknown bridge handle");
    };
    bridge.on_deinit_done();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::BridgePhase;

    #[test]
    fn test_register_resolve_unregister() {
        let bridge = EnvBridge::new("registry-basic").unwrap();
        let handle = register_bridge(Arc::clone(&bridge));

        let resolved = resolve_bridge(handle).unwrap();
        assert_eq!(resolved.name(), "registry-basic");

        let removed = unregister_bridge(handle).unwrap();
        assert_eq!(removed.name(), "registry-basic");
        assert!(resolve_bridge(handle).is_none());
    }

    #[test]
    fn test_entry_points_drive_the_handshake() {
        let bridge = EnvBridge::new("registry-lifecycle").unwrap();
        let handle = register_bridge(Arc::clone(&bridge));

        notify_on_init_done(handle);
        assert_eq!(bridge.phase(), BridgePhase::Open);

        notify_on_deinit_done(handle);
        assert_eq!(bridge.phase(), BridgePhase::Closed);

        // Late repeat resolves fine and is absorbed by the liveness guard.
        notify_on_deinit_done(handle);
        assert_eq!(bridge.phase(), BridgePhase::Closed);

        unregister_bridge(handle);
    }

    #[test]
    #[should_panic(expected = "unknown bridge handle")]
    fn test_unknown_handle_is_a_protocol_violation() {
        notify_on_init_done(u64::MAX);
    }
}
