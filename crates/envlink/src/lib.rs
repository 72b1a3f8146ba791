//! envlink: cross-thread environment handoff and lifecycle bridge.
//!
//! Each plugin environment lives on a dedicated OS thread that exclusively
//! owns it. Arbitrary caller threads schedule work onto that thread through
//! a reference-counted proxy; a bridge pairs the foreign runtime's opaque
//! handle with the environment/proxy pair and coordinates the at-most-once
//! init/deinit handshake across the boundary.
//!
//! # Architecture
//!
//! - [`Env`] is only touched on its owner thread - the single-writer rule
//!   is the system's data-race defense
//! - [`EnvProxy`] is the sole cross-thread path in; delivery is FIFO, so a
//!   deinit submitted last runs after all earlier work
//! - [`EnvBridge`] enforces init-before-deinit and deinit-exactly-once, and
//!   its liveness guard turns post-close calls into defined no-ops
//! - the registry resolves opaque numeric handles to in-process bridges for
//!   the foreign-runtime adapter layer

mod bridge;
mod env;
mod error;
mod proxy;
mod registry;
mod spawn;
mod worker;

pub use bridge::{BridgePhase, EnvBridge, LivenessGuard};
pub use env::{Env, EnvPhase};
pub use error::{Error, Result};
pub use proxy::EnvProxy;
pub use registry::{
    notify_on_deinit_done, notify_on_init_done, register_bridge, resolve_bridge,
    unregister_bridge,
};
