//! Resilient session bootstrap for the collaboration channel.
//!
//! The data layer never waits on any of this: a session in Degraded mode has
//! full store access and is only missing live presence/chat push. Startup
//! races the real channel initialization against a fixed deadline, and a
//! process-wide advisory memory-pressure signal decides whether optional
//! subsystems start at all.

mod bootstrap;
mod memory;
mod sweeper;

pub use bootstrap::{BootstrapState, BootstrapStatus, SessionBootstrapper};
pub use memory::MemoryPressure;
pub use sweeper::PresenceSweeper;
