//! Core of the KeyShare agent.
//!
//! Owns the Z matrix and the MIB, answers GET/SET requests, issues keys
//! and runs the background maintenance loop that evolves the matrix and
//! sweeps expired keys.

pub mod agent;
pub mod clock;
pub mod config;
pub mod daemon;
pub mod error;
pub mod maintenance;
pub mod matrix;

pub use agent::KeyShareAgent;
pub use daemon::AgentDaemon;
pub use error::{KernelError, KernelResult};
