//! Kernel-specific error types.

use keyshare_mib::SnapshotError;
use keyshare_types::error::KeyShareError;
use keyshare_wire::WireError;
use thiserror::Error;

/// Kernel error type wrapping KeyShareError with kernel-specific context.
#[derive(Error, Debug)]
pub enum KernelError {
    /// A wrapped KeyShareError.
    #[error(transparent)]
    KeyShare(#[from] KeyShareError),

    /// Reading or writing the MIB snapshot failed.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// The network endpoint failed.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// The agent failed to boot.
    #[error("Boot failed: {0}")]
    BootFailed(String),
}

/// Alias for kernel results.
pub type KernelResult<T> = Result<T, KernelError>;
