//! Error types for the hypervisor adapter contract.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HypervisorError {
    #[error("machine {0} not found on hypervisor")]
    NotFound(String),

    #[error("hypervisor operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("hypervisor call failed: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, HypervisorError>;
