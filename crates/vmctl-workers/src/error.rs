//! Error types shared by the worker loops.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error(transparent)]
    Store(#[from] vmctl_store::StoreError),

    #[error(transparent)]
    Hypervisor(#[from] vmctl_hypervisor::HypervisorError),

    #[error("request {0} references a machine that cannot be deployed (already undeployed)")]
    UndeployedMachine(String),

    #[error("machine labels do not declare a template: {0:?}")]
    MissingTemplate(Vec<String>),

    #[error("request {0} is missing its subject_id")]
    MissingSubjectId(String),

    #[error("unhandled request type {0}")]
    UnhandledRequestType(String),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
