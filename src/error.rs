//! Error taxonomy for the ANC engine (spec §7).
//!
//! Every variant here is returned at an API boundary; nothing in the filter
//! loop or the classifier gate ever surfaces as one of these — numerical
//! anomalies and detector failures are repaired locally and counted instead
//! (see `filter::fixup` and `gate::decide`).

use thiserror::Error;

/// Failure to validate a `SessionConfig` at construction or `reconfigure` time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid config: {reason}")]
pub struct InvalidConfig {
    pub reason: String,
}

impl InvalidConfig {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A submitted block failed the size/domain check at the `submit` boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("block has {actual} samples, expected {expected}")]
    WrongSize { expected: usize, actual: usize },
}

/// Errors returned by `SessionManager::reconfigure`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconfigureError {
    #[error("session not found")]
    NotFound,
    #[error(transparent)]
    InvalidConfig(#[from] InvalidConfig),
}

/// Errors returned by `SessionManager::submit`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnqueueError {
    #[error("session not found")]
    NotFound,
    #[error("session is closed")]
    Closed,
    #[error("input queue is full")]
    Full,
    #[error(transparent)]
    InvalidBlock(#[from] BlockError),
}

/// Errors returned by `SessionManager::open`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpenError {
    #[error(transparent)]
    InvalidConfig(#[from] InvalidConfig),
    #[error("global session capacity exceeded")]
    CapacityExceeded,
}

/// Errors returned by `SessionManager::close` / `terminate` / `snapshot_stats`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("session not found")]
pub struct NotFound;
