//! The `error` module defines the failure model shared by every client type.
//!
//! All broker engine results pass through [`check_status`] or
//! [`check_allocation`]; no other code inspects raw status codes.

use thiserror::Error;

use crate::broker::engine::{Status, status};

/// A failed broker engine call.
///
/// The variants mirror the two ways an engine can fail: it could not hand out
/// a connection resource, or it returned a non-success status from one of its
/// calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Failure {
    /// The engine returned no connection resource.
    #[error("broker engine failed to allocate a connection")]
    Allocation,

    /// The engine returned a non-success status code.
    #[error("broker engine reported status {code} ({})", status::describe(*.code))]
    Status { code: Status },
}

impl Failure {
    /// The engine status code, if this failure carries one.
    pub fn code(&self) -> Option<Status> {
        match self {
            Failure::Allocation => None,
            Failure::Status { code } => Some(*code),
        }
    }

    /// Whether the engine reported that the network connection went away.
    ///
    /// A subscriber that fails this way has to be dropped and rebuilt.
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            Failure::Status {
                code: status::CONN_LOST | status::NO_CONN
            }
        )
    }
}

/// Succeeds on `status::SUCCESS`, otherwise fails with the given code.
pub fn check_status(code: Status) -> Result<(), Failure> {
    if code == status::SUCCESS {
        Ok(())
    } else {
        Err(Failure::Status { code })
    }
}

/// Unwraps a possibly missing engine resource.
pub fn check_allocation<T>(resource: Option<T>) -> Result<T, Failure> {
    resource.ok_or(Failure::Allocation)
}
