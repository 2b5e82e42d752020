//! Status codes reported by every store operation.

use std::collections::TryReserveError;
use std::fmt;
use std::time::Duration;

/// Flat status code, as carried over the wire next to each result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    NotFound,
    NoMemory,
    TimedOut,
    Corrupted,
    CannotDo,
    Refused,
}

impl Status {
    /// errno-style raw value.
    pub fn as_raw(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::NotFound => -2,
            Status::NoMemory => -12,
            Status::TimedOut => -110,
            Status::Corrupted => i32::MIN,
            Status::CannotDo => -38,
            Status::Refused => -1,
        }
    }

    /// Unknown raw values are reported as `Corrupted`.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => Status::Ok,
            -2 => Status::NotFound,
            -12 => Status::NoMemory,
            -110 => Status::TimedOut,
            -38 => Status::CannotDo,
            -1 => Status::Refused,
            _ => Status::Corrupted,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }

    /// Only a missed deadline is worth retrying; everything else is terminal for the call.
    pub fn is_retryable(self) -> bool {
        self == Status::TimedOut
    }

    pub fn of<T>(result: &Result<T, StoreError>) -> Self {
        match result {
            Ok(_) => Status::Ok,
            Err(e) => e.status(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Ok => "OK",
            Status::NotFound => "NOT_FOUND",
            Status::NoMemory => "NO_MEMORY",
            Status::TimedOut => "TIMED_OUT",
            Status::Corrupted => "CORRUPTED",
            Status::CannotDo => "CANNOT_DO",
            Status::Refused => "REFUSED",
        };
        f.write_str(s)
    }
}

/// What went wrong
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("component '{0}' not found")]
    NotFound(String),

    #[error("out of memory: {0}")]
    NoMemory(String),

    #[error("{op} exceeded its {budget:?} budget")]
    TimedOut { op: &'static str, budget: Duration },

    #[error("internal fault: {0}")]
    Corrupted(String),

    #[error("cannot do: {0}")]
    CannotDo(String),

    #[error("refused: {0}")]
    Refused(String),
}

impl StoreError {
    pub fn status(&self) -> Status {
        match self {
            StoreError::NotFound(_) => Status::NotFound,
            StoreError::NoMemory(_) => Status::NoMemory,
            StoreError::TimedOut { .. } => Status::TimedOut,
            StoreError::Corrupted(_) => Status::Corrupted,
            StoreError::CannotDo(_) => Status::CannotDo,
            StoreError::Refused(_) => Status::Refused,
        }
    }

    /// Classifies a failure reported by an external collaborator.
    ///
    /// A collaborator that was already resolved by name must never surface as
    /// `NotFound`, so those are folded into `Corrupted`.
    pub fn from_collaborator(err: anyhow::Error) -> Self {
        if let Some(store_err) = err.downcast_ref::<StoreError>() {
            return match store_err {
                StoreError::NotFound(_) => StoreError::Corrupted(format!("{:#}", err)),
                StoreError::NoMemory(m) => StoreError::NoMemory(m.clone()),
                StoreError::TimedOut { op, budget } => StoreError::TimedOut {
                    op: *op,
                    budget: *budget,
                },
                StoreError::Corrupted(m) => StoreError::Corrupted(m.clone()),
                StoreError::CannotDo(m) => StoreError::CannotDo(m.clone()),
                StoreError::Refused(m) => StoreError::Refused(m.clone()),
            };
        }
        if err.downcast_ref::<TryReserveError>().is_some() {
            return StoreError::NoMemory(format!("{:#}", err));
        }
        StoreError::Corrupted(format!("{:#}", err))
    }
}

impl From<TryReserveError> for StoreError {
    fn from(e: TryReserveError) -> Self {
        StoreError::NoMemory(e.to_string())
    }
}
