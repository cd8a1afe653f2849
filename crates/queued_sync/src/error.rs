#[derive(Debug, derive_more::Display, derive_more::IsVariant)]
enum ErrorPayload {
    #[display(fmt = "Interrupted while waiting")]
    Interrupted,

    #[display(fmt = "{} is not supported by this synchronizer", _0)]
    Unsupported(&'static str),

    #[display(fmt = "Illegal monitor state: {}", _0)]
    IllegalMonitorState(&'static str),

    #[display(fmt = "Synchronizer state overflowed: {}", _0)]
    Overflow(&'static str),

    #[display(fmt = "The condition was not created by this synchronizer")]
    ForeignCondition,
}

/// Errors surfaced by the framework and by the hooks of synchronizers built on it.
///
/// Timeouts are not errors: timed operations report them as `Ok(false)` or `Ok(None)`.
#[derive(Debug, thiserror::Error)]
#[error("{payload}")]
pub struct Error {
    payload: ErrorPayload,
}

impl Error {
    /// A cancellable wait observed its [crate::CancelToken] being cancelled.
    pub fn interrupted() -> Error {
        Error {
            payload: ErrorPayload::Interrupted,
        }
    }

    /// A hook the synchronizer does not implement was called.
    ///
    /// This is what the default implementations on [crate::Synchronizer] return.
    pub fn unsupported(hook: &'static str) -> Error {
        Error {
            payload: ErrorPayload::Unsupported(hook),
        }
    }

    /// A hook's precondition was violated, e.g. releasing a lock which the caller does not hold.
    pub fn illegal_monitor_state(message: &'static str) -> Error {
        Error {
            payload: ErrorPayload::IllegalMonitorState(message),
        }
    }

    /// A counting synchronizer would have overflowed its state.  The acquisition which hit this must not be retried.
    pub fn overflow(message: &'static str) -> Error {
        Error {
            payload: ErrorPayload::Overflow(message),
        }
    }

    pub(crate) fn foreign_condition() -> Error {
        Error {
            payload: ErrorPayload::ForeignCondition,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.payload.is_interrupted()
    }

    pub fn is_unsupported(&self) -> bool {
        self.payload.is_unsupported()
    }

    pub fn is_illegal_monitor_state(&self) -> bool {
        self.payload.is_illegal_monitor_state()
    }

    pub fn is_overflow(&self) -> bool {
        self.payload.is_overflow()
    }

    pub fn is_foreign_condition(&self) -> bool {
        self.payload.is_foreign_condition()
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
