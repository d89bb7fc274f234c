//! Error types for step execution primitives.

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ActionError {
    #[error("navigation timeout: {0}")]
    NavTimeout(String),

    #[error("wait timeout: {0}")]
    WaitTimeout(String),

    #[error("element not clickable: {0}")]
    NotClickable(String),

    #[error("element not enabled: {0}")]
    NotEnabled(String),

    #[error("option not found: {0}")]
    OptionNotFound(String),

    #[error("anchor not found: {0}")]
    AnchorNotFound(String),

    #[error("out_of_bounds({0})")]
    OutOfBounds(usize),

    #[error("assertion failed: {0}")]
    AssertionFailed(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("cdp i/o error: {0}")]
    CdpIo(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ActionError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ActionError::WaitTimeout(_) | ActionError::NotClickable(_) | ActionError::CdpIo(_)
        )
    }

    pub fn severity(&self) -> u8 {
        match self {
            ActionError::Internal(_) => 3,
            ActionError::NavTimeout(_) | ActionError::CdpIo(_) | ActionError::Http(_) => 2,
            ActionError::WaitTimeout(_)
            | ActionError::AnchorNotFound(_)
            | ActionError::NotEnabled(_) => 1,
            _ => 0,
        }
    }
}

impl From<cdp_adapter::AdapterError> for ActionError {
    fn from(err: cdp_adapter::AdapterError) -> Self {
        use cdp_adapter::AdapterErrorKind::*;
        let message = err.to_string();
        match err.kind {
            NavTimeout => ActionError::NavTimeout(message),
            TargetNotFound => ActionError::AnchorNotFound(message),
            OptionNotFound => ActionError::OptionNotFound(message),
            CdpIo | EvaluationFailed | Internal => ActionError::CdpIo(message),
        }
    }
}
