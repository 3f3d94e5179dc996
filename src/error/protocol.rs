use std::fmt::{Display, Formatter};

#[derive(Debug, PartialEq, Eq)]
pub enum ProtocolError {
    /// Text or binary frame while a fragmented message is unfinished.
    UnexpectedDataFrame,

    /// Continuation frame with no message in progress.
    UnexpectedContinuation,
}

impl Display for ProtocolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use ProtocolError::*;
        match self {
            UnexpectedDataFrame => {
                write!(f, "Unexpected data frame while expecting continuation")
            }
            UnexpectedContinuation => {
                write!(f, "Continuation frame without a preceding data frame")
            }
        }
    }
}

// use default impl
impl std::error::Error for ProtocolError {}
