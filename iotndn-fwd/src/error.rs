use iotndn_core::TlvError;

use crate::face::FaceId;

/// Result of a forwarder operation that changed nothing vs. one that did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// The request was valid but there was nothing to do
    NoEffect,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ForwarderError {
    #[error("Invalid face: {0}")]
    InvalidFace(FaceId),
    #[error("Face table is full")]
    FaceTableFull,
    #[error("FIB is full")]
    FibFull,
    #[error("PIT is full")]
    PitFull,
    #[error("Scheduler task queue is full")]
    TaskQueueFull,
    #[error("Wrong TLV type: expected {expected:#x}, got {actual:#x}")]
    WrongTlvType { expected: u32, actual: u32 },
    #[error("Wrong TLV length: declared {declared}, available {available}")]
    WrongTlvLength { declared: usize, available: usize },
    #[error("Missing input: {0}")]
    InvalidPointer(&'static str),
    #[error("Malformed packet: {0}")]
    Malformed(TlvError),
}

impl From<TlvError> for ForwarderError {
    fn from(err: TlvError) -> Self {
        match err {
            TlvError::WrongType { expected, actual } => ForwarderError::WrongTlvType { expected, actual },
            TlvError::WrongLength { declared, available } => {
                ForwarderError::WrongTlvLength { declared, available }
            }
            other => ForwarderError::Malformed(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ForwarderError>;
