//! Error types for service discovery.

use iotndn_core::TlvError;
use iotndn_fwd::ForwarderError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SdError {
    /// The local service table has no free slot
    #[error("Service table is full")]
    ServiceTableFull,

    /// The neighbor table has no free slot
    #[error("Neighbor table is full")]
    NeighborTableFull,

    #[error("Unknown service: {0}")]
    UnknownService(String),

    #[error("Forwarder error: {0}")]
    Forwarder(#[from] ForwarderError),

    #[error("TLV error: {0}")]
    Tlv(#[from] TlvError),
}

pub type Result<T> = std::result::Result<T, SdError>;
