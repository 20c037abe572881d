//! Service discovery for iotndn nodes.
//!
//! Nodes under a shared home prefix advertise the services they offer and
//! query each other for service status. Everything goes through the
//! forwarder's public API: prefixes are registered as local producers and
//! requests are expressed as Interests.

pub mod discovery;
pub mod error;
pub mod service;

pub use discovery::{ServiceDiscovery, TLV_SD_STATUS};
pub use error::{Result, SdError};
pub use service::{Neighbor, Service, ServiceList, ServiceStatus, MAX_NEIGHBORS, MAX_SERVICES};
