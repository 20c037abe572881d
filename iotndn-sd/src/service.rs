//! Local service table and the neighbor table learned from advertisements.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SdError};

/// Capacity of every service list
pub const MAX_SERVICES: usize = 10;
/// Capacity of the neighbor table
pub const MAX_NEIGHBORS: usize = 10;

/// Service status as carried in an SD_STATUS element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceStatus {
    Unavailable,
    Available,
    Busy,
}

impl ServiceStatus {
    pub fn to_byte(self) -> u8 {
        match self {
            ServiceStatus::Unavailable => 0,
            ServiceStatus::Available => 1,
            ServiceStatus::Busy => 2,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(ServiceStatus::Unavailable),
            1 => Some(ServiceStatus::Available),
            2 => Some(ServiceStatus::Busy),
            _ => None,
        }
    }

    /// Whether the service is worth advertising
    pub fn is_advertised(self) -> bool {
        !matches!(self, ServiceStatus::Unavailable)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: Vec<u8>,
    pub status: ServiceStatus,
}

/// Bounded list of services keyed by ID
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceList {
    services: Vec<Service>,
}

impl ServiceList {
    pub fn new() -> Self {
        Self {
            services: Vec::with_capacity(MAX_SERVICES),
        }
    }

    pub fn get(&self, id: &[u8]) -> Option<&Service> {
        self.services.iter().find(|service| service.id == id)
    }

    /// Insert or update a service
    pub fn upsert(&mut self, id: &[u8], status: ServiceStatus) -> Result<()> {
        if let Some(service) = self.services.iter_mut().find(|service| service.id == id) {
            service.status = status;
            return Ok(());
        }
        if self.services.len() >= MAX_SERVICES {
            return Err(SdError::ServiceTableFull);
        }
        self.services.push(Service {
            id: id.to_vec(),
            status,
        });
        Ok(())
    }

    pub fn clear(&mut self) {
        self.services.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Service> {
        self.services.iter()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// A node discovered through its advertisements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neighbor {
    pub identity: Vec<u8>,
    pub services: ServiceList,
}

#[derive(Debug, Clone, Default)]
pub struct NeighborTable {
    neighbors: Vec<Neighbor>,
}

impl NeighborTable {
    pub fn new() -> Self {
        Self {
            neighbors: Vec::with_capacity(MAX_NEIGHBORS),
        }
    }

    pub fn find(&self, identity: &[u8]) -> Option<&Neighbor> {
        self.neighbors.iter().find(|neighbor| neighbor.identity == identity)
    }

    /// Return the neighbor, adding it if it is new
    pub fn find_or_insert(&mut self, identity: &[u8]) -> Result<&mut Neighbor> {
        let index = match self.neighbors.iter().position(|neighbor| neighbor.identity == identity) {
            Some(index) => index,
            None => {
                if self.neighbors.len() >= MAX_NEIGHBORS {
                    warn!("Neighbor table full, ignoring {}", String::from_utf8_lossy(identity));
                    return Err(SdError::NeighborTableFull);
                }
                debug!("New neighbor {}", String::from_utf8_lossy(identity));
                self.neighbors.push(Neighbor {
                    identity: identity.to_vec(),
                    services: ServiceList::new(),
                });
                self.neighbors.len() - 1
            }
        };
        Ok(&mut self.neighbors[index])
    }

    pub fn remove(&mut self, identity: &[u8]) -> Option<Neighbor> {
        let index = self.neighbors.iter().position(|neighbor| neighbor.identity == identity)?;
        debug!("Removed neighbor {}", String::from_utf8_lossy(identity));
        Some(self.neighbors.remove(index))
    }

    /// First neighbor offering `service_id`
    pub fn find_provider(&self, service_id: &[u8]) -> Option<&Neighbor> {
        self.neighbors
            .iter()
            .find(|neighbor| neighbor.services.get(service_id).is_some())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Neighbor> {
        self.neighbors.iter()
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_bytes() {
        for status in [ServiceStatus::Unavailable, ServiceStatus::Available, ServiceStatus::Busy] {
            assert_eq!(ServiceStatus::from_byte(status.to_byte()), Some(status));
        }
        assert_eq!(ServiceStatus::from_byte(9), None);
        assert!(!ServiceStatus::Unavailable.is_advertised());
        assert!(ServiceStatus::Busy.is_advertised());
    }

    #[test]
    fn test_service_list_bounded() {
        let mut list = ServiceList::new();
        for i in 0..MAX_SERVICES {
            list.upsert(format!("svc{}", i).as_bytes(), ServiceStatus::Available)
                .unwrap();
        }
        assert_eq!(
            list.upsert(b"one-too-many", ServiceStatus::Available),
            Err(SdError::ServiceTableFull)
        );
        // Updating an existing entry still works when full
        list.upsert(b"svc3", ServiceStatus::Busy).unwrap();
        assert_eq!(list.get(b"svc3").unwrap().status, ServiceStatus::Busy);
        assert_eq!(list.len(), MAX_SERVICES);
    }

    #[test]
    fn test_service_ids_match_exactly() {
        let mut list = ServiceList::new();
        list.upsert(b"light", ServiceStatus::Available).unwrap();
        assert!(list.get(b"lig").is_none());
        assert!(list.get(b"lights").is_none());
    }

    #[test]
    fn test_neighbor_table() {
        let mut table = NeighborTable::new();
        table
            .find_or_insert(b"lamp")
            .unwrap()
            .services
            .upsert(b"light", ServiceStatus::Available)
            .unwrap();
        table.find_or_insert(b"lamp").unwrap();
        assert_eq!(table.len(), 1);

        assert_eq!(table.find_provider(b"light").unwrap().identity, b"lamp".to_vec());
        assert!(table.find_provider(b"heat").is_none());

        assert!(table.remove(b"lamp").is_some());
        assert!(table.remove(b"lamp").is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_neighbor_table_full() {
        let mut table = NeighborTable::new();
        for i in 0..MAX_NEIGHBORS {
            table.find_or_insert(format!("node{}", i).as_bytes()).unwrap();
        }
        assert!(matches!(table.find_or_insert(b"late"), Err(SdError::NeighborTableFull)));
        assert!(table.find_or_insert(b"node0").is_ok());
    }
}
