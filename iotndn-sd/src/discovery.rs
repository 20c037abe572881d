//! Service discovery client built on the forwarder's FIB and PIT.
//!
//! Names used, relative to the home prefix:
//! - `<home>/SD-ADV/<identity>`: advertisement Interest; ApplicationParameters
//!   hold one name component per advertised service
//! - `<home>/SD/<identity>/QUERY/<service>`: status query, answered with Data
//!   whose content is a single SD_STATUS element

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use iotndn_core::tlv::{decode_tlv_sequence, encode_tlv_sequence};
use iotndn_core::{tlv_types, Data, Interest, Name, TlvElement, TlvError};
use iotndn_fwd::{Consumer, Forwarder, Outcome, Strategy};
use log::{debug, info, warn};

use crate::error::{Result, SdError};
use crate::service::{Neighbor, NeighborTable, Service, ServiceList, ServiceStatus};

pub const ADVERTISEMENT_COMPONENT: &str = "SD-ADV";
pub const DISCOVERY_COMPONENT: &str = "SD";
pub const QUERY_COMPONENT: &str = "QUERY";

/// TLV type of the status element in a query reply
pub const TLV_SD_STATUS: u32 = 0x80;

#[derive(Debug)]
struct SdState {
    home: Name,
    identity: Vec<u8>,
    services: ServiceList,
    neighbors: NeighborTable,
}

/// Handle to the discovery state. Clones share it, which is how the handlers
/// and consumers registered with the forwarder reach it.
#[derive(Debug, Clone)]
pub struct ServiceDiscovery {
    state: Rc<RefCell<SdState>>,
}

impl ServiceDiscovery {
    /// Create the discovery state and register its advertisement and query
    /// prefixes with `forwarder`
    pub fn register(forwarder: &mut Forwarder, home: Name, identity: impl Into<Vec<u8>>) -> Result<Self> {
        let identity = identity.into();
        let sd = Self {
            state: Rc::new(RefCell::new(SdState {
                home,
                identity,
                services: ServiceList::new(),
                neighbors: NeighborTable::new(),
            })),
        };

        let advertisements = sd.home().with(ADVERTISEMENT_COMPONENT);
        let handler = sd.clone();
        forwarder.register_prefix(
            &advertisements.encode(),
            move |_: &mut Forwarder, interest: &Interest, _: &[u8]| handler.on_advertisement(interest),
        )?;

        let queries = sd
            .home()
            .with(DISCOVERY_COMPONENT)
            .with(sd.identity())
            .with(QUERY_COMPONENT);
        let handler = sd.clone();
        forwarder.register_prefix(
            &queries.encode(),
            move |fwd: &mut Forwarder, interest: &Interest, _: &[u8]| handler.on_query(fwd, interest),
        )?;

        info!("Service discovery registered under {} as {}", sd.home(), queries);
        Ok(sd)
    }

    pub fn home(&self) -> Name {
        self.state.borrow().home.clone()
    }

    pub fn identity(&self) -> Vec<u8> {
        self.state.borrow().identity.clone()
    }

    /// Offer a service, initially available. Adding a known service is a no-op.
    pub fn add_service(&self, id: impl AsRef<[u8]>) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.services.get(id.as_ref()).is_some() {
            return Ok(());
        }
        state.services.upsert(id.as_ref(), ServiceStatus::Available)
    }

    pub fn set_service_status(&self, id: impl AsRef<[u8]>, status: ServiceStatus) -> Result<()> {
        let id = id.as_ref();
        let mut state = self.state.borrow_mut();
        if state.services.get(id).is_none() {
            return Err(SdError::UnknownService(String::from_utf8_lossy(id).into_owned()));
        }
        state.services.upsert(id, status)
    }

    pub fn services(&self) -> Vec<Service> {
        self.state.borrow().services.iter().cloned().collect()
    }

    pub fn neighbors(&self) -> Vec<Neighbor> {
        self.state.borrow().neighbors.iter().cloned().collect()
    }

    pub fn neighbor(&self, identity: &[u8]) -> Option<Neighbor> {
        self.state.borrow().neighbors.find(identity).cloned()
    }

    /// Identity of the first neighbor known to offer `service_id`
    pub fn find_provider(&self, service_id: &[u8]) -> Option<Vec<u8>> {
        self.state
            .borrow()
            .neighbors
            .find_provider(service_id)
            .map(|neighbor| neighbor.identity.clone())
    }

    /// Express `<home>/SD-ADV/<identity>` listing every advertised service.
    /// When the Interest expires a fresh advertisement is sent.
    pub fn advertise(&self, forwarder: &mut Forwarder, lifetime: Duration) -> Result<Outcome> {
        let (name, parameters) = {
            let state = self.state.borrow();
            let name = state
                .home
                .clone()
                .with(ADVERTISEMENT_COMPONENT)
                .with(state.identity.clone());
            let advertised: Vec<TlvElement> = state
                .services
                .iter()
                .filter(|service| service.status.is_advertised())
                .map(|service| TlvElement::new(tlv_types::GENERIC_NAME_COMPONENT, service.id.clone()))
                .collect();
            (name, encode_tlv_sequence(&advertised))
        };

        let interest = Interest::new(name)
            .with_nonce(rand::random())
            .with_lifetime(lifetime)
            .with_application_parameters(parameters);

        let sd = self.clone();
        let consumer = Consumer::new(|_, data: &Data| debug!("Unexpected reply to advertisement: {}", data.name))
            .on_timeout(move |fwd, _| {
                if let Err(err) = sd.advertise(fwd, lifetime) {
                    warn!("Failed to re-advertise: {}", err);
                }
            });

        debug!("Advertising {}", interest.name);
        Ok(forwarder.express_interest(&interest.encode(), consumer)?)
    }

    /// Ask `target` for the status of `service`. A reply updates the
    /// neighbor's entry; a timeout drops the neighbor.
    pub fn query(
        &self,
        forwarder: &mut Forwarder,
        target: &[u8],
        service: &[u8],
        parameters: Option<Vec<u8>>,
        lifetime: Duration,
    ) -> Result<Outcome> {
        let name = self
            .home()
            .with(DISCOVERY_COMPONENT)
            .with(target)
            .with(QUERY_COMPONENT)
            .with(service);
        let mut interest = Interest::new(name)
            .with_nonce(rand::random())
            .with_lifetime(lifetime);
        if let Some(parameters) = parameters.filter(|parameters| !parameters.is_empty()) {
            interest = interest.with_application_parameters(parameters);
        }

        let on_reply = self.clone();
        let on_timeout = self.clone();
        let consumer = Consumer::new(move |_, data: &Data| {
            if let Err(err) = on_reply.on_query_response(data) {
                warn!("Ignoring query response {}: {}", data.name, err);
            }
        })
        .on_timeout(move |_, name| on_timeout.on_query_timeout(name));

        debug!("Querying {}", interest.name);
        Ok(forwarder.express_interest(&interest.encode(), consumer)?)
    }

    /// Component `offset` positions after the home prefix
    fn component_after_home(&self, name: &Name, offset: usize) -> Option<Vec<u8>> {
        let state = self.state.borrow();
        if !state.home.is_prefix_of(name) {
            return None;
        }
        name.get(state.home.len() + offset).map(<[u8]>::to_vec)
    }

    fn on_advertisement(&self, interest: &Interest) -> Strategy {
        let Some(identity) = self.component_after_home(&interest.name, 1) else {
            debug!("Advertisement {} carries no identity", interest.name);
            return Strategy::Suppress;
        };
        // Our own advertisement goes out through the routes
        if identity == self.identity() {
            return Strategy::Forward;
        }

        let services = match interest.application_parameters.as_deref() {
            Some(parameters) => match decode_tlv_sequence(parameters) {
                Ok(elements) => elements,
                Err(err) => {
                    warn!("Malformed advertisement {}: {}", interest.name, err);
                    return Strategy::Suppress;
                }
            },
            None => Vec::new(),
        };

        let mut state = self.state.borrow_mut();
        let Ok(neighbor) = state.neighbors.find_or_insert(&identity) else {
            return Strategy::Suppress;
        };
        neighbor.services.clear();
        for service in services
            .iter()
            .filter(|element| element.type_ == tlv_types::GENERIC_NAME_COMPONENT)
        {
            if neighbor
                .services
                .upsert(&service.value, ServiceStatus::Available)
                .is_err()
            {
                warn!("Too many services advertised by {}", String::from_utf8_lossy(&identity));
                break;
            }
        }
        debug!(
            "Neighbor {} advertises {} services",
            String::from_utf8_lossy(&identity),
            neighbor.services.len()
        );
        Strategy::Suppress
    }

    fn on_query(&self, forwarder: &mut Forwarder, interest: &Interest) -> Strategy {
        let Some(service_id) = self.component_after_home(&interest.name, 3) else {
            debug!("Query {} names no service", interest.name);
            return Strategy::Suppress;
        };

        let status = self
            .state
            .borrow()
            .services
            .get(&service_id)
            .map(|service| service.status);
        let Some(status) = status else {
            debug!("No such service: {}", String::from_utf8_lossy(&service_id));
            return Strategy::Suppress;
        };

        let content = TlvElement::new(TLV_SD_STATUS, vec![status.to_byte()]).encode();
        let reply = Data::new(interest.name.clone(), content);
        if let Err(err) = forwarder.put_data(&reply.encode()) {
            warn!("Failed to answer query {}: {}", interest.name, err);
        }
        Strategy::Suppress
    }

    fn on_query_response(&self, data: &Data) -> Result<()> {
        let (element, _) = TlvElement::decode(&data.content)?;
        if element.type_ != TLV_SD_STATUS {
            return Err(TlvError::WrongType {
                expected: TLV_SD_STATUS,
                actual: element.type_,
            }
            .into());
        }
        let status = element
            .value
            .first()
            .copied()
            .and_then(ServiceStatus::from_byte)
            .ok_or(TlvError::InvalidInteger(element.value.len()))?;

        let identity = self
            .component_after_home(&data.name, 1)
            .ok_or(TlvError::MissingElement(tlv_types::GENERIC_NAME_COMPONENT))?;
        let service_id = self
            .component_after_home(&data.name, 3)
            .ok_or(TlvError::MissingElement(tlv_types::GENERIC_NAME_COMPONENT))?;

        let mut state = self.state.borrow_mut();
        let neighbor = state.neighbors.find_or_insert(&identity)?;
        neighbor.services.upsert(&service_id, status)?;
        debug!(
            "Service {} on {} is {:?}",
            String::from_utf8_lossy(&service_id),
            String::from_utf8_lossy(&identity),
            status
        );
        Ok(())
    }

    fn on_query_timeout(&self, name: &Name) {
        if let Some(identity) = self.component_after_home(name, 1) {
            info!("Query {} timed out, dropping neighbor", name);
            self.state.borrow_mut().neighbors.remove(&identity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iotndn_fwd::{FaceId, ForwarderConfig, ManualClock, MemoryFace};

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn name(uri: &str) -> Name {
        uri.parse().unwrap()
    }

    /// A forwarder with one link face routing every discovery prefix
    struct Node {
        forwarder: Forwarder,
        clock: ManualClock,
        link: FaceId,
        outbound: MemoryFace,
        sd: ServiceDiscovery,
    }

    impl Node {
        fn new(identity: &str) -> Self {
            init_logging();
            let clock = ManualClock::new(0);
            let mut forwarder = Forwarder::with_clock(ForwarderConfig::default(), clock.clone()).unwrap();
            let outbound = MemoryFace::new();
            let link = forwarder.register_face(outbound.handle()).unwrap().face_id();
            forwarder.add_route(link, &name("/home/SD-ADV").encode()).unwrap();
            forwarder.add_route(link, &name("/home/SD").encode()).unwrap();
            let sd = ServiceDiscovery::register(&mut forwarder, name("/home"), identity).unwrap();
            Self {
                forwarder,
                clock,
                link,
                outbound,
                sd,
            }
        }

        /// Deliver everything `self` sent to `peer`
        fn flush_to(&self, peer: &mut Node) -> usize {
            let packets = self.outbound.drain();
            for packet in &packets {
                let _ = peer.forwarder.receive(peer.link, packet);
            }
            packets.len()
        }
    }

    #[test]
    fn test_advertisement_populates_neighbor_table() {
        let mut lamp = Node::new("lamp");
        let mut phone = Node::new("phone");
        lamp.sd.add_service("light").unwrap();
        lamp.sd.add_service("dimmer").unwrap();
        lamp.sd.add_service("heater").unwrap();
        lamp.sd.set_service_status("heater", ServiceStatus::Unavailable).unwrap();

        lamp.sd.advertise(&mut lamp.forwarder, Duration::from_secs(5)).unwrap();
        assert_eq!(lamp.flush_to(&mut phone), 1);

        let neighbor = phone.sd.neighbor(b"lamp").unwrap();
        let ids: Vec<Vec<u8>> = neighbor.services.iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids, vec![b"light".to_vec(), b"dimmer".to_vec()]);
        assert_eq!(phone.sd.find_provider(b"dimmer"), Some(b"lamp".to_vec()));
        assert!(phone.sd.find_provider(b"heater").is_none());
        // Own advertisement never lands in the local neighbor table
        assert!(lamp.sd.neighbors().is_empty());
    }

    #[test]
    fn test_new_advertisement_replaces_services() {
        let mut lamp = Node::new("lamp");
        let mut phone = Node::new("phone");
        lamp.sd.add_service("light").unwrap();
        lamp.sd.advertise(&mut lamp.forwarder, Duration::from_millis(100)).unwrap();
        lamp.flush_to(&mut phone);

        lamp.sd.set_service_status("light", ServiceStatus::Unavailable).unwrap();
        lamp.sd.add_service("fan").unwrap();
        lamp.clock.advance(Duration::from_millis(100));
        // Expiry re-advertises with the current service list
        lamp.forwarder.process();
        phone.clock.advance(Duration::from_millis(100));
        phone.forwarder.process();
        assert_eq!(lamp.flush_to(&mut phone), 1);

        let neighbor = phone.sd.neighbor(b"lamp").unwrap();
        assert!(neighbor.services.get(b"light").is_none());
        assert_eq!(neighbor.services.get(b"fan").unwrap().status, ServiceStatus::Available);
    }

    #[test]
    fn test_readvertisement_refreshes_before_receiver_expiry_runs() {
        let mut lamp = Node::new("lamp");
        let mut phone = Node::new("phone");
        lamp.sd.add_service("light").unwrap();
        lamp.sd.advertise(&mut lamp.forwarder, Duration::from_millis(100)).unwrap();
        lamp.flush_to(&mut phone);

        lamp.sd.add_service("fan").unwrap();
        lamp.clock.advance(Duration::from_millis(100));
        lamp.forwarder.process();
        // The phone's entry for the first advertisement is due but not yet expired
        phone.clock.advance(Duration::from_millis(100));
        assert_eq!(lamp.flush_to(&mut phone), 1);

        let neighbor = phone.sd.neighbor(b"lamp").unwrap();
        assert!(neighbor.services.get(b"light").is_some());
        assert_eq!(neighbor.services.get(b"fan").unwrap().status, ServiceStatus::Available);
        assert_eq!(phone.forwarder.pit().len(), 1);

        phone.forwarder.process();
        assert_eq!(phone.forwarder.stats().timeouts, 1);
        assert_eq!(phone.forwarder.pit().len(), 1);
    }

    #[test]
    fn test_query_roundtrip() {
        let mut lamp = Node::new("lamp");
        let mut phone = Node::new("phone");
        lamp.sd.add_service("light").unwrap();
        lamp.sd.set_service_status("light", ServiceStatus::Busy).unwrap();

        phone
            .sd
            .query(&mut phone.forwarder, b"lamp", b"light", None, Duration::from_secs(2))
            .unwrap();
        assert_eq!(phone.flush_to(&mut lamp), 1);
        // Lamp answers through its PIT entry on the link face
        assert_eq!(lamp.flush_to(&mut phone), 1);

        let neighbor = phone.sd.neighbor(b"lamp").unwrap();
        assert_eq!(neighbor.services.get(b"light").unwrap().status, ServiceStatus::Busy);
        assert_eq!(phone.forwarder.pit().len(), 0);
    }

    #[test]
    fn test_query_for_unknown_service_is_not_answered() {
        let mut lamp = Node::new("lamp");
        let mut phone = Node::new("phone");

        phone
            .sd
            .query(&mut phone.forwarder, b"lamp", b"toaster", Some(vec![1, 2]), Duration::from_secs(2))
            .unwrap();
        phone.flush_to(&mut lamp);
        assert_eq!(lamp.flush_to(&mut phone), 0);
    }

    #[test]
    fn test_query_timeout_drops_neighbor() {
        let mut lamp = Node::new("lamp");
        let mut phone = Node::new("phone");
        lamp.sd.add_service("light").unwrap();
        lamp.sd.advertise(&mut lamp.forwarder, Duration::from_secs(60)).unwrap();
        lamp.flush_to(&mut phone);
        assert!(phone.sd.neighbor(b"lamp").is_some());

        phone
            .sd
            .query(&mut phone.forwarder, b"lamp", b"light", None, Duration::from_millis(500))
            .unwrap();
        phone.clock.advance(Duration::from_millis(500));
        phone.forwarder.process();

        assert!(phone.sd.neighbor(b"lamp").is_none());
    }

    #[test]
    fn test_advertisement_reissued_on_timeout() {
        let mut lamp = Node::new("lamp");
        lamp.sd.advertise(&mut lamp.forwarder, Duration::from_millis(1000)).unwrap();
        assert_eq!(lamp.outbound.drain().len(), 1);

        lamp.clock.advance(Duration::from_millis(1000));
        lamp.forwarder.process();

        let packets = lamp.outbound.drain();
        assert_eq!(packets.len(), 1);
        let interest = Interest::decode(&packets[0]).unwrap();
        assert_eq!(interest.name, name("/home/SD-ADV/lamp"));
        assert_eq!(interest.lifetime(), Duration::from_millis(1000));
    }

    #[test]
    fn test_set_status_of_unknown_service() {
        let node = Node::new("lamp");
        assert_eq!(
            node.sd.set_service_status("ghost", ServiceStatus::Busy),
            Err(SdError::UnknownService("ghost".to_string()))
        );
        node.sd.add_service("light").unwrap();
        node.sd.add_service("light").unwrap();
        assert_eq!(node.sd.services().len(), 1);
    }

    #[test]
    fn test_malformed_query_reply_rejected() {
        let node = Node::new("phone");
        let reply = Data::new(name("/home/SD/lamp/QUERY/light"), vec![0x15, 0x01, 0x01]);
        assert!(matches!(
            node.sd.on_query_response(&reply),
            Err(SdError::Tlv(TlvError::WrongType { .. }))
        ));
        assert!(node.sd.neighbor(b"lamp").is_none());
    }
}
