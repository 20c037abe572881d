//! The forwarding engine: owns every table and runs the Interest/Data
//! pipeline over them.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use iotndn_core::tlv::check_outer_tlv;
use iotndn_core::{tlv_types, Data, Interest, Name, Packet, PacketType, TlvError};
use log::{debug, info, trace, warn};

use crate::clock::{Clock, MonotonicClock};
use crate::config::{ConfigError, ForwarderConfig};
use crate::error::{ForwarderError, Outcome, Result};
use crate::face::{FaceError, FaceHandle, FaceId, FaceTable, Registration};
use crate::face_set::FaceSet;
use crate::fib::{Fib, HandlerRef, InterestHandler, Strategy};
use crate::name_tree::NameTree;
use crate::pit::{Consumer, Pit, RemovedEntry};
use crate::scheduler::Scheduler;
use crate::stats::ForwarderStats;


pub struct Forwarder {
    config: ForwarderConfig,
    clock: Box<dyn Clock>,
    name_tree: NameTree,
    fib: Fib,
    pit: Pit,
    faces: FaceTable,
    scheduler: Scheduler,
    stats: ForwarderStats,
    /// Entries found past their deadline outside `process`, timed out there
    overdue: Vec<RemovedEntry>,
}

impl Forwarder {
    /// Create a forwarder driven by the monotonic system clock
    pub fn new(config: ForwarderConfig) -> std::result::Result<Self, ConfigError> {
        Self::with_clock(config, MonotonicClock::new())
    }

    pub fn with_clock<C>(config: ForwarderConfig, clock: C) -> std::result::Result<Self, ConfigError>
    where
        C: Clock + 'static,
    {
        config.validate()?;
        info!(
            "Forwarder initialized: {} faces, FIB {}, PIT {}, name tree {}",
            config.face_table_capacity, config.fib_capacity, config.pit_capacity, config.name_tree_capacity
        );
        Ok(Self {
            name_tree: NameTree::new(config.name_tree_capacity),
            fib: Fib::new(config.fib_capacity),
            pit: Pit::new(config.pit_capacity),
            faces: FaceTable::new(config.face_table_capacity),
            scheduler: Scheduler::new(config.task_queue_capacity),
            stats: ForwarderStats::default(),
            overdue: Vec::new(),
            clock: Box::new(clock),
            config,
        })
    }

    pub fn config(&self) -> &ForwarderConfig {
        &self.config
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn name_tree(&self) -> &NameTree {
        &self.name_tree
    }

    pub fn fib(&self) -> &Fib {
        &self.fib
    }

    pub fn pit(&self) -> &Pit {
        &self.pit
    }

    pub fn faces(&self) -> &FaceTable {
        &self.faces
    }

    /// Counters plus a snapshot of table occupancy
    pub fn stats(&self) -> ForwarderStats {
        ForwarderStats {
            name_tree_entries: self.name_tree.len(),
            fib_entries: self.fib.len(),
            pit_entries: self.pit.len(),
            faces: self.faces.len(),
            scheduled_tasks: self.scheduler.len(),
            ..self.stats.clone()
        }
    }

    /// Incoming faces of the pending Interest named exactly `name`
    pub fn pending_faces(&self, name: &Name) -> Option<FaceSet> {
        let id = self.pit.find(&self.name_tree, name)?;
        let now = self.now_ms();
        self.pit
            .get(id)
            .filter(|entry| entry.deadline_ms() > now)
            .map(|entry| entry.incoming_faces())
    }

    /// Nexthops registered for exactly `prefix`
    pub fn nexthops(&self, prefix: &Name) -> Option<FaceSet> {
        let id = self.fib.find(&self.name_tree, prefix)?;
        self.fib.get(id).map(|entry| entry.nexthops())
    }

    pub fn register_face(&mut self, face: FaceHandle) -> Result<Registration> {
        self.faces.register(face)
    }

    /// Remove a face from every FIB and PIT entry, then free its slot
    pub fn unregister_face(&mut self, face: FaceId) -> Result<Outcome> {
        self.faces.check_bounds(face)?;
        if !self.faces.contains(face) {
            return Ok(Outcome::NoEffect);
        }

        self.fib.unregister_face(&mut self.name_tree, face);
        self.pit.unregister_face(&mut self.name_tree, face);
        self.faces.unregister(face);
        Ok(Outcome::Success)
    }

    /// Add `face` as a nexthop of the TLV-encoded Name `prefix`
    pub fn add_route(&mut self, face: FaceId, prefix: &[u8]) -> Result<Outcome> {
        self.check_registered(face)?;
        let prefix = decode_prefix(prefix)?;

        let id = self
            .fib
            .find_or_insert(&mut self.name_tree, &prefix)
            .map_err(|_| {
                warn!("FIB full, cannot add route {} -> face {}", prefix, face);
                ForwarderError::FibFull
            })?;
        let added = self
            .fib
            .get_mut(id)
            .is_some_and(|entry| entry.nexthops.insert(face));

        if added {
            info!("Added route {} -> face {}", prefix, face);
            Ok(Outcome::Success)
        } else {
            Ok(Outcome::NoEffect)
        }
    }

    pub fn remove_route(&mut self, face: FaceId, prefix: &[u8]) -> Result<Outcome> {
        self.faces.check_bounds(face)?;
        let prefix = decode_prefix(prefix)?;

        let Some(id) = self.fib.find(&self.name_tree, &prefix) else {
            return Ok(Outcome::NoEffect);
        };
        let removed = self
            .fib
            .get_mut(id)
            .is_some_and(|entry| entry.nexthops.remove(face));
        if !removed {
            return Ok(Outcome::NoEffect);
        }

        info!("Removed route {} -> face {}", prefix, face);
        self.fib.remove_if_empty(&mut self.name_tree, id);
        Ok(Outcome::Success)
    }

    /// Drop every nexthop of `prefix`
    pub fn remove_all_routes(&mut self, prefix: &[u8]) -> Result<Outcome> {
        let prefix = decode_prefix(prefix)?;

        let Some(id) = self.fib.find(&self.name_tree, &prefix) else {
            return Ok(Outcome::NoEffect);
        };
        let cleared = match self.fib.get_mut(id) {
            Some(entry) if !entry.nexthops.is_empty() => {
                entry.nexthops.clear();
                true
            }
            _ => false,
        };
        if !cleared {
            return Ok(Outcome::NoEffect);
        }

        info!("Removed all routes for {}", prefix);
        self.fib.remove_if_empty(&mut self.name_tree, id);
        Ok(Outcome::Success)
    }

    /// Attach a local producer to `prefix`, replacing any previous one
    pub fn register_prefix<H>(&mut self, prefix: &[u8], handler: H) -> Result<Outcome>
    where
        H: InterestHandler + 'static,
    {
        let prefix = decode_prefix(prefix)?;
        let handler: HandlerRef = Rc::new(RefCell::new(handler));

        let id = self
            .fib
            .find_or_insert(&mut self.name_tree, &prefix)
            .map_err(|_| {
                warn!("FIB full, cannot register prefix {}", prefix);
                ForwarderError::FibFull
            })?;
        if let Some(entry) = self.fib.get_mut(id) {
            entry.handler = Some(handler);
        }
        info!("Registered local producer for {}", prefix);
        Ok(Outcome::Success)
    }

    pub fn unregister_prefix(&mut self, prefix: &[u8]) -> Result<Outcome> {
        let prefix = decode_prefix(prefix)?;

        let Some(id) = self.fib.find(&self.name_tree, &prefix) else {
            return Ok(Outcome::NoEffect);
        };
        let had_handler = self
            .fib
            .get_mut(id)
            .is_some_and(|entry| entry.handler.take().is_some());
        if !had_handler {
            return Ok(Outcome::NoEffect);
        }

        info!("Unregistered local producer for {}", prefix);
        self.fib.remove_if_empty(&mut self.name_tree, id);
        Ok(Outcome::Success)
    }

    /// Send an Interest on behalf of a local application.
    ///
    /// Returns `NoEffect` when an Interest with the same name is already
    /// pending: nothing is transmitted, and `consumer` is kept only if the
    /// pending entry has no consumer yet.
    pub fn express_interest(&mut self, interest: &[u8], consumer: Consumer) -> Result<Outcome> {
        if interest.is_empty() {
            return Err(ForwarderError::InvalidPointer("interest"));
        }
        check_outer_tlv(interest, tlv_types::INTEREST)?;
        let decoded = Interest::decode(interest)?;

        self.retire_overdue(&decoded.name);
        let deadline = self.deadline_for(&decoded);
        let (id, created) = self
            .pit
            .find_or_insert(&mut self.name_tree, &decoded.name, deadline)
            .map_err(|_| {
                warn!("PIT full, cannot express Interest {}", decoded.name);
                ForwarderError::PitFull
            })?;
        self.stats.interests_expressed += 1;

        let Some(entry) = self.pit.get_mut(id) else {
            return Ok(Outcome::NoEffect);
        };
        if !created {
            self.stats.interests_aggregated += 1;
            if entry.consumer.is_none() {
                entry.consumer = Some(consumer);
                debug!("Local consumer attached to pending Interest {}", decoded.name);
            } else {
                debug!("Interest {} already pending, consumer ignored", decoded.name);
            }
            return Ok(Outcome::NoEffect);
        }

        entry.consumer = Some(consumer);
        self.forward_interest(None, &decoded, interest);
        Ok(Outcome::Success)
    }

    /// Publish a Data packet from a local producer
    pub fn put_data(&mut self, data: &[u8]) -> Result<Outcome> {
        if data.is_empty() {
            return Err(ForwarderError::InvalidPointer("data"));
        }
        check_outer_tlv(data, tlv_types::DATA)?;
        self.on_incoming_data(None, data)
    }

    /// Handle a packet that arrived on `face`
    pub fn receive(&mut self, face: FaceId, packet: &[u8]) -> Result<Outcome> {
        self.check_registered(face)?;
        if packet.is_empty() {
            return Err(ForwarderError::InvalidPointer("packet"));
        }

        match Packet::classify(packet) {
            Ok(PacketType::Interest) => self.on_incoming_interest(face, packet),
            Ok(PacketType::Data) => self.on_incoming_data(Some(face), packet),
            Err(err) => Err(self.drop_malformed(Some(face), err)),
        }
    }

    /// Queue `task` to run in the first `process` call at least `delay` from now
    pub fn schedule<F>(&mut self, delay: Duration, task: F) -> Result<()>
    where
        F: FnOnce(&mut Forwarder) + 'static,
    {
        let due = self.now_ms().saturating_add(duration_ms(delay));
        self.scheduler
            .schedule(due, Box::new(task))
            .map_err(|_| ForwarderError::TaskQueueFull)
    }

    /// Expire overdue PIT entries and run due tasks.
    ///
    /// This is the only place where timeout callbacks and scheduled tasks
    /// run. Work queued by those callbacks waits for the next call.
    pub fn process(&mut self) {
        let now = self.now_ms();

        let mut expired = std::mem::take(&mut self.overdue);
        expired.extend(self.pit.expire(&mut self.name_tree, now));
        for expired in expired {
            self.stats.timeouts += 1;
            if let Some(on_timeout) = expired.consumer.and_then(|consumer| consumer.on_timeout) {
                on_timeout(self, &expired.name);
            }
        }

        for task in self.scheduler.take_due(now) {
            task(self);
        }
    }

    fn on_incoming_interest(&mut self, face: FaceId, wire: &[u8]) -> Result<Outcome> {
        self.stats.interests_received += 1;
        let interest = match Interest::decode(wire) {
            Ok(interest) => interest,
            Err(err) => return Err(self.drop_malformed(Some(face), err)),
        };
        trace!("Interest {} from face {}", interest.name, face);

        self.retire_overdue(&interest.name);
        let deadline = self.deadline_for(&interest);
        let (id, created) = match self.pit.find_or_insert(&mut self.name_tree, &interest.name, deadline) {
            Ok(result) => result,
            Err(_) => {
                self.stats.packets_dropped += 1;
                warn!("PIT full, dropping Interest {} from face {}", interest.name, face);
                return Err(ForwarderError::PitFull);
            }
        };
        let newly_added = self
            .pit
            .get_mut(id)
            .is_some_and(|entry| entry.incoming.insert(face));

        if !created {
            if newly_added {
                self.stats.interests_aggregated += 1;
                debug!("Aggregated Interest {} from face {}", interest.name, face);
            } else {
                debug!("Duplicate Interest {} from face {}", interest.name, face);
            }
            return Ok(Outcome::NoEffect);
        }

        self.forward_interest(Some(face), &interest, wire);
        Ok(Outcome::Success)
    }

    fn forward_interest(&mut self, incoming: Option<FaceId>, interest: &Interest, wire: &[u8]) {
        let Some(fib_id) = self.fib.longest_prefix_match(&self.name_tree, &interest.name) else {
            self.stats.interests_unrouted += 1;
            debug!("No route for Interest {}", interest.name);
            return;
        };
        let Some((nexthops, handler)) = self
            .fib
            .get(fib_id)
            .map(|entry| (entry.nexthops(), entry.handler.clone()))
        else {
            return;
        };

        let strategy = match handler {
            Some(handler) => self.invoke_handler(&handler, interest, wire),
            None => Strategy::Forward,
        };
        if strategy == Strategy::Suppress {
            debug!("Interest {} suppressed by local producer", interest.name);
            return;
        }

        for face in nexthops.without(incoming).iter() {
            if self.send_to(face, wire) {
                self.stats.interests_forwarded += 1;
            }
        }
    }

    fn invoke_handler(&mut self, handler: &HandlerRef, interest: &Interest, wire: &[u8]) -> Strategy {
        match handler.try_borrow_mut() {
            Ok(mut handler) => {
                debug!("Dispatching Interest {} to local producer", interest.name);
                handler.on_interest(self, interest, wire)
            }
            Err(_) => {
                warn!("Local producer re-entered for {}, skipping it", interest.name);
                Strategy::Forward
            }
        }
    }

    fn on_incoming_data(&mut self, incoming: Option<FaceId>, wire: &[u8]) -> Result<Outcome> {
        self.stats.data_received += 1;
        let data = match Data::decode(wire) {
            Ok(data) => data,
            Err(err) => return Err(self.drop_malformed(incoming, err)),
        };

        self.retire_overdue(&data.name);
        let Some(id) = self.pit.find(&self.name_tree, &data.name) else {
            self.stats.data_unsolicited += 1;
            debug!("Unsolicited Data {}", data.name);
            return Ok(Outcome::NoEffect);
        };
        let Some(satisfied) = self.pit.remove(&mut self.name_tree, id) else {
            return Ok(Outcome::NoEffect);
        };
        self.stats.data_satisfied += 1;
        debug!("Data {} satisfies PIT entry for faces {:?}", data.name, satisfied.incoming);

        for face in satisfied.incoming.without(incoming).iter() {
            self.send_to(face, wire);
        }
        if let Some(consumer) = satisfied.consumer {
            (consumer.on_data)(self, &data);
        }
        Ok(Outcome::Success)
    }

    /// Transmit on a face; failures are logged and counted
    fn send_to(&mut self, face: FaceId, wire: &[u8]) -> bool {
        let Some(handle) = self.faces.get(face) else {
            return false;
        };
        let result = match handle.try_borrow_mut() {
            Ok(mut endpoint) => endpoint.send(wire),
            Err(_) => Err(FaceError::SendFailed("face is busy".to_string())),
        };

        match result {
            Ok(()) => {
                trace!("Sent {} bytes on face {}", wire.len(), face);
                true
            }
            Err(err) => {
                self.stats.send_failures += 1;
                warn!("Failed to send on face {}: {}", face, err);
                false
            }
        }
    }

    /// Move an entry for `name` whose deadline has passed out of the PIT so
    /// that it can neither aggregate nor be satisfied. Its timeout still
    /// fires in the next `process`.
    fn retire_overdue(&mut self, name: &Name) {
        let now = self.now_ms();
        if let Some(entry) = self.pit.take_overdue(&mut self.name_tree, name, now) {
            debug!("Pending Interest {} passed its deadline", entry.name);
            self.overdue.push(entry);
        }
    }

    fn drop_malformed(&mut self, face: Option<FaceId>, err: TlvError) -> ForwarderError {
        self.stats.packets_dropped += 1;
        match face {
            Some(face) => warn!("Dropping malformed packet from face {}: {}", face, err),
            None => warn!("Dropping malformed local packet: {}", err),
        }
        err.into()
    }

    fn check_registered(&self, face: FaceId) -> Result<()> {
        self.faces.check_bounds(face)?;
        if self.faces.contains(face) {
            Ok(())
        } else {
            Err(ForwarderError::InvalidFace(face))
        }
    }

    fn deadline_for(&self, interest: &Interest) -> u64 {
        let lifetime_ms = interest
            .interest_lifetime
            .map(duration_ms)
            .unwrap_or(self.config.default_interest_lifetime_ms);
        self.now_ms().saturating_add(lifetime_ms)
    }
}

impl std::fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forwarder")
            .field("faces", &self.faces)
            .field("fib", &self.fib)
            .field("pit", &self.pit)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

/// Validate and decode a TLV-encoded Name
fn decode_prefix(prefix: &[u8]) -> Result<Name> {
    if prefix.is_empty() {
        return Err(ForwarderError::InvalidPointer("prefix"));
    }
    check_outer_tlv(prefix, tlv_types::NAME)?;
    let (name, _) = Name::decode(prefix)?;
    Ok(name)
}

fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}
