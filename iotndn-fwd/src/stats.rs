use serde::Serialize;

/// Packet counters and table occupancy of a forwarder
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ForwarderStats {
    pub interests_received: u64,
    pub interests_expressed: u64,
    pub interests_forwarded: u64,
    pub interests_aggregated: u64,
    pub interests_unrouted: u64,
    pub data_received: u64,
    pub data_satisfied: u64,
    pub data_unsolicited: u64,
    pub timeouts: u64,
    pub packets_dropped: u64,
    pub send_failures: u64,
    pub name_tree_entries: usize,
    pub fib_entries: usize,
    pub pit_entries: usize,
    pub faces: usize,
    pub scheduled_tasks: usize,
}
