//! The AODV routing table.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::node::NodeId;
use crate::time::{SimDuration, SimTime};

/// Compare two sequence numbers with wrap-around (RFC 1982 serial arithmetic).
pub fn seq_cmp(a: u32, b: u32) -> Ordering {
    (a.wrapping_sub(b) as i32).cmp(&0)
}

/// `true` if `a` is strictly fresher than `b`.
#[inline]
pub fn seq_newer(a: u32, b: u32) -> bool {
    seq_cmp(a, b) == Ordering::Greater
}

/// Stored state of a routing table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RouteState {
    Valid,
    Invalid,
    InRepair,
}

/// What a node knows about reaching one destination right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RouteStatus {
    NoRoute,
    RouteDiscoveryPending,
    Valid,
    Expired,
    Repairing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteEntry {
    pub destination: NodeId,
    pub next_hop: NodeId,
    pub seq: u32,
    /// Whether `seq` was learned from the destination.
    pub valid_seq: bool,
    pub hop_count: u8,
    /// Absolute expiry. For Invalid entries this is the deletion time.
    pub lifetime: SimTime,
    pub state: RouteState,
    /// Neighbors that route through us to `destination`.
    pub precursors: BTreeSet<NodeId>,
}

impl RouteEntry {
    pub fn new(
        destination: NodeId,
        next_hop: NodeId,
        seq: u32,
        valid_seq: bool,
        hop_count: u8,
        lifetime: SimTime,
    ) -> Self {
        RouteEntry {
            destination,
            next_hop,
            seq,
            valid_seq,
            hop_count,
            lifetime,
            state: RouteState::Valid,
            precursors: BTreeSet::new(),
        }
    }

    /// Valid and not yet past its lifetime.
    pub fn is_usable(&self, now: SimTime) -> bool {
        self.state == RouteState::Valid && now < self.lifetime
    }
}

/// Destination-indexed routing table.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    entries: BTreeMap<NodeId, RouteEntry>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, dst: NodeId) -> Option<&RouteEntry> {
        self.entries.get(&dst)
    }

    pub fn get_mut(&mut self, dst: NodeId) -> Option<&mut RouteEntry> {
        self.entries.get_mut(&dst)
    }

    /// The entry for `dst` if it can carry traffic at `now`.
    pub fn usable(&self, dst: NodeId, now: SimTime) -> Option<&RouteEntry> {
        self.entries.get(&dst).filter(|e| e.is_usable(now))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.entries.values()
    }

    /// Install `candidate` if it is fresher than what the table holds.
    ///
    /// A candidate wins when the stored sequence number is unknown, when its
    /// own sequence number is strictly greater (even with more hops), or
    /// when the numbers are equal and either the stored route is not
    /// usable or the candidate is shorter. Precursors of a replaced entry
    /// are kept. Returns whether the candidate was installed.
    pub fn update(&mut self, candidate: RouteEntry, now: SimTime) -> bool {
        let Some(existing) = self.entries.get_mut(&candidate.destination) else {
            self.entries.insert(candidate.destination, candidate);
            return true;
        };

        let accept = !existing.valid_seq
            || seq_newer(candidate.seq, existing.seq)
            || (candidate.seq == existing.seq
                && (!existing.is_usable(now) || candidate.hop_count < existing.hop_count));
        if !accept {
            return false;
        }

        let precursors = std::mem::take(&mut existing.precursors);
        *existing = candidate;
        existing.precursors.extend(precursors);
        true
    }

    /// Record that `neighbor` is directly reachable until `expires`.
    ///
    /// The one-hop route is forced Valid regardless of freshness; a known
    /// sequence number is kept, and `seq` (when present) only ever moves it
    /// forward.
    pub fn refresh_neighbor(&mut self, neighbor: NodeId, seq: Option<u32>, expires: SimTime) {
        let entry = self
            .entries
            .entry(neighbor)
            .or_insert_with(|| RouteEntry::new(neighbor, neighbor, 0, false, 1, expires));

        if entry.state != RouteState::Valid || entry.next_hop != neighbor || entry.hop_count != 1 {
            entry.next_hop = neighbor;
            entry.hop_count = 1;
            entry.state = RouteState::Valid;
            entry.lifetime = expires;
        } else {
            entry.lifetime = entry.lifetime.max(expires);
        }

        if let Some(seq) = seq {
            if !entry.valid_seq || seq_newer(seq, entry.seq) {
                entry.seq = seq;
            }
            entry.valid_seq = true;
        }
    }

    /// Push the lifetime of a usable entry out to at least `until`.
    pub fn extend_lifetime(&mut self, dst: NodeId, until: SimTime) {
        if let Some(e) = self.entries.get_mut(&dst) {
            if e.state == RouteState::Valid {
                e.lifetime = e.lifetime.max(until);
            }
        }
    }

    pub fn add_precursor(&mut self, dst: NodeId, precursor: NodeId) {
        if let Some(e) = self.entries.get_mut(&dst) {
            e.precursors.insert(precursor);
        }
    }

    /// Invalidate one entry: bump its sequence number and schedule deletion.
    pub fn invalidate(&mut self, dst: NodeId, now: SimTime, delete_period: SimDuration) {
        if let Some(e) = self.entries.get_mut(&dst) {
            if e.state != RouteState::Invalid {
                if e.valid_seq {
                    e.seq = e.seq.wrapping_add(1);
                }
                e.state = RouteState::Invalid;
                e.lifetime = now.saturating_plus(delete_period);
            }
        }
    }

    /// Invalidate every Valid entry whose next hop is `next_hop`.
    ///
    /// Returns the invalidated entries (after the sequence bump) so the
    /// caller can build an RERR and notify precursors.
    pub fn invalidate_via(
        &mut self,
        next_hop: NodeId,
        now: SimTime,
        delete_period: SimDuration,
    ) -> Vec<RouteEntry> {
        let mut broken = Vec::new();
        for e in self.entries.values_mut() {
            if e.next_hop == next_hop && e.state == RouteState::Valid {
                if e.valid_seq {
                    e.seq = e.seq.wrapping_add(1);
                }
                e.state = RouteState::Invalid;
                e.lifetime = now.saturating_plus(delete_period);
                broken.push(e.clone());
            }
        }
        broken
    }

    /// Invalidate `dst` because `via` reported it unreachable, adopting the
    /// reported sequence number when it is fresher. Only routes that
    /// actually go through `via` are touched.
    pub fn invalidate_reported(
        &mut self,
        dst: NodeId,
        via: NodeId,
        seq: u32,
        now: SimTime,
        delete_period: SimDuration,
    ) -> Option<RouteEntry> {
        let e = self.entries.get_mut(&dst)?;
        if e.next_hop != via || e.state == RouteState::Invalid {
            return None;
        }
        if !e.valid_seq || seq_newer(seq, e.seq) {
            e.seq = seq;
        }
        e.state = RouteState::Invalid;
        e.lifetime = now.saturating_plus(delete_period);
        Some(e.clone())
    }

    /// Age the table: Valid entries past their lifetime become Invalid
    /// (kept for `delete_period`), and Invalid entries past their deletion
    /// time are removed. Entries under repair are left alone.
    pub fn purge(&mut self, now: SimTime, delete_period: SimDuration) {
        self.entries.retain(|_, e| match e.state {
            RouteState::Invalid => now < e.lifetime,
            RouteState::InRepair => true,
            RouteState::Valid => true,
        });
        for e in self.entries.values_mut() {
            if e.state == RouteState::Valid && now >= e.lifetime {
                e.state = RouteState::Invalid;
                e.lifetime = now.saturating_plus(delete_period);
            }
        }
    }

    /// Point-in-time copy of every entry, ordered by destination.
    pub fn snapshot(&self) -> Vec<RouteEntry> {
        self.entries.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(i: u64) -> NodeId {
        NodeId::new(i)
    }

    fn at(secs: u64) -> SimTime {
        SimTime::from_nanos(secs * 1_000_000_000)
    }

    #[test]
    fn test_seq_wraparound() {
        assert!(seq_newer(1, 0));
        assert!(seq_newer(0, u32::MAX));
        assert!(!seq_newer(u32::MAX, 0));
        assert_eq!(seq_cmp(7, 7), Ordering::Equal);
    }

    #[test]
    fn test_fresher_seq_beats_shorter_path() {
        let mut table = RoutingTable::new();
        let now = at(1);
        assert!(table.update(RouteEntry::new(n(9), n(1), 5, true, 2, at(10)), now));
        assert!(table.update(RouteEntry::new(n(9), n(2), 6, true, 7, at(10)), now));

        let e = table.get(n(9)).unwrap();
        assert_eq!(e.next_hop, n(2));
        assert_eq!(e.hop_count, 7);
        assert_eq!(e.seq, 6);
    }

    #[test]
    fn test_equal_seq_needs_fewer_hops() {
        let mut table = RoutingTable::new();
        let now = at(1);
        table.update(RouteEntry::new(n(9), n(1), 5, true, 3, at(10)), now);

        assert!(!table.update(RouteEntry::new(n(9), n(2), 5, true, 3, at(10)), now));
        assert!(!table.update(RouteEntry::new(n(9), n(2), 4, true, 1, at(10)), now));
        assert!(table.update(RouteEntry::new(n(9), n(3), 5, true, 2, at(10)), now));
        assert_eq!(table.get(n(9)).unwrap().next_hop, n(3));
    }

    #[test]
    fn test_update_keeps_precursors() {
        let mut table = RoutingTable::new();
        table.update(RouteEntry::new(n(9), n(1), 5, true, 3, at(10)), at(0));
        table.add_precursor(n(9), n(4));
        table.update(RouteEntry::new(n(9), n(2), 6, true, 3, at(10)), at(0));
        assert!(table.get(n(9)).unwrap().precursors.contains(&n(4)));
    }

    #[test]
    fn test_invalidate_via_bumps_seq() {
        let mut table = RoutingTable::new();
        table.update(RouteEntry::new(n(9), n(1), 5, true, 3, at(10)), at(0));
        table.update(RouteEntry::new(n(8), n(1), 2, true, 2, at(10)), at(0));
        table.update(RouteEntry::new(n(7), n(2), 2, true, 2, at(10)), at(0));

        let broken = table.invalidate_via(n(1), at(1), SimDuration::from_secs(15));
        assert_eq!(broken.len(), 2);
        let e = table.get(n(9)).unwrap();
        assert_eq!(e.state, RouteState::Invalid);
        assert_eq!(e.seq, 6);
        assert!(table.usable(n(7), at(1)).is_some());
    }

    #[test]
    fn test_purge_expires_then_deletes() {
        let mut table = RoutingTable::new();
        let delete = SimDuration::from_secs(15);
        table.update(RouteEntry::new(n(9), n(1), 1, true, 1, at(3)), at(0));

        table.purge(at(2), delete);
        assert_eq!(table.get(n(9)).unwrap().state, RouteState::Valid);

        table.purge(at(3), delete);
        let e = table.get(n(9)).unwrap();
        assert_eq!(e.state, RouteState::Invalid);
        assert_eq!(e.lifetime, at(18));

        table.purge(at(18), delete);
        assert!(table.get(n(9)).is_none());
    }

    #[test]
    fn test_refresh_neighbor_revalidates() {
        let mut table = RoutingTable::new();
        table.update(RouteEntry::new(n(2), n(5), 4, true, 3, at(10)), at(0));
        table.invalidate(n(2), at(1), SimDuration::from_secs(15));

        table.refresh_neighbor(n(2), None, at(4));
        let e = table.get(n(2)).unwrap();
        assert_eq!(e.state, RouteState::Valid);
        assert_eq!(e.next_hop, n(2));
        assert_eq!(e.hop_count, 1);
        assert_eq!(e.seq, 5);
        assert!(e.valid_seq);
    }
}
