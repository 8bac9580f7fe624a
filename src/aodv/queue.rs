//! Packets waiting for a route discovery to finish.

use std::collections::VecDeque;

use crate::node::NodeId;
use crate::packet::Packet;
use crate::time::{SimDuration, SimTime};

#[derive(Debug, Clone)]
struct Queued {
    packet: Packet,
    expires: SimTime,
}

/// Bounded FIFO of packets parked until a route to their destination exists.
#[derive(Debug, Clone)]
pub struct RequestQueue {
    entries: VecDeque<Queued>,
    max_len: usize,
    timeout: SimDuration,
}

impl RequestQueue {
    pub fn new(max_len: usize, timeout: SimDuration) -> Self {
        RequestQueue {
            entries: VecDeque::new(),
            max_len,
            timeout,
        }
    }

    /// Park `packet`. When the queue is full the oldest packet is evicted
    /// and returned.
    pub fn enqueue(&mut self, packet: Packet, now: SimTime) -> Option<Packet> {
        let evicted = if self.entries.len() >= self.max_len {
            self.entries.pop_front().map(|q| q.packet)
        } else {
            None
        };
        if self.max_len > 0 {
            self.entries.push_back(Queued {
                packet,
                expires: now.saturating_plus(self.timeout),
            });
            evicted
        } else {
            Some(packet)
        }
    }

    /// Remove and return every packet addressed to `dst`, oldest first.
    pub fn take_for(&mut self, dst: NodeId) -> Vec<Packet> {
        let mut taken = Vec::new();
        self.entries.retain(|q| {
            if q.packet.dst == dst {
                taken.push(q.packet.clone());
                false
            } else {
                true
            }
        });
        taken
    }

    /// Remove and return packets that waited longer than the queue timeout.
    pub fn purge(&mut self, now: SimTime) -> Vec<Packet> {
        let mut expired = Vec::new();
        self.entries.retain(|q| {
            if now >= q.expires {
                expired.push(q.packet.clone());
                false
            } else {
                true
            }
        });
        expired
    }

    /// Remove and return every parked packet, oldest first.
    pub fn drain(&mut self) -> Vec<Packet> {
        self.entries.drain(..).map(|q| q.packet).collect()
    }

    pub fn has_for(&self, dst: NodeId) -> bool {
        self.entries.iter().any(|q| q.packet.dst == dst)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{Payload, DEFAULT_TTL};

    fn packet(uid: u64, dst: u64) -> Packet {
        Packet {
            uid,
            src: NodeId::new(0),
            dst: NodeId::new(dst),
            src_port: 1,
            dst_port: 9,
            size_bytes: 64,
            ttl: DEFAULT_TTL,
            payload: Payload::Datagram {
                seq: uid as u32,
                sent_at: SimTime::ZERO,
            },
        }
    }

    #[test]
    fn test_take_for_destination() {
        let mut q = RequestQueue::new(8, SimDuration::from_secs(30));
        q.enqueue(packet(1, 5), SimTime::ZERO);
        q.enqueue(packet(2, 6), SimTime::ZERO);
        q.enqueue(packet(3, 5), SimTime::ZERO);

        let taken: Vec<u64> = q.take_for(NodeId::new(5)).iter().map(|p| p.uid).collect();
        assert_eq!(taken, vec![1, 3]);
        assert_eq!(q.len(), 1);
        assert!(q.has_for(NodeId::new(6)));
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let mut q = RequestQueue::new(2, SimDuration::from_secs(30));
        assert!(q.enqueue(packet(1, 5), SimTime::ZERO).is_none());
        assert!(q.enqueue(packet(2, 5), SimTime::ZERO).is_none());
        let evicted = q.enqueue(packet(3, 5), SimTime::ZERO).unwrap();
        assert_eq!(evicted.uid, 1);
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn test_purge_times_out() {
        let mut q = RequestQueue::new(8, SimDuration::from_secs(30));
        q.enqueue(packet(1, 5), SimTime::ZERO);
        q.enqueue(packet(2, 5), SimTime::from_nanos(10_000_000_000));

        let expired = q.purge(SimTime::from_nanos(30_000_000_000));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].uid, 1);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_drain_empties_queue() {
        let mut q = RequestQueue::new(8, SimDuration::from_secs(30));
        q.enqueue(packet(1, 5), SimTime::ZERO);
        q.enqueue(packet(2, 6), SimTime::ZERO);

        let drained: Vec<u64> = q.drain().iter().map(|p| p.uid).collect();
        assert_eq!(drained, vec![1, 2]);
        assert!(q.is_empty());
    }
}
