use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::packet::RtpPacket;

struct Entry {
    packet: RtpPacket,
    arrival: Instant,
}

/// A capacity-bounded, delay-based reordering buffer keyed by RTP sequence
/// number.
///
/// Packets are held until either their arrival age reaches `delay`, the
/// buffer would otherwise exceed `capacity`, or — the force-drain ceiling —
/// their age reaches `max_delay` regardless of how empty the buffer is.
pub struct JitterBuffer {
    capacity: usize,
    delay: Duration,
    max_delay: Duration,
    entries: HashMap<u16, Entry>,
    expected_sequence_number: u16,
}

impl JitterBuffer {
    pub fn new(capacity: usize, delay: Duration, max_delay: Duration) -> Self {
        Self {
            capacity,
            delay: delay.min(max_delay),
            max_delay,
            entries: HashMap::new(),
            expected_sequence_number: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn expected_sequence_number(&self) -> u16 {
        self.expected_sequence_number
    }

    /// Insert a packet, evicting the lowest-numbered entry first if the
    /// buffer is already at capacity.
    pub fn insert(&mut self, sequence_number: u16, packet: RtpPacket, arrival: Instant) {
        if self.entries.len() >= self.capacity {
            if let Some(&lowest) = self.entries.keys().min() {
                self.entries.remove(&lowest);
            }
        }

        self.entries.insert(sequence_number, Entry { packet, arrival });
    }

    /// Release every entry that has aged past `delay` (or `max_delay`
    /// regardless of capacity pressure), or that must be evicted to keep
    /// the buffer within `capacity`, in wrap-aware sequence order.
    pub fn drain(&mut self, now: Instant) -> Vec<RtpPacket> {
        let mut keys: Vec<u16> = self.entries.keys().copied().collect();
        keys.sort_by_key(|&k| wrap_distance(self.expected_sequence_number, k));

        let mut released = Vec::new();
        let mut remaining = self.entries.len();

        for key in keys {
            let age = self.entries.get(&key).map(|e| now.duration_since(e.arrival));
            let Some(age) = age else { continue };

            let over_capacity = remaining > self.capacity;
            if age >= self.delay || age >= self.max_delay || over_capacity {
                if let Some(entry) = self.entries.remove(&key) {
                    remaining -= 1;
                    released.push((key, entry.packet));
                }
            }
        }

        if let Some(&(last_key, _)) = released.last() {
            self.expected_sequence_number = last_key.wrapping_add(1);
        }

        released.into_iter().map(|(_, packet)| packet).collect()
    }
}

/// Signed distance from `from` to `to` on the wrap-around sequence space,
/// used only to order entries for the drain pass (not classification).
fn wrap_distance(from: u16, to: u16) -> i32 {
    to.wrapping_sub(from) as i16 as i32
}
