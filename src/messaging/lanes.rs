//! Bounded multi-lane priority queue backing the dispatcher.
//!
//! One FIFO lane per [`Priority`].  Capacity is shared across lanes; a full
//! queue rejects new messages instead of blocking the producer.
//!
//! ```text
//!   Highest ─▶ [m7]
//!   High    ─▶ [m2, m5]          take_batch(3) ─▶ [m7, m2, m5]
//!   Medium  ─▶ []
//!   Low     ─▶ [m1, m3]
//!   Lowest  ─▶ [m4]
//! ```

use std::collections::VecDeque;

use heapless::Vec as BoundedVec;

use super::message::{Message, Priority};
use crate::config::MAX_BATCH_SIZE;

/// Stack-allocated batch handed to the transport.
pub type Batch = BoundedVec<Message, MAX_BATCH_SIZE>;

pub struct LaneQueue {
    lanes: [VecDeque<Message>; Priority::COUNT],
    len: usize,
    capacity: usize,
}

impl LaneQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            lanes: core::array::from_fn(|_| VecDeque::new()),
            len: 0,
            capacity,
        }
    }

    /// Append to the message's lane.  Hands the message back if full.
    pub fn push(&mut self, message: Message) -> Result<(), Message> {
        if self.len >= self.capacity {
            return Err(message);
        }
        self.lanes[message.priority().index()].push_back(message);
        self.len += 1;
        Ok(())
    }

    /// Remove up to `max` messages: highest lane first, FIFO within a lane.
    pub fn take_batch(&mut self, max: usize) -> Batch {
        let max = max.min(MAX_BATCH_SIZE);
        let mut batch = Batch::new();
        for priority in Priority::DESCENDING {
            let lane = &mut self.lanes[priority.index()];
            while batch.len() < max {
                let Some(message) = lane.pop_front() else {
                    break;
                };
                // Capacity was checked above; push cannot fail.
                let _ = batch.push(message);
                self.len -= 1;
            }
        }
        batch
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn lane_len(&self, priority: Priority) -> usize {
        self.lanes[priority.index()].len()
    }
}
