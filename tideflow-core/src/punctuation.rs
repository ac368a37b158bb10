//! PunctuationQueue holds the periodic callbacks processor nodes have
//! scheduled against stream time. Entries are ordered by their next fire
//! time; among entries due at the same time, scheduling order wins. The
//! caller pops one due entry at a time and reinserts it after the callback
//! so that a clock jump of several intervals produces the catch-up fires the
//! floor((t - t_sched) / interval) contract requires.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::error::Error;
use crate::topology::NodeId;
use crate::Result;

#[derive(Debug, Clone)]
pub(crate) struct PunctuationSchedule {
    pub(crate) node: NodeId,
    pub(crate) interval: i64,
    pub(crate) next_fire: i64,
    seq: u64,
}

impl PartialEq for PunctuationSchedule {
    fn eq(&self, other: &Self) -> bool {
        self.next_fire == other.next_fire && self.seq == other.seq
    }
}

impl Eq for PunctuationSchedule {}

impl PartialOrd for PunctuationSchedule {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PunctuationSchedule {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.next_fire, self.seq).cmp(&(other.next_fire, other.seq))
    }
}

#[derive(Default)]
pub(crate) struct PunctuationQueue {
    schedules: BinaryHeap<Reverse<PunctuationSchedule>>,
    next_seq: u64,
}

impl PunctuationQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a periodic callback for `node`. The first fire is due one
    /// interval past the stream time at scheduling.
    pub(crate) fn schedule(
        &mut self,
        node: NodeId,
        interval_ms: i64,
        stream_time: i64,
    ) -> Result<()> {
        if interval_ms <= 0 {
            return Err(Error::Config(format!(
                "punctuation interval must be positive, got {interval_ms}"
            )));
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.schedules.push(Reverse(PunctuationSchedule {
            node,
            interval: interval_ms,
            next_fire: stream_time + interval_ms,
            seq,
        }));
        Ok(())
    }

    /// Pop the next schedule due at `stream_time`, if any. The caller fires
    /// the callback and hands the schedule back via [Self::reschedule];
    /// splitting the two keeps the queue borrowable inside the callback, so
    /// punctuate code can itself call `schedule`.
    pub(crate) fn pop_due(&mut self, stream_time: i64) -> Option<PunctuationSchedule> {
        if self.schedules.peek()?.0.next_fire <= stream_time {
            self.schedules.pop().map(|Reverse(s)| s)
        } else {
            None
        }
    }

    /// Reinsert a fired schedule one interval later. The original scheduling
    /// sequence number is retained so equal fire times keep firing in
    /// scheduling order.
    pub(crate) fn reschedule(&mut self, mut schedule: PunctuationSchedule) {
        schedule.next_fire += schedule.interval;
        self.schedules.push(Reverse(schedule));
    }
}
