//! FIFO reply correlation per request category.
//!
//! The daemon answers requests of one category in the order it received
//! them, so the oldest waiter of a category owns the next reply for it.
//! Waiters only live for one registration: the worker flushes them whenever
//! the registration changes and drops replies stamped with another session.

use std::collections::{BTreeMap, HashMap, VecDeque};

use super::ticket::{Reply, ReplySender};
use crate::message::ConfigCategory;
use crate::types::Response;

/// One outstanding reply. `tx` is `None` for requests whose reply is
/// consumed silently, such as replays after re-registration.
#[derive(Debug)]
struct Waiter {
    tx: Option<ReplySender>,
}

impl Waiter {
    fn notify(self, reply: Reply) {
        if let Some(tx) = self.tx {
            // the caller may have dropped its ticket
            let _ = tx.send(reply);
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Resolution {
    Delivered,
    /// Consumed by a silent waiter.
    Absorbed,
    Unmatched,
}

#[derive(Debug, Default)]
pub(crate) struct Correlator {
    pending: HashMap<ConfigCategory, VecDeque<Waiter>>,
}

impl Correlator {
    pub(crate) fn add(&mut self, category: ConfigCategory, tx: Option<ReplySender>) {
        self.pending
            .entry(category)
            .or_default()
            .push_back(Waiter { tx });
    }

    /// Hand `reply` to the oldest waiter of `category`.
    pub(crate) fn resolve(&mut self, category: ConfigCategory, reply: Reply) -> Resolution {
        let Some(queue) = self.pending.get_mut(&category) else {
            return Resolution::Unmatched;
        };
        let Some(waiter) = queue.pop_front() else {
            return Resolution::Unmatched;
        };
        if queue.is_empty() {
            self.pending.remove(&category);
        }

        let resolution = if waiter.tx.is_some() {
            Resolution::Delivered
        } else {
            Resolution::Absorbed
        };
        waiter.notify(reply);
        resolution
    }

    /// Resolve every waiter: queries with `Failure`, everything else with
    /// `Success`. Returns the number of waiters resolved.
    pub(crate) fn flush(&mut self) -> usize {
        let mut count = 0;
        for (category, queue) in self.pending.drain() {
            let response = if category.is_query() {
                Response::Failure
            } else {
                Response::Success
            };
            for waiter in queue {
                waiter.notify(Reply::Status(response));
                count += 1;
            }
        }
        count
    }

    pub(crate) fn counts(&self) -> BTreeMap<ConfigCategory, usize> {
        self.pending
            .iter()
            .map(|(category, queue)| (*category, queue.len()))
            .collect()
    }
}
