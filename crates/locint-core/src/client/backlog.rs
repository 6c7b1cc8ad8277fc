//! Sends deferred until the client is registered.
//!
//! Entries are kept unencoded: a frame carries the session it is sent in,
//! which is only known once registration succeeds.

use std::collections::VecDeque;

use super::ticket::ReplySender;
use crate::message::ConfigRequest;
use crate::types::Location;

#[derive(Debug)]
pub(crate) enum Deferred {
    Config {
        request: ConfigRequest,
        reply: Option<ReplySender>,
    },
    Location(Location),
}

#[derive(Debug, Default)]
pub(crate) struct Backlog {
    entries: VecDeque<Deferred>,
}

impl Backlog {
    pub(crate) fn push(&mut self, entry: Deferred) {
        self.entries.push_back(entry);
    }

    /// Take every entry in submission order.
    pub(crate) fn take(&mut self) -> VecDeque<Deferred> {
        std::mem::take(&mut self.entries)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(week: u16) -> Deferred {
        Deferred::Config {
            request: ConfigRequest::MinGpsWeek(week),
            reply: None,
        }
    }

    #[test]
    fn test_take_preserves_order_and_empties() {
        let mut backlog = Backlog::default();
        backlog.push(entry(1));
        backlog.push(entry(2));
        backlog.push(entry(3));
        assert_eq!(backlog.len(), 3);

        let weeks: Vec<_> = backlog
            .take()
            .into_iter()
            .filter_map(|e| match e {
                Deferred::Config {
                    request: ConfigRequest::MinGpsWeek(week),
                    ..
                } => Some(week),
                _ => None,
            })
            .collect();
        assert_eq!(weeks, vec![1, 2, 3]);
        assert_eq!(backlog.len(), 0);
    }

    #[test]
    fn test_clear_drops_waiters() {
        let (tx, mut rx) = tokio::sync::oneshot::channel();
        let mut backlog = Backlog::default();
        backlog.push(Deferred::Config {
            request: ConfigRequest::GetMinGpsWeek,
            reply: Some(tx),
        });
        backlog.clear();
        assert!(matches!(
            rx.try_recv(),
            Err(tokio::sync::oneshot::error::TryRecvError::Closed)
        ));
    }
}
