//! Discarding superseded queries.
//!
//! Each keystroke starts a new query; once a newer one has begun, the
//! older result is of no use. Ranking never mutates anything, so an
//! abandoned query needs no cleanup; checking the ticket just lets the
//! engine skip the remaining work.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Hands out [`QueryTicket`]s; cloning shares the same sequence.
#[derive(Debug, Clone, Default)]
pub struct QuerySession {
    latest: Arc<AtomicU64>,
}

impl QuerySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new query, superseding every earlier ticket.
    pub fn begin(&self) -> QueryTicket {
        let id = self.latest.fetch_add(1, Ordering::AcqRel) + 1;
        QueryTicket {
            id,
            latest: Arc::clone(&self.latest),
        }
    }
}

/// Handle for one query of a [`QuerySession`].
#[derive(Debug, Clone)]
pub struct QueryTicket {
    id: u64,
    latest: Arc<AtomicU64>,
}

impl QueryTicket {
    pub fn is_current(&self) -> bool {
        self.latest.load(Ordering::Acquire) == self.id
    }

    pub fn is_superseded(&self) -> bool {
        !self.is_current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ticket_supersedes_old() {
        let session = QuerySession::new();
        let first = session.begin();
        assert!(first.is_current());

        let second = session.clone().begin();
        assert!(first.is_superseded());
        assert!(second.is_current());
    }
}
