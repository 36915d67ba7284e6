//! Temporal session partitioning
//!
//! Each SKU event opens a window that runs until the next event. Captures that
//! carry an explicit event reference go to that event; older captures without
//! one fall into the window containing their timestamp. Anything that cannot be
//! placed becomes an orphan.

use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::storage::{SkuEvent, TextCapture};

/// One SKU event and the captures assigned to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub event: SkuEvent,
    /// Ascending by capture time
    pub captures: Vec<TextCapture>,
}

/// Result of partitioning all captures
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionGrouping {
    /// Newest event first
    pub sessions: Vec<Session>,
    /// Captures with no session, ascending by capture time
    pub orphans: Vec<TextCapture>,
}

impl SessionGrouping {
    /// Session opened by the given event
    pub fn session_for(&self, event_id: i64) -> Option<&Session> {
        self.sessions.iter().find(|session| session.event.id == event_id)
    }

    /// Total captures across sessions and orphans
    pub fn capture_count(&self) -> usize {
        self.sessions
            .iter()
            .map(|session| session.captures.len())
            .sum::<usize>()
            + self.orphans.len()
    }
}

/// Partition captures into SKU sessions and orphans
///
/// Deterministic for any input order: ties on timestamps are broken by id.
pub fn partition(events: &[SkuEvent], captures: &[TextCapture]) -> SessionGrouping {
    let mut sorted_captures: Vec<TextCapture> = captures.to_vec();
    sorted_captures.sort_by_key(|capture| (capture.captured_at, capture.id));

    if events.is_empty() {
        return SessionGrouping {
            sessions: Vec::new(),
            orphans: sorted_captures,
        };
    }

    let mut sorted_events: Vec<SkuEvent> = events.to_vec();
    sorted_events.sort_by_key(|event| (event.created_at, event.id));

    let index_by_id: HashMap<i64, usize> = sorted_events
        .iter()
        .enumerate()
        .map(|(index, event)| (event.id, index))
        .collect();

    let mut buckets: Vec<Vec<TextCapture>> = vec![Vec::new(); sorted_events.len()];
    let mut orphans = Vec::new();
    let mut dangling = 0usize;

    for capture in sorted_captures {
        let slot = match capture.sku_event_id {
            Some(event_id) => {
                let slot = index_by_id.get(&event_id).copied();
                if slot.is_none() {
                    dangling += 1;
                }
                slot
            }
            None => window_for(&sorted_events, capture.captured_at),
        };
        match slot {
            Some(index) => buckets[index].push(capture),
            None => orphans.push(capture),
        }
    }

    let sessions: Vec<Session> = sorted_events
        .into_iter()
        .zip(buckets)
        .map(|(event, captures)| Session { event, captures })
        .rev()
        .collect();

    debug!(
        "Partitioned captures into {} sessions, {} orphans ({} dangling references)",
        sessions.len(),
        orphans.len(),
        dangling
    );

    SessionGrouping { sessions, orphans }
}

/// Index of the event whose window `[created_at, next.created_at)` contains `timestamp`
fn window_for(sorted_events: &[SkuEvent], timestamp: i64) -> Option<usize> {
    // Events at or before the timestamp
    let opened = sorted_events.partition_point(|event| event.created_at <= timestamp);
    opened.checked_sub(1)
}
