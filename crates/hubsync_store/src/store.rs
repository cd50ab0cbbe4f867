//! The access event store.

use crate::error::{StoreError, StoreResult};
use crate::journal::{EventJournal, HeartbeatMark, HeartbeatTarget, JournalEntry, MemoryJournal};
use crate::records::Records;
use crate::types::{AccessEvent, AccessPointId, EventId, ManagerId, NewAccessEvent};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::HashMap;

/// Record tables plus the event log and its per-manager indexes.
#[derive(Debug, Default)]
struct StoreState {
    records: Records,
    /// Events in commit order.
    events: Vec<AccessEvent>,
    /// Positions in `events` per reporting manager.
    by_manager: HashMap<ManagerId, Vec<usize>>,
    /// Maximum event `at` per manager.
    watermarks: HashMap<ManagerId, DateTime<Utc>>,
    next_event_id: u64,
}

impl StoreState {
    fn new(records: Records) -> Self {
        Self {
            records,
            next_event_id: 1,
            ..Self::default()
        }
    }

    fn apply(&mut self, entry: JournalEntry) {
        for event in entry.events {
            self.push_event(event);
        }
        for mark in entry.heartbeats {
            self.apply_heartbeat(mark);
        }
    }

    fn push_event(&mut self, event: AccessEvent) {
        self.next_event_id = self.next_event_id.max(event.id.as_u64() + 1);
        self.watermarks
            .entry(event.manager_id)
            .and_modify(|mark| *mark = (*mark).max(event.at))
            .or_insert(event.at);
        self.by_manager
            .entry(event.manager_id)
            .or_default()
            .push(self.events.len());
        self.events.push(event);
    }

    fn apply_heartbeat(&mut self, mark: HeartbeatMark) {
        match mark.target {
            HeartbeatTarget::Manager(id) => {
                if let Some(manager) = self.records.manager_mut(id) {
                    manager.heartbeat_at = Some(mark.at);
                }
            }
            HeartbeatTarget::Point(id) => {
                if let Some(point) = self.records.point_mut(id) {
                    point.heartbeat_at = Some(mark.at);
                }
            }
        }
    }

    fn events_of_manager(&self, manager: ManagerId) -> Vec<&AccessEvent> {
        let mut events: Vec<_> = self
            .by_manager
            .get(&manager)
            .map(|positions| positions.iter().map(|&i| &self.events[i]).collect())
            .unwrap_or_default();
        events.sort_by_key(|event| (event.at, event.id));
        events
    }
}

/// Append-only store of access events over the access-control records.
///
/// # Concurrency
///
/// The store has a single writer. [`AccessStore::begin_write`] holds the
/// exclusive lock until the transaction commits or is dropped, so a
/// watermark read inside a write transaction cannot change before commit.
///
/// # Durability
///
/// A commit appends one journal frame before the in-memory state changes.
/// If the append fails, nothing of the transaction is visible.
pub struct AccessStore {
    state: RwLock<StoreState>,
    journal: Mutex<Box<dyn EventJournal>>,
}

impl AccessStore {
    /// Opens a store over a journal, replaying its committed transactions.
    ///
    /// Heartbeat marks for records missing from `records` are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal is corrupted or unreadable.
    pub fn open(mut journal: Box<dyn EventJournal>, records: Records) -> StoreResult<Self> {
        let entries = journal.replay()?;
        let mut state = StoreState::new(records);
        let frames = entries.len();
        for entry in entries {
            state.apply(entry);
        }
        tracing::info!(
            frames,
            events = state.events.len(),
            "replayed access event journal"
        );

        Ok(Self {
            state: RwLock::new(state),
            journal: Mutex::new(journal),
        })
    }

    /// Creates a store with an empty in-memory journal.
    #[must_use]
    pub fn in_memory(records: Records) -> Self {
        Self {
            state: RwLock::new(StoreState::new(records)),
            journal: Mutex::new(Box::new(MemoryJournal::new())),
        }
    }

    /// Begins a read transaction.
    pub fn read(&self) -> ReadTransaction<'_> {
        ReadTransaction {
            state: self.state.read(),
        }
    }

    /// Begins the write transaction, blocking while another one is open.
    pub fn begin_write(&self) -> WriteTransaction<'_> {
        WriteTransaction {
            state: self.state.write(),
            journal: &self.journal,
            staged: Vec::new(),
            heartbeats: Vec::new(),
        }
    }

    /// Mutates the record tables on behalf of the record-management layer.
    ///
    /// Record edits are owned by that layer and are not journaled here.
    pub fn update_records<R>(&self, f: impl FnOnce(&mut Records) -> R) -> R {
        f(&mut self.state.write().records)
    }

    /// Returns the watermark of a manager.
    #[must_use]
    pub fn watermark(&self, manager: ManagerId) -> Option<DateTime<Utc>> {
        self.read().watermark(manager)
    }

    /// Returns the total number of stored events.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.read().event_count()
    }

    /// Returns the size of the journal in bytes.
    #[must_use]
    pub fn journal_size(&self) -> u64 {
        self.journal.lock().size()
    }
}

/// A consistent read view of the store.
pub struct ReadTransaction<'a> {
    state: RwLockReadGuard<'a, StoreState>,
}

impl ReadTransaction<'_> {
    /// Returns the record tables.
    #[must_use]
    pub fn records(&self) -> &Records {
        &self.state.records
    }

    /// Returns the maximum event `at` recorded for a manager.
    #[must_use]
    pub fn watermark(&self, manager: ManagerId) -> Option<DateTime<Utc>> {
        self.state.watermarks.get(&manager).copied()
    }

    /// Returns a manager's events ordered by `at`, ties by append order.
    #[must_use]
    pub fn events_of_manager(&self, manager: ManagerId) -> Vec<&AccessEvent> {
        self.state.events_of_manager(manager)
    }

    /// Iterates over all events in commit order.
    pub fn events(&self) -> impl Iterator<Item = &AccessEvent> {
        self.state.events.iter()
    }

    /// Returns the total number of stored events.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.state.events.len()
    }
}

/// The single write transaction.
///
/// Events and heartbeat marks are staged and become visible together on
/// [`WriteTransaction::commit`]. Dropping the transaction discards them.
pub struct WriteTransaction<'a> {
    state: RwLockWriteGuard<'a, StoreState>,
    journal: &'a Mutex<Box<dyn EventJournal>>,
    staged: Vec<(ManagerId, NewAccessEvent)>,
    heartbeats: Vec<HeartbeatMark>,
}

impl<'a> WriteTransaction<'a> {
    /// Returns the record tables as of the start of the transaction.
    #[must_use]
    pub fn records(&self) -> &Records {
        &self.state.records
    }

    /// Returns the committed watermark of a manager, ignoring staged events.
    #[must_use]
    pub fn watermark(&self, manager: ManagerId) -> Option<DateTime<Utc>> {
        self.state.watermarks.get(&manager).copied()
    }

    /// Stages an event reported by a manager.
    pub fn append_event(&mut self, manager: ManagerId, event: NewAccessEvent) {
        self.staged.push((manager, event));
    }

    /// Returns the number of staged events.
    #[must_use]
    pub fn staged_events(&self) -> usize {
        self.staged.len()
    }

    /// Stages a heartbeat timestamp for a manager.
    pub fn touch_manager(&mut self, manager: ManagerId, at: DateTime<Utc>) -> StoreResult<()> {
        if self.state.records.manager(manager).is_none() {
            return Err(StoreError::UnknownManager(manager));
        }
        self.heartbeats.push(HeartbeatMark {
            target: HeartbeatTarget::Manager(manager),
            at,
        });
        Ok(())
    }

    /// Stages a heartbeat timestamp for an access point.
    pub fn touch_point(&mut self, point: AccessPointId, at: DateTime<Utc>) -> StoreResult<()> {
        if self.state.records.point(point).is_none() {
            return Err(StoreError::UnknownPoint(point));
        }
        self.heartbeats.push(HeartbeatMark {
            target: HeartbeatTarget::Point(point),
            at,
        });
        Ok(())
    }

    /// Commits staged changes and keeps reading the result.
    ///
    /// Event IDs are assigned in staging order. The returned view is taken
    /// without releasing the lock, so it reflects exactly this commit.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal append fails; the store is then
    /// unchanged.
    pub fn commit(mut self) -> StoreResult<ReadTransaction<'a>> {
        let mut next_id = self.state.next_event_id;
        let events: Vec<_> = self
            .staged
            .drain(..)
            .map(|(manager, event)| {
                let id = EventId::new(next_id);
                next_id += 1;
                AccessEvent::from_new(id, manager, event)
            })
            .collect();
        let entry = JournalEntry {
            events,
            heartbeats: std::mem::take(&mut self.heartbeats),
        };

        if !entry.is_empty() {
            self.journal.lock().append(&entry)?;
            tracing::debug!(
                events = entry.events.len(),
                heartbeats = entry.heartbeats.len(),
                "committed journal frame"
            );
            self.state.apply(entry);
        }

        Ok(ReadTransaction {
            state: RwLockWriteGuard::downgrade(self.state),
        })
    }
}
