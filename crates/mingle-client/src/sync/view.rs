//! View-state reconciler.
//!
//! A [`ViewState`] is the single ordered list one screen renders. It is the
//! only thing allowed to mutate that list, and it merges three sources:
//! point-in-time snapshots, live change events and optimistic local writes.
//!
//! Invariants:
//! - at most one entry per key;
//! - entries are ordered by `(created_at, key)` in the view's direction,
//!   except that an optimistic entry replaced by its authoritative row keeps
//!   the slot it was shown in;
//! - while a local write is pending, remote rows that may be its echo are
//!   held back (see [`ViewState::with_echo_filter`]) and never shown next
//!   to it;
//! - only the most recently started snapshot may replace the contents.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use mingle_shared::protocol::{ChangeEvent, ChangeKind, Entity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Oldest first (message threads).
    Ascending,
    /// Newest first (chat list).
    Descending,
}

/// A view entry: either an authoritative row or a local write whose
/// outcome is not known yet.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry<E: Entity> {
    Confirmed(E),
    Pending { entity: E, local_id: E::Key },
}

impl<E: Entity> Entry<E> {
    pub fn entity(&self) -> &E {
        match self {
            Self::Confirmed(entity) | Self::Pending { entity, .. } => entity,
        }
    }

    pub fn key(&self) -> E::Key {
        match self {
            Self::Confirmed(entity) => entity.key(),
            Self::Pending { local_id, .. } => local_id.clone(),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }
}

/// Tells which remote rows may be the echo of this view's own writes.
pub struct EchoFilter<E>(Arc<dyn Fn(&E) -> bool + Send + Sync>);

impl<E> Clone for EchoFilter<E> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<E> fmt::Debug for EchoFilter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EchoFilter")
    }
}

#[derive(Debug, Clone)]
pub struct ViewState<E: Entity> {
    entries: Vec<Entry<E>>,
    order: SortOrder,
    /// Changes held back while a snapshot is in flight.
    backlog: Option<Vec<ChangeEvent<E>>>,
    /// Ticket of the latest [`ViewState::begin_snapshot`].
    generation: u64,
    echo_filter: Option<EchoFilter<E>>,
    /// Possible echoes of pending writes, not rendered yet.
    echoes: Vec<E>,
    version: u64,
}

impl<E: Entity> ViewState<E> {
    pub fn new(order: SortOrder) -> Self {
        Self {
            entries: Vec::new(),
            order,
            backlog: None,
            generation: 0,
            echo_filter: None,
            echoes: Vec::new(),
            version: 0,
        }
    }

    /// Hold back remote rows matching `filter` while a local write is
    /// pending. They are settled by [`Self::confirm_optimistic`] or
    /// released by [`Self::revert_optimistic`].
    pub fn with_echo_filter(mut self, filter: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.echo_filter = Some(EchoFilter(Arc::new(filter)));
        self
    }

    pub fn ascending() -> Self {
        Self::new(SortOrder::Ascending)
    }

    pub fn descending() -> Self {
        Self::new(SortOrder::Descending)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bumped on every mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn entries(&self) -> &[Entry<E>] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.entries.iter().map(Entry::entity)
    }

    pub fn to_vec(&self) -> Vec<E> {
        self.iter().cloned().collect()
    }

    pub fn keys(&self) -> Vec<E::Key> {
        self.entries.iter().map(Entry::key).collect()
    }

    pub fn get(&self, key: &E::Key) -> Option<&E> {
        self.position(key).map(|i| self.entries[i].entity())
    }

    pub fn contains(&self, key: &E::Key) -> bool {
        self.position(key).is_some()
    }

    pub fn is_pending(&self, key: &E::Key) -> bool {
        self.position(key)
            .map(|i| self.entries[i].is_pending())
            .unwrap_or(false)
    }

    pub fn is_holding(&self) -> bool {
        self.backlog.is_some()
    }

    pub fn has_pending(&self) -> bool {
        self.entries.iter().any(Entry::is_pending)
    }

    /// Number of remote rows held back as possible echoes.
    pub fn held_echoes(&self) -> usize {
        self.echoes.len()
    }

    // ------------------------------------------------------------------
    // Snapshot
    // ------------------------------------------------------------------

    /// Start buffering changes and return the ticket the fetched snapshot
    /// must be handed back with.
    ///
    /// Call before fetching so events that race the fetch are replayed on
    /// top of it instead of being overwritten. Starting again while a fetch
    /// is in flight makes the older ticket stale.
    pub fn begin_snapshot(&mut self) -> u64 {
        if self.backlog.is_none() {
            self.backlog = Some(Vec::new());
        }
        self.generation += 1;
        self.generation
    }

    /// Apply the snapshot fetched under `ticket`. A stale ticket is
    /// ignored and the view keeps waiting for the newer one.
    pub fn finish_snapshot(&mut self, ticket: u64, entities: Vec<E>) -> bool {
        if ticket != self.generation || self.backlog.is_none() {
            return false;
        }
        self.apply_snapshot(entities);
        true
    }

    /// Give up on the snapshot behind `ticket`: buffered changes are
    /// applied to the current contents instead. Stale tickets are ignored.
    pub fn abort_snapshot(&mut self, ticket: u64) -> bool {
        if ticket != self.generation {
            return false;
        }
        if let Some(backlog) = self.backlog.take() {
            for event in backlog {
                self.apply_change(event);
            }
        }
        true
    }

    /// Replace the confirmed contents wholesale. Pending local writes that
    /// the snapshot does not already contain survive, then any buffered
    /// changes are replayed.
    pub fn apply_snapshot(&mut self, entities: Vec<E>) {
        let shown: Vec<E::Key> = self
            .entries
            .iter()
            .filter(|e| !e.is_pending())
            .map(Entry::key)
            .collect();
        let pending: Vec<Entry<E>> = self
            .entries
            .drain(..)
            .filter(|e| e.is_pending())
            .collect();
        let holding = !pending.is_empty();

        let mut confirmed: Vec<Entry<E>> = Vec::with_capacity(entities.len());
        for entity in entities {
            let key = entity.key();
            // A row first seen while a write is pending may be its echo.
            if holding && !shown.contains(&key) && self.may_be_echo(&entity) {
                self.hold_echo(entity);
                continue;
            }
            match confirmed.iter().position(|e| e.key() == key) {
                Some(i) => confirmed[i] = Entry::Confirmed(entity),
                None => confirmed.push(Entry::Confirmed(entity)),
            }
        }
        confirmed.sort_by(|a, b| self.compare(a.entity(), b.entity()));
        self.entries = confirmed;

        for entry in pending {
            if !self.contains(&entry.key()) {
                let at = self.insertion_point(entry.entity());
                self.entries.insert(at, entry);
            }
        }

        self.version += 1;
        if let Some(backlog) = self.backlog.take() {
            for event in backlog {
                self.apply_change(event);
            }
        }
        self.release_echoes();
    }

    // ------------------------------------------------------------------
    // Change events
    // ------------------------------------------------------------------

    /// Fold one change event in. Returns whether the view changed.
    ///
    /// - Insert adds the row only if its key is absent. A pending entry with
    ///   the same key is confirmed in place with the remote fields.
    /// - Update replaces in place, re-sorting only when the sort key moved.
    ///   An update for an unknown key is treated as an insert.
    /// - Delete removes the row; deleting an unknown key is a no-op.
    pub fn apply_change(&mut self, event: ChangeEvent<E>) -> bool {
        if let Some(backlog) = self.backlog.as_mut() {
            backlog.push(event);
            return false;
        }

        let key = event.entity.key();
        if let Some(i) = self.echoes.iter().position(|e| e.key() == key) {
            match event.kind {
                ChangeKind::Insert => {}
                ChangeKind::Update => self.echoes[i] = event.entity,
                ChangeKind::Delete => {
                    self.echoes.remove(i);
                }
            }
            return false;
        }
        if event.kind != ChangeKind::Delete
            && self.position(&key).is_none()
            && self.has_pending()
            && self.may_be_echo(&event.entity)
        {
            self.echoes.push(event.entity);
            return false;
        }

        let changed = match (event.kind, self.position(&key)) {
            (ChangeKind::Insert, Some(i)) => {
                if self.entries[i].is_pending() {
                    self.entries[i] = Entry::Confirmed(event.entity);
                    true
                } else {
                    false
                }
            }
            (ChangeKind::Update, Some(i)) => {
                let was_pending = self.entries[i].is_pending();
                let moved = self.entries[i].entity().created_at() != event.entity.created_at();
                if moved && !was_pending {
                    self.entries.remove(i);
                    self.insert_sorted(Entry::Confirmed(event.entity));
                } else {
                    self.entries[i] = Entry::Confirmed(event.entity);
                }
                true
            }
            (ChangeKind::Insert | ChangeKind::Update, None) => {
                self.insert_sorted(Entry::Confirmed(event.entity));
                true
            }
            (ChangeKind::Delete, Some(i)) => {
                self.entries.remove(i);
                true
            }
            (ChangeKind::Delete, None) => false,
        };

        if changed {
            self.version += 1;
            self.release_echoes();
        }
        changed
    }

    // ------------------------------------------------------------------
    // Optimistic writes
    // ------------------------------------------------------------------

    /// Show a local write immediately. The entity's own key serves as the
    /// local id until [`Self::confirm_optimistic`] swaps in the stored row.
    pub fn apply_optimistic(&mut self, entity: E) -> E::Key {
        let local_id = entity.key();
        if let Some(i) = self.position(&local_id) {
            self.entries.remove(i);
        }
        self.insert_sorted(Entry::Pending {
            entity,
            local_id: local_id.clone(),
        });
        self.version += 1;
        local_id
    }

    /// The write behind `local_id` succeeded and the backend returned
    /// `stored`. A held echo of it takes the pending entry's slot (remote
    /// fields win); otherwise `stored` does. If the echo is already shown
    /// the pending entry is simply dropped. Once nothing is pending, the
    /// other held rows are released.
    pub fn confirm_optimistic(&mut self, local_id: &E::Key, stored: E) {
        let stored_key = stored.key();
        let stored = match self.echoes.iter().position(|e| e.key() == stored_key) {
            Some(i) => self.echoes.remove(i),
            None => stored,
        };

        let pending_at = self
            .entries
            .iter()
            .position(|e| e.is_pending() && &e.key() == local_id);
        let echoed = self
            .entries
            .iter()
            .any(|e| !e.is_pending() && e.key() == stored_key);

        match (pending_at, echoed) {
            (Some(i), true) => {
                self.entries.remove(i);
                self.version += 1;
            }
            (Some(i), false) => {
                self.entries[i] = Entry::Confirmed(stored);
                self.version += 1;
            }
            (None, true) => {}
            (None, false) => {
                self.insert_sorted(Entry::Confirmed(stored));
                self.version += 1;
            }
        }
        self.release_echoes();
    }

    /// The write behind `local_id` failed: roll the entry back. Held rows
    /// are released once nothing is pending.
    pub fn revert_optimistic(&mut self, local_id: &E::Key) -> Option<E> {
        let i = self
            .entries
            .iter()
            .position(|e| e.is_pending() && &e.key() == local_id)?;
        self.version += 1;
        let reverted = match self.entries.remove(i) {
            Entry::Pending { entity, .. } | Entry::Confirmed(entity) => entity,
        };
        self.release_echoes();
        Some(reverted)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn may_be_echo(&self, entity: &E) -> bool {
        self.echo_filter.as_ref().is_some_and(|filter| (filter.0)(entity))
    }

    fn hold_echo(&mut self, entity: E) {
        let key = entity.key();
        match self.echoes.iter().position(|e| e.key() == key) {
            Some(i) => self.echoes[i] = entity,
            None => self.echoes.push(entity),
        }
    }

    fn release_echoes(&mut self) {
        if self.has_pending() || self.echoes.is_empty() {
            return;
        }
        for entity in std::mem::take(&mut self.echoes) {
            if !self.contains(&entity.key()) {
                self.insert_sorted(Entry::Confirmed(entity));
            }
        }
        self.version += 1;
    }

    fn position(&self, key: &E::Key) -> Option<usize> {
        self.entries.iter().position(|e| &e.key() == key)
    }

    fn compare(&self, a: &E, b: &E) -> Ordering {
        let natural = a
            .created_at()
            .cmp(&b.created_at())
            .then_with(|| a.key().cmp(&b.key()));
        match self.order {
            SortOrder::Ascending => natural,
            SortOrder::Descending => natural.reverse(),
        }
    }

    fn insertion_point(&self, entity: &E) -> usize {
        self.entries
            .iter()
            .position(|e| self.compare(entity, e.entity()) == Ordering::Less)
            .unwrap_or(self.entries.len())
    }

    fn insert_sorted(&mut self, entry: Entry<E>) {
        let at = self.insertion_point(entry.entity());
        self.entries.insert(at, entry);
    }
}
