//! In-memory command sessions with inactivity expiry
//!
//! The table maps session ids to rows. The table lock only guards the map
//! and is never held across an await; each row has its own async mutex so
//! that requests for one session run one after another while different
//! sessions proceed concurrently.
//!
//! Expiry is passive: an idle row is dropped when it is next looked up or
//! by [`SessionTable::sweep`]. Unknown and expired ids are reported the
//! same way.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use uuid::Uuid;

use super::{CommandError, Status, StepData};
use crate::Jid;

/// Shared handle to a session row
pub type SessionHandle = Arc<SessionRow>;

/// State of one command invocation
#[derive(Debug)]
pub struct CommandSession {
    pub id: String,
    pub owner: Jid,
    pub node: String,
    /// Full JID that opened the session
    pub requestor: Jid,
    pub status: Status,
    pub data: StepData,
}

/// A session row: the session state behind its own lock, plus a flag set
/// once the row has left the table
///
/// A request that queued on the row lock before the row was removed
/// checks [`SessionRow::is_closed`] after acquiring it.
#[derive(Debug)]
pub struct SessionRow {
    closed: AtomicBool,
    state: Arc<tokio::sync::Mutex<CommandSession>>,
}

impl SessionRow {
    fn new(session: CommandSession) -> Self {
        Self {
            closed: AtomicBool::new(false),
            state: Arc::new(tokio::sync::Mutex::new(session)),
        }
    }

    /// Whether the row was removed from the table
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Wait for exclusive access to the session state
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, CommandSession> {
        self.state.lock().await
    }

    /// Owned variant of [`SessionRow::lock`], for handing the row to a task
    pub async fn lock_owned(&self) -> tokio::sync::OwnedMutexGuard<CommandSession> {
        Arc::clone(&self.state).lock_owned().await
    }
}

#[derive(Debug)]
struct Slot {
    handle: SessionHandle,
    owner: Jid,
    created_at: DateTime<Utc>,
    last_touch: Instant,
    timeout: Duration,
}

impl Slot {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.last_touch) > self.timeout
    }

    /// Seconds since the session was opened
    fn age_secs(&self) -> i64 {
        (Utc::now() - self.created_at).num_seconds()
    }
}

/// Keyed store of live sessions
#[derive(Debug, Default)]
pub struct SessionTable {
    slots: Mutex<HashMap<String, Slot>>,
}

impl SessionTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session in the `Executing` state under a fresh id
    pub fn new_session(
        &self,
        owner: &Jid,
        node: &str,
        requestor: &Jid,
        timeout: Duration,
    ) -> (String, SessionHandle) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());

        let mut id = Uuid::new_v4().to_string();
        while slots.contains_key(&id) {
            id = Uuid::new_v4().to_string();
        }

        let handle = Arc::new(SessionRow::new(CommandSession {
            id: id.clone(),
            owner: owner.clone(),
            node: node.to_string(),
            requestor: requestor.clone(),
            status: Status::Executing,
            data: StepData::new(),
        }));

        slots.insert(
            id.clone(),
            Slot {
                handle: Arc::clone(&handle),
                owner: owner.clone(),
                created_at: Utc::now(),
                last_touch: Instant::now(),
                timeout,
            },
        );

        tracing::debug!(session_id = %id, owner = %owner, node, "opened command session");
        (id, handle)
    }

    /// Look up a live session
    ///
    /// The inactivity timer is left alone; call [`SessionTable::touch`] once
    /// the request has been accepted for this session.
    ///
    /// # Errors
    ///
    /// Returns `SessionExpired` if the id is unknown or the session idled
    /// past its timeout
    pub fn get(&self, id: &str) -> Result<SessionHandle, CommandError> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());

        match slots.get(id) {
            None => return Err(CommandError::SessionExpired),
            Some(slot) if !slot.is_expired(Instant::now()) => {
                return Ok(Arc::clone(&slot.handle));
            }
            Some(_) => {}
        }

        if let Some(slot) = slots.remove(id) {
            slot.handle.close();
            tracing::debug!(session_id = %id, age_secs = slot.age_secs(), "command session expired");
        }
        Err(CommandError::SessionExpired)
    }

    /// Restart the inactivity timer of a session; absent ids are ignored
    pub fn touch(&self, id: &str) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = slots.get_mut(id) {
            slot.last_touch = Instant::now();
        }
    }

    /// Remove a session; removing an absent id is a no-op
    pub fn delete(&self, id: &str) {
        let removed = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.remove(id)
        };
        if let Some(slot) = removed {
            slot.handle.close();
            tracing::debug!(session_id = %id, age_secs = slot.age_secs(), "closed command session");
        }
    }

    /// Drop every idle session, returning how many were removed
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let expired: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| slot.is_expired(now))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            if let Some(slot) = slots.remove(id) {
                slot.handle.close();
                tracing::trace!(session_id = %id, age_secs = slot.age_secs(), "dropped idle command session");
            }
        }

        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "swept expired command sessions");
        }
        expired.len()
    }

    /// Drop every session opened under `owner`
    pub fn purge_owner(&self, owner: &Jid) -> usize {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let before = slots.len();
        slots.retain(|_, slot| {
            if slot.owner == *owner {
                slot.handle.close();
                false
            } else {
                true
            }
        });
        before - slots.len()
    }

    /// Whether a live (not yet expired) session exists under `id`
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .get(id)
            .is_some_and(|slot| !slot.is_expired(Instant::now()))
    }

    /// Number of rows, including idle ones not swept yet
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the table holds no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn jid(s: &str) -> Jid {
        Jid::parse(s).unwrap()
    }

    fn open(table: &SessionTable, timeout: Duration) -> (String, SessionHandle) {
        table.new_session(
            &jid("owner@example.com"),
            "status",
            &jid("alice@example.com/phone"),
            timeout,
        )
    }

    #[tokio::test]
    async fn new_session_starts_executing() {
        let table = SessionTable::new();
        let (id, handle) = open(&table, Duration::from_secs(60));

        let session = handle.lock().await;
        assert_eq!(session.id, id);
        assert_eq!(session.status, Status::Executing);
        assert!(session.data.is_empty());
        assert!(table.contains(&id));
    }

    #[tokio::test]
    async fn ids_are_unique() {
        let table = SessionTable::new();
        let ids: HashSet<String> = (0..500)
            .map(|_| open(&table, Duration::from_secs(60)).0)
            .collect();
        assert_eq!(ids.len(), 500);
        assert_eq!(table.len(), 500);
    }

    #[tokio::test]
    async fn unknown_id_is_expired() {
        let table = SessionTable::new();
        assert_eq!(
            table.get("nope").unwrap_err(),
            CommandError::SessionExpired
        );
    }

    #[tokio::test]
    async fn delete_is_idempotent_and_closes_row() {
        let table = SessionTable::new();
        let (id, handle) = open(&table, Duration::from_secs(60));

        table.delete(&id);
        table.delete(&id);

        assert!(table.get(&id).is_err());
        assert!(handle.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_session_expires_on_access() {
        let table = SessionTable::new();
        let (id, _) = open(&table, Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(table.get(&id).is_ok());
        table.touch(&id);

        // touch restarted the timer
        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(table.get(&id).is_ok());

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(table.get(&id).unwrap_err(), CommandError::SessionExpired);
        assert!(table.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_alone_does_not_extend_session() {
        let table = SessionTable::new();
        let (id, _) = open(&table, Duration::from_secs(10));

        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(4)).await;
            let _ = table.get(&id);
        }

        assert_eq!(table.get(&id).unwrap_err(), CommandError::SessionExpired);
    }

    #[tokio::test]
    async fn touch_ignores_unknown_id() {
        let table = SessionTable::new();
        table.touch("nope");
        assert!(table.is_empty());
    }

    #[test]
    fn fresh_slot_has_no_age() {
        let table = SessionTable::new();
        let (id, _) = open(&table, Duration::from_secs(10));
        let slots = table.slots.lock().unwrap();
        assert!((0..=1).contains(&slots[&id].age_secs()));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_only_idle_rows() {
        let table = SessionTable::new();
        let (short, _) = open(&table, Duration::from_secs(5));
        let (long, _) = open(&table, Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(table.sweep(), 1);
        assert!(!table.contains(&short));
        assert!(table.contains(&long));
    }

    #[tokio::test]
    async fn purge_owner_leaves_other_owners() {
        let table = SessionTable::new();
        open(&table, Duration::from_secs(60));
        let (other, _) = table.new_session(
            &jid("second@example.com"),
            "status",
            &jid("bob@example.com"),
            Duration::from_secs(60),
        );

        assert_eq!(table.purge_owner(&jid("owner@example.com")), 1);
        assert!(table.contains(&other));
    }
}
