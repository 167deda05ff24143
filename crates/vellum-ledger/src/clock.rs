//! Commit timestamps.

use chrono::{DateTime, SubsecRound, Utc};
use tokio::sync::{Mutex, MutexGuard};

/// Hands out `recorded_at` values for one store instance.
///
/// A stamp is taken while holding the clock's lock and the lock is held
/// until that one record is committed, so stamps are non-decreasing in
/// commit order even if the wall clock steps backwards. Stamps are
/// truncated to microseconds, the resolution of the index keys.
#[derive(Debug)]
pub(crate) struct CommitClock {
    last: Mutex<DateTime<Utc>>,
}

impl CommitClock {
    pub(crate) fn new() -> Self {
        Self::starting_at(DateTime::<Utc>::MIN_UTC)
    }

    pub(crate) fn starting_at(last: DateTime<Utc>) -> Self {
        Self {
            last: Mutex::new(last),
        }
    }

    /// Reserve the commit slot. Drop the slot once the record is written.
    pub(crate) async fn slot(&self) -> CommitSlot<'_> {
        CommitSlot {
            last: self.last.lock().await,
        }
    }
}

/// Exclusive right to stamp and commit one record.
pub(crate) struct CommitSlot<'a> {
    last: MutexGuard<'a, DateTime<Utc>>,
}

impl CommitSlot<'_> {
    pub(crate) fn stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now().trunc_subsecs(6);
        let stamp = now.max(*self.last);
        *self.last = stamp;
        stamp
    }
}
