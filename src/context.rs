use chrono::Utc;

use crate::model::UserId;
use crate::store::GradingStore;

/// Everything a component may consult while handling one event: the acting
/// user, the persistence boundary, and a single clock reading so every record
/// written for the event carries the same timestamp.
#[derive(Clone, Copy)]
pub struct SyncContext<'a> {
    pub store: &'a dyn GradingStore,
    pub actor: UserId,
    /// Unix seconds.
    pub now: i64,
}

impl<'a> SyncContext<'a> {
    pub fn new(store: &'a dyn GradingStore, actor: UserId) -> Self {
        Self {
            store,
            actor,
            now: Utc::now().timestamp(),
        }
    }

    /// Pins the clock. Used by replays and tests.
    pub fn at(self, now: i64) -> Self {
        Self { now, ..self }
    }
}
