use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use crate::model::Outcome;
use crate::store::FixtureStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allow,
    Deny(DenyReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The fixture's gameweek lock time has passed.
    Locked { lock_time: DateTime<Utc> },
}

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("predictions for this gameweek locked at {lock_time}")]
    Locked { lock_time: DateTime<Utc> },
    #[error("unknown fixture {0}")]
    UnknownFixture(i64),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Read-time lock check. A gameweek without a computed lock time is open.
pub fn admission_for(lock_time: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Admission {
    match lock_time {
        Some(lock_time) if now >= lock_time => Admission::Deny(DenyReason::Locked { lock_time }),
        _ => Admission::Allow,
    }
}

pub fn can_predict(
    store: &FixtureStore,
    fixture_id: i64,
    now: DateTime<Utc>,
) -> Result<Admission, PredictionError> {
    let lock = store
        .fixture_lock(fixture_id)?
        .ok_or(PredictionError::UnknownFixture(fixture_id))?;
    Ok(admission_for(lock.lock_time, now))
}

/// Gate then upsert. The gate read and the write are independent; the
/// `(user_id, fixture_id)` unique key is the only coordination needed.
pub fn submit_prediction(
    store: &FixtureStore,
    user_id: i64,
    fixture_id: i64,
    value: Outcome,
    now: DateTime<Utc>,
) -> Result<(), PredictionError> {
    match can_predict(store, fixture_id, now)? {
        Admission::Allow => {
            store.upsert_prediction(user_id, fixture_id, value)?;
            Ok(())
        }
        Admission::Deny(DenyReason::Locked { lock_time }) => {
            info!(user_id, fixture_id, %lock_time, "prediction rejected: gameweek locked");
            Err(PredictionError::Locked { lock_time })
        }
    }
}
