//! Closure policy: the single place where an entity becomes fully invested.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::types::Fundable;

/// Close `entity` now. See [`close_at`].
pub fn close(entity: &mut Fundable) -> bool {
    close_at(entity, Utc::now())
}

/// Mark `entity` fully invested and stamp `close_date = now`.
///
/// Returns `true` when the entity transitioned. An entity that is already
/// closed keeps its original `close_date`, and an entity that still has money
/// missing is left open; both return `false`.
pub fn close_at(entity: &mut Fundable, now: DateTime<Utc>) -> bool {
    if entity.fully_invested || entity.invested_amount != entity.full_amount {
        return false;
    }
    entity.fully_invested = true;
    entity.close_date = Some(now);
    debug!(kind = %entity.kind, id = entity.id, "closed at {now}");
    true
}
