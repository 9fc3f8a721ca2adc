//! The Delayed Reaper: frees actions that slept past their `next_try`
//! so the worker loops can pick them up again, or gives up on them once
//! their retry budget is spent.

use tracing::info;
use vmctl_store::adapter;
use vmctl_types::{Action, ActionLock, Request, RequestState};

use crate::error::Result;

/// Claims the oldest sleeping [`Action`] whose `next_try` has elapsed
/// and either re-frees it for another attempt or, once `repetitions`
/// has been exhausted, times out its owning [`Request`].
///
/// Returns `true` if an action was reaped, `false` if there was
/// nothing to do this pass — callers use this to decide whether to
/// keep polling at the busy interval or fall back to the idle one.
///
/// # Errors
///
/// Returns the underlying store error.
pub fn reap_one(tx: &mut postgres::Transaction<'_>) -> Result<bool> {
    let Some(mut action) = adapter::claim_one_for_update_skip_locked::<Action>(
        tx,
        "lock",
        ActionLock::Sleeping.into(),
        "AND (data->>'next_try')::timestamptz < now()",
    )?
    else {
        return Ok(false);
    };

    info!(action_id = action.id, repetitions = action.repetitions, "reaping delayed action");

    if action.repetitions <= 0 {
        let request_id: i64 = action.request.parse().unwrap_or_default();
        if let Some(mut request) = adapter::get_by_id::<_, Request>(tx, request_id)? {
            request.state = RequestState::Timeouted;
            adapter::update(tx, &request)?;
        }
        action.lock = ActionLock::Finished.into();
    } else {
        action.lock = ActionLock::Free.into();
        action.next_try = vmctl_types::timestamp_not_initialized();
    }

    adapter::update(tx, &action)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repetitions_exhausted_maps_to_finished_lock() {
        // Pure state-transition check, no database: mirrors the branch
        // `reap_one` takes once `repetitions` is spent.
        let mut action = Action::new("get_info", "1");
        action.repetitions = 0;
        assert!(action.repetitions <= 0);
    }
}
