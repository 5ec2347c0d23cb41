//! Progress estimation for an outstanding submission.
//!
//! The remote service reports no granular progress, so the client advances
//! a bounded counter on a fixed cadence instead. The counter approaches a
//! ceiling strictly below 100 and never reaches it on its own; the
//! controller pins 100 once the network exchange actually completes.
//!
//! The ticking task is owned by the request token it was started for:
//! [`StateManager::tick_progress`](crate::state::StateManager::tick_progress)
//! refuses ticks for a superseded token, and the first refused tick ends
//! the task. A stale estimator can therefore never touch the progress of
//! a newer request.

use crate::state::StateManager;
use std::sync::Arc;
use std::time::Duration;

/// Next estimated progress value.
///
/// Takes ever-smaller steps toward `ceiling` (an eighth of the remaining
/// distance, at least one point) and never exceeds it, so the estimate
/// slows down instead of stalling at an arbitrary cutoff.
pub fn advance(current: u8, ceiling: u8) -> u8 {
    if current >= ceiling {
        return ceiling;
    }
    let step = ((ceiling - current) / 8).max(1);
    current.saturating_add(step).min(ceiling)
}

/// Tick estimated progress for one request until it is no longer current.
///
/// Spawn this alongside the network exchange. It terminates itself on the
/// first tick after the owning request was superseded, completed, or the
/// workflow was reset.
pub async fn drive(state: Arc<StateManager>, token: u64, cadence: Duration, ceiling: u8) {
    let mut interval = tokio::time::interval(cadence);
    // The first interval tick completes immediately; skip it so the bar
    // rests at 0 for one full cadence.
    interval.tick().await;

    loop {
        interval.tick().await;
        if !state.tick_progress(token, ceiling) {
            tracing::trace!("progress estimator for request {} finished", token);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_advance_moves_toward_ceiling() {
        let mut value = 0;
        for _ in 0..200 {
            let next = advance(value, 95);
            assert!(next > value || value == 95);
            assert!(next <= 95);
            value = next;
        }
        assert_eq!(value, 95);
    }

    #[test]
    fn test_advance_final_steps_are_single_points() {
        assert_eq!(advance(94, 95), 95);
        assert_eq!(advance(95, 95), 95);
    }

    proptest! {
        // The estimate is monotonic and bounded for every starting point.
        #[test]
        fn prop_advance_is_monotonic_and_bounded(
            current in 0u8..=99,
            ceiling in 1u8..=99,
        ) {
            let next = advance(current, ceiling);
            prop_assert!(next <= ceiling.max(current));
            if current < ceiling {
                prop_assert!(next > current);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_drive_stops_once_request_is_stale() {
        let state = Arc::new(StateManager::new());
        let token = state.begin_submission();

        let driver = tokio::spawn(drive(
            Arc::clone(&state),
            token,
            Duration::from_millis(50),
            95,
        ));

        tokio::time::sleep(Duration::from_millis(400)).await;
        let mid_flight = state.read(|s| s.progress);
        assert!(mid_flight > 0);
        assert!(mid_flight <= 95);

        // Completion lands: the flight ends and progress resets.
        state.update(|s| {
            s.is_in_flight = false;
            s.progress = 0;
        });

        // The driver notices on its next tick and exits on its own.
        tokio::time::sleep(Duration::from_millis(200)).await;
        driver.await.unwrap();
        assert_eq!(state.read(|s| s.progress), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drive_for_superseded_token_leaves_new_request_alone() {
        let state = Arc::new(StateManager::new());
        let stale_token = state.begin_submission();
        let current_token = state.begin_submission();
        assert_ne!(stale_token, current_token);

        let stale_driver = tokio::spawn(drive(
            Arc::clone(&state),
            stale_token,
            Duration::from_millis(10),
            95,
        ));

        // The stale driver exits on its first tick without advancing.
        tokio::time::sleep(Duration::from_millis(100)).await;
        stale_driver.await.unwrap();
        assert_eq!(state.read(|s| s.progress), 0);
    }
}
