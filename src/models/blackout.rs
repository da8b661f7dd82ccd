use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Process-wide blackout flag (spec.md §3). Updated once per minute by a
/// dedicated task from a configured local-time window; read, never written,
/// on the trade-execution path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlackoutState {
    pub in_blackout: bool,
    pub last_checked: Option<DateTime<Utc>>,
}

impl BlackoutState {
    /// Recomputes the flag from the current hour/minute in `tz`. Returns
    /// `true` if the flag changed, so the caller can log the transition.
    pub fn recompute(
        &mut self,
        enabled: bool,
        start_hour: u32,
        start_minute: u32,
        end_hour: u32,
        end_minute: u32,
        now_local_minutes: u32,
    ) -> bool {
        let new_value = if !enabled {
            false
        } else {
            let start = start_hour * 60 + start_minute;
            let end = end_hour * 60 + end_minute;
            if start <= end {
                now_local_minutes >= start && now_local_minutes < end
            } else {
                // Window wraps past local midnight.
                now_local_minutes >= start || now_local_minutes < end
            }
        };
        let changed = new_value != self.in_blackout;
        self.in_blackout = new_value;
        self.last_checked = Some(Utc::now());
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inside_window_is_blackout() {
        let mut state = BlackoutState::default();
        state.recompute(true, 5, 0, 5, 29, 5 * 60 + 10);
        assert!(state.in_blackout);
    }

    #[test]
    fn outside_window_is_not_blackout() {
        let mut state = BlackoutState::default();
        state.recompute(true, 5, 0, 5, 29, 5 * 60 + 30);
        assert!(!state.in_blackout);
    }

    #[test]
    fn disabled_never_blacks_out() {
        let mut state = BlackoutState::default();
        state.recompute(false, 5, 0, 5, 29, 5 * 60 + 10);
        assert!(!state.in_blackout);
    }

    #[test]
    fn wrapping_window_across_midnight() {
        let mut state = BlackoutState::default();
        state.recompute(true, 23, 30, 0, 30, 23 * 60 + 45);
        assert!(state.in_blackout);
        state.recompute(true, 23, 30, 0, 30, 12 * 60);
        assert!(!state.in_blackout);
    }
}
