use tracing::{debug, warn};

use crate::models::{AppointmentError, AppointmentStatus};

/// Pure state machine over appointment statuses.
///
/// Pending -> Confirmed; Pending/Confirmed -> Cancelled, NoShow or Completed.
/// Cancelled, NoShow and Completed are terminal.
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_status_transition(
        &self,
        current: &AppointmentStatus,
        next: &AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition {} -> {}", current, next);

        if !self.get_valid_transitions(current).contains(next) {
            warn!("Invalid status transition attempted: {} -> {}", current, next);
            return Err(AppointmentError::InvalidStatusTransition {
                from: *current,
                to: *next,
            });
        }

        Ok(())
    }

    pub fn get_valid_transitions(&self, current: &AppointmentStatus) -> Vec<AppointmentStatus> {
        match current {
            AppointmentStatus::Pending => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
                AppointmentStatus::Completed,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
                AppointmentStatus::Completed,
            ],
            AppointmentStatus::Cancelled
            | AppointmentStatus::NoShow
            | AppointmentStatus::Completed => vec![],
        }
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn pending_can_be_confirmed() {
        let lifecycle = AppointmentLifecycleService::new();
        assert!(lifecycle
            .validate_status_transition(&AppointmentStatus::Pending, &AppointmentStatus::Confirmed)
            .is_ok());
    }

    #[test]
    fn pending_and_confirmed_can_be_cancelled() {
        let lifecycle = AppointmentLifecycleService::new();
        for from in [AppointmentStatus::Pending, AppointmentStatus::Confirmed] {
            assert!(lifecycle
                .validate_status_transition(&from, &AppointmentStatus::Cancelled)
                .is_ok());
        }
    }

    #[test]
    fn terminal_states_allow_nothing() {
        let lifecycle = AppointmentLifecycleService::new();
        for from in [
            AppointmentStatus::Cancelled,
            AppointmentStatus::NoShow,
            AppointmentStatus::Completed,
        ] {
            assert!(lifecycle.get_valid_transitions(&from).is_empty());
            assert_matches!(
                lifecycle.validate_status_transition(&from, &AppointmentStatus::Confirmed),
                Err(AppointmentError::InvalidStatusTransition { .. })
            );
        }
    }

    #[test]
    fn confirmed_cannot_go_back_to_pending() {
        let lifecycle = AppointmentLifecycleService::new();
        assert_matches!(
            lifecycle.validate_status_transition(
                &AppointmentStatus::Confirmed,
                &AppointmentStatus::Pending
            ),
            Err(AppointmentError::InvalidStatusTransition { .. })
        );
    }
}
