// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, warn};

use crate::models::{AppointmentError, AppointmentStatus};

/// Transition table for appointment states.
#[derive(Debug, Default, Clone, Copy)]
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if !self.get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidState {
                from: current_status,
                action: action_name(new_status),
            });
        }

        Ok(())
    }

    /// Get all valid next statuses for a given current status
    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Scheduled => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ],
            // Re-cancelling only refreshes the modification time.
            AppointmentStatus::Cancelled => vec![AppointmentStatus::Cancelled],
            AppointmentStatus::Completed => vec![],
        }
    }

    /// Completed appointments are frozen; anything else may be moved or edited.
    pub fn validate_reschedule(&self, current_status: AppointmentStatus) -> Result<(), AppointmentError> {
        match current_status {
            AppointmentStatus::Completed => Err(AppointmentError::InvalidState {
                from: current_status,
                action: "reschedule",
            }),
            AppointmentStatus::Scheduled
            | AppointmentStatus::Confirmed
            | AppointmentStatus::Cancelled => Ok(()),
        }
    }

    /// Patients may edit their own bookings only before staff confirm them.
    pub fn patient_may_edit(&self, current_status: AppointmentStatus) -> bool {
        matches!(current_status, AppointmentStatus::Scheduled | AppointmentStatus::Cancelled)
    }
}

pub(crate) fn action_name(target: AppointmentStatus) -> &'static str {
    match target {
        AppointmentStatus::Scheduled => "schedule",
        AppointmentStatus::Confirmed => "confirm",
        AppointmentStatus::Completed => "complete",
        AppointmentStatus::Cancelled => "cancel",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use crate::models::AppointmentStatus::*;

    #[test]
    fn transition_table() {
        let lifecycle = AppointmentLifecycleService::new();
        let legal = [
            (Scheduled, Confirmed),
            (Scheduled, Completed),
            (Scheduled, Cancelled),
            (Confirmed, Completed),
            (Confirmed, Cancelled),
            (Cancelled, Cancelled),
        ];

        for from in [Scheduled, Confirmed, Completed, Cancelled] {
            for to in [Scheduled, Confirmed, Completed, Cancelled] {
                let result = lifecycle.validate_status_transition(from, to);
                assert_eq!(result.is_ok(), legal.contains(&(from, to)), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn rejection_names_the_action() {
        let lifecycle = AppointmentLifecycleService::new();

        assert_matches!(
            lifecycle.validate_status_transition(Confirmed, Confirmed),
            Err(AppointmentError::InvalidState { from: Confirmed, action: "confirm" })
        );
        assert_matches!(
            lifecycle.validate_status_transition(Cancelled, Completed),
            Err(AppointmentError::InvalidState { from: Cancelled, action: "complete" })
        );
        assert_matches!(
            lifecycle.validate_status_transition(Completed, Cancelled),
            Err(AppointmentError::InvalidState { from: Completed, action: "cancel" })
        );
    }

    #[test]
    fn only_completed_blocks_reschedule() {
        let lifecycle = AppointmentLifecycleService::new();
        assert!(lifecycle.validate_reschedule(Scheduled).is_ok());
        assert!(lifecycle.validate_reschedule(Confirmed).is_ok());
        assert!(lifecycle.validate_reschedule(Cancelled).is_ok());
        assert!(lifecycle.validate_reschedule(Completed).is_err());

        assert!(lifecycle.patient_may_edit(Scheduled));
        assert!(!lifecycle.patient_may_edit(Confirmed));
        assert!(!lifecycle.patient_may_edit(Completed));
    }
}
