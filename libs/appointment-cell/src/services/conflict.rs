use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use doctor_cell::services::weekday_index;
use doctor_cell::store::DoctorStore;
use shared_utils::clock::Clock;

use crate::models::{AppointmentError, Eligibility};
use crate::store::AppointmentStore;

/// Decides whether a doctor can take an appointment at a given time.
pub struct EligibilityChecker {
    doctors: Arc<dyn DoctorStore>,
    appointments: Arc<dyn AppointmentStore>,
    clock: Arc<dyn Clock>,
}

impl EligibilityChecker {
    pub fn new(
        doctors: Arc<dyn DoctorStore>,
        appointments: Arc<dyn AppointmentStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { doctors, appointments, clock }
    }

    pub async fn is_available(
        &self,
        doctor_id: Uuid,
        start: NaiveDateTime,
        duration_minutes: i32,
    ) -> Result<bool, AppointmentError> {
        Ok(self.check(doctor_id, start, duration_minutes, None).await?.is_eligible())
    }

    /// Rules run in order and stop at the first failure. `exclude` skips one
    /// appointment in the overlap test, so a booking can be moved onto itself.
    pub async fn check(
        &self,
        doctor_id: Uuid,
        start: NaiveDateTime,
        duration_minutes: i32,
        exclude: Option<Uuid>,
    ) -> Result<Eligibility, AppointmentError> {
        debug!("Checking eligibility for doctor {} at {} ({} min)", doctor_id, start, duration_minutes);

        if start < self.clock.now() {
            return Ok(Eligibility::Past);
        }

        match self.doctors.find_doctor(doctor_id).await? {
            None => return Ok(Eligibility::DoctorNotFound),
            Some(doctor) if !doctor.is_active => return Ok(Eligibility::DoctorInactive),
            Some(_) => {}
        }

        let windows = self.doctors
            .list_active_windows(doctor_id, weekday_index(start.date()))
            .await?;
        if !windows.iter().any(|w| w.covers(start.time(), duration_minutes)) {
            return Ok(Eligibility::OutsideAvailability);
        }

        let end = start + Duration::minutes(duration_minutes as i64);
        let existing = self.appointments
            .list_for_doctor_on_date(doctor_id, start.date(), true)
            .await?;

        let clash = existing.iter().find(|a| {
            Some(a.id) != exclude && a.is_blocking() && a.overlaps(start, end)
        });
        if let Some(other) = clash {
            warn!("Requested {} - {} overlaps appointment {}", start, end, other.id);
            return Ok(Eligibility::Overlap);
        }

        Ok(Eligibility::Eligible)
    }
}
