use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{AvailabilityWindow, CreateAvailabilityRequest, Doctor, DoctorError};
use crate::store::DoctorStore;

/// Weekday index used by availability windows: 0 = Sunday through 6 = Saturday.
pub fn weekday_index(date: NaiveDate) -> i32 {
    date.weekday().num_days_from_sunday() as i32
}

pub struct AvailabilityService {
    store: Arc<dyn DoctorStore>,
}

impl AvailabilityService {
    pub fn new(store: Arc<dyn DoctorStore>) -> Self {
        Self { store }
    }

    pub async fn get_doctor(&self, doctor_id: Uuid) -> Result<Doctor, DoctorError> {
        self.store
            .find_doctor(doctor_id)
            .await?
            .ok_or(DoctorError::NotFound)
    }

    /// Create a weekly availability window for a doctor
    pub async fn create_window(
        &self,
        doctor_id: Uuid,
        request: CreateAvailabilityRequest,
    ) -> Result<AvailabilityWindow, DoctorError> {
        debug!("Creating availability window for doctor: {}", doctor_id);

        if !(0..=6).contains(&request.day_of_week) {
            warn!("Rejected window with day_of_week {}", request.day_of_week);
            return Err(DoctorError::Validation(
                "Day of week must be between 0 (Sunday) and 6 (Saturday)".to_string(),
            ));
        }

        if request.start_time >= request.end_time {
            warn!("Rejected window {} - {}", request.start_time, request.end_time);
            return Err(DoctorError::Validation(
                "Start time must be before end time".to_string(),
            ));
        }

        self.get_doctor(doctor_id).await?;

        let window = AvailabilityWindow {
            id: Uuid::new_v4(),
            doctor_id,
            day_of_week: request.day_of_week,
            start_time: request.start_time,
            end_time: request.end_time,
            is_active: request.is_active.unwrap_or(true),
        };

        let window = self.store.insert_window(window).await?;
        info!(
            "Availability window {} created for doctor {} (day {}, {} - {})",
            window.id, doctor_id, window.day_of_week, window.start_time, window.end_time
        );

        Ok(window)
    }

    /// Active windows across the whole week, for display.
    pub async fn weekly_schedule(&self, doctor: &Doctor) -> Result<Vec<AvailabilityWindow>, DoctorError> {
        let windows = self.store.list_windows(doctor.id).await?;
        Ok(windows.into_iter().filter(|w| w.is_active).collect())
    }
}
