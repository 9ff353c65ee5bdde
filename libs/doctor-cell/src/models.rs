use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_models::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub specialization_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl Doctor {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// A weekly recurring range during which a doctor takes appointments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub day_of_week: i32, // 0 = Sunday, 1 = Monday, etc.
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_active: bool,
}

impl AvailabilityWindow {
    /// True when `[start, start + duration_minutes]` lies inside this window.
    /// An interval that wraps past midnight never fits.
    pub fn covers(&self, start: NaiveTime, duration_minutes: i32) -> bool {
        let (end, wrapped) = start.overflowing_add_signed(Duration::minutes(duration_minutes as i64));
        wrapped == 0 && self.start_time <= start && self.end_time >= end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAvailabilityRequest {
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_active: Option<bool>,
}

#[derive(Error, Debug)]
pub enum DoctorError {
    #[error("Doctor not found")]
    NotFound,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<DoctorError> for AppError {
    fn from(err: DoctorError) -> Self {
        match err {
            DoctorError::NotFound => AppError::NotFound(err.to_string()),
            DoctorError::Validation(msg) => AppError::ValidationError(msg),
            DoctorError::Database(msg) => AppError::Database(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(start: (u32, u32), end: (u32, u32)) -> AvailabilityWindow {
        AvailabilityWindow {
            id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            day_of_week: 1,
            start_time: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
            is_active: true,
        }
    }

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn covers_inclusive_bounds() {
        let morning = window((9, 0), (13, 0));
        assert!(morning.covers(at(9, 0), 30));
        assert!(morning.covers(at(12, 30), 30));
        assert!(!morning.covers(at(12, 45), 30));
        assert!(!morning.covers(at(8, 30), 30));
    }

    #[test]
    fn interval_past_midnight_never_fits() {
        let late = window((20, 0), (23, 59));
        assert!(!late.covers(at(23, 45), 30));
    }

    #[test]
    fn doctor_error_maps_to_http_errors() {
        assert!(matches!(AppError::from(DoctorError::NotFound), AppError::NotFound(_)));
        assert!(matches!(
            AppError::from(DoctorError::Validation("bad".into())),
            AppError::ValidationError(_)
        ));
        assert!(matches!(
            AppError::from(DoctorError::Database("down".into())),
            AppError::Database(_)
        ));
    }
}
