// libs/appointment-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use doctor_cell::models::DoctorError;
use shared_models::error::AppError;

pub const DEFAULT_DURATION_MINUTES: i32 = 30;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_date: NaiveDateTime,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub visit_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Appointment {
    /// Exclusive end of the booked interval.
    pub fn end_time(&self) -> NaiveDateTime {
        self.appointment_date + Duration::minutes(self.duration_minutes as i64)
    }

    /// Cancelled appointments never hold their slot.
    pub fn is_blocking(&self) -> bool {
        self.status != AppointmentStatus::Cancelled
    }

    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        intervals_overlap(start, end, self.appointment_date, self.end_time())
    }

    pub fn occupies(&self, instant: NaiveDateTime) -> bool {
        self.appointment_date <= instant && instant < self.end_time()
    }
}

/// Half-open overlap test: touching endpoints do not overlap.
pub fn intervals_overlap(
    start1: NaiveDateTime,
    end1: NaiveDateTime,
    start2: NaiveDateTime,
    end2: NaiveDateTime,
) -> bool {
    start1 < end2 && start2 < end1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
}

/// Clinical report attached to a completed appointment. Read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub title: String,
    pub body: String,
    pub diagnosis: Option<String>,
    pub treatment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentDetails {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub report: Option<Report>,
}

// ==============================================================================
// SLOTS & ELIGIBILITY
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotReason {
    Occupied,
    Past,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub start: NaiveDateTime,
    pub available: bool,
    pub reason: Option<SlotReason>,
}

impl Slot {
    pub fn free(start: NaiveDateTime) -> Self {
        Self { start, available: true, reason: None }
    }

    pub fn blocked(start: NaiveDateTime, reason: SlotReason) -> Self {
        Self { start, available: false, reason: Some(reason) }
    }
}

/// Outcome of a placement check; anything but `Eligible` names the first failed rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Past,
    DoctorNotFound,
    DoctorInactive,
    OutsideAvailability,
    Overlap,
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }
}

impl fmt::Display for Eligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Eligibility::Eligible => write!(f, "slot is available"),
            Eligibility::Past => write!(f, "requested time is in the past"),
            Eligibility::DoctorNotFound => write!(f, "doctor does not exist"),
            Eligibility::DoctorInactive => write!(f, "doctor is not active"),
            Eligibility::OutsideAvailability => write!(f, "requested time is outside the doctor's availability"),
            Eligibility::Overlap => write!(f, "requested time overlaps another appointment"),
        }
    }
}

// ==============================================================================
// REQUEST / QUERY DTOs
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    /// Defaults to the caller's own patient id.
    pub patient_id: Option<Uuid>,
    pub doctor_id: Uuid,
    pub appointment_date: NaiveDateTime,
    pub duration_minutes: Option<i32>,
    pub notes: Option<String>,
    pub visit_reason: Option<String>,
}

/// Fields left as `None` keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub appointment_date: Option<NaiveDateTime>,
    pub duration_minutes: Option<i32>,
    pub notes: Option<String>,
    pub visit_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityQuery {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentListQuery {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub from: Option<NaiveDateTime>,
    pub to: Option<NaiveDateTime>,
}

/// Store-level listing filter; every populated field must match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppointmentFilter {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub from: Option<NaiveDateTime>,
    pub to: Option<NaiveDateTime>,
}

impl AppointmentFilter {
    pub fn for_patient(patient_id: Uuid) -> Self {
        Self { patient_id: Some(patient_id), ..Self::default() }
    }

    pub fn for_doctor(doctor_id: Uuid) -> Self {
        Self { doctor_id: Some(doctor_id), ..Self::default() }
    }

    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.patient_id.map_or(true, |id| appointment.patient_id == id)
            && self.doctor_id.map_or(true, |id| appointment.doctor_id == id)
            && self.status.map_or(true, |status| appointment.status == status)
            && self.from.map_or(true, |from| appointment.appointment_date >= from)
            && self.to.map_or(true, |to| appointment.appointment_date < to)
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum AppointmentError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Doctor is not active")]
    InactiveDoctor,

    #[error("Appointment slot not available: {0}")]
    SlotUnavailable(String),

    #[error("Cannot {action} an appointment that is {from}")]
    InvalidState { from: AppointmentStatus, action: &'static str },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<DoctorError> for AppointmentError {
    fn from(err: DoctorError) -> Self {
        match err {
            DoctorError::NotFound => AppointmentError::NotFound("Doctor"),
            DoctorError::Validation(msg) => AppointmentError::Validation(msg),
            DoctorError::Database(msg) => AppointmentError::Database(msg),
        }
    }
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        let message = err.to_string();
        match err {
            AppointmentError::NotFound(_) => AppError::NotFound(message),
            AppointmentError::InactiveDoctor => AppError::BadRequest(message),
            AppointmentError::SlotUnavailable(_) => AppError::Conflict(message),
            AppointmentError::InvalidState { .. } => AppError::BadRequest(message),
            AppointmentError::Forbidden(msg) => AppError::Forbidden(msg),
            AppointmentError::Validation(msg) => AppError::ValidationError(msg),
            AppointmentError::Database(msg) => AppError::Database(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 3)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn appointment(start: NaiveDateTime, minutes: i32) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            appointment_date: start,
            duration_minutes: minutes,
            status: AppointmentStatus::Scheduled,
            notes: None,
            visit_reason: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn touching_intervals_do_not_overlap() {
        let existing = appointment(at(10, 0), 30);

        assert!(!existing.overlaps(at(10, 30), at(11, 0)));
        assert!(!existing.overlaps(at(9, 30), at(10, 0)));
        assert!(existing.overlaps(at(9, 45), at(10, 15)));
        assert!(existing.overlaps(at(10, 10), at(10, 20)));
        assert!(existing.overlaps(at(9, 0), at(12, 0)));
    }

    #[test]
    fn occupies_is_half_open() {
        let existing = appointment(at(10, 0), 30);
        assert!(existing.occupies(at(10, 0)));
        assert!(existing.occupies(at(10, 29)));
        assert!(!existing.occupies(at(10, 30)));
        assert!(!existing.occupies(at(9, 59)));
    }

    #[test]
    fn filter_matches_every_populated_field() {
        let existing = appointment(at(10, 0), 30);

        assert!(AppointmentFilter::default().matches(&existing));
        assert!(AppointmentFilter::for_patient(existing.patient_id).matches(&existing));
        assert!(!AppointmentFilter::for_doctor(Uuid::new_v4()).matches(&existing));

        let filter = AppointmentFilter {
            status: Some(AppointmentStatus::Confirmed),
            ..AppointmentFilter::for_doctor(existing.doctor_id)
        };
        assert!(!filter.matches(&existing));

        let window = AppointmentFilter {
            from: Some(at(9, 0)),
            to: Some(at(10, 0)),
            ..AppointmentFilter::default()
        };
        assert!(!window.matches(&existing));
    }

    #[test]
    fn errors_map_to_expected_status_codes() {
        let cases = [
            (AppointmentError::NotFound("Appointment"), StatusCode::NOT_FOUND),
            (AppointmentError::InactiveDoctor, StatusCode::BAD_REQUEST),
            (AppointmentError::SlotUnavailable("taken".into()), StatusCode::CONFLICT),
            (
                AppointmentError::InvalidState { from: AppointmentStatus::Completed, action: "cancel" },
                StatusCode::BAD_REQUEST,
            ),
            (AppointmentError::Forbidden("no".into()), StatusCode::FORBIDDEN),
            (AppointmentError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (AppointmentError::Database("down".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(AppError::from(err).status_code(), expected);
        }
    }

    #[test]
    fn invalid_state_message_names_action_and_state() {
        let err = AppointmentError::InvalidState {
            from: AppointmentStatus::Cancelled,
            action: "complete",
        };
        assert_eq!(err.to_string(), "Cannot complete an appointment that is cancelled");
    }
}
