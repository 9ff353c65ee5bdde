// libs/appointment-cell/src/store.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{SupabaseClient, SupabaseError};

use crate::models::{Appointment, AppointmentError, AppointmentFilter, AppointmentStatus, Patient, Report};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Error, Debug)]
pub enum StoreError {
    /// Another non-cancelled appointment already holds an overlapping interval.
    #[error("Conflicting appointment: {0}")]
    Conflict(String),

    #[error("Appointment not found")]
    NotFound,

    /// The stored status no longer matches the one the write was based on.
    #[error("Appointment status changed to {0}")]
    StatusChanged(AppointmentStatus),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<SupabaseError> for StoreError {
    fn from(err: SupabaseError) -> Self {
        if err.is_exclusion_violation() {
            return StoreError::Conflict(err.to_string());
        }
        StoreError::Database(err.to_string())
    }
}

impl From<StoreError> for AppointmentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => AppointmentError::SlotUnavailable(msg),
            StoreError::NotFound => AppointmentError::NotFound("Appointment"),
            StoreError::StatusChanged(status) => AppointmentError::InvalidState { from: status, action: "update" },
            StoreError::Database(msg) => AppointmentError::Database(msg),
        }
    }
}

/// Persistence seam for appointments, patients and reports.
///
/// `insert_appointment` and `update_appointment` must refuse to write a
/// non-cancelled row overlapping another non-cancelled row of the same doctor,
/// answering `StoreError::Conflict` instead. `update_appointment` also writes
/// only while the stored status still equals `expected`, answering
/// `StoreError::StatusChanged` with the stored status otherwise.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn find_patient(&self, patient_id: Uuid) -> Result<Option<Patient>, StoreError>;

    async fn find_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError>;

    /// Appointments starting on `date`, ordered by start time.
    async fn list_for_doctor_on_date(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        exclude_cancelled: bool,
    ) -> Result<Vec<Appointment>, StoreError>;

    async fn list_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError>;

    async fn insert_appointment(&self, appointment: Appointment) -> Result<Appointment, StoreError>;

    async fn update_appointment(
        &self,
        appointment: Appointment,
        expected: AppointmentStatus,
    ) -> Result<Appointment, StoreError>;

    /// Sets only `status` and `updated_at`, under the same `expected` guard.
    async fn update_status(
        &self,
        appointment_id: Uuid,
        expected: AppointmentStatus,
        status: AppointmentStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Appointment, StoreError>;

    async fn find_report_for_appointment(&self, appointment_id: Uuid) -> Result<Option<Report>, StoreError>;
}

// ==============================================================================
// SUPABASE (POSTGREST) STORE
// ==============================================================================

/// Relies on the `appointments_no_overlap` exclusion constraint; PostgREST
/// answers its violation with 409.
pub struct SupabaseAppointmentStore {
    supabase: SupabaseClient,
    api_key: String,
}

impl SupabaseAppointmentStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            api_key: config.store_api_key().to_string(),
        }
    }

    async fn fetch_rows<T: DeserializeOwned>(&self, path: &str, entity: &str) -> Result<Vec<T>, StoreError> {
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            path,
            Some(&self.api_key),
            None,
        ).await?;

        result
            .into_iter()
            .map(|row| serde_json::from_value(row)
                .map_err(|e| StoreError::Database(format!("Failed to parse {}: {}", entity, e))))
            .collect()
    }

    async fn fetch_one<T: DeserializeOwned>(&self, path: &str, entity: &str) -> Result<Option<T>, StoreError> {
        Ok(self.fetch_rows(path, entity).await?.into_iter().next())
    }

    fn parse_written(result: Vec<Value>) -> Result<Option<Appointment>, StoreError> {
        match result.into_iter().next() {
            Some(row) => serde_json::from_value(row)
                .map(Some)
                .map_err(|e| StoreError::Database(format!("Failed to parse appointment: {}", e))),
            None => Ok(None),
        }
    }

    /// PATCH filtered on both id and status, so a row whose status moved since
    /// it was read is left alone.
    async fn patch_guarded(
        &self,
        appointment_id: Uuid,
        expected: AppointmentStatus,
        body: Value,
    ) -> Result<Appointment, StoreError> {
        let path = format!("/rest/v1/appointments?id=eq.{}&status=eq.{}", appointment_id, expected);

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(&self.api_key),
            Some(body),
            Some(SupabaseClient::return_representation()),
        ).await?;

        if let Some(saved) = Self::parse_written(result)? {
            return Ok(saved);
        }

        // Nothing matched: either the row is gone or its status moved.
        match self.find_appointment(appointment_id).await? {
            Some(current) => {
                warn!("Appointment {} is {}, expected {}", appointment_id, current.status, expected);
                Err(StoreError::StatusChanged(current.status))
            }
            None => Err(StoreError::NotFound),
        }
    }

    fn appointment_body(appointment: &Appointment) -> Value {
        json!({
            "patient_id": appointment.patient_id,
            "doctor_id": appointment.doctor_id,
            "appointment_date": appointment.appointment_date.format(TIMESTAMP_FORMAT).to_string(),
            "duration_minutes": appointment.duration_minutes,
            "status": appointment.status,
            "notes": appointment.notes,
            "visit_reason": appointment.visit_reason,
            "updated_at": appointment.updated_at.map(|t| t.to_rfc3339()),
        })
    }
}

fn filter_query(filter: &AppointmentFilter) -> String {
    let mut query_parts = Vec::new();

    if let Some(patient_id) = filter.patient_id {
        query_parts.push(format!("patient_id=eq.{}", patient_id));
    }
    if let Some(doctor_id) = filter.doctor_id {
        query_parts.push(format!("doctor_id=eq.{}", doctor_id));
    }
    if let Some(status) = filter.status {
        query_parts.push(format!("status=eq.{}", status));
    }
    if let Some(from) = filter.from {
        query_parts.push(format!("appointment_date=gte.{}", from.format(TIMESTAMP_FORMAT)));
    }
    if let Some(to) = filter.to {
        query_parts.push(format!("appointment_date=lt.{}", to.format(TIMESTAMP_FORMAT)));
    }
    query_parts.push("order=appointment_date.asc".to_string());

    query_parts.join("&")
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn find_patient(&self, patient_id: Uuid) -> Result<Option<Patient>, StoreError> {
        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        self.fetch_one(&path, "patient").await
    }

    async fn find_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        self.fetch_one(&path, "appointment").await
    }

    async fn list_for_doctor_on_date(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        exclude_cancelled: bool,
    ) -> Result<Vec<Appointment>, StoreError> {
        debug!("Fetching appointments for doctor {} on {}", doctor_id, date);

        let day_start = date.and_hms_opt(0, 0, 0)
            .ok_or_else(|| StoreError::Database(format!("Invalid date {}", date)))?;
        let day_end = day_start + Duration::days(1);

        let mut path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&appointment_date=gte.{}&appointment_date=lt.{}&order=appointment_date.asc",
            doctor_id,
            day_start.format(TIMESTAMP_FORMAT),
            day_end.format(TIMESTAMP_FORMAT),
        );
        if exclude_cancelled {
            path.push_str(&format!("&status=neq.{}", AppointmentStatus::Cancelled));
        }

        self.fetch_rows(&path, "appointment").await
    }

    async fn list_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        let path = format!("/rest/v1/appointments?{}", filter_query(filter));
        self.fetch_rows(&path, "appointment").await
    }

    async fn insert_appointment(&self, appointment: Appointment) -> Result<Appointment, StoreError> {
        let mut body = Self::appointment_body(&appointment);
        body["id"] = json!(appointment.id);
        body["created_at"] = json!(appointment.created_at.to_rfc3339());

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/appointments",
            Some(&self.api_key),
            Some(body),
            Some(SupabaseClient::return_representation()),
        ).await?;

        Self::parse_written(result)?
            .ok_or_else(|| StoreError::Database("Failed to create appointment".to_string()))
    }

    async fn update_appointment(
        &self,
        appointment: Appointment,
        expected: AppointmentStatus,
    ) -> Result<Appointment, StoreError> {
        self.patch_guarded(appointment.id, expected, Self::appointment_body(&appointment)).await
    }

    async fn update_status(
        &self,
        appointment_id: Uuid,
        expected: AppointmentStatus,
        status: AppointmentStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Appointment, StoreError> {
        let body = json!({
            "status": status,
            "updated_at": updated_at.to_rfc3339(),
        });
        self.patch_guarded(appointment_id, expected, body).await
    }

    async fn find_report_for_appointment(&self, appointment_id: Uuid) -> Result<Option<Report>, StoreError> {
        let path = format!("/rest/v1/reports?appointment_id=eq.{}", appointment_id);
        self.fetch_one(&path, "report").await
    }
}

// ==============================================================================
// IN-MEMORY STORE
// ==============================================================================

/// Overlap test and write happen under one write lock, so concurrent bookings
/// for the same interval serialize and all but one get `Conflict`.
#[derive(Default)]
pub struct InMemoryAppointmentStore {
    appointments: RwLock<HashMap<Uuid, Appointment>>,
    patients: RwLock<HashMap<Uuid, Patient>>,
    reports: RwLock<HashMap<Uuid, Report>>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_patient(&self, patient: Patient) {
        self.patients.write().await.insert(patient.id, patient);
    }

    pub async fn insert_report(&self, report: Report) {
        self.reports.write().await.insert(report.appointment_id, report);
    }

    fn find_clash<'a>(
        appointments: &'a HashMap<Uuid, Appointment>,
        candidate: &Appointment,
    ) -> Option<&'a Appointment> {
        if !candidate.is_blocking() {
            return None;
        }

        appointments.values().find(|existing| {
            existing.id != candidate.id
                && existing.doctor_id == candidate.doctor_id
                && existing.is_blocking()
                && existing.overlaps(candidate.appointment_date, candidate.end_time())
        })
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn find_patient(&self, patient_id: Uuid) -> Result<Option<Patient>, StoreError> {
        Ok(self.patients.read().await.get(&patient_id).cloned())
    }

    async fn find_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        Ok(self.appointments.read().await.get(&appointment_id).cloned())
    }

    async fn list_for_doctor_on_date(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        exclude_cancelled: bool,
    ) -> Result<Vec<Appointment>, StoreError> {
        let mut appointments: Vec<Appointment> = self.appointments
            .read()
            .await
            .values()
            .filter(|a| a.doctor_id == doctor_id && a.appointment_date.date() == date)
            .filter(|a| !exclude_cancelled || a.is_blocking())
            .cloned()
            .collect();
        appointments.sort_by_key(|a| a.appointment_date);
        Ok(appointments)
    }

    async fn list_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        let mut appointments: Vec<Appointment> = self.appointments
            .read()
            .await
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        appointments.sort_by_key(|a| a.appointment_date);
        Ok(appointments)
    }

    async fn insert_appointment(&self, appointment: Appointment) -> Result<Appointment, StoreError> {
        let mut appointments = self.appointments.write().await;

        if let Some(existing) = Self::find_clash(&appointments, &appointment) {
            warn!("Rejecting appointment {}: overlaps {}", appointment.id, existing.id);
            return Err(StoreError::Conflict(format!(
                "doctor {} already booked at {}",
                existing.doctor_id, existing.appointment_date
            )));
        }

        appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn update_appointment(
        &self,
        appointment: Appointment,
        expected: AppointmentStatus,
    ) -> Result<Appointment, StoreError> {
        let mut appointments = self.appointments.write().await;

        let stored = appointments
            .get(&appointment.id)
            .map(|a| a.status)
            .ok_or(StoreError::NotFound)?;
        if stored != expected {
            warn!("Appointment {} is {}, expected {}", appointment.id, stored, expected);
            return Err(StoreError::StatusChanged(stored));
        }

        if let Some(existing) = Self::find_clash(&appointments, &appointment) {
            warn!("Rejecting update of {}: overlaps {}", appointment.id, existing.id);
            return Err(StoreError::Conflict(format!(
                "doctor {} already booked at {}",
                existing.doctor_id, existing.appointment_date
            )));
        }

        appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn update_status(
        &self,
        appointment_id: Uuid,
        expected: AppointmentStatus,
        status: AppointmentStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Appointment, StoreError> {
        let mut appointments = self.appointments.write().await;

        let stored = appointments.get_mut(&appointment_id).ok_or(StoreError::NotFound)?;
        if stored.status != expected {
            warn!("Appointment {} is {}, expected {}", appointment_id, stored.status, expected);
            return Err(StoreError::StatusChanged(stored.status));
        }

        stored.status = status;
        stored.updated_at = Some(updated_at);
        Ok(stored.clone())
    }

    async fn find_report_for_appointment(&self, appointment_id: Uuid) -> Result<Option<Report>, StoreError> {
        Ok(self.reports.read().await.get(&appointment_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 3)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn appointment(doctor_id: Uuid, start: NaiveDateTime) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id,
            appointment_date: start,
            duration_minutes: 30,
            status: AppointmentStatus::Scheduled,
            notes: None,
            visit_reason: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn in_memory_rejects_overlapping_insert() {
        let store = InMemoryAppointmentStore::new();
        let doctor_id = Uuid::new_v4();

        store.insert_appointment(appointment(doctor_id, at(10, 0))).await.unwrap();

        let clash = store.insert_appointment(appointment(doctor_id, at(10, 15))).await;
        assert!(matches!(clash, Err(StoreError::Conflict(_))));

        // Adjacent interval and other doctors are fine.
        store.insert_appointment(appointment(doctor_id, at(10, 30))).await.unwrap();
        store.insert_appointment(appointment(Uuid::new_v4(), at(10, 0))).await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_rows_do_not_block() {
        let store = InMemoryAppointmentStore::new();
        let doctor_id = Uuid::new_v4();

        let mut first = store.insert_appointment(appointment(doctor_id, at(10, 0))).await.unwrap();
        first.status = AppointmentStatus::Cancelled;
        store.update_appointment(first, AppointmentStatus::Scheduled).await.unwrap();

        store.insert_appointment(appointment(doctor_id, at(10, 0))).await.unwrap();

        let blocking = store.list_for_doctor_on_date(doctor_id, at(0, 0).date(), true).await.unwrap();
        let all = store.list_for_doctor_on_date(doctor_id, at(0, 0).date(), false).await.unwrap();
        assert_eq!(blocking.len(), 1);
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn update_of_unknown_row_is_not_found() {
        let store = InMemoryAppointmentStore::new();
        let result = store
            .update_appointment(appointment(Uuid::new_v4(), at(9, 0)), AppointmentStatus::Scheduled)
            .await;
        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn update_based_on_stale_status_is_refused() {
        let store = InMemoryAppointmentStore::new();
        let booked = store.insert_appointment(appointment(Uuid::new_v4(), at(9, 0))).await.unwrap();

        let mut completed = booked.clone();
        completed.status = AppointmentStatus::Completed;
        store.update_appointment(completed, AppointmentStatus::Scheduled).await.unwrap();

        // A writer that still believes the row is Scheduled loses.
        let mut cancelled = booked.clone();
        cancelled.status = AppointmentStatus::Cancelled;
        let result = store.update_appointment(cancelled, AppointmentStatus::Scheduled).await;
        assert!(matches!(result, Err(StoreError::StatusChanged(AppointmentStatus::Completed))));

        let stored = store.find_appointment(booked.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AppointmentStatus::Completed);
    }

    #[tokio::test]
    async fn status_update_keeps_other_fields() {
        let store = InMemoryAppointmentStore::new();
        let booked = store.insert_appointment(appointment(Uuid::new_v4(), at(9, 0))).await.unwrap();

        let mut moved = booked.clone();
        moved.appointment_date = at(11, 0);
        store.update_appointment(moved, AppointmentStatus::Scheduled).await.unwrap();

        let cancelled = store
            .update_status(booked.id, AppointmentStatus::Scheduled, AppointmentStatus::Cancelled, Utc::now())
            .await
            .unwrap();
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
        assert_eq!(cancelled.appointment_date, at(11, 0));
        assert!(cancelled.updated_at.is_some());

        let again = store
            .update_status(booked.id, AppointmentStatus::Scheduled, AppointmentStatus::Completed, Utc::now())
            .await;
        assert!(matches!(again, Err(StoreError::StatusChanged(AppointmentStatus::Cancelled))));

        let missing = store
            .update_status(Uuid::new_v4(), AppointmentStatus::Scheduled, AppointmentStatus::Cancelled, Utc::now())
            .await;
        assert!(matches!(missing, Err(StoreError::NotFound)));
    }

    #[test]
    fn filter_query_includes_populated_fields() {
        let doctor_id = Uuid::new_v4();
        let filter = AppointmentFilter {
            status: Some(AppointmentStatus::Confirmed),
            from: Some(at(8, 0)),
            ..AppointmentFilter::for_doctor(doctor_id)
        };

        assert_eq!(
            filter_query(&filter),
            format!(
                "doctor_id=eq.{}&status=eq.confirmed&appointment_date=gte.2025-03-03T08:00:00&order=appointment_date.asc",
                doctor_id
            )
        );
    }
}
