use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{SupabaseClient, SupabaseError};

use crate::models::{AvailabilityWindow, Doctor, DoctorError};

/// Persistence seam for doctors and their weekly availability.
#[async_trait]
pub trait DoctorStore: Send + Sync {
    async fn find_doctor(&self, doctor_id: Uuid) -> Result<Option<Doctor>, DoctorError>;

    /// Active windows for one weekday (0 = Sunday), ordered by start time.
    async fn list_active_windows(
        &self,
        doctor_id: Uuid,
        day_of_week: i32,
    ) -> Result<Vec<AvailabilityWindow>, DoctorError>;

    /// Every window of the doctor, ordered by weekday then start time.
    async fn list_windows(&self, doctor_id: Uuid) -> Result<Vec<AvailabilityWindow>, DoctorError>;

    async fn insert_window(&self, window: AvailabilityWindow) -> Result<AvailabilityWindow, DoctorError>;
}

impl From<SupabaseError> for DoctorError {
    fn from(err: SupabaseError) -> Self {
        DoctorError::Database(err.to_string())
    }
}

// ==============================================================================
// SUPABASE (POSTGREST) STORE
// ==============================================================================

pub struct SupabaseDoctorStore {
    supabase: SupabaseClient,
    api_key: String,
}

impl SupabaseDoctorStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            api_key: config.store_api_key().to_string(),
        }
    }

    async fn fetch_windows(&self, path: &str) -> Result<Vec<AvailabilityWindow>, DoctorError> {
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            path,
            Some(&self.api_key),
            None,
        ).await?;

        result
            .into_iter()
            .map(|row| serde_json::from_value(row)
                .map_err(|e| DoctorError::Database(format!("Failed to parse availability window: {}", e))))
            .collect()
    }
}

#[async_trait]
impl DoctorStore for SupabaseDoctorStore {
    async fn find_doctor(&self, doctor_id: Uuid) -> Result<Option<Doctor>, DoctorError> {
        debug!("Fetching doctor {}", doctor_id);

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(&self.api_key),
            None,
        ).await?;

        match result.into_iter().next() {
            Some(row) => serde_json::from_value(row)
                .map(Some)
                .map_err(|e| DoctorError::Database(format!("Failed to parse doctor: {}", e))),
            None => Ok(None),
        }
    }

    async fn list_active_windows(
        &self,
        doctor_id: Uuid,
        day_of_week: i32,
    ) -> Result<Vec<AvailabilityWindow>, DoctorError> {
        debug!("Fetching active windows for doctor {} on weekday {}", doctor_id, day_of_week);

        let path = format!(
            "/rest/v1/availability_windows?doctor_id=eq.{}&day_of_week=eq.{}&is_active=eq.true&order=start_time.asc",
            doctor_id, day_of_week
        );
        self.fetch_windows(&path).await
    }

    async fn list_windows(&self, doctor_id: Uuid) -> Result<Vec<AvailabilityWindow>, DoctorError> {
        let path = format!(
            "/rest/v1/availability_windows?doctor_id=eq.{}&order=day_of_week.asc,start_time.asc",
            doctor_id
        );
        self.fetch_windows(&path).await
    }

    async fn insert_window(&self, window: AvailabilityWindow) -> Result<AvailabilityWindow, DoctorError> {
        let body = json!({
            "id": window.id,
            "doctor_id": window.doctor_id,
            "day_of_week": window.day_of_week,
            "start_time": window.start_time.format("%H:%M:%S").to_string(),
            "end_time": window.end_time.format("%H:%M:%S").to_string(),
            "is_active": window.is_active,
        });

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/availability_windows",
            Some(&self.api_key),
            Some(body),
            Some(SupabaseClient::return_representation()),
        ).await?;

        let row = result
            .into_iter()
            .next()
            .ok_or_else(|| DoctorError::Database("Failed to create availability window".to_string()))?;

        serde_json::from_value(row)
            .map_err(|e| DoctorError::Database(format!("Failed to parse availability window: {}", e)))
    }
}

// ==============================================================================
// IN-MEMORY STORE
// ==============================================================================

#[derive(Default)]
pub struct InMemoryDoctorStore {
    doctors: RwLock<HashMap<Uuid, Doctor>>,
    windows: RwLock<HashMap<Uuid, AvailabilityWindow>>,
}

impl InMemoryDoctorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_doctor(&self, doctor: Doctor) {
        self.doctors.write().await.insert(doctor.id, doctor);
    }

    pub async fn set_doctor_active(&self, doctor_id: Uuid, is_active: bool) -> Result<(), DoctorError> {
        let mut doctors = self.doctors.write().await;
        let doctor = doctors.get_mut(&doctor_id).ok_or(DoctorError::NotFound)?;
        doctor.is_active = is_active;
        Ok(())
    }

    pub async fn set_window_active(&self, window_id: Uuid, is_active: bool) -> Result<(), DoctorError> {
        let mut windows = self.windows.write().await;
        let window = windows
            .get_mut(&window_id)
            .ok_or_else(|| DoctorError::Validation(format!("Unknown availability window {}", window_id)))?;
        window.is_active = is_active;
        Ok(())
    }
}

#[async_trait]
impl DoctorStore for InMemoryDoctorStore {
    async fn find_doctor(&self, doctor_id: Uuid) -> Result<Option<Doctor>, DoctorError> {
        Ok(self.doctors.read().await.get(&doctor_id).cloned())
    }

    async fn list_active_windows(
        &self,
        doctor_id: Uuid,
        day_of_week: i32,
    ) -> Result<Vec<AvailabilityWindow>, DoctorError> {
        let mut windows: Vec<AvailabilityWindow> = self.windows
            .read()
            .await
            .values()
            .filter(|w| w.doctor_id == doctor_id && w.day_of_week == day_of_week && w.is_active)
            .cloned()
            .collect();
        windows.sort_by_key(|w| w.start_time);
        Ok(windows)
    }

    async fn list_windows(&self, doctor_id: Uuid) -> Result<Vec<AvailabilityWindow>, DoctorError> {
        let mut windows: Vec<AvailabilityWindow> = self.windows
            .read()
            .await
            .values()
            .filter(|w| w.doctor_id == doctor_id)
            .cloned()
            .collect();
        windows.sort_by_key(|w| (w.day_of_week, w.start_time));
        Ok(windows)
    }

    async fn insert_window(&self, window: AvailabilityWindow) -> Result<AvailabilityWindow, DoctorError> {
        self.windows.write().await.insert(window.id, window.clone());
        Ok(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn window(doctor_id: Uuid, day: i32, start: u32, end: u32) -> AvailabilityWindow {
        AvailabilityWindow {
            id: Uuid::new_v4(),
            doctor_id,
            day_of_week: day,
            start_time: NaiveTime::from_hms_opt(start, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end, 0, 0).unwrap(),
            is_active: true,
        }
    }

    #[tokio::test]
    async fn in_memory_filters_inactive_and_other_days() {
        let store = InMemoryDoctorStore::new();
        let doctor_id = Uuid::new_v4();

        let afternoon = store.insert_window(window(doctor_id, 1, 14, 18)).await.unwrap();
        store.insert_window(window(doctor_id, 1, 9, 13)).await.unwrap();
        store.insert_window(window(doctor_id, 2, 9, 13)).await.unwrap();
        store.insert_window(window(Uuid::new_v4(), 1, 9, 13)).await.unwrap();

        let monday = store.list_active_windows(doctor_id, 1).await.unwrap();
        assert_eq!(monday.len(), 2);
        assert!(monday[0].start_time < monday[1].start_time);

        store.set_window_active(afternoon.id, false).await.unwrap();
        let monday = store.list_active_windows(doctor_id, 1).await.unwrap();
        assert_eq!(monday.len(), 1);

        assert_eq!(store.list_windows(doctor_id).await.unwrap().len(), 3);
    }

    #[test]
    fn unknown_doctor_is_none() {
        let store = InMemoryDoctorStore::new();
        let found = tokio_test::block_on(store.find_doctor(Uuid::new_v4())).unwrap();
        assert!(found.is_none());
    }
}
