use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_utils::extractor::caller_context;

use crate::models::CreateAvailabilityRequest;
use crate::router::DoctorState;
use crate::services::AvailabilityService;

#[axum::debug_handler]
pub async fn get_doctor_availability(
    State(state): State<DoctorState>,
    Path(doctor_id): Path<Uuid>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let availability_service = AvailabilityService::new(state.store.clone());

    let doctor = availability_service.get_doctor(doctor_id).await?;
    let windows = availability_service.weekly_schedule(&doctor).await?;

    Ok(Json(json!({
        "doctor_id": doctor.id,
        "doctor_name": doctor.full_name(),
        "is_active": doctor.is_active,
        "windows": windows,
        "total": windows.len()
    })))
}

#[axum::debug_handler]
pub async fn create_availability(
    State(state): State<DoctorState>,
    Path(doctor_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAvailabilityRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let caller = caller_context(&user)?;
    if caller.role != Role::Admin {
        warn!("User {} ({}) tried to edit availability of doctor {}", caller.user_id, caller.role, doctor_id);
        return Err(AppError::Forbidden("Only administrators can manage availability".to_string()));
    }

    let availability_service = AvailabilityService::new(state.store.clone());
    let window = availability_service.create_window(doctor_id, request).await?;

    Ok((StatusCode::CREATED, Json(json!(window))))
}
