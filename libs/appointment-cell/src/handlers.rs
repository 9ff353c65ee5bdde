// libs/appointment-cell/src/handlers.rs
use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use shared_models::auth::{CallerContext, Role, User};
use shared_models::error::AppError;
use shared_utils::extractor::caller_context;

use crate::models::{
    Appointment, AppointmentError, AppointmentFilter, AppointmentListQuery, AvailabilityQuery,
    CreateAppointmentRequest, UpdateAppointmentRequest,
};
use crate::router::SchedulingState;
use crate::services::AppointmentLifecycleService;

// ==============================================================================
// ACCESS RULES
// ==============================================================================

/// Patients and doctors only reach appointments they take part in.
fn ensure_participant(caller: &CallerContext, appointment: &Appointment) -> Result<(), AppError> {
    let allowed = match caller.role {
        Role::Admin | Role::Receptionist => true,
        Role::Patient => caller.patient_id == Some(appointment.patient_id),
        Role::Doctor => caller.doctor_id == Some(appointment.doctor_id),
    };

    if !allowed {
        warn!("User {} ({}) denied access to appointment {}", caller.user_id, caller.role, appointment.id);
        return Err(AppError::Forbidden("You do not have access to this appointment".to_string()));
    }
    Ok(())
}

fn ensure_role(caller: &CallerContext, roles: &[Role], action: &str) -> Result<(), AppError> {
    if !caller.has_role(roles) {
        warn!("User {} ({}) may not {} appointments", caller.user_id, caller.role, action);
        return Err(AppError::Forbidden(format!("Your role cannot {} appointments", action)));
    }
    Ok(())
}

/// Listing scope for a caller: patients and doctors are pinned to their own id.
fn scoped_filter(caller: &CallerContext, query: AppointmentListQuery) -> Result<AppointmentFilter, AppError> {
    let mut filter = AppointmentFilter {
        patient_id: query.patient_id,
        doctor_id: query.doctor_id,
        status: query.status,
        from: query.from,
        to: query.to,
    };

    match caller.role {
        Role::Admin | Role::Receptionist => {}
        Role::Patient => {
            let patient_id = caller.patient_id
                .ok_or_else(|| AppError::Forbidden("Caller has no patient record".to_string()))?;
            filter.patient_id = Some(patient_id);
            filter.doctor_id = None;
        }
        Role::Doctor => {
            let doctor_id = caller.doctor_id
                .ok_or_else(|| AppError::Forbidden("Caller has no doctor record".to_string()))?;
            filter.doctor_id = Some(doctor_id);
            filter.patient_id = None;
        }
    }

    Ok(filter)
}

// ==============================================================================
// HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<SchedulingState>,
    Query(query): Query<AvailabilityQuery>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let slots = state
        .slot_engine()
        .compute_available_slots(query.doctor_id, query.date)
        .await?;

    Ok(Json(json!(slots)))
}

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<SchedulingState>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let caller = caller_context(&user)?;

    let appointment = state
        .booking_service()
        .create_appointment(&caller, request)
        .await?;

    Ok((StatusCode::CREATED, Json(json!(appointment))))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<SchedulingState>,
    Query(query): Query<AppointmentListQuery>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_context(&user)?;
    let filter = scoped_filter(&caller, query)?;

    let appointments = state.booking_service().list_appointments(&filter).await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn my_appointments(
    State(state): State<SchedulingState>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_context(&user)?;

    let filter = match (caller.role, caller.patient_id, caller.doctor_id) {
        (Role::Patient, Some(patient_id), _) => AppointmentFilter::for_patient(patient_id),
        (Role::Doctor, _, Some(doctor_id)) => AppointmentFilter::for_doctor(doctor_id),
        _ => {
            return Err(AppError::BadRequest(
                "Only patients and doctors have personal appointments".to_string(),
            ))
        }
    };

    let appointments = state.booking_service().list_appointments(&filter).await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<SchedulingState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_context(&user)?;

    let details = state.booking_service().get_appointment_details(appointment_id).await?;
    ensure_participant(&caller, &details.appointment)?;

    Ok(Json(json!(details)))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<SchedulingState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_context(&user)?;
    let booking_service = state.booking_service();

    let current = booking_service.get_appointment(appointment_id).await?;
    ensure_participant(&caller, &current)?;

    if caller.role == Role::Patient && !AppointmentLifecycleService::new().patient_may_edit(current.status) {
        return Err(AppointmentError::InvalidState { from: current.status, action: "edit" }.into());
    }

    let appointment = booking_service.reschedule_appointment(appointment_id, request).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn confirm_appointment(
    State(state): State<SchedulingState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_context(&user)?;
    ensure_role(&caller, &[Role::Admin, Role::Receptionist, Role::Doctor], "confirm")?;

    let booking_service = state.booking_service();
    let current = booking_service.get_appointment(appointment_id).await?;
    ensure_participant(&caller, &current)?;

    let appointment = booking_service.confirm_appointment(appointment_id).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Appointment confirmed",
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<SchedulingState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_context(&user)?;
    ensure_role(&caller, &[Role::Admin, Role::Doctor], "complete")?;

    let booking_service = state.booking_service();
    let current = booking_service.get_appointment(appointment_id).await?;
    ensure_participant(&caller, &current)?;

    let appointment = booking_service.complete_appointment(appointment_id).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Appointment completed",
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<SchedulingState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<StatusCode, AppError> {
    let caller = caller_context(&user)?;
    let booking_service = state.booking_service();

    let current = booking_service.get_appointment(appointment_id).await?;
    ensure_participant(&caller, &current)?;

    booking_service.cancel_appointment(appointment_id).await?;

    Ok(StatusCode::NO_CONTENT)
}
