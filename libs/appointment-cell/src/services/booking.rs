// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use doctor_cell::store::DoctorStore;
use shared_models::auth::CallerContext;
use shared_utils::clock::Clock;

use crate::models::{
    Appointment, AppointmentDetails, AppointmentError, AppointmentFilter, AppointmentStatus,
    CreateAppointmentRequest, Eligibility, UpdateAppointmentRequest, DEFAULT_DURATION_MINUTES,
};
use crate::services::conflict::EligibilityChecker;
use crate::services::lifecycle::{action_name, AppointmentLifecycleService};
use crate::store::{AppointmentStore, StoreError};

/// Check-then-write runs at most this many times when the store reports a
/// concurrent conflicting write.
const MAX_PLACEMENT_ATTEMPTS: u32 = 2;

/// Updates of an existing row re-read and retry at most this many times when
/// its status moved underneath them.
const MAX_WRITE_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Copy)]
enum Write {
    Insert,
    /// Only applies while the stored status is still `expected`.
    Update { expected: AppointmentStatus },
}

pub struct AppointmentBookingService {
    doctors: Arc<dyn DoctorStore>,
    appointments: Arc<dyn AppointmentStore>,
    checker: EligibilityChecker,
    lifecycle: AppointmentLifecycleService,
}

impl AppointmentBookingService {
    pub fn new(
        doctors: Arc<dyn DoctorStore>,
        appointments: Arc<dyn AppointmentStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let checker = EligibilityChecker::new(doctors.clone(), appointments.clone(), clock);
        Self {
            doctors,
            appointments,
            checker,
            lifecycle: AppointmentLifecycleService::new(),
        }
    }

    /// Book a new appointment in `Scheduled` state.
    #[instrument(skip(self, caller, request), fields(doctor_id = %request.doctor_id, start = %request.appointment_date))]
    pub async fn create_appointment(
        &self,
        caller: &CallerContext,
        request: CreateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let patient_id = request
            .patient_id
            .or(caller.patient_id)
            .ok_or_else(|| AppointmentError::Validation("patient_id is required".to_string()))?;

        if !caller.may_act_for_patient(patient_id) {
            warn!("Patient {} tried to book for patient {}", caller.user_id, patient_id);
            return Err(AppointmentError::Forbidden(
                "Patients can only book appointments for themselves".to_string(),
            ));
        }

        let duration_minutes = request.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES);
        validate_duration(duration_minutes)?;

        if self.appointments.find_patient(patient_id).await?.is_none() {
            return Err(AppointmentError::NotFound("Patient"));
        }

        let doctor = self.doctors
            .find_doctor(request.doctor_id)
            .await?
            .ok_or(AppointmentError::NotFound("Doctor"))?;
        if !doctor.is_active {
            return Err(AppointmentError::InactiveDoctor);
        }

        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id: doctor.id,
            appointment_date: request.appointment_date,
            duration_minutes,
            status: AppointmentStatus::Scheduled,
            notes: request.notes,
            visit_reason: request.visit_reason,
            created_at: Utc::now(),
            updated_at: None,
        };

        let saved = self.place(appointment, Write::Insert)
            .await?
            .ok_or_else(|| AppointmentError::Database("insert reported a status change".to_string()))?;
        info!("Appointment {} booked for patient {} with doctor {}", saved.id, patient_id, saved.doctor_id);

        Ok(saved)
    }

    /// Move and/or annotate an appointment. Placement is re-checked only when
    /// the start or the duration changes. The edit is applied on top of the
    /// stored status, so a concurrent transition is never undone.
    pub async fn reschedule_appointment(
        &self,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let mut current = self.get_appointment(appointment_id).await?;

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            self.lifecycle.validate_reschedule(current.status)?;

            let updated = apply_update(&current, &request)?;
            let moved = updated.appointment_date != current.appointment_date
                || updated.duration_minutes != current.duration_minutes;
            let expected = current.status;

            let saved = if moved {
                self.place(updated, Write::Update { expected }).await?
            } else {
                debug!("Appointment {} keeps its slot, skipping placement check", appointment_id);
                guarded(self.appointments.update_appointment(updated, expected).await)?
            };

            if let Some(saved) = saved {
                info!("Appointment {} updated (moved: {})", appointment_id, moved);
                return Ok(saved);
            }

            warn!("Appointment {} changed status during update, attempt {}/{}", appointment_id, attempt, MAX_WRITE_ATTEMPTS);
            current = self.get_appointment(appointment_id).await?;
        }

        Err(AppointmentError::InvalidState { from: current.status, action: "reschedule" })
    }

    pub async fn confirm_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.transition(appointment_id, AppointmentStatus::Confirmed).await
    }

    pub async fn complete_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.transition(appointment_id, AppointmentStatus::Completed).await
    }

    pub async fn cancel_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.transition(appointment_id, AppointmentStatus::Cancelled).await
    }

    pub async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.appointments
            .find_appointment(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound("Appointment"))
    }

    pub async fn get_appointment_details(
        &self,
        appointment_id: Uuid,
    ) -> Result<AppointmentDetails, AppointmentError> {
        let appointment = self.get_appointment(appointment_id).await?;
        let report = self.appointments.find_report_for_appointment(appointment_id).await?;

        Ok(AppointmentDetails { appointment, report })
    }

    pub async fn list_appointments(
        &self,
        filter: &AppointmentFilter,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Listing appointments with {:?}", filter);
        Ok(self.appointments.list_appointments(filter).await?)
    }

    /// The write is conditional on the status the rule was checked against.
    /// If another transition landed first, the rule is re-checked against the
    /// fresh status.
    async fn transition(
        &self,
        appointment_id: Uuid,
        target: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError> {
        let mut current = self.get_appointment(appointment_id).await?;

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let from = current.status;
            self.lifecycle.validate_status_transition(from, target)?;

            let written = self.appointments
                .update_status(appointment_id, from, target, Utc::now())
                .await;

            if let Some(saved) = guarded(written)? {
                info!("Appointment {} status changed: {} -> {}", appointment_id, from, target);
                return Ok(saved);
            }

            warn!("Appointment {} left {} before it could {}, attempt {}/{}",
                appointment_id, from, action_name(target), attempt, MAX_WRITE_ATTEMPTS);
            current = self.get_appointment(appointment_id).await?;
        }

        Err(AppointmentError::InvalidState { from: current.status, action: action_name(target) })
    }

    /// Eligibility check plus write as one unit. A store-level conflict means a
    /// concurrent booking won the race; the unit is re-run once so the loser
    /// gets an accurate reason. `None` means an update found the row's status
    /// moved and nothing was written.
    #[instrument(skip(self, appointment), fields(appointment_id = %appointment.id, doctor_id = %appointment.doctor_id))]
    async fn place(&self, appointment: Appointment, write: Write) -> Result<Option<Appointment>, AppointmentError> {
        let exclude = match write {
            Write::Insert => None,
            Write::Update { .. } => Some(appointment.id),
        };

        for attempt in 1..=MAX_PLACEMENT_ATTEMPTS {
            let eligibility = self.checker.check(
                appointment.doctor_id,
                appointment.appointment_date,
                appointment.duration_minutes,
                exclude,
            ).await?;
            reject_ineligible(eligibility)?;

            let written = match write {
                Write::Insert => self.appointments.insert_appointment(appointment.clone()).await,
                Write::Update { expected } => {
                    self.appointments.update_appointment(appointment.clone(), expected).await
                }
            };

            match written {
                Ok(saved) => return Ok(Some(saved)),
                Err(StoreError::StatusChanged(_)) => return Ok(None),
                Err(StoreError::Conflict(reason)) if attempt < MAX_PLACEMENT_ATTEMPTS => {
                    warn!("Placement conflict on attempt {}/{}: {}", attempt, MAX_PLACEMENT_ATTEMPTS, reason);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppointmentError::SlotUnavailable(
            "slot was taken by a concurrent booking".to_string(),
        ))
    }
}

/// Fold a lost status race into `None`.
fn guarded(written: Result<Appointment, StoreError>) -> Result<Option<Appointment>, AppointmentError> {
    match written {
        Ok(saved) => Ok(Some(saved)),
        Err(StoreError::StatusChanged(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn apply_update(
    current: &Appointment,
    request: &UpdateAppointmentRequest,
) -> Result<Appointment, AppointmentError> {
    let mut updated = current.clone();
    if let Some(start) = request.appointment_date {
        updated.appointment_date = start;
    }
    if let Some(duration) = request.duration_minutes {
        validate_duration(duration)?;
        updated.duration_minutes = duration;
    }
    if request.notes.is_some() {
        updated.notes = request.notes.clone();
    }
    if request.visit_reason.is_some() {
        updated.visit_reason = request.visit_reason.clone();
    }
    updated.updated_at = Some(Utc::now());
    Ok(updated)
}

fn validate_duration(duration_minutes: i32) -> Result<(), AppointmentError> {
    if duration_minutes <= 0 {
        return Err(AppointmentError::Validation(
            "duration_minutes must be positive".to_string(),
        ));
    }
    Ok(())
}

fn reject_ineligible(eligibility: Eligibility) -> Result<(), AppointmentError> {
    match eligibility {
        Eligibility::Eligible => Ok(()),
        Eligibility::DoctorNotFound => Err(AppointmentError::NotFound("Doctor")),
        Eligibility::DoctorInactive => Err(AppointmentError::InactiveDoctor),
        Eligibility::Past | Eligibility::OutsideAvailability | Eligibility::Overlap => {
            Err(AppointmentError::SlotUnavailable(eligibility.to_string()))
        }
    }
}
