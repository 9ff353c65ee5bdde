// libs/appointment-cell/src/services/slots.rs
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use tracing::debug;
use uuid::Uuid;

use doctor_cell::models::AvailabilityWindow;
use doctor_cell::services::weekday_index;
use doctor_cell::store::DoctorStore;
use shared_utils::clock::Clock;

use crate::models::{Appointment, AppointmentError, Slot, SlotReason};
use crate::store::AppointmentStore;

pub const SLOT_STEP_MINUTES: i64 = 30;

/// Derives the bookable grid for one doctor on one day.
pub struct SlotEngine {
    doctors: Arc<dyn DoctorStore>,
    appointments: Arc<dyn AppointmentStore>,
    clock: Arc<dyn Clock>,
}

impl SlotEngine {
    pub fn new(
        doctors: Arc<dyn DoctorStore>,
        appointments: Arc<dyn AppointmentStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { doctors, appointments, clock }
    }

    /// Missing or inactive doctors, and days without windows, yield an empty list.
    pub async fn compute_available_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Slot>, AppointmentError> {
        match self.doctors.find_doctor(doctor_id).await? {
            Some(doctor) if doctor.is_active => {}
            _ => {
                debug!("Doctor {} missing or inactive, no slots on {}", doctor_id, date);
                return Ok(Vec::new());
            }
        }

        let windows = self.doctors.list_active_windows(doctor_id, weekday_index(date)).await?;
        if windows.is_empty() {
            return Ok(Vec::new());
        }

        let appointments = self.appointments
            .list_for_doctor_on_date(doctor_id, date, true)
            .await?;

        let slots = build_slots(date, &windows, &appointments, self.clock.now());
        debug!("Computed {} slots for doctor {} on {}", slots.len(), doctor_id, date);

        Ok(slots)
    }
}

/// Walks every window in fixed steps and labels each instant.
/// Overlapping windows produce duplicate instants; the result is sorted stably.
pub fn build_slots(
    date: NaiveDate,
    windows: &[AvailabilityWindow],
    appointments: &[Appointment],
    now: NaiveDateTime,
) -> Vec<Slot> {
    let step = Duration::minutes(SLOT_STEP_MINUTES);
    let mut slots = Vec::new();

    for window in windows {
        let mut current = date.and_time(window.start_time);
        let end = date.and_time(window.end_time);

        while current < end {
            slots.push(label_slot(current, appointments, now));
            current += step;
        }
    }

    slots.sort_by_key(|slot| slot.start);
    slots
}

fn label_slot(instant: NaiveDateTime, appointments: &[Appointment], now: NaiveDateTime) -> Slot {
    let occupied = appointments
        .iter()
        .any(|a| a.is_blocking() && a.occupies(instant));

    if occupied {
        Slot::blocked(instant, SlotReason::Occupied)
    } else if instant < now {
        Slot::blocked(instant, SlotReason::Past)
    } else {
        Slot::free(instant)
    }
}
