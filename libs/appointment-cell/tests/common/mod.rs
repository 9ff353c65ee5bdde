// Shared fixtures for appointment-cell integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use uuid::Uuid;

use appointment_cell::models::{Appointment, AppointmentStatus, CreateAppointmentRequest, Patient, Report};
use appointment_cell::router::SchedulingState;
use appointment_cell::services::{AppointmentBookingService, EligibilityChecker, SlotEngine};
use appointment_cell::store::InMemoryAppointmentStore;
use doctor_cell::models::{AvailabilityWindow, Doctor};
use doctor_cell::store::{DoctorStore, InMemoryDoctorStore};
use shared_models::auth::{CallerContext, Role};
use shared_utils::clock::FixedClock;
use shared_utils::test_utils::TestConfig;

/// Monday 3 March 2025.
pub fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()
}

pub fn at(h: u32, m: u32) -> NaiveDateTime {
    monday().and_hms_opt(h, m, 0).unwrap()
}

pub fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

pub struct Clinic {
    pub doctors: Arc<InMemoryDoctorStore>,
    pub appointments: Arc<InMemoryAppointmentStore>,
    pub clock: FixedClock,
    pub doctor: Doctor,
    pub patient: Patient,
}

impl Clinic {
    /// One active doctor with a Monday 09:00-13:00 window, one patient, and a
    /// clock parked on the Saturday before.
    pub async fn new() -> Self {
        let doctors = Arc::new(InMemoryDoctorStore::new());
        let appointments = Arc::new(InMemoryAppointmentStore::new());
        let clock = FixedClock::new(
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap().and_hms_opt(8, 0, 0).unwrap(),
        );

        let doctor = Doctor {
            id: Uuid::new_v4(),
            first_name: "Marco".to_string(),
            last_name: "Rossi".to_string(),
            email: Some("marco.rossi@example.com".to_string()),
            specialization_id: None,
            is_active: true,
            created_at: Some(Utc::now()),
        };
        doctors.insert_doctor(doctor.clone()).await;

        let patient = Patient {
            id: Uuid::new_v4(),
            first_name: "Anna".to_string(),
            last_name: "Bianchi".to_string(),
            email: Some("anna.bianchi@example.com".to_string()),
        };
        appointments.insert_patient(patient.clone()).await;

        let clinic = Self { doctors, appointments, clock, doctor, patient };
        clinic.add_window(1, time(9, 0), time(13, 0)).await;
        clinic
    }

    pub async fn add_window(&self, day_of_week: i32, start: NaiveTime, end: NaiveTime) -> AvailabilityWindow {
        self.doctors
            .insert_window(AvailabilityWindow {
                id: Uuid::new_v4(),
                doctor_id: self.doctor.id,
                day_of_week,
                start_time: start,
                end_time: end,
                is_active: true,
            })
            .await
            .unwrap()
    }

    pub async fn add_patient(&self) -> Patient {
        let patient = Patient {
            id: Uuid::new_v4(),
            first_name: "Luca".to_string(),
            last_name: "Verdi".to_string(),
            email: None,
        };
        self.appointments.insert_patient(patient.clone()).await;
        patient
    }

    pub async fn add_report(&self, appointment: &Appointment) -> Report {
        let report = Report {
            id: Uuid::new_v4(),
            appointment_id: appointment.id,
            patient_id: appointment.patient_id,
            doctor_id: appointment.doctor_id,
            title: "Follow-up".to_string(),
            body: "Patient recovering well.".to_string(),
            diagnosis: Some("Seasonal allergy".to_string()),
            treatment: None,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.appointments.insert_report(report.clone()).await;
        report
    }

    pub fn state(&self) -> SchedulingState {
        SchedulingState::new(
            TestConfig::default().to_arc(),
            self.doctors.clone(),
            self.appointments.clone(),
            Arc::new(self.clock.clone()),
        )
    }

    pub fn booking(&self) -> AppointmentBookingService {
        self.state().booking_service()
    }

    pub fn slots(&self) -> SlotEngine {
        self.state().slot_engine()
    }

    pub fn checker(&self) -> EligibilityChecker {
        EligibilityChecker::new(self.doctors.clone(), self.appointments.clone(), Arc::new(self.clock.clone()))
    }

    pub fn receptionist(&self) -> CallerContext {
        CallerContext::new("front-desk", Role::Receptionist)
    }

    pub fn patient_caller(&self) -> CallerContext {
        CallerContext::new(self.patient.id.to_string(), Role::Patient).with_patient(self.patient.id)
    }

    pub fn request(&self, start: NaiveDateTime, duration_minutes: i32) -> CreateAppointmentRequest {
        CreateAppointmentRequest {
            patient_id: Some(self.patient.id),
            doctor_id: self.doctor.id,
            appointment_date: start,
            duration_minutes: Some(duration_minutes),
            notes: None,
            visit_reason: Some("Check-up".to_string()),
        }
    }

    pub async fn book(&self, start: NaiveDateTime, duration_minutes: i32) -> Appointment {
        let appointment = self.booking()
            .create_appointment(&self.receptionist(), self.request(start, duration_minutes))
            .await
            .unwrap();
        assert_eq!(appointment.status, AppointmentStatus::Scheduled);
        appointment
    }
}
