// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, patch, post},
    middleware,
};

use doctor_cell::store::DoctorStore;
use shared_config::AppConfig;
use shared_utils::clock::Clock;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::{AppointmentBookingService, SlotEngine};
use crate::store::AppointmentStore;

#[derive(Clone)]
pub struct SchedulingState {
    pub config: Arc<AppConfig>,
    pub doctors: Arc<dyn DoctorStore>,
    pub appointments: Arc<dyn AppointmentStore>,
    pub clock: Arc<dyn Clock>,
}

impl SchedulingState {
    pub fn new(
        config: Arc<AppConfig>,
        doctors: Arc<dyn DoctorStore>,
        appointments: Arc<dyn AppointmentStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { config, doctors, appointments, clock }
    }

    pub fn booking_service(&self) -> AppointmentBookingService {
        AppointmentBookingService::new(self.doctors.clone(), self.appointments.clone(), self.clock.clone())
    }

    pub fn slot_engine(&self) -> SlotEngine {
        SlotEngine::new(self.doctors.clone(), self.appointments.clone(), self.clock.clone())
    }
}

pub fn appointment_routes(state: SchedulingState) -> Router {
    Router::new()
        .route("/", post(handlers::create_appointment).get(handlers::list_appointments))
        .route("/mine", get(handlers::my_appointments))
        .route(
            "/{appointment_id}",
            get(handlers::get_appointment)
                .put(handlers::update_appointment)
                .delete(handlers::cancel_appointment),
        )
        .route("/{appointment_id}/confirm", patch(handlers::confirm_appointment))
        .route("/{appointment_id}/complete", patch(handlers::complete_appointment))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}

pub fn availability_routes(state: SchedulingState) -> Router {
    Router::new()
        .route("/", get(handlers::get_available_slots))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}
