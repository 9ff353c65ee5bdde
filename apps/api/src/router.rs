use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::{appointment_routes, availability_routes, SchedulingState};
use appointment_cell::store::AppointmentStore;
use doctor_cell::router::{doctor_routes, DoctorState};
use doctor_cell::store::DoctorStore;
use shared_config::AppConfig;
use shared_utils::clock::Clock;

pub fn create_router(
    config: Arc<AppConfig>,
    doctors: Arc<dyn DoctorStore>,
    appointments: Arc<dyn AppointmentStore>,
    clock: Arc<dyn Clock>,
) -> Router {
    let scheduling = SchedulingState::new(config.clone(), doctors.clone(), appointments, clock);
    let doctor_state = DoctorState::new(config, doctors);

    Router::new()
        .route("/", get(|| async { "Clinic scheduling API is running!" }))
        .nest("/appointments", appointment_routes(scheduling.clone()))
        .nest("/availability", availability_routes(scheduling))
        .nest("/doctors", doctor_routes(doctor_state))
}
