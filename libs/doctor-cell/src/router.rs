use std::sync::Arc;

use axum::{
    Router,
    routing::get,
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::store::DoctorStore;

#[derive(Clone)]
pub struct DoctorState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn DoctorStore>,
}

impl DoctorState {
    pub fn new(config: Arc<AppConfig>, store: Arc<dyn DoctorStore>) -> Self {
        Self { config, store }
    }
}

pub fn doctor_routes(state: DoctorState) -> Router {
    Router::new()
        .route(
            "/{doctor_id}/availability",
            get(handlers::get_doctor_availability).post(handlers::create_availability),
        )
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}
