pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod store;

pub use models::{AvailabilityWindow, CreateAvailabilityRequest, Doctor, DoctorError};
pub use router::{doctor_routes, DoctorState};
pub use services::{weekday_index, AvailabilityService};
pub use store::{DoctorStore, InMemoryDoctorStore, SupabaseDoctorStore};
