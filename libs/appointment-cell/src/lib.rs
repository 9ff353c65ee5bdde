pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod store;

pub use models::*;
pub use router::{appointment_routes, availability_routes, SchedulingState};
pub use services::{AppointmentBookingService, AppointmentLifecycleService, EligibilityChecker, SlotEngine};
pub use store::{AppointmentStore, InMemoryAppointmentStore, StoreError, SupabaseAppointmentStore};
