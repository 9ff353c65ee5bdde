pub mod availability;

pub use availability::{weekday_index, AvailabilityService};
