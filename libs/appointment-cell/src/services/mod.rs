pub mod booking;
pub mod conflict;
pub mod lifecycle;
pub mod slots;

pub use booking::AppointmentBookingService;
pub use conflict::EligibilityChecker;
pub use lifecycle::AppointmentLifecycleService;
pub use slots::SlotEngine;
