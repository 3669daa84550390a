mod doctor;
mod snapshot;

pub use doctor::run_doctor;
pub use snapshot::run_snapshot;
