pub mod enrollments;
pub mod jobs;
pub mod settings;
pub mod skylearn;
pub mod telemetry;
