pub mod sync_enrollments;
