pub mod external;
pub mod log;
pub mod record;
pub mod syncer;
