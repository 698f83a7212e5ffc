pub mod attendance;
pub mod backup;
pub mod core;
pub mod departments;
pub mod groups;
pub mod institutions;
pub mod print;
pub mod profile;
pub mod reports;
pub mod setup;
pub mod students;
