pub mod admissions;
pub mod attendance;
pub mod core;
pub mod finance;
pub mod notices;
pub mod results;
pub mod students;
pub mod users;
