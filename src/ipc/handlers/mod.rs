pub mod admin;
pub mod backup;
pub mod core;
pub mod history;
pub mod sessions;
pub mod students;
pub mod weeks;
