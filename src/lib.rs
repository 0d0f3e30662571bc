pub mod backup;
pub mod config;
pub mod db;
pub mod error;
pub mod history;
pub mod integrity;
pub mod ipc;
pub mod logging;
pub mod reset;
pub mod roster;
pub mod students;
pub mod timeline;
pub mod weeks;
