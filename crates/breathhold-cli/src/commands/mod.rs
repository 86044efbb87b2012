pub mod config;
pub mod history;
pub mod programs;
pub mod session;
pub mod stats;
