pub mod analyze;
pub mod config;
pub mod info;
pub mod run;

mod progress;
