pub mod brain;
pub mod config;
pub mod driver;
pub mod evidence;
pub mod exit_codes;
pub mod logging;
pub mod providers;
pub mod runner;
pub mod scenarios;
pub mod storage;
pub mod types;

pub use config::Config;
pub use types::*;
