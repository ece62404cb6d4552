pub mod cli;
pub mod config;
pub mod error;
pub mod jre;
pub mod jvm;
pub mod launch;

pub use error::LaunchError;
