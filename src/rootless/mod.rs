//! Rootless Docker configuration for the invoking user.

pub mod rcblock;
pub mod setup;
pub mod unit;

pub use setup::{InstallReport, RootlessSetup, ServiceVerb, SetupStatus, UserEnv};
