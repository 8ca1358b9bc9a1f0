//! Host-side manager for a single GPU-enabled development container.
//!
//! - `mode` decides once per process whether Docker is reached rootless or through sudo.
//! - `lifecycle` reconciles the image, its archive and the container against the
//!   `runtime::ContainerRuntime` seam.
//! - `rootless` configures a per-user rootless daemon.

pub mod color;
pub mod config;
pub mod dockerfile;
pub mod errors;
pub mod lifecycle;
pub mod mode;
pub mod rootless;
pub mod runtime;
pub mod telemetry;
pub mod ui;
pub mod util;

pub use color::{
    color_enabled_stderr, log_error_stderr, log_info_stderr, log_warn_stderr, paint,
    set_color_mode, ColorMode,
};
pub use config::{DevIdentity, Settings, DEV_IDENTITY};
pub use errors::{one_line, DevboxError};
pub use lifecycle::{CleanOptions, CleanReport, Lifecycle, LifecycleStatus, StartOutcome, StopOutcome};
pub use mode::{resolve, ExecutionContext, ExecutionMode, HostSnapshot};
pub use runtime::{ContainerRuntime, ContainerState, DockerCli};
pub use telemetry::telemetry_init;
pub use ui::{Confirm, ScriptedConfirm, TerminalConfirm};
