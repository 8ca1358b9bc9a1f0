//! Terminal interaction: warnings, the privileged-mode banner, confirmations.

pub mod prompt;
pub mod warn;

pub use prompt::{Confirm, ScriptedConfirm, TerminalConfirm};
pub use warn::{render_security_banner, security_banner_lines, warn_print};
