//! Error taxonomy for lifecycle and setup operations.
//!
//! Mapping guide:
//! - Runtime plumbing (spawn, timeout, non-zero exit) stays `anyhow::Error` inside
//!   `util::exec` and `runtime::docker`; lifecycle operations fold it into a `DevboxError`
//!   variant carrying the rendered message.
//! - Every variant maps to exit code 1; `PrerequisiteMissing` is not special-cased.
//! - User-facing text is `<label>: <detail>`; `hint()` adds an optional second line.
use std::fmt;

#[derive(Debug)]
pub enum DevboxError {
    /// Build definition file not found at the configured path.
    DefinitionMissing(String),
    /// Image `name:tag` is not present in the runtime's image store.
    ImageNotBuilt(String),
    /// Archive file not found at the deterministic path.
    ArchiveMissing(String),
    /// Neither the image nor an archive to load it from exists.
    NoImageAvailable(String),
    BuildFailed(String),
    SaveFailed(String),
    LoadFailed(String),
    StartFailed(String),
    StopFailed(String),
    /// Container runtime, privilege wrapper, driver or setup tool not installed.
    PrerequisiteMissing(String),
    ContainerAbsent(String),
    LogsFailed(String),
    ServiceFailed(String),
    Config(String),
}

impl DevboxError {
    pub fn label(&self) -> &'static str {
        match self {
            DevboxError::DefinitionMissing(_) => "DefinitionMissing",
            DevboxError::ImageNotBuilt(_) => "ImageNotBuilt",
            DevboxError::ArchiveMissing(_) => "ArchiveMissing",
            DevboxError::NoImageAvailable(_) => "NoImageAvailable",
            DevboxError::BuildFailed(_) => "BuildFailed",
            DevboxError::SaveFailed(_) => "SaveFailed",
            DevboxError::LoadFailed(_) => "LoadFailed",
            DevboxError::StartFailed(_) => "StartFailed",
            DevboxError::StopFailed(_) => "StopFailed",
            DevboxError::PrerequisiteMissing(_) => "PrerequisiteMissing",
            DevboxError::ContainerAbsent(_) => "ContainerAbsent",
            DevboxError::LogsFailed(_) => "LogsFailed",
            DevboxError::ServiceFailed(_) => "ServiceFailed",
            DevboxError::Config(_) => "Config",
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            DevboxError::DefinitionMissing(s)
            | DevboxError::ImageNotBuilt(s)
            | DevboxError::ArchiveMissing(s)
            | DevboxError::NoImageAvailable(s)
            | DevboxError::BuildFailed(s)
            | DevboxError::SaveFailed(s)
            | DevboxError::LoadFailed(s)
            | DevboxError::StartFailed(s)
            | DevboxError::StopFailed(s)
            | DevboxError::PrerequisiteMissing(s)
            | DevboxError::ContainerAbsent(s)
            | DevboxError::LogsFailed(s)
            | DevboxError::ServiceFailed(s)
            | DevboxError::Config(s) => s,
        }
    }

    /// Follow-up suggestion printed under the error line, when one applies.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            DevboxError::ImageNotBuilt(_) => Some("build the image first: devbox build"),
            DevboxError::ArchiveMissing(_) => {
                Some("no saved archive yet; run `devbox build` and accept the save prompt, or `devbox save`")
            }
            DevboxError::NoImageAvailable(_) => Some("run `devbox build` (or `devbox load` with an archive)"),
            DevboxError::ContainerAbsent(_) => Some("start the container first: devbox start"),
            DevboxError::PrerequisiteMissing(_) => {
                Some("install the missing tool and make sure it is on PATH")
            }
            _ => None,
        }
    }

    pub fn exit_code(&self) -> u8 {
        1
    }
}

impl fmt::Display for DevboxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label(), self.detail())
    }
}

impl std::error::Error for DevboxError {}

impl From<serde_yaml::Error> for DevboxError {
    fn from(e: serde_yaml::Error) -> Self {
        DevboxError::Config(e.to_string())
    }
}

/// Render a runtime error chain on one line (`outer: inner: root`).
pub fn one_line(e: &anyhow::Error) -> String {
    format!("{e:#}")
}
