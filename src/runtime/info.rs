/*!
Parsers for `docker ... --format '{{json ...}}'` output.

- `parse_container_state`: the `.State` object of `docker container inspect`.
  `running`, `restarting` and `paused` count as Running (the container occupies the name
  and cannot be recreated in place); `created`, `exited` and `dead` count as Stopped.
- `parse_security_options`: the `.SecurityOptions` array of `docker info`, e.g.
  `["name=seccomp,profile=builtin","name=rootless","name=cgroupns"]`.
*/

use anyhow::{Context, Result};
use serde::Deserialize;

use super::ContainerState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StateJson {
    #[serde(default)]
    status: String,
    #[serde(default)]
    running: bool,
    #[serde(default)]
    restarting: bool,
    #[serde(default)]
    paused: bool,
}

pub fn parse_container_state(raw: &str) -> Result<ContainerState> {
    let st: StateJson = serde_json::from_str(raw.trim())
        .with_context(|| format!("unexpected container state output: {}", raw.trim()))?;
    if st.running || st.restarting || st.paused {
        return Ok(ContainerState::Running);
    }
    match st.status.as_str() {
        "running" | "restarting" | "paused" => Ok(ContainerState::Running),
        _ => Ok(ContainerState::Stopped),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonSecurity {
    pub items: Vec<String>,
    pub rootless: bool,
    pub seccomp_profile: String,
    pub cgroupns_mode: String,
}

pub fn parse_security_options(raw: &str) -> Result<DaemonSecurity> {
    let items: Vec<String> = serde_json::from_str(raw.trim())
        .with_context(|| format!("unexpected security options output: {}", raw.trim()))?;

    let field = |name: &str, key: &str| -> String {
        items
            .iter()
            .filter(|s| s.split(',').any(|p| p == format!("name={name}")))
            .flat_map(|s| s.split(','))
            .find_map(|p| p.strip_prefix(key).map(str::to_string))
            .unwrap_or_else(|| "(unknown)".to_string())
    };

    Ok(DaemonSecurity {
        rootless: items
            .iter()
            .any(|s| s.to_ascii_lowercase().contains("rootless")),
        seccomp_profile: field("seccomp", "profile="),
        cgroupns_mode: field("cgroupns", "mode="),
        items,
    })
}
