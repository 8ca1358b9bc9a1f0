//! The managed container's `docker run` shape.

use crate::config::Settings;
use crate::runtime::{ContainerSpec, Mount};

pub const DEFAULT_DISPLAY: &str = ":0";
const X11_SOCKET_DIR: &str = "/tmp/.X11-unix";

/// `DISPLAY` to pass into the container, falling back to the local display.
pub fn display_or_default(display: Option<String>) -> String {
    display
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| DEFAULT_DISPLAY.to_string())
}

pub fn container_spec(settings: &Settings, display: &str) -> ContainerSpec {
    let id = settings.identity;
    let workdir = settings.workspace_mount();

    let mut mounts = vec![
        Mount::Bind {
            host: settings.workspace.clone(),
            target: workdir.clone(),
        },
        Mount::Bind {
            host: X11_SOCKET_DIR.into(),
            target: X11_SOCKET_DIR.to_string(),
        },
    ];
    mounts.extend(
        settings
            .cache_volumes()
            .into_iter()
            .map(|(name, target)| Mount::Volume { name, target }),
    );

    ContainerSpec {
        name: settings.container_name.clone(),
        image: settings.image_ref(),
        user: id.user_spec(),
        gpus: "all".to_string(),
        network: "host".to_string(),
        restart: "always".to_string(),
        shm_size: settings.shm_size.clone(),
        security_opts: vec!["seccomp=unconfined".to_string()],
        env: vec![
            ("DISPLAY".to_string(), display.to_string()),
            ("NVIDIA_DRIVER_CAPABILITIES".to_string(), "all".to_string()),
            ("HOME".to_string(), id.home()),
            ("USER".to_string(), id.user.to_string()),
        ],
        mounts,
        workdir,
        command: vec!["sleep".to_string(), "infinity".to_string()],
    }
}
