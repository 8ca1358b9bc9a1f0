//! systemd user unit for the rootless daemon.

use std::io;
use std::path::{Path, PathBuf};

use crate::util::TextLines;

pub const UNIT_NAME: &str = "docker.service";

/// `~/.config/systemd/user/docker.service`
pub fn unit_path(home: &Path) -> PathBuf {
    home.join(".config")
        .join("systemd")
        .join("user")
        .join(UNIT_NAME)
}

/// Render the unit for `dockerd-rootless.sh` located at `dockerd_rootless`.
pub fn render_unit(dockerd_rootless: &Path) -> io::Result<String> {
    let bin_dir = dockerd_rootless
        .parent()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "/usr/bin".to_string());
    let mut t = TextLines::new();
    t.push("[Unit]")
        .push_kv("Description", "Docker Application Container Engine (Rootless)")
        .push_kv("Documentation", "https://docs.docker.com/go/rootless/")
        .blank()
        .push("[Service]")
        .push_kv(
            "Environment",
            format!("PATH={bin_dir}:/sbin:/usr/sbin:/usr/local/bin:/usr/bin:/bin"),
        )
        .push_kv("ExecStart", dockerd_rootless.display().to_string())
        .push_kv("ExecReload", "/bin/kill -s HUP $MAINPID")
        .push_kv("TimeoutSec", "0")
        .push_kv("RestartSec", "2")
        .push_kv("Restart", "always")
        .push_kv("StartLimitBurst", "3")
        .push_kv("StartLimitInterval", "60s")
        .push_kv("LimitNOFILE", "infinity")
        .push_kv("LimitNPROC", "infinity")
        .push_kv("LimitCORE", "infinity")
        .push_kv("TasksMax", "infinity")
        .push_kv("Delegate", "yes")
        .push_kv("Type", "notify")
        .push_kv("NotifyAccess", "all")
        .push_kv("KillMode", "mixed")
        .blank()
        .push("[Install]")
        .push_kv("WantedBy", "default.target");
    t.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_lives_in_user_dir() {
        assert_eq!(
            unit_path(Path::new("/home/u")),
            PathBuf::from("/home/u/.config/systemd/user/docker.service")
        );
    }

    #[test]
    fn unit_points_at_rootless_script() {
        let u = render_unit(Path::new("/usr/local/bin/dockerd-rootless.sh")).unwrap();
        assert!(u.contains("\nExecStart=/usr/local/bin/dockerd-rootless.sh\n"));
        assert!(u.contains("Environment=PATH=/usr/local/bin:/sbin:/usr/sbin:"));
        assert!(u.contains("\n[Install]\nWantedBy=default.target\n"));
    }
}
