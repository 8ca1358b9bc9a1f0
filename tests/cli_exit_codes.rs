use std::process::Command;

fn devbox() -> Command {
    Command::new(env!("CARGO_BIN_EXE_devbox"))
}

#[test]
fn test_cli_help_exits_zero() {
    let out = devbox().arg("--help").output().expect("failed to run devbox --help");
    assert!(out.status.success(), "status: {:?}", out.status.code());
    let stdout = String::from_utf8_lossy(&out.stdout);
    for cmd in ["build", "save", "load", "run", "start", "stop", "clean", "status", "logs"] {
        assert!(stdout.contains(cmd), "help lacks {cmd}:\n{stdout}");
    }

    let out = devbox().arg("help").output().expect("failed to run devbox help");
    assert_eq!(out.status.code(), Some(0));
}

#[test]
fn test_cli_version_exits_zero() {
    let out = devbox().arg("--version").output().expect("failed to run devbox --version");
    assert_eq!(out.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&out.stdout).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_unknown_command_exits_one() {
    let out = devbox().arg("frobnicate").output().expect("failed to run devbox");
    assert_eq!(
        out.status.code(),
        Some(1),
        "stderr:\n{}",
        String::from_utf8_lossy(&out.stderr)
    );
}

#[test]
fn test_cli_missing_docker_is_labeled() {
    let tmp = tempfile::tempdir().unwrap();
    let out = devbox()
        .arg("--project-dir")
        .arg(tmp.path())
        .arg("status")
        .env("DEVBOX_TEST_DISABLE_DOCKER", "1")
        .env("HOME", tmp.path())
        .env("NO_COLOR", "1")
        .output()
        .expect("failed to run devbox status");
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(
        stderr.contains("devbox: error: PrerequisiteMissing:"),
        "stderr:\n{stderr}"
    );
    assert!(stderr.contains("devbox: hint:"), "stderr:\n{stderr}");
}

fn rootless_socket_present() -> bool {
    let uid = nix::unistd::getuid().as_raw();
    gpu_devbox::mode::user_socket_path(uid).exists()
}

fn stderr_without_docker(args: &[&str]) -> String {
    let tmp = tempfile::tempdir().unwrap();
    let out = devbox()
        .arg("--project-dir")
        .arg(tmp.path())
        .args(args)
        .env("DEVBOX_TEST_DISABLE_DOCKER", "1")
        .env_remove("DOCKER_HOST")
        .env_remove("DEVBOX_CONFIG")
        .env("HOME", tmp.path())
        .env("NO_COLOR", "1")
        .output()
        .expect("failed to run devbox");
    assert_eq!(out.status.code(), Some(1), "{args:?}");
    String::from_utf8_lossy(&out.stderr).into_owned()
}

#[test]
fn test_cli_privileged_banner_on_mutating_commands() {
    if rootless_socket_present() {
        eprintln!("skipping: rootless docker socket present on this host");
        return;
    }
    for args in [&["stop"][..], &["start"], &["run"], &["clean"]] {
        let stderr = stderr_without_docker(args);
        assert!(stderr.contains("SECURITY WARNING"), "{args:?} stderr:\n{stderr}");
        assert!(stderr.contains("devbox-rootless install"), "{args:?} stderr:\n{stderr}");
    }
}

#[test]
fn test_cli_status_has_no_banner() {
    if rootless_socket_present() {
        eprintln!("skipping: rootless docker socket present on this host");
        return;
    }
    let stderr = stderr_without_docker(&["status"]);
    assert!(!stderr.contains("SECURITY WARNING"), "stderr:\n{stderr}");
    assert!(stderr.contains("devbox: error: PrerequisiteMissing:"), "stderr:\n{stderr}");
}

#[test]
fn test_cli_bad_config_is_labeled() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("devbox.yml"), "no-such-key: 1\n").unwrap();
    let out = devbox()
        .arg("--project-dir")
        .arg(tmp.path())
        .arg("status")
        .env_remove("DEVBOX_CONFIG")
        .env("HOME", tmp.path())
        .env("NO_COLOR", "1")
        .output()
        .expect("failed to run devbox status");
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("devbox: error: Config:"));
}

#[test]
fn test_rootless_cli_help_exits_zero() {
    let out = Command::new(env!("CARGO_BIN_EXE_devbox-rootless"))
        .arg("--help")
        .output()
        .expect("failed to run devbox-rootless --help");
    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&out.stdout);
    for cmd in ["install", "status", "start", "stop", "restart", "uninstall"] {
        assert!(stdout.contains(cmd), "help lacks {cmd}:\n{stdout}");
    }
}

#[test]
fn test_rootless_cli_unknown_command_exits_one() {
    let out = Command::new(env!("CARGO_BIN_EXE_devbox-rootless"))
        .arg("reinstall")
        .output()
        .expect("failed to run devbox-rootless");
    assert_eq!(out.status.code(), Some(1));
}
