//! Idempotent marker block in the user's shell startup file.
//!
//! The export is written with `$(id -u)` unexpanded so every new shell computes its own
//! socket path at startup; nothing machine-specific is frozen into the rc file.

use std::io;
use std::path::{Path, PathBuf};

use crate::util::TextLines;

pub const BEGIN_MARKER: &str = "# >>> gpu-devbox rootless docker >>>";
pub const END_MARKER: &str = "# <<< gpu-devbox rootless docker <<<";

pub fn render_block() -> io::Result<String> {
    let mut t = TextLines::new();
    t.push(BEGIN_MARKER)
        .push("# managed by devbox-rootless; remove with: devbox-rootless uninstall")
        .push("export DOCKER_HOST=unix:///run/user/$(id -u)/docker.sock")
        .push(END_MARKER);
    t.build()
}

pub fn contains_block(text: &str) -> bool {
    text.lines().any(|l| l.trim_end() == BEGIN_MARKER)
}

/// Append the block unless present. Returns `None` when nothing changes.
pub fn insert_block(text: &str) -> io::Result<Option<String>> {
    if contains_block(text) {
        return Ok(None);
    }
    let mut out = text.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str(&render_block()?);
    Ok(Some(out))
}

/// Drop every line from the begin marker through the end marker (inclusive), plus one
/// blank line directly before the block. Returns `None` when no block exists. An
/// unterminated block is removed to the end of the file.
pub fn remove_block(text: &str) -> Option<String> {
    if !contains_block(text) {
        return None;
    }
    let mut kept: Vec<&str> = Vec::new();
    let mut inside = false;
    for line in text.lines() {
        let l = line.trim_end();
        if !inside && l == BEGIN_MARKER {
            inside = true;
            if kept.last().is_some_and(|p| p.trim().is_empty()) {
                kept.pop();
            }
            continue;
        }
        if inside {
            if l == END_MARKER {
                inside = false;
            }
            continue;
        }
        kept.push(line);
    }
    let mut out = kept.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    Some(out)
}

/// `~/.zshrc` for zsh users, `~/.bashrc` otherwise.
pub fn rc_file_for(shell: Option<&str>, home: &Path) -> PathBuf {
    let is_zsh = shell
        .and_then(|s| Path::new(s).file_name())
        .and_then(|n| n.to_str())
        .is_some_and(|n| n == "zsh");
    if is_zsh {
        home.join(".zshrc")
    } else {
        home.join(".bashrc")
    }
}
