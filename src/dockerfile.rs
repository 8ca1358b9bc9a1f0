//! Build-definition `ARG` defaults vs. the fixed in-container identity.
//!
//! The image bakes `USERNAME`/`USER_UID`/`USER_GID` defaults and the container is started
//! with `--user <uid>:<gid>`. If the two disagree, files written through the workspace bind
//! mount get the wrong owner. Builds always pass the identity explicitly; this check catches
//! a definition whose defaults drifted (e.g. someone building it by hand later).

use std::collections::BTreeMap;

use crate::config::{DevIdentity, BUILD_ARG_GID, BUILD_ARG_UID, BUILD_ARG_USER};

/// Collect `ARG NAME=default` declarations. Later declarations override earlier ones;
/// `ARG NAME` without a default is ignored. Line continuations are not supported.
pub fn arg_defaults(text: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        let Some(rest) = strip_keyword(line, "ARG") else {
            continue;
        };
        for decl in rest.split_whitespace() {
            if let Some((name, value)) = decl.split_once('=') {
                out.insert(name.to_string(), unquote(value).to_string());
            }
        }
    }
    out
}

fn strip_keyword<'a>(line: &'a str, kw: &str) -> Option<&'a str> {
    let head = line.get(..kw.len())?;
    let rest = &line[kw.len()..];
    if head.eq_ignore_ascii_case(kw) && rest.starts_with(char::is_whitespace) {
        Some(rest.trim_start())
    } else {
        None
    }
}

fn unquote(v: &str) -> &str {
    let b = v.as_bytes();
    if b.len() >= 2 && (b[0] == b'"' || b[0] == b'\'') && b[b.len() - 1] == b[0] {
        &v[1..v.len() - 1]
    } else {
        v
    }
}

/// Human-readable mismatches between declared defaults and the identity. Missing
/// declarations are fine (the build arguments supply them).
pub fn identity_mismatches(text: &str, identity: &DevIdentity) -> Vec<String> {
    let defaults = arg_defaults(text);
    let expected = [
        (BUILD_ARG_USER, identity.user.to_string()),
        (BUILD_ARG_UID, identity.uid.to_string()),
        (BUILD_ARG_GID, identity.gid.to_string()),
    ];
    expected
        .iter()
        .filter_map(|(name, want)| match defaults.get(*name) {
            Some(have) if have != want => Some(format!(
                "build definition declares {name}={have} but the container runs as {name}={want}"
            )),
            _ => None,
        })
        .collect()
}
