#![allow(clippy::module_name_repetitions)]
//! Small utilities: command execution, shell quoting for previews, text builders.

pub mod exec;
pub mod text_lines;

pub use exec::{CommandRunner, ExecOutput, ExecRequest, ExecService};
pub use text_lines::TextLines;

/// Join argv into one shell-quoted line. Used only for printing; commands are never run through a shell.
pub fn shell_join(args: &[String]) -> String {
    args.iter()
        .map(|a| shell_escape(a))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn shell_escape(s: &str) -> String {
    if s.is_empty() {
        "''".to_string()
    } else if s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_=./:@".contains(c))
    {
        s.to_string()
    } else {
        let escaped = s.replace('\'', "'\"'\"'");
        format!("'{}'", escaped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_leaves_plain_words() {
        assert_eq!(shell_escape("--shm-size=16g"), "--shm-size=16g");
        assert_eq!(shell_escape("unix:///run/user/1000/docker.sock"), "unix:///run/user/1000/docker.sock");
    }

    #[test]
    fn escape_quotes_spaces_and_quotes() {
        assert_eq!(shell_escape(""), "''");
        assert_eq!(shell_escape("a b"), "'a b'");
        assert_eq!(shell_escape("it's"), "'it'\"'\"'s'");
    }

    #[test]
    fn join_quotes_each_word() {
        let argv = vec!["docker".to_string(), "run".to_string(), "-e".to_string(), "A=b c".to_string()];
        assert_eq!(shell_join(&argv), "docker run -e 'A=b c'");
    }
}
