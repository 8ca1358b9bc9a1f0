use std::io;

/// Builder for small generated text files (systemd units, shell rc blocks).
///
/// Invariants:
/// - Each pushed line must not contain `\n`, `\r`, or `\0`.
/// - `build()` joins lines with `\n` and ensures a trailing `\n` when non-empty.
#[derive(Debug, Default)]
pub struct TextLines {
    lines: Vec<String>,
}

impl TextLines {
    pub fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Push one logical line (no embedded CR/LF/NUL).
    pub fn push(&mut self, line: impl Into<String>) -> &mut Self {
        self.lines.push(line.into());
        self
    }

    /// Push a `Key=Value` line (ini/unit-file style).
    pub fn push_kv(&mut self, key: &str, value: impl AsRef<str>) -> &mut Self {
        self.lines.push(format!("{key}={}", value.as_ref()));
        self
    }

    pub fn blank(&mut self) -> &mut Self {
        self.lines.push(String::new());
        self
    }

    pub fn build(&self) -> io::Result<String> {
        for (i, l) in self.lines.iter().enumerate() {
            if l.contains('\n') || l.contains('\r') || l.contains('\0') {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("text line {i} contains a newline or NUL; use atomic lines"),
                ));
            }
        }

        if self.lines.is_empty() {
            return Ok(String::new());
        }

        let mut out = self.lines.join("\n");
        out.push('\n');
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_builds_empty() {
        assert_eq!(TextLines::new().build().unwrap(), "");
    }

    #[test]
    fn sections_and_pairs_render_in_order() {
        let mut tl = TextLines::new();
        tl.push("[Service]").push_kv("Type", "notify").blank().push("# end");
        assert_eq!(tl.build().unwrap(), "[Service]\nType=notify\n\n# end\n");
    }

    #[test]
    fn rejects_embedded_newline() {
        let mut tl = TextLines::new();
        tl.push("ok").push_kv("ExecStart", "a\nb");
        assert!(tl.build().is_err());
    }

    #[test]
    fn rejects_nul() {
        let mut tl = TextLines::new();
        tl.push("bad\0line");
        assert!(tl.build().is_err());
    }
}
