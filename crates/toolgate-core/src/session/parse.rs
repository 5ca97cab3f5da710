//! Recovering the post-command working directory from stdout.

/// Visible output plus the directory the trailer reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOutput {
    pub body: String,
    /// Only set for absolute paths.
    pub cwd: Option<String>,
    pub sentinel_found: bool,
}

/// Split `stdout` at the last `sentinel`.
///
/// The last occurrence wins, so a command that echoes the sentinel cannot
/// spoof the directory. Everything from that occurrence on is dropped, as
/// is the newline the trailer printed before it.
pub fn split_sentinel(stdout: &str, sentinel: &str) -> ParsedOutput {
    let Some(idx) = stdout.rfind(sentinel) else {
        return ParsedOutput {
            body: stdout.to_string(),
            cwd: None,
            sentinel_found: false,
        };
    };

    let after = &stdout[idx + sentinel.len()..];
    let line = after.split('\n').next().unwrap_or_default().trim_end_matches('\r');
    let cwd = line.starts_with('/').then(|| line.to_string());

    let before = &stdout[..idx];
    let body = before.strip_suffix('\n').unwrap_or(before);

    ParsedOutput {
        body: body.to_string(),
        cwd,
        sentinel_found: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const S: &str = "__TG_CWD_abc__";

    #[test]
    fn extracts_cwd_and_strips_trailer() {
        let stdout = format!("hello\nworld\n\n{S}/home/user/project\n");
        let parsed = split_sentinel(&stdout, S);
        assert_eq!(parsed.body, "hello\nworld\n");
        assert_eq!(parsed.cwd.as_deref(), Some("/home/user/project"));
        assert!(parsed.sentinel_found);
    }

    #[test]
    fn last_sentinel_wins() {
        let stdout = format!("{S}/first\nmore output\n\n{S}/second\n");
        let parsed = split_sentinel(&stdout, S);
        assert_eq!(parsed.cwd.as_deref(), Some("/second"));
        assert!(parsed.body.ends_with("more output\n"));
    }

    #[test]
    fn relative_or_empty_cwd_is_rejected() {
        assert_eq!(split_sentinel(&format!("\n{S}relative/dir\n"), S).cwd, None);
        assert_eq!(split_sentinel(&format!("\n{S}\n"), S).cwd, None);
    }

    #[test]
    fn missing_sentinel_keeps_everything() {
        let parsed = split_sentinel("partial output", S);
        assert_eq!(parsed.body, "partial output");
        assert!(!parsed.sentinel_found);
        assert_eq!(parsed.cwd, None);
    }

    #[test]
    fn empty_command_output() {
        let parsed = split_sentinel(&format!("\n{S}/tmp\n"), S);
        assert_eq!(parsed.body, "");
        assert_eq!(parsed.cwd.as_deref(), Some("/tmp"));
    }
}
