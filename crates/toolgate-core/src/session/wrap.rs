//! Building the shell script sent to the sandbox for one command.
//!
//! Layout, one part per line so a heredoc in the caller's command still
//! terminates correctly:
//!
//! ```text
//! export CI=1 DEBIAN_FRONTEND=noninteractive ...
//! if [ -f '<env file>' ]; then . '<env file>'; fi
//! cd -- '<cwd>' && {            (only when a directory is forced)
//! <command>
//! }
//! __tg_ec=$?
//! printf '\n%s%s\n' '<sentinel>' "$(pwd)"
//! (exit $__tg_ec)
//! ```

use uuid::Uuid;

pub const SENTINEL_PREFIX: &str = "__TG_CWD_";
const SENTINEL_SUFFIX: &str = "__";
const EXIT_VAR: &str = "__tg_ec";

/// A fresh per-call sentinel.
pub fn new_sentinel() -> String {
    format!("{SENTINEL_PREFIX}{}{SENTINEL_SUFFIX}", Uuid::new_v4().simple())
}

/// First sentinel embedded in `text`, if any.
pub fn find_sentinel(text: &str) -> Option<&str> {
    let start = text.find(SENTINEL_PREFIX)?;
    let body_start = start + SENTINEL_PREFIX.len();
    let end = text[body_start..].find(SENTINEL_SUFFIX)? + body_start + SENTINEL_SUFFIX.len();
    Some(&text[start..end])
}

/// Quote `value` for POSIX sh using single quotes.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_plain_value(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | ','))
}

/// `KEY=VALUE` assignments for the export line. Entries without a valid
/// name are dropped.
fn export_assignments(env_prefix: &[String]) -> Vec<String> {
    env_prefix
        .iter()
        .filter_map(|entry| {
            let (name, value) = entry.split_once('=')?;
            if !is_env_name(name) {
                return None;
            }
            Some(if is_plain_value(value) {
                format!("{name}={value}")
            } else {
                format!("{name}={}", shell_quote(value))
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct WrapSpec<'a> {
    pub env_prefix: &'a [String],
    pub env_file: &'a str,
    /// Directory to force before running; `None` leaves the shell where it is.
    pub cwd: Option<&'a str>,
    pub sentinel: &'a str,
}

pub fn wrap_command(spec: &WrapSpec<'_>, command: &str) -> String {
    let mut script = String::new();

    let assignments = export_assignments(spec.env_prefix);
    if !assignments.is_empty() {
        script.push_str("export ");
        script.push_str(&assignments.join(" "));
        script.push('\n');
    }

    if !spec.env_file.is_empty() {
        let file = shell_quote(spec.env_file);
        script.push_str(&format!("if [ -f {file} ]; then . {file}; fi\n"));
    }

    match spec.cwd {
        Some(cwd) => {
            script.push_str(&format!("cd -- {} && {{\n", shell_quote(cwd)));
            script.push_str(command);
            script.push_str("\n}\n");
        }
        None => {
            script.push_str(command);
            script.push('\n');
        }
    }

    script.push_str(&format!("{EXIT_VAR}=$?\n"));
    script.push_str(&format!(
        "printf '\\n%s%s\\n' {} \"$(pwd)\"\n",
        shell_quote(spec.sentinel)
    ));
    script.push_str(&format!("(exit ${EXIT_VAR})\n"));
    script
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefix() -> Vec<String> {
        vec!["CI=1".into(), "TERM=dumb".into(), "GREETING=hello world".into(), "bad name=x".into()]
    }

    #[test]
    fn sentinel_is_unique_and_findable() {
        let a = new_sentinel();
        let b = new_sentinel();
        assert_ne!(a, b);
        let text = format!("noise {a} more");
        assert_eq!(find_sentinel(&text), Some(a.as_str()));
        assert_eq!(find_sentinel("nothing here"), None);
    }

    #[test]
    fn quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn forced_cwd_wraps_command_in_group() {
        let env = prefix();
        let script = wrap_command(
            &WrapSpec {
                env_prefix: &env,
                env_file: "/home/user/.env",
                cwd: Some("/work dir"),
                sentinel: "__TG_CWD_x__",
            },
            "cat <<EOF\nhi\nEOF",
        );
        let lines: Vec<&str> = script.lines().collect();
        assert_eq!(lines[0], "export CI=1 TERM=dumb GREETING='hello world'");
        assert_eq!(lines[1], "if [ -f '/home/user/.env' ]; then . '/home/user/.env'; fi");
        assert_eq!(lines[2], "cd -- '/work dir' && {");
        assert_eq!(&lines[3..6], ["cat <<EOF", "hi", "EOF"]);
        assert_eq!(lines[6], "}");
        assert_eq!(lines[7], "__tg_ec=$?");
        assert_eq!(lines[8], r#"printf '\n%s%s\n' '__TG_CWD_x__' "$(pwd)""#);
        assert_eq!(lines[9], "(exit $__tg_ec)");
    }

    #[test]
    fn session_mode_does_not_cd() {
        let script = wrap_command(
            &WrapSpec {
                env_prefix: &[],
                env_file: "",
                cwd: None,
                sentinel: "__TG_CWD_y__",
            },
            "ls",
        );
        assert!(!script.contains("cd --"));
        assert!(script.starts_with("ls\n__tg_ec=$?\n"));
    }
}
