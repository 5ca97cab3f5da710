//! Remote skill discovery over a line protocol.
//!
//! The scan script prints, for every `SKILL.md` it finds:
//!
//! ```text
//! @@TG-SKILL-BEGIN /abs/path/SKILL.md
//! @@TG-SKILL-LINE <line>
//! @@TG-SKILL-END
//! ```
//!
//! and finally `@@TG-SCAN-DONE`. Tokens only count at the start of a line,
//! so a shell that echoes the script back never produces a match.

use serde::Serialize;

use crate::session::wrap::shell_quote;

pub const BEGIN: &str = "@@TG-SKILL-BEGIN";
pub const LINE: &str = "@@TG-SKILL-LINE";
pub const END: &str = "@@TG-SKILL-END";
pub const DONE: &str = "@@TG-SCAN-DONE";

/// Skill roots scanned in addition to `<cwd>/.skills`.
pub const DEFAULT_SKILL_ROOTS: [&str; 1] = ["/home/user/.toolgate/skills"];

/// Bytes of each skill file the script prints.
pub const MAX_SKILL_BYTES: usize = 16 * 1024;

const MAX_PATH_LEN: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredSkill {
    pub path: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip)]
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub skills: Vec<DiscoveredSkill>,
    /// False when the output ended before `@@TG-SCAN-DONE`.
    pub complete: bool,
    pub problems: Vec<String>,
}

/// A well-formed absolute path: no `..` segments, no control characters.
pub fn is_valid_skill_path(path: &str) -> bool {
    !path.is_empty()
        && path.len() <= MAX_PATH_LEN
        && path.starts_with('/')
        && !path.chars().any(char::is_control)
        && !path.split('/').any(|segment| segment == "..")
}

/// Shell script that scans `roots` and prints the protocol.
pub fn build_scan_script(roots: &[String]) -> String {
    let mut script = String::new();
    for root in roots {
        script.push_str(&format!(
            "for f in {}/*/SKILL.md; do\n\
             [ -f \"$f\" ] || continue\n\
             printf '{BEGIN} %s\\n' \"$f\"\n\
             head -c {MAX_SKILL_BYTES} \"$f\" | sed 's/^/{LINE} /'\n\
             printf '\\n{END}\\n'\n\
             done\n",
            shell_quote(root.trim_end_matches('/'))
        ));
    }
    script.push_str(&format!("printf '{DONE}\\n'\n"));
    script
}

enum State {
    Idle,
    InSkill { path: String, lines: Vec<String> },
    /// Inside a block whose path was rejected.
    Skipping,
}

fn token_payload<'a>(line: &'a str, token: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(token)?;
    if rest.is_empty() {
        Some("")
    } else {
        rest.strip_prefix(' ')
    }
}

/// Parse scan output. Lines that do not start with a token are ignored.
pub fn parse_scan_output(output: &str) -> ScanReport {
    let mut report = ScanReport::default();
    let mut state = State::Idle;

    for raw in output.split('\n') {
        let line = raw.strip_suffix('\r').unwrap_or(raw);

        if token_payload(line, DONE).is_some() {
            if let State::InSkill { path, .. } = &state {
                report.problems.push(format!("{path}: block not terminated"));
            }
            report.complete = true;
            break;
        }

        if let Some(path) = token_payload(line, BEGIN) {
            if let State::InSkill { path: open, .. } = &state {
                report.problems.push(format!("{open}: block not terminated"));
            }
            state = if is_valid_skill_path(path) {
                State::InSkill {
                    path: path.to_string(),
                    lines: Vec::new(),
                }
            } else {
                report.problems.push(format!("rejected skill path {path:?}"));
                State::Skipping
            };
            continue;
        }

        if token_payload(line, END).is_some() {
            if let State::InSkill { path, lines } = std::mem::replace(&mut state, State::Idle) {
                report.skills.push(finish_skill(path, lines));
            }
            continue;
        }

        if let Some(text) = token_payload(line, LINE) {
            if let State::InSkill { lines, .. } = &mut state {
                lines.push(text.to_string());
            }
        }
    }

    report
}

fn finish_skill(path: String, mut lines: Vec<String>) -> DiscoveredSkill {
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    let content = lines.join("\n");
    let (name, description) = frontmatter(&lines);
    let name = name.unwrap_or_else(|| {
        path.rsplit('/')
            .nth(1)
            .filter(|s| !s.is_empty())
            .unwrap_or("skill")
            .to_string()
    });
    DiscoveredSkill {
        path,
        name,
        description,
        content,
    }
}

/// `name` and `description` from a leading `---` block.
fn frontmatter(lines: &[String]) -> (Option<String>, Option<String>) {
    let mut name = None;
    let mut description = None;
    if lines.first().map(|l| l.trim()) != Some("---") {
        return (name, description);
    }
    for line in &lines[1..] {
        if line.trim() == "---" {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            if value.is_empty() {
                continue;
            }
            match key.trim() {
                "name" => name = Some(value.to_string()),
                "description" => description = Some(value.to_string()),
                _ => {}
            }
        }
    }
    (name, description)
}
