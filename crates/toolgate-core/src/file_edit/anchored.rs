//! Anchor-checked line edits.
//!
//! Every edit names a line and the short hash the agent saw for it. The
//! whole batch is checked against the current file before anything is
//! applied; edits always refer to the original numbering.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Deserializer};

use super::lines::{split_content, LineBuffer};
use crate::anchor::{line_hash, Anchor};
use crate::result::LineMismatch;

/// Replace (or, with `newContent: null`, delete) one line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AnchorEdit {
    pub line: usize,
    pub hash: String,
    /// Must be present; `null` deletes the line.
    #[serde(deserialize_with = "nullable")]
    pub new_content: Option<String>,
}

fn nullable<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)
}

/// Structural checks that need no file content. Hashes must be exactly
/// `hash_len` hex characters.
pub fn validate(edits: &[AnchorEdit], hash_len: usize) -> Result<(), String> {
    if edits.is_empty() {
        return Err("edits must not be empty".to_string());
    }
    let mut seen = BTreeSet::new();
    for (i, edit) in edits.iter().enumerate() {
        if edit.line == 0 {
            return Err(format!("edit {}: line numbers are 1-based", i + 1));
        }
        if edit.hash.is_empty() || !edit.hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("edit {}: hash '{}' is not a hex anchor", i + 1, edit.hash));
        }
        if edit.hash.len() != hash_len {
            return Err(format!(
                "edit {}: hash '{}' has {} characters, anchors have {hash_len}; re-read the file",
                i + 1,
                edit.hash,
                edit.hash.len()
            ));
        }
        if !seen.insert(edit.line) {
            return Err(format!(
                "edit {}: line {} is targeted more than once; combine the changes into one edit",
                i + 1,
                edit.line
            ));
        }
    }
    Ok(())
}

/// Every edit whose anchor no longer matches, in line order.
pub fn stale_anchors(buffer: &LineBuffer, edits: &[AnchorEdit], hash_len: usize) -> Vec<LineMismatch> {
    let mut stale: Vec<LineMismatch> = edits
        .iter()
        .filter_map(|edit| {
            let anchor = Anchor {
                line: edit.line,
                hash: edit.hash.to_ascii_lowercase(),
            };
            match buffer.line(edit.line) {
                Some(text) if anchor.matches(text, hash_len) => None,
                Some(text) => Some(LineMismatch {
                    line: edit.line,
                    expected: anchor.hash,
                    current: Some(line_hash(text, hash_len)),
                }),
                None => Some(LineMismatch {
                    line: edit.line,
                    expected: anchor.hash,
                    current: None,
                }),
            }
        })
        .collect();
    stale.sort_by_key(|m| m.line);
    stale
}

/// Result of applying a checked batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub buffer: LineBuffer,
    /// 1-based inclusive range of the new file covering every change.
    pub region: Option<(usize, usize)>,
    pub deleted: usize,
}

/// Apply `edits` to `buffer`. Anchors must already have been checked.
pub fn apply(buffer: &LineBuffer, edits: &[AnchorEdit]) -> Applied {
    let by_line: BTreeMap<usize, &AnchorEdit> = edits.iter().map(|e| (e.line, e)).collect();
    let mut lines = Vec::with_capacity(buffer.len());
    let mut lo = usize::MAX;
    let mut hi = 0;
    let mut deleted = 0;

    for (i, text) in buffer.lines.iter().enumerate() {
        let Some(edit) = by_line.get(&(i + 1)) else {
            lines.push(text.clone());
            continue;
        };
        let start = lines.len();
        match &edit.new_content {
            Some(content) => lines.extend(split_content(content)),
            None => deleted += 1,
        }
        lo = lo.min(start);
        // A deletion marks the line that moved into its place.
        hi = hi.max(lines.len().max(start + 1));
    }

    let hi = hi.min(lines.len());
    let region = if lines.is_empty() || lo == usize::MAX {
        None
    } else {
        let lo = lo.min(hi.saturating_sub(1));
        Some((lo + 1, hi))
    };

    Applied {
        buffer: LineBuffer {
            lines,
            ending: buffer.ending,
            trailing_newline: buffer.trailing_newline,
        },
        region,
        deleted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEN: usize = 6;

    fn edit(buffer: &LineBuffer, line: usize, new_content: Option<&str>) -> AnchorEdit {
        AnchorEdit {
            line,
            hash: line_hash(buffer.line(line).unwrap_or_default(), LEN),
            new_content: new_content.map(str::to_string),
        }
    }

    #[test]
    fn edits_apply_against_original_numbering() {
        let buf = LineBuffer::parse("a\nb\nc\nd\n");
        let edits = [
            edit(&buf, 1, Some("A1\nA2")),
            edit(&buf, 3, None),
            edit(&buf, 4, Some("D")),
        ];
        assert!(stale_anchors(&buf, &edits, LEN).is_empty());
        let applied = apply(&buf, &edits);
        assert_eq!(applied.buffer.render(), "A1\nA2\nb\nD\n");
        assert_eq!(applied.region, Some((1, 4)));
        assert_eq!(applied.deleted, 1);
    }

    #[test]
    fn stale_and_missing_lines_are_reported() {
        let buf = LineBuffer::parse("one\ntwo\n");
        let edits = [
            AnchorEdit {
                line: 2,
                hash: "000000".into(),
                new_content: Some("x".into()),
            },
            AnchorEdit {
                line: 9,
                hash: "abcdef".into(),
                new_content: None,
            },
        ];
        let stale = stale_anchors(&buf, &edits, LEN);
        assert_eq!(stale.len(), 2);
        assert_eq!(stale[0].current.as_deref(), Some(line_hash("two", LEN).as_str()));
        assert_eq!(stale[1].current, None);
    }

    #[test]
    fn uppercase_hash_is_accepted() {
        let buf = LineBuffer::parse("hello\n");
        let mut e = edit(&buf, 1, Some("bye"));
        e.hash = e.hash.to_ascii_uppercase();
        assert!(stale_anchors(&buf, &[e], LEN).is_empty());
    }

    #[test]
    fn duplicate_targets_are_rejected() {
        let buf = LineBuffer::parse("x\n");
        let err = validate(&[edit(&buf, 1, Some("y")), edit(&buf, 1, Some("z"))], LEN).unwrap_err();
        assert!(err.contains("more than once"));
        assert!(validate(&[], LEN).is_err());
    }

    #[test]
    fn hash_of_the_wrong_length_is_rejected() {
        let buf = LineBuffer::parse("alpha\n");
        let mut short = edit(&buf, 1, Some("ALPHA"));
        short.hash.truncate(1);
        let err = validate(std::slice::from_ref(&short), LEN).unwrap_err();
        assert!(err.contains("has 1 characters"));

        let mut long = edit(&buf, 1, Some("ALPHA"));
        long.hash = line_hash("alpha", LEN + 2);
        assert!(validate(&[long], LEN).is_err());
        assert!(validate(&[edit(&buf, 1, Some("ALPHA"))], LEN).is_ok());
    }

    #[test]
    fn prefix_of_an_old_hash_never_matches_a_changed_line() {
        let buf = LineBuffer::parse("changed 3\n");
        let mut e = edit(&LineBuffer::parse("alpha\n"), 1, Some("ALPHA"));
        e.hash.truncate(1);
        let stale = stale_anchors(&buf, &[e], LEN);
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].current.as_deref(), Some(line_hash("changed 3", LEN).as_str()));
    }

    #[test]
    fn deleting_the_last_line_points_at_the_new_last_line() {
        let buf = LineBuffer::parse("a\nb\n");
        let applied = apply(&buf, &[edit(&buf, 2, None)]);
        assert_eq!(applied.buffer.render(), "a\n");
        assert_eq!(applied.region, Some((1, 1)));
    }

    #[test]
    fn missing_new_content_is_a_parse_error() {
        let parsed: Result<AnchorEdit, _> =
            serde_json::from_value(serde_json::json!({"line": 1, "hash": "abc"}));
        assert!(parsed.is_err());
        let deletion: AnchorEdit =
            serde_json::from_value(serde_json::json!({"line": 1, "hash": "abc", "newContent": null}))
                .unwrap();
        assert_eq!(deletion.new_content, None);
    }
}
