//! String-substitution edits for plain mode.

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PlainEdit {
    pub old_string: String,
    pub new_string: String,
    #[serde(default)]
    pub replace_all: bool,
}

pub fn validate(edits: &[PlainEdit]) -> Result<(), String> {
    if edits.is_empty() {
        return Err("edits must not be empty".to_string());
    }
    for (i, edit) in edits.iter().enumerate() {
        if edit.old_string.is_empty() {
            return Err(format!("edit {}: oldString must not be empty", i + 1));
        }
        if edit.old_string == edit.new_string {
            return Err(format!("edit {}: oldString and newString are identical", i + 1));
        }
    }
    Ok(())
}

/// Apply `edits` in order; each sees the result of the previous one.
/// Returns the new content and the number of replacements made.
pub fn apply(content: &str, edits: &[PlainEdit]) -> Result<(String, usize), String> {
    let mut current = content.to_string();
    let mut replacements = 0;
    for (i, edit) in edits.iter().enumerate() {
        let count = current.matches(edit.old_string.as_str()).count();
        match count {
            0 => return Err(format!("edit {}: oldString not found", i + 1)),
            1 => {}
            n if !edit.replace_all => {
                return Err(format!(
                    "edit {}: oldString matches {n} times; include more context or set replaceAll",
                    i + 1
                ))
            }
            _ => {}
        }
        current = current.replace(edit.old_string.as_str(), &edit.new_string);
        replacements += count;
    }
    Ok((current, replacements))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edit(old: &str, new: &str, all: bool) -> PlainEdit {
        PlainEdit {
            old_string: old.into(),
            new_string: new.into(),
            replace_all: all,
        }
    }

    #[test]
    fn sequential_edits_see_previous_results() {
        let (out, n) = apply("let x = 1;", &[edit("x", "y", false), edit("y = 1", "y = 2", false)]).unwrap();
        assert_eq!(out, "let y = 2;");
        assert_eq!(n, 2);
    }

    #[test]
    fn ambiguous_without_replace_all() {
        let err = apply("a a a", &[edit("a", "b", false)]).unwrap_err();
        assert!(err.contains("3 times"));
        let (out, n) = apply("a a a", &[edit("a", "b", true)]).unwrap();
        assert_eq!(out, "b b b");
        assert_eq!(n, 3);
    }

    #[test]
    fn not_found() {
        assert!(apply("abc", &[edit("zzz", "y", false)]).unwrap_err().contains("not found"));
    }

    #[test]
    fn validation() {
        assert!(validate(&[]).is_err());
        assert!(validate(&[edit("", "x", false)]).is_err());
        assert!(validate(&[edit("x", "x", false)]).is_err());
        assert!(validate(&[edit("x", "y", false)]).is_ok());
    }
}
