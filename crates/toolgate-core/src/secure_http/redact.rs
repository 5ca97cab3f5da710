//! Scrubbing secret material from text headed back to the agent.

use super::placement::query_encode;

pub const REDACTED: &str = "[REDACTED_SECRET]";

/// Replaces every known encoding of one secret.
#[derive(Clone)]
pub struct Redactor {
    needles: Vec<String>,
}

impl std::fmt::Debug for Redactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Redactor")
            .field("forms", &self.needles.len())
            .finish()
    }
}

impl Redactor {
    pub fn new(secret: &str) -> Self {
        let mut needles = Vec::new();
        if !secret.is_empty() {
            let form = query_encode(secret);
            let percent = form.replace('+', "%20");
            needles = vec![secret.to_string(), form, percent];
            needles.sort_by_key(|n| std::cmp::Reverse(n.len()));
            needles.dedup();
        }
        Self { needles }
    }

    pub fn redact(&self, text: &str) -> String {
        let mut out = text.to_string();
        for needle in &self.needles {
            if out.contains(needle.as_str()) {
                out = out.replace(needle.as_str(), REDACTED);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_raw_and_encoded_forms() {
        let r = Redactor::new("s3cr3t value/+");
        let text = "raw=s3cr3t value/+ form=s3cr3t+value%2F%2B pct=s3cr3t%20value%2F%2B";
        let out = r.redact(text);
        assert!(!out.contains("s3cr3t"));
        assert_eq!(out.matches(REDACTED).count(), 3);
    }

    #[test]
    fn empty_secret_changes_nothing() {
        assert_eq!(Redactor::new("").redact("hello"), "hello");
    }
}
