//! Hashline anchors: short content hashes that pin an edit to the exact line
//! text the agent last saw.
//!
//! An anchor is `(line_number, short_hash)` where `short_hash` is the first
//! `len` lowercase hex characters of SHA-256 over the line text without its
//! terminator. Anchors are recomputed on every read and never stored.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Short hash of a single line's text.
pub fn line_hash(text: &str, len: usize) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(len.min(64));
    hex
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Anchor {
    /// 1-based.
    pub line: usize,
    pub hash: String,
}

impl Anchor {
    pub fn for_line(line: usize, text: &str, len: usize) -> Self {
        Self {
            line,
            hash: line_hash(text, len),
        }
    }

    /// Whether `text` still hashes to this anchor at the full `len`.
    /// A shorter or longer token never matches.
    pub fn matches(&self, text: &str, len: usize) -> bool {
        self.hash.len() == len && line_hash(text, len) == self.hash
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.hash)
    }
}

impl FromStr for Anchor {
    type Err = String;

    /// Parses `"12:a1b2c3"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (line, hash) = s
            .split_once(':')
            .ok_or_else(|| format!("anchor '{s}' must look like <line>:<hash>"))?;
        let line: usize = line
            .trim()
            .parse()
            .map_err(|_| format!("anchor '{s}' has a non-numeric line"))?;
        if line == 0 {
            return Err(format!("anchor '{s}' has line 0; lines are 1-based"));
        }
        let hash = hash.trim().to_ascii_lowercase();
        if hash.is_empty() || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("anchor '{s}' has an invalid hash"));
        }
        Ok(Self { line, hash })
    }
}

/// Render lines as `N:hash|text`, numbering from `first_line`.
pub fn render_anchored<'a, I>(lines: I, first_line: usize, hash_len: usize) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = String::new();
    for (i, text) in lines.into_iter().enumerate() {
        let anchor = Anchor::for_line(first_line + i, text, hash_len);
        out.push_str(&format!("{anchor}|{text}\n"));
    }
    out
}

/// Render lines as `N: text`, numbering from `first_line`.
pub fn render_plain<'a, I>(lines: I, first_line: usize) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = String::new();
    for (i, text) in lines.into_iter().enumerate() {
        out.push_str(&format!("{}: {text}\n", first_line + i));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_lowercase_hex_prefix() {
        let h = line_hash("fn main() {}", 6);
        assert_eq!(h.len(), 6);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(h, line_hash("fn main() {}", 6));
        assert_ne!(h, line_hash("fn main() { }", 6));
    }

    #[test]
    fn known_sha256_prefix() {
        // sha256("") = e3b0c442...
        assert_eq!(line_hash("", 8), "e3b0c442");
    }

    #[test]
    fn anchor_parse_and_display() {
        let a: Anchor = "12:A1B2C3".parse().unwrap();
        assert_eq!(a.line, 12);
        assert_eq!(a.hash, "a1b2c3");
        assert_eq!(a.to_string(), "12:a1b2c3");
        assert!("0:abc".parse::<Anchor>().is_err());
        assert!("x:abc".parse::<Anchor>().is_err());
        assert!("3:zz".parse::<Anchor>().is_err());
        assert!("3".parse::<Anchor>().is_err());
    }

    #[test]
    fn render_formats() {
        let anchored = render_anchored(["alpha", "beta"], 4, 6);
        let first = anchored.lines().next().unwrap();
        assert!(first.starts_with("4:"));
        assert!(first.ends_with("|alpha"));
        assert_eq!(render_plain(["alpha", "beta"], 1), "1: alpha\n2: beta\n");
    }

    #[test]
    fn matches_requires_full_hash_length() {
        let a = Anchor::for_line(1, "x = 1", 10);
        assert!(a.matches("x = 1", 10));
        assert!(!a.matches("x = 2", 10));

        let prefix = Anchor {
            line: 1,
            hash: a.hash[..1].to_string(),
        };
        assert!(!prefix.matches("x = 1", 10));
        assert!(!a.matches("x = 1", 6));
    }
}
