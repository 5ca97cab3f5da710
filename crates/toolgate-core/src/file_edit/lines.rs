//! Line-level view of a text file that round-trips its terminators.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::CrLf => "\r\n",
        }
    }
}

/// File content split into lines without terminators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineBuffer {
    pub lines: Vec<String>,
    pub ending: LineEnding,
    pub trailing_newline: bool,
}

impl LineBuffer {
    /// Split `text`. The ending style is taken from the first terminator.
    pub fn parse(text: &str) -> Self {
        let ending = match text.find('\n') {
            Some(i) if i > 0 && text.as_bytes()[i - 1] == b'\r' => LineEnding::CrLf,
            _ => LineEnding::Lf,
        };
        if text.is_empty() {
            return Self {
                lines: Vec::new(),
                ending,
                trailing_newline: false,
            };
        }

        let trailing_newline = text.ends_with('\n');
        let body = text.strip_suffix('\n').unwrap_or(text);
        let lines = body
            .split('\n')
            .map(|line| match ending {
                LineEnding::CrLf => line.strip_suffix('\r').unwrap_or(line).to_string(),
                LineEnding::Lf => line.to_string(),
            })
            .collect();
        Self {
            lines,
            ending,
            trailing_newline,
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// 1-based.
    pub fn line(&self, number: usize) -> Option<&str> {
        number
            .checked_sub(1)
            .and_then(|i| self.lines.get(i))
            .map(String::as_str)
    }

    pub fn render(&self) -> String {
        let mut out = self.lines.join(self.ending.as_str());
        if self.trailing_newline && !self.lines.is_empty() {
            out.push_str(self.ending.as_str());
        }
        out
    }
}

/// Split replacement text into lines, dropping a stray `\r` before each `\n`.
pub fn split_content(content: &str) -> Vec<String> {
    content
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l).to_string())
        .collect()
}
