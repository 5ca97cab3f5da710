//! Telling session faults apart from ordinary command failures.

/// Substrings that mean the remote session itself is unusable.
pub const SESSION_FAULT_MARKERS: [&str; 5] = [
    "WebSocket error",
    "WebSocket keepalive timeout",
    "Timeout connecting to session",
    "Session is closed",
    "before start marker was observed",
];

/// Lowercased phrases a backend uses when it had to reset the shell after a
/// timeout (as opposed to interrupting the command in place).
const RESET_MARKERS: [&str; 8] = [
    "shell was reset",
    "session was reset",
    "shell has been reset",
    "session has been reset",
    "shell was restarted",
    "session was restarted",
    "shell has been restarted",
    "session has been restarted",
];

/// Conventional exit code of `timeout(1)`.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Succeeded,
    /// Ordinary non-zero exit.
    Failed,
    /// Timed out; the shell survived.
    TimedOutInPlace,
    /// Timed out; the backend reset the shell, so session state is gone.
    SessionReset,
    /// Transport-level failure; the session must be recreated.
    SessionFault(&'static str),
}

/// Session-fault marker contained in `text`, if any.
pub fn session_fault_marker(text: &str) -> Option<&'static str> {
    SESSION_FAULT_MARKERS.into_iter().find(|m| text.contains(m))
}

fn mentions_reset(lower: &str) -> bool {
    RESET_MARKERS.iter().any(|m| lower.contains(m))
}

/// Classify a finished command from its exit code and stderr.
///
/// A zero exit is always success; stderr is only inspected for failures so
/// a command that merely prints a marker phrase is not misread.
pub fn classify(exit_code: i32, stderr: &str) -> Classification {
    if exit_code == 0 {
        return Classification::Succeeded;
    }
    if let Some(marker) = session_fault_marker(stderr) {
        return Classification::SessionFault(marker);
    }
    let lower = stderr.to_lowercase();
    if exit_code == TIMEOUT_EXIT_CODE || lower.contains("timed out") {
        return if mentions_reset(&lower) {
            Classification::SessionReset
        } else {
            Classification::TimedOutInPlace
        };
    }
    Classification::Failed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_exit_is_success_even_with_marker_text() {
        assert_eq!(classify(0, "Session is closed"), Classification::Succeeded);
    }

    #[test]
    fn session_markers_are_faults() {
        for marker in SESSION_FAULT_MARKERS {
            let stderr = format!("error: {marker} (code 1006)");
            assert_eq!(classify(1, &stderr), Classification::SessionFault(marker));
        }
        assert_eq!(
            classify(1, "Session is closed"),
            Classification::SessionFault("Session is closed")
        );
    }

    #[test]
    fn timeouts_split_on_reset_text() {
        assert_eq!(
            classify(124, "Command timed out after 120000ms; the shell was reset"),
            Classification::SessionReset
        );
        assert_eq!(
            classify(130, "command timed out; interrupted with SIGINT and recovered"),
            Classification::TimedOutInPlace
        );
        assert_eq!(classify(124, ""), Classification::TimedOutInPlace);
    }

    #[test]
    fn ordinary_failure() {
        assert_eq!(classify(2, "ls: cannot access 'x'"), Classification::Failed);
    }
}
