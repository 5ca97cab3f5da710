//! File tools: `read_file`, `write_file` and `edit_file`.
//!
//! In anchor mode `read_file` prints every line as `N:hash|text` and
//! `edit_file` only writes when every targeted line still hashes to what
//! the agent saw. The read-check-write sequence is not atomic across the
//! network; the anchor check is the optimistic lock. Plain mode prints
//! `N: text` and edits by string substitution.

pub mod anchored;
pub mod lines;
pub mod plain;

use std::sync::Arc;

use serde_json::json;
use tracing::instrument;

use self::anchored::AnchorEdit;
use self::lines::LineBuffer;
use self::plain::PlainEdit;
use crate::anchor::{render_anchored, render_plain};
use crate::config::{EditConfig, EditMode};
use crate::context::ExecutionContext;
use crate::metrics::METRICS;
use crate::obs;
use crate::result::{ToolError, ToolMeta, ToolResult};
use crate::sandbox::{SandboxCapability, SandboxIoError};

/// Most refreshed-anchor lines printed after an edit.
const MAX_REGION_LINES: usize = 100;

/// Resolve `path` against the context's working directory.
pub fn resolve_path(cwd: &str, path: &str) -> Result<String, String> {
    let path = path.trim();
    if path.is_empty() {
        return Err("path must not be empty".to_string());
    }
    if path.chars().any(char::is_control) {
        return Err("path contains control characters".to_string());
    }
    if path.starts_with('/') {
        Ok(path.to_string())
    } else {
        Ok(format!("{}/{}", cwd.trim_end_matches('/'), path.trim_start_matches("./")))
    }
}

fn io_error(tool: &str, err: SandboxIoError) -> ToolError {
    match err {
        SandboxIoError::NotFound { path } => {
            ToolError::invalid_arguments(tool, format!("no such file: {path}"))
        }
        other => ToolError::SandboxUnavailable {
            detail: other.to_string(),
        },
    }
}

pub struct FileEditTool {
    sandbox: Arc<dyn SandboxCapability>,
    config: EditConfig,
}

impl FileEditTool {
    pub fn new(sandbox: Arc<dyn SandboxCapability>, config: EditConfig) -> Self {
        Self { sandbox, config }
    }

    /// The context's mode, else the configured default.
    pub fn mode(&self, ctx: &ExecutionContext) -> EditMode {
        ctx.edit_mode.unwrap_or(self.config.default_mode)
    }

    fn render(&self, mode: EditMode, lines: &[String], first_line: usize) -> String {
        let iter = lines.iter().map(String::as_str);
        match mode {
            EditMode::Anchor => render_anchored(iter, first_line, self.config.anchor_hash_len),
            EditMode::Plain => render_plain(iter, first_line),
        }
    }

    async fn load(&self, ctx: &ExecutionContext, tool: &str, path: &str) -> Result<LineBuffer, ToolError> {
        let text = self
            .sandbox
            .read_file(&ctx.sandbox_id, path)
            .await
            .map_err(|e| io_error(tool, e))?;
        Ok(LineBuffer::parse(&text))
    }

    #[instrument(skip(self, ctx), fields(run_id = %ctx.run_id, mode = ?ctx.edit_mode))]
    pub async fn read_file(
        &self,
        ctx: &ExecutionContext,
        path: &str,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> Result<ToolResult, ToolError> {
        let path = resolve_path(&ctx.cwd, path).map_err(|r| ToolError::invalid_arguments("read_file", r))?;
        let buffer = self.load(ctx, "read_file", &path).await?;
        let total = buffer.len();
        let data = |shown: Option<(usize, usize)>| {
            json!({ "path": path, "totalLines": total, "shown": shown })
        };

        if total == 0 {
            return Ok(ToolResult::ok_with_meta(
                "(empty file)\n",
                ToolMeta {
                    data: Some(data(None)),
                    ..ToolMeta::default()
                },
            ));
        }

        let start = offset.unwrap_or(1);
        if start == 0 {
            return Err(ToolError::invalid_arguments("read_file", "offset is 1-based"));
        }
        if start > total {
            return Err(ToolError::invalid_arguments(
                "read_file",
                format!("offset {start} is past the end of the file ({total} lines)"),
            ));
        }
        let end = match limit {
            Some(0) => return Err(ToolError::invalid_arguments("read_file", "limit must be positive")),
            Some(limit) => start.saturating_add(limit - 1).min(total),
            None => total,
        };

        let mut text = String::new();
        let mut shown_end = start - 1;
        let mut cut = false;
        for number in start..=end {
            let line = self.render(
                self.mode(ctx),
                std::slice::from_ref(&buffer.lines[number - 1]),
                number,
            );
            if !text.is_empty() && text.len() + line.len() > self.config.max_read_bytes {
                cut = true;
                break;
            }
            text.push_str(&line);
            shown_end = number;
        }
        if start != 1 || shown_end != total {
            text.push_str(&format!(
                "[showing lines {start}-{shown_end} of {total}; use offset/limit to read more]\n"
            ));
        }
        let omitted: usize = buffer.lines[shown_end..end].iter().map(|l| l.len() + 1).sum();
        if cut {
            obs::emit_output_truncated(&ctx.run_id, "read_file", omitted);
            METRICS.inc_truncations();
        }

        Ok(ToolResult::ok_with_meta(
            text,
            ToolMeta {
                truncated: cut,
                omitted_bytes: cut.then_some(omitted),
                data: Some(data(Some((start, shown_end)))),
                ..ToolMeta::default()
            },
        ))
    }

    #[instrument(skip(self, ctx, content), fields(run_id = %ctx.run_id, bytes = content.len()))]
    pub async fn write_file(
        &self,
        ctx: &ExecutionContext,
        path: &str,
        content: &str,
    ) -> Result<ToolResult, ToolError> {
        let path = resolve_path(&ctx.cwd, path).map_err(|r| ToolError::invalid_arguments("write_file", r))?;
        self.sandbox
            .write_file(&ctx.sandbox_id, &path, content)
            .await
            .map_err(|e| io_error("write_file", e))?;
        let lines = LineBuffer::parse(content).len();
        Ok(ToolResult::ok(format!(
            "Wrote {} bytes ({lines} lines) to {path}",
            content.len()
        )))
    }

    /// Anchor-checked edit. Nothing is written unless every anchor matches.
    #[instrument(skip(self, ctx, edits), fields(run_id = %ctx.run_id, edits = edits.len()))]
    pub async fn edit_anchored(
        &self,
        ctx: &ExecutionContext,
        path: &str,
        edits: &[AnchorEdit],
    ) -> Result<ToolResult, ToolError> {
        anchored::validate(edits, self.config.anchor_hash_len)
            .map_err(|r| ToolError::invalid_arguments("edit_file", r))?;
        let path = resolve_path(&ctx.cwd, path).map_err(|r| ToolError::invalid_arguments("edit_file", r))?;
        let buffer = self.load(ctx, "edit_file", &path).await?;

        let stale = anchored::stale_anchors(&buffer, edits, self.config.anchor_hash_len);
        if !stale.is_empty() {
            obs::emit_edit_hash_mismatch(&ctx.run_id, &path, stale.len());
            METRICS.inc_hash_mismatches();
            return Err(ToolError::HashMismatch {
                path,
                mismatches: stale,
                total_lines: buffer.len(),
            });
        }

        let applied = anchored::apply(&buffer, edits);
        self.sandbox
            .write_file(&ctx.sandbox_id, &path, &applied.buffer.render())
            .await
            .map_err(|e| io_error("edit_file", e))?;

        let mut text = format!(
            "Applied {} edit(s) to {path} ({} line(s) deleted); file now has {} lines.\n",
            edits.len(),
            applied.deleted,
            applied.buffer.len()
        );
        if let Some((lo, hi)) = applied.region {
            let hi_shown = hi.min(lo + MAX_REGION_LINES - 1);
            text.push_str(&format!("Fresh anchors for lines {lo}-{hi_shown}:\n"));
            text.push_str(&self.render(EditMode::Anchor, &applied.buffer.lines[lo - 1..hi_shown], lo));
            if hi_shown < hi {
                text.push_str(&format!("[{} more changed lines not shown]\n", hi - hi_shown));
            }
        }
        Ok(ToolResult::ok(text))
    }

    /// Sequential string substitutions; all-or-nothing.
    #[instrument(skip(self, ctx, edits), fields(run_id = %ctx.run_id, edits = edits.len()))]
    pub async fn edit_plain(
        &self,
        ctx: &ExecutionContext,
        path: &str,
        edits: &[PlainEdit],
    ) -> Result<ToolResult, ToolError> {
        plain::validate(edits).map_err(|r| ToolError::invalid_arguments("edit_file", r))?;
        let path = resolve_path(&ctx.cwd, path).map_err(|r| ToolError::invalid_arguments("edit_file", r))?;
        let original = self
            .sandbox
            .read_file(&ctx.sandbox_id, &path)
            .await
            .map_err(|e| io_error("edit_file", e))?;

        let (updated, replacements) = plain::apply(&original, edits).map_err(|reason| {
            ToolError::EditNotApplied {
                path: path.clone(),
                reason,
            }
        })?;
        self.sandbox
            .write_file(&ctx.sandbox_id, &path, &updated)
            .await
            .map_err(|e| io_error("edit_file", e))?;
        Ok(ToolResult::ok(format!(
            "Applied {} edit(s) to {path} ({replacements} replacement(s)).",
            edits.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::line_hash;
    use crate::fakes::ScriptedSandbox;
    use crate::result::ToolErrorKind;

    const VM: &str = "vm-1";

    fn setup(content: &str) -> (Arc<ScriptedSandbox>, FileEditTool) {
        let sandbox = Arc::new(ScriptedSandbox::new());
        sandbox.put_file(VM, "/work/src/main.rs", content);
        let tool = FileEditTool::new(sandbox.clone(), EditConfig::default());
        (sandbox, tool)
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("agent", "run", VM, "/work")
    }

    fn anchor_of(text: &str) -> String {
        line_hash(text, 6)
    }

    #[test]
    fn paths_resolve_against_cwd() {
        assert_eq!(resolve_path("/work/", "./a.txt").unwrap(), "/work/a.txt");
        assert_eq!(resolve_path("/work", "/etc/hosts").unwrap(), "/etc/hosts");
        assert!(resolve_path("/work", "  ").is_err());
        assert!(resolve_path("/work", "a\nb").is_err());
    }

    #[tokio::test]
    async fn read_renders_anchors_and_windows() {
        let (_, tool) = setup("fn main() {\n    println!(\"hi\");\n}\n");
        let full = tool.read_file(&ctx(), "src/main.rs", None, None).await.unwrap();
        let first = full.output.lines().next().unwrap();
        assert_eq!(first, format!("1:{}|fn main() {{", anchor_of("fn main() {")));
        assert!(!full.output.contains("showing lines"));

        let window = tool.read_file(&ctx(), "src/main.rs", Some(2), Some(1)).await.unwrap();
        assert!(window.output.starts_with("2:"));
        assert!(window.output.contains("[showing lines 2-2 of 3;"));

        let past = tool.read_file(&ctx(), "src/main.rs", Some(9), None).await.unwrap_err();
        assert_eq!(past.kind(), ToolErrorKind::InvalidArguments);
    }

    #[tokio::test]
    async fn plain_mode_read() {
        let (_, tool) = setup("a\nb\n");
        let ctx = ctx().with_edit_mode(EditMode::Plain);
        let out = tool.read_file(&ctx, "src/main.rs", None, None).await.unwrap();
        assert_eq!(out.output, "1: a\n2: b\n");
    }

    #[tokio::test]
    async fn configured_default_mode_applies_unless_the_context_overrides_it() {
        let sandbox = Arc::new(ScriptedSandbox::new());
        sandbox.put_file(VM, "/work/src/main.rs", "a\n");
        let tool = FileEditTool::new(
            sandbox,
            EditConfig {
                default_mode: EditMode::Plain,
                ..EditConfig::default()
            },
        );
        assert_eq!(tool.mode(&ctx()), EditMode::Plain);
        let out = tool.read_file(&ctx(), "src/main.rs", None, None).await.unwrap();
        assert_eq!(out.output, "1: a\n");

        let anchored = ctx().with_edit_mode(EditMode::Anchor);
        assert_eq!(tool.mode(&anchored), EditMode::Anchor);
    }

    #[tokio::test]
    async fn fresh_anchor_edit_succeeds_and_preserves_crlf() {
        let (sandbox, tool) = setup("one\r\ntwo\r\nthree");
        let edits = [AnchorEdit {
            line: 2,
            hash: anchor_of("two"),
            new_content: Some("TWO\nTWO-B".into()),
        }];
        let result = tool.edit_anchored(&ctx(), "src/main.rs", &edits).await.unwrap();
        assert!(result.success);
        assert_eq!(
            sandbox.file(VM, "/work/src/main.rs").unwrap(),
            "one\r\nTWO\r\nTWO-B\r\nthree"
        );
        assert!(result
            .output
            .contains(&format!("2:{}|TWO\n", anchor_of("TWO"))));
    }

    #[tokio::test]
    async fn stale_anchor_aborts_without_writing() {
        let original = "alpha\nbeta\ngamma\n";
        let (sandbox, tool) = setup(original);
        let edits = [
            AnchorEdit {
                line: 1,
                hash: anchor_of("alpha"),
                new_content: Some("ALPHA".into()),
            },
            AnchorEdit {
                line: 3,
                hash: anchor_of("old gamma"),
                new_content: None,
            },
        ];
        let err = tool.edit_anchored(&ctx(), "src/main.rs", &edits).await.unwrap_err();
        assert_eq!(err.kind(), ToolErrorKind::HashMismatch);
        let message = err.to_string();
        assert!(message.contains("line 3"));
        assert!(message.contains(&anchor_of("gamma")));
        assert_eq!(sandbox.file(VM, "/work/src/main.rs").unwrap(), original);
        assert_eq!(sandbox.write_count(), 0);
    }

    #[tokio::test]
    async fn plain_edit_errors_are_edit_not_applied() {
        let (sandbox, tool) = setup("x = 1\nx = 1\n");
        let ambiguous = [PlainEdit {
            old_string: "x = 1".into(),
            new_string: "x = 2".into(),
            replace_all: false,
        }];
        let err = tool.edit_plain(&ctx(), "src/main.rs", &ambiguous).await.unwrap_err();
        assert_eq!(err.kind(), ToolErrorKind::EditNotApplied);
        assert_eq!(sandbox.write_count(), 0);

        let all = [PlainEdit {
            replace_all: true,
            ..ambiguous[0].clone()
        }];
        tool.edit_plain(&ctx(), "src/main.rs", &all).await.unwrap();
        assert_eq!(sandbox.file(VM, "/work/src/main.rs").unwrap(), "x = 2\nx = 2\n");
    }

    #[tokio::test]
    async fn write_then_missing_file() {
        let (sandbox, tool) = setup("");
        let out = tool.write_file(&ctx(), "notes.md", "# hi\n").await.unwrap();
        assert!(out.output.contains("/work/notes.md"));
        assert_eq!(sandbox.file(VM, "/work/notes.md").as_deref(), Some("# hi\n"));

        let err = tool.read_file(&ctx(), "missing.txt", None, None).await.unwrap_err();
        assert!(err.to_string().contains("no such file"));
    }
}
