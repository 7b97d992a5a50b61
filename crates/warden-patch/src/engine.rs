//! Context-verified hunk engine
//!
//! Works purely in memory: callers read the current content, get the new
//! content back, and decide when to write.

use crate::diff::Hunk;
use crate::error::PatchError;

/// File content split into lines plus its final-newline flag
#[derive(Debug, Clone, PartialEq, Eq)]
struct Lines {
    lines: Vec<String>,
    trailing_newline: bool,
}

impl Lines {
    fn parse(text: &str) -> Self {
        if text.is_empty() {
            return Self {
                lines: Vec::new(),
                trailing_newline: true,
            };
        }
        let (body, trailing_newline) = match text.strip_suffix('\n') {
            Some(body) => (body, true),
            None => (text, false),
        };
        Self {
            lines: body.split('\n').map(str::to_string).collect(),
            trailing_newline,
        }
    }

    fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        if self.trailing_newline && !self.lines.is_empty() {
            out.push('\n');
        }
        out
    }
}

/// Apply `hunks` in order to `original`.
///
/// Every context and removed line must byte-match the file at the hunk's
/// offset-adjusted position. The running offset carries the line-count change
/// of earlier hunks forward to later ones.
///
/// # Errors
/// [`PatchError::ContextMismatch`] on the first line that does not match, or
/// when a hunk reaches past the end of the file.
pub fn apply_hunks(path: &str, original: &str, hunks: &[Hunk]) -> Result<String, PatchError> {
    let mut content = Lines::parse(original);
    let mut offset: isize = 0;

    for (idx, hunk) in hunks.iter().enumerate() {
        let expected: Vec<&str> = hunk.old_lines().collect();
        let replacement: Vec<String> = hunk.new_lines().map(str::to_string).collect();

        // Pure insertions name the line they follow; everything else names its first line.
        let anchor = if hunk.old_count == 0 {
            hunk.old_start
        } else {
            hunk.old_start.saturating_sub(1)
        };
        let position = isize::try_from(anchor).unwrap_or(isize::MAX).saturating_add(offset);
        let mismatch = |line: usize, expected: &str| PatchError::ContextMismatch {
            path: path.to_string(),
            hunk: idx + 1,
            line,
            expected: expected.to_string(),
        };

        let Ok(start) = usize::try_from(position) else {
            return Err(mismatch(0, expected.first().copied().unwrap_or_default()));
        };
        if start > content.lines.len() {
            return Err(mismatch(start + 1, expected.first().copied().unwrap_or_default()));
        }
        for (i, want) in expected.iter().enumerate() {
            match content.lines.get(start + i) {
                Some(have) if have == want => {}
                _ => return Err(mismatch(start + i + 1, want)),
            }
        }

        let end = start + expected.len();
        let added = replacement.len();
        content.lines.splice(start..end, replacement);
        offset += isize::try_from(added).unwrap_or(isize::MAX)
            - isize::try_from(expected.len()).unwrap_or(isize::MAX);

        if hunk.old_missing_newline || hunk.new_missing_newline {
            content.trailing_newline = !hunk.new_missing_newline;
        }
    }

    Ok(content.render())
}
