//! Unified diff model and parser

use crate::error::PatchError;
use once_cell::sync::Lazy;
use regex::Regex;

static HUNK_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("hunk header regex is valid")
});

/// Path marker for an absent side
pub const DEV_NULL: &str = "/dev/null";

/// One body line of a hunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HunkLine {
    Context(String),
    Added(String),
    Removed(String),
}

impl HunkLine {
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            HunkLine::Context(t) | HunkLine::Added(t) | HunkLine::Removed(t) => t,
        }
    }
}

/// One `@@ -a,b +c,d @@` region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
    pub lines: Vec<HunkLine>,
    /// `\ No newline at end of file` after the last old-side line
    pub old_missing_newline: bool,
    /// `\ No newline at end of file` after the last new-side line
    pub new_missing_newline: bool,
}

impl Hunk {
    /// 1-based first line covered; a pure insertion sits after `old_start`
    #[must_use]
    pub fn first_old_line(&self) -> usize {
        if self.old_count == 0 {
            self.old_start + 1
        } else {
            self.old_start
        }
    }

    /// Lines the file must currently contain (context + removed)
    pub fn old_lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter_map(|l| match l {
            HunkLine::Context(t) | HunkLine::Removed(t) => Some(t.as_str()),
            HunkLine::Added(_) => None,
        })
    }

    /// Lines the file will contain afterwards (context + added)
    pub fn new_lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter_map(|l| match l {
            HunkLine::Context(t) | HunkLine::Added(t) => Some(t.as_str()),
            HunkLine::Removed(_) => None,
        })
    }
}

/// All hunks for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePatch {
    /// `None` when the old side is `/dev/null`
    pub old_path: Option<String>,
    /// `None` when the new side is `/dev/null`
    pub new_path: Option<String>,
    pub hunks: Vec<Hunk>,
}

impl FilePatch {
    #[inline]
    #[must_use]
    pub fn is_creation(&self) -> bool {
        self.old_path.is_none()
    }

    #[inline]
    #[must_use]
    pub fn is_deletion(&self) -> bool {
        self.new_path.is_none()
    }

    #[must_use]
    pub fn is_rename(&self) -> bool {
        matches!((&self.old_path, &self.new_path), (Some(a), Some(b)) if a != b)
    }

    /// Path the patch leaves behind, or the deleted path
    #[must_use]
    pub fn target(&self) -> &str {
        self.new_path
            .as_deref()
            .or(self.old_path.as_deref())
            .unwrap_or_default()
    }

    /// Every repository path this patch reads or writes
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        let new = match (&self.old_path, &self.new_path) {
            (Some(a), Some(b)) if a == b => None,
            (_, b) => b.as_deref(),
        };
        self.old_path.as_deref().into_iter().chain(new)
    }
}

/// A parsed unified diff
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    pub files: Vec<FilePatch>,
}

impl Diff {
    /// Touched paths in first-seen order, without duplicates
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for path in self.files.iter().flat_map(FilePatch::paths) {
            if !out.iter().any(|p| p == path) {
                out.push(path.to_string());
            }
        }
        out
    }
}

/// Parse a unified diff.
///
/// Hunk bodies are consumed by the header's line counts, so a removed line
/// that happens to start with `--` is never mistaken for a file header.
/// Preamble text before the first file header (commit messages, `diff --git`,
/// `index` lines) is ignored.
///
/// # Errors
/// [`PatchError::Malformed`] when hunk counts disagree with the body, when a
/// hunk has no file header, when a file header has no hunks, or when change
/// lines appear outside any hunk.
pub fn parse(text: &str) -> Result<Diff, PatchError> {
    let mut lines: Vec<&str> = text.split('\n').collect();
    if text.ends_with('\n') {
        lines.pop();
    }

    let mut diff = Diff::default();
    let mut header_lines = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];

        if line.starts_with("--- ") && lines.get(i + 1).is_some_and(|l| l.starts_with("+++ ")) {
            diff.files.push(FilePatch {
                old_path: parse_path(&line[4..]),
                new_path: parse_path(&lines[i + 1][4..]),
                hunks: Vec::new(),
            });
            header_lines.push(i + 1);
            i += 2;
            continue;
        }

        if line.starts_with("@@") {
            let Some(file) = diff.files.last_mut() else {
                return Err(PatchError::malformed(i + 1, "hunk before any file header"));
            };
            let (hunk, next) = parse_hunk(&lines, i)?;
            if let Some(prev) = file.hunks.last() {
                if hunk.first_old_line() < prev.first_old_line() + prev.old_count {
                    return Err(PatchError::malformed(i + 1, "hunks overlap or are out of order"));
                }
            }
            file.hunks.push(hunk);
            i = next;
            continue;
        }

        if !diff.files.is_empty() && matches!(line.as_bytes().first(), Some(b' ' | b'+' | b'-')) {
            return Err(PatchError::malformed(
                i + 1,
                "change line outside any hunk (line counts disagree with header)",
            ));
        }
        i += 1;
    }

    // A header alone would apply as a no-op and still report the file modified.
    if let Some((file, line)) = diff.files.iter().zip(&header_lines).find(|(f, _)| f.hunks.is_empty()) {
        return Err(PatchError::malformed(
            *line,
            format!("file header for {} has no hunks", file.target()),
        ));
    }
    diff.files.retain(|f| f.old_path.is_some() || f.new_path.is_some());
    Ok(diff)
}

fn parse_hunk(lines: &[&str], start: usize) -> Result<(Hunk, usize), PatchError> {
    let header = lines[start];
    let caps = HUNK_HEADER
        .captures(header)
        .ok_or_else(|| PatchError::malformed(start + 1, format!("bad hunk header {header:?}")))?;
    let number = |idx: usize, default: usize| -> Result<usize, PatchError> {
        caps.get(idx).map_or(Ok(default), |m| {
            m.as_str()
                .parse()
                .map_err(|_| PatchError::malformed(start + 1, "hunk range out of bounds"))
        })
    };

    let mut hunk = Hunk {
        old_start: number(1, 0)?,
        old_count: number(2, 1)?,
        new_start: number(3, 0)?,
        new_count: number(4, 1)?,
        lines: Vec::new(),
        old_missing_newline: false,
        new_missing_newline: false,
    };

    let mut old_left = hunk.old_count;
    let mut new_left = hunk.new_count;
    let mut i = start + 1;
    while old_left > 0 || new_left > 0 {
        let Some(&line) = lines.get(i) else {
            return Err(PatchError::malformed(i, "hunk ends before its line counts are met"));
        };
        let (tag, body) = match line.as_bytes().first() {
            None => (b' ', ""),
            Some(&b) => (b, line.get(1..).unwrap_or_default()),
        };
        match tag {
            b' ' if old_left > 0 && new_left > 0 => {
                old_left -= 1;
                new_left -= 1;
                hunk.lines.push(HunkLine::Context(body.to_string()));
            }
            b'-' if old_left > 0 => {
                old_left -= 1;
                hunk.lines.push(HunkLine::Removed(body.to_string()));
            }
            b'+' if new_left > 0 => {
                new_left -= 1;
                hunk.lines.push(HunkLine::Added(body.to_string()));
            }
            b'\\' => mark_missing_newline(&mut hunk),
            _ => {
                return Err(PatchError::malformed(
                    i + 1,
                    "hunk body disagrees with header line counts",
                ))
            }
        }
        i += 1;
    }

    if lines.get(i).is_some_and(|l| l.starts_with('\\')) {
        mark_missing_newline(&mut hunk);
        i += 1;
    }
    Ok((hunk, i))
}

fn mark_missing_newline(hunk: &mut Hunk) {
    match hunk.lines.last() {
        Some(HunkLine::Removed(_)) => hunk.old_missing_newline = true,
        Some(HunkLine::Added(_)) => hunk.new_missing_newline = true,
        Some(HunkLine::Context(_)) => {
            hunk.old_missing_newline = true;
            hunk.new_missing_newline = true;
        }
        None => {}
    }
}

/// Strip `a/` / `b/` prefixes and trailing timestamps; `/dev/null` maps to `None`
fn parse_path(raw: &str) -> Option<String> {
    let path = raw.split('\t').next().unwrap_or_default().trim_end();
    if path == DEV_NULL {
        return None;
    }
    let path = path
        .strip_prefix("a/")
        .or_else(|| path.strip_prefix("b/"))
        .unwrap_or(path);
    Some(path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_modification() {
        let diff = parse(
            "--- a/src/lib.rs\n+++ b/src/lib.rs\n@@ -1,3 +1,3 @@\n one\n-two\n+TWO\n three\n",
        )
        .unwrap();
        assert_eq!(diff.files.len(), 1);
        let file = &diff.files[0];
        assert_eq!(file.old_path.as_deref(), Some("src/lib.rs"));
        assert_eq!(file.target(), "src/lib.rs");
        assert!(!file.is_creation() && !file.is_deletion() && !file.is_rename());
        let hunk = &file.hunks[0];
        assert_eq!((hunk.old_start, hunk.old_count, hunk.new_start, hunk.new_count), (1, 3, 1, 3));
        assert_eq!(hunk.old_lines().collect::<Vec<_>>(), vec!["one", "two", "three"]);
        assert_eq!(hunk.new_lines().collect::<Vec<_>>(), vec!["one", "TWO", "three"]);
    }

    #[test]
    fn parses_creation_and_deletion() {
        let diff = parse(
            "--- /dev/null\n+++ b/new.txt\n@@ -0,0 +1 @@\n+hello\n\
             --- a/old.txt\n+++ /dev/null\n@@ -1 +0,0 @@\n-bye\n",
        )
        .unwrap();
        assert!(diff.files[0].is_creation());
        assert_eq!(diff.files[0].hunks[0].new_count, 1);
        assert!(diff.files[1].is_deletion());
        assert_eq!(diff.files[1].target(), "old.txt");
        assert_eq!(diff.paths(), vec!["new.txt", "old.txt"]);
    }

    #[test]
    fn removed_line_that_looks_like_header() {
        let diff = parse("--- a/x.md\n+++ b/x.md\n@@ -1,2 +1 @@\n--- rule\n keep\n").unwrap();
        assert_eq!(diff.files.len(), 1);
        assert_eq!(diff.files[0].hunks[0].lines[0], HunkLine::Removed("-- rule".into()));
    }

    #[test]
    fn rename_lists_both_paths() {
        let diff = parse("--- a/old.rs\n+++ b/new.rs\n@@ -1 +1 @@\n-a\n+b\n").unwrap();
        assert!(diff.files[0].is_rename());
        assert_eq!(diff.paths(), vec!["old.rs", "new.rs"]);
    }

    #[test]
    fn no_newline_marker() {
        let diff = parse(
            "--- a/f\n+++ b/f\n@@ -1 +1 @@\n-old\n\\ No newline at end of file\n+new\n\\ No newline at end of file\n",
        )
        .unwrap();
        let hunk = &diff.files[0].hunks[0];
        assert!(hunk.old_missing_newline);
        assert!(hunk.new_missing_newline);
    }

    #[test]
    fn preamble_is_ignored() {
        let diff = parse(
            "Add a cabin\n\ndiff --git a/f b/f\nindex 000..111 100644\n--- a/f\n+++ b/f\n@@ -1 +1 @@\n-a\n+b\n",
        )
        .unwrap();
        assert_eq!(diff.files.len(), 1);
    }

    #[test]
    fn timestamps_after_tab_are_dropped() {
        let diff = parse("--- a/f\t2026-01-01 00:00:00\n+++ b/f\t2026-01-01 00:00:01\n@@ -1 +1 @@\n-a\n+b\n")
            .unwrap();
        assert_eq!(diff.files[0].new_path.as_deref(), Some("f"));
    }

    #[test]
    fn count_mismatch_rejected() {
        // Header promises two new lines, body has three.
        let err = parse("--- a/f\n+++ b/f\n@@ -1 +1,2 @@\n-a\n+b\n+c\n+d\n").unwrap_err();
        assert!(matches!(err, PatchError::Malformed { .. }));
        // Header promises more than the body holds.
        let err = parse("--- a/f\n+++ b/f\n@@ -1,3 +1,3 @@\n a\n").unwrap_err();
        assert!(matches!(err, PatchError::Malformed { .. }));
    }

    #[test]
    fn hunk_without_file_rejected() {
        assert!(parse("@@ -1 +1 @@\n-a\n+b\n").is_err());
    }

    #[test]
    fn header_without_hunks_rejected() {
        let err = parse("--- a/keep.txt\n+++ b/keep.txt\n").unwrap_err();
        assert!(matches!(err, PatchError::Malformed { line: 1, .. }), "{err}");
        // Also when it trails a well-formed file.
        let err = parse("--- a/f\n+++ b/f\n@@ -1 +1 @@\n-a\n+b\n--- a/g\n+++ b/g\n").unwrap_err();
        assert!(matches!(err, PatchError::Malformed { line: 6, .. }), "{err}");
    }

    #[test]
    fn garbage_yields_no_files() {
        assert!(parse("this is not a diff").unwrap().files.is_empty());
    }

    #[test]
    fn insertion_right_after_previous_hunk_is_ordered() {
        let diff = parse("--- a/f\n+++ b/f\n@@ -1,3 +1,3 @@\n a\n-b\n+B\n c\n@@ -3,0 +4 @@\n+d\n").unwrap();
        assert_eq!(diff.files[0].hunks.len(), 2);
    }

    #[test]
    fn overlapping_hunks_rejected() {
        let err = parse("--- a/f\n+++ b/f\n@@ -5 +5 @@\n-a\n+b\n@@ -2 +2 @@\n-c\n+d\n").unwrap_err();
        assert!(matches!(err, PatchError::Malformed { .. }));
    }
}
