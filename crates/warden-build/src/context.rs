//! Bounded repository context for the patch provider
//!
//! Everything here leaves the process, so every excerpt line is screened for
//! secret markers before it is kept.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use walkdir::{DirEntry, WalkDir};
use warden_core::ContextConfig;

/// Replacement for a line that carried a secret marker
pub const REDACTED: &str = "[REDACTED]";

/// What the provider is allowed to see of the repository
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepoContext {
    /// Repository-relative file paths, sorted, capped
    pub file_tree: Vec<String>,
    /// Whether the listing hit the entry cap
    pub tree_truncated: bool,
    /// Leading lines of whitelisted files, redacted
    pub excerpts: BTreeMap<String, String>,
}

/// Walk `repo_root` and excerpt the configured files
#[must_use]
pub fn gather_context(repo_root: &Path, config: &ContextConfig) -> RepoContext {
    let mut context = RepoContext::default();

    let walker = WalkDir::new(repo_root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_skipped(entry, config));
    for entry in walker.filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        if context.file_tree.len() >= config.max_tree_entries {
            context.tree_truncated = true;
            break;
        }
        if let Ok(rel) = entry.path().strip_prefix(repo_root) {
            context.file_tree.push(rel.to_string_lossy().replace('\\', "/"));
        }
    }

    for rel in &config.excerpt_files {
        let Ok(text) = std::fs::read_to_string(repo_root.join(rel)) else {
            continue;
        };
        let excerpt = text
            .lines()
            .take(config.max_excerpt_lines)
            .map(|line| redact_line(line, &config.secret_markers))
            .collect::<Vec<_>>()
            .join("\n");
        context.excerpts.insert(rel.clone(), excerpt);
    }

    tracing::debug!(
        files = context.file_tree.len(),
        excerpts = context.excerpts.len(),
        truncated = context.tree_truncated,
        "gathered repository context"
    );
    context
}

/// The line itself, or [`REDACTED`] when it mentions any marker
#[must_use]
pub fn redact_line<'a>(line: &'a str, markers: &[String]) -> &'a str {
    let lower = line.to_lowercase();
    if markers.iter().any(|marker| lower.contains(&marker.to_lowercase())) {
        REDACTED
    } else {
        line
    }
}

fn is_skipped(entry: &DirEntry, config: &ContextConfig) -> bool {
    let name = entry.file_name().to_string_lossy();
    if name.starts_with('.') {
        return true;
    }
    entry.file_type().is_dir() && config.skip_dirs.iter().any(|dir| *dir == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn config() -> ContextConfig {
        ContextConfig {
            excerpt_files: vec!["src/lib.rs".to_string(), "missing.rs".to_string()],
            ..ContextConfig::default()
        }
    }

    #[test]
    fn lists_files_skipping_hidden_and_ignored_dirs() {
        let repo = tempfile::tempdir().unwrap();
        fs::create_dir_all(repo.path().join("src")).unwrap();
        fs::create_dir_all(repo.path().join("target/debug")).unwrap();
        fs::create_dir_all(repo.path().join(".git")).unwrap();
        fs::write(repo.path().join("src/lib.rs"), "pub fn f() {}\n").unwrap();
        fs::write(repo.path().join("target/debug/out"), "bin").unwrap();
        fs::write(repo.path().join(".git/HEAD"), "ref").unwrap();
        fs::write(repo.path().join(".env"), "TOKEN=x").unwrap();

        let context = gather_context(repo.path(), &config());
        assert_eq!(context.file_tree, vec!["src/lib.rs"]);
        assert!(!context.tree_truncated);
    }

    #[test]
    fn tree_is_capped() {
        let repo = tempfile::tempdir().unwrap();
        for i in 0..10 {
            fs::write(repo.path().join(format!("f{i}.txt")), "x").unwrap();
        }
        let config = ContextConfig {
            max_tree_entries: 3,
            ..ContextConfig::default()
        };
        let context = gather_context(repo.path(), &config);
        assert_eq!(context.file_tree.len(), 3);
        assert!(context.tree_truncated);
    }

    #[test]
    fn excerpts_are_bounded_and_redacted() {
        let repo = tempfile::tempdir().unwrap();
        fs::create_dir_all(repo.path().join("src")).unwrap();
        let mut body = String::from("let API_KEY = \"abc\";\nlet password = 1;\n");
        for i in 0..200 {
            body.push_str(&format!("line {i}\n"));
        }
        fs::write(repo.path().join("src/lib.rs"), body).unwrap();

        let context = gather_context(repo.path(), &config());
        let excerpt = &context.excerpts["src/lib.rs"];
        let lines: Vec<&str> = excerpt.lines().collect();
        assert_eq!(lines.len(), 80);
        assert_eq!(lines[0], REDACTED);
        assert_eq!(lines[1], REDACTED);
        assert_eq!(lines[2], "line 0");
        assert!(!excerpt.contains("abc"));
        assert!(!context.excerpts.contains_key("missing.rs"));
    }

    #[test]
    fn redaction_is_case_insensitive() {
        let markers = vec!["token".to_string()];
        assert_eq!(redact_line("GITHUB_TOKEN=1", &markers), REDACTED);
        assert_eq!(redact_line("fn parse()", &markers), "fn parse()");
    }
}
