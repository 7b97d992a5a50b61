//! Warden Patch
//!
//! Applies untrusted unified diffs, or fails cleanly with zero partial
//! mutation.
//!
//! Pipeline for [`PatchApplier::apply`]:
//! 1. Size cap, parse, path confinement ([`validate_diff`])
//! 2. Raw diff saved as `<patches>/<timestamp>_<event>.patch`
//! 3. Every touched file snapshotted into `<timestamp>_<event>_backup/`
//!    with a manifest of files the patch will create
//! 4. Optional `git apply --check` + `git apply`
//! 5. Otherwise the built-in hunk engine, all content staged in memory first
//!
//! [`PatchApplier::revert`] restores from the backup and deletes created files.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod applier;
mod backup;
mod diff;
mod engine;
mod error;
mod validate;
mod vcs;

pub use applier::{PatchApplier, PatchResult};
pub use backup::{backup_dir_for, BackupManifest, FILES_DIR, MANIFEST_FILE};
pub use diff::{parse, Diff, FilePatch, Hunk, HunkLine, DEV_NULL};
pub use engine::apply_hunks;
pub use error::PatchError;
pub use validate::{check_path, validate_diff};

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, Copy)]
    enum Edit {
        Replace,
        Delete,
        InsertAfter,
    }

    fn edit() -> impl Strategy<Value = Edit> {
        prop_oneof![Just(Edit::Replace), Just(Edit::Delete), Just(Edit::InsertAfter)]
    }

    proptest! {
        /// Many single-line hunks in one file: the running offset must place
        /// each one exactly where a line-by-line rewrite would.
        #[test]
        fn multi_hunk_matches_reference(
            len in 5usize..40,
            picks in proptest::collection::btree_map(0usize..40, edit(), 1..8),
        ) {
            let original: Vec<String> = (0..len).map(|k| format!("line{k}")).collect();
            let picks: Vec<(usize, Edit)> = picks.into_iter().filter(|(i, _)| *i < len).collect();
            prop_assume!(!picks.is_empty());

            let mut diff = String::from("--- a/f.txt\n+++ b/f.txt\n");
            for (i, edit) in &picks {
                let n = i + 1;
                match edit {
                    Edit::Replace => diff.push_str(&format!("@@ -{n} +{n} @@\n-line{i}\n+line{i}_new\n")),
                    Edit::Delete => diff.push_str(&format!("@@ -{n} +{i},0 @@\n-line{i}\n")),
                    Edit::InsertAfter => diff.push_str(&format!("@@ -{n},0 +{},2 @@\n+ins{i}a\n+ins{i}b\n", n + 1)),
                }
            }

            let mut expected: Vec<String> = Vec::new();
            for (k, line) in original.iter().enumerate() {
                match picks.iter().find(|(i, _)| *i == k).map(|(_, e)| *e) {
                    Some(Edit::Replace) => expected.push(format!("line{k}_new")),
                    Some(Edit::Delete) => {}
                    Some(Edit::InsertAfter) => {
                        expected.push(line.clone());
                        expected.push(format!("ins{k}a"));
                        expected.push(format!("ins{k}b"));
                    }
                    None => expected.push(line.clone()),
                }
            }

            let parsed = parse(&diff).unwrap();
            let text = format!("{}\n", original.join("\n"));
            let out = apply_hunks("f.txt", &text, &parsed.files[0].hunks).unwrap();
            let got: Vec<&str> = out.lines().collect();
            prop_assert_eq!(got, expected.iter().map(String::as_str).collect::<Vec<_>>());
        }
    }
}
