use std::path::Path;

use tokio::process::Command;
use tracing::{debug, warn};

use super::truncate;

const MAX_DIFF_CHARS: usize = 60_000;

/// The working tree (or staged) diff of the repository at `dir`. A failing
/// `git` or an empty diff both mean there is nothing to review.
pub async fn git_diff(dir: &Path, staged: bool) -> Option<String> {
    let mut command = Command::new("git");
    command.arg("diff").current_dir(dir);
    if staged {
        command.arg("--staged");
    }

    let output = match command.output().await {
        Ok(output) => output,
        Err(err) => {
            warn!(error = %err, "could not run git");
            return None;
        }
    };
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(status = %output.status, stderr = %stderr.trim(), "git diff failed");
        return None;
    }

    let diff = String::from_utf8_lossy(&output.stdout).into_owned();
    debug!(bytes = diff.len(), staged, "collected diff");
    (!diff.trim().is_empty()).then_some(diff)
}

pub fn build_prompt(diff: &str, focus: Option<&str>) -> String {
    let focus = focus
        .map(str::trim)
        .filter(|focus| !focus.is_empty())
        .map(|focus| format!("Pay particular attention to {focus}.\n"))
        .unwrap_or_default();

    format!(
        "Review the following change as an experienced code reviewer. Point out bugs, \
risky behaviour, missing tests and unclear code, citing file names and lines. \
Be concise and order findings by severity.\n{focus}\n```diff\n{}\n```",
        truncate(diff, MAX_DIFF_CHARS)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn outside_a_repository_there_is_nothing_to_review() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(git_diff(dir.path(), false).await, None);
    }

    #[test]
    fn prompt_includes_focus_and_diff() {
        let diff = "--- a/src/lib.rs\n+++ b/src/lib.rs\n@@ -1 +1 @@\n-old\n+new\n";
        let prompt = build_prompt(diff, Some("error handling"));
        assert!(prompt.contains("Pay particular attention to error handling."));
        assert!(prompt.contains("```diff\n--- a/src/lib.rs"));

        let plain = build_prompt(diff, Some("  "));
        assert!(!plain.contains("particular attention"));
    }

    #[test]
    fn long_diffs_are_truncated() {
        let diff = "+".repeat(MAX_DIFF_CHARS + 100);
        let prompt = build_prompt(&diff, None);
        assert!(prompt.len() < MAX_DIFF_CHARS + 1_000);
    }
}
