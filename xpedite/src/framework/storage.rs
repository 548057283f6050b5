//! Samples file naming.
//!
//! Profilers pass a pattern like `/tmp/samples-%.data`; every `%` expands
//! to `<pid>-<epoch-seconds>` so repeated sessions never collide on disk.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Expand a samples-file pattern to a concrete path. A pattern without
/// `%` is used verbatim.
pub fn expand_samples_file_pattern(pattern: &str) -> PathBuf {
    PathBuf::from(pattern.replace('%', &unique_token()))
}

/// Default pattern used by in-process sessions started via `profile()`.
pub fn default_samples_file_pattern() -> String {
    std::env::temp_dir().join("xpedite-samples-%.data").to_string_lossy().into_owned()
}

fn unique_token() -> String {
    let epoch =
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default();
    format!("{}-{}", std::process::id(), epoch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_expansion_replaces_wildcard() {
        let path = expand_samples_file_pattern("/tmp/x.%.bin");
        let text = path.to_string_lossy().into_owned();
        assert!(!text.contains('%'));
        assert!(text.starts_with("/tmp/x."));
        assert!(text.ends_with(".bin"));
        assert!(text.contains(&std::process::id().to_string()));
    }

    #[test]
    fn test_pattern_without_wildcard_verbatim() {
        let path = expand_samples_file_pattern("/tmp/fixed.data");
        assert_eq!(path, PathBuf::from("/tmp/fixed.data"));
    }

    #[test]
    fn test_default_pattern_has_wildcard() {
        assert!(default_samples_file_pattern().contains('%'));
    }
}
