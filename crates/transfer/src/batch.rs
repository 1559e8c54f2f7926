//! Pattern expansion for `mput` and `mget`.
//!
//! Only the final path component may contain wildcards. `*` never
//! crosses a `/`.

use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};

use crate::TransferError;

/// True if `s` contains a wildcard character.
pub fn has_glob_meta(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

fn compile(pattern: &str) -> Result<GlobMatcher, TransferError> {
    let glob = GlobBuilder::new(pattern)
        .literal_separator(true)
        .backslash_escape(true)
        .build()?;
    Ok(glob.compile_matcher())
}

/// Expands local patterns into file paths.
///
/// Plain names pass through unchanged, even when they do not exist, so
/// the upload can report them as missing. Wildcards match regular files
/// in the pattern's directory, sorted by name. Duplicates are dropped.
pub async fn expand_local_patterns(patterns: &[String]) -> Result<Vec<PathBuf>, TransferError> {
    let mut out: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let path = Path::new(pattern);
        let file_part = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if !has_glob_meta(&file_part) {
            push_unique(&mut out, path.to_path_buf());
            continue;
        }

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let matcher = compile(&file_part)?;

        let mut matched = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name();
            if matcher.is_match(Path::new(&name)) {
                matched.push(entry.path());
            }
        }
        matched.sort();
        tracing::debug!(%pattern, count = matched.len(), "local pattern expanded");

        for p in matched {
            push_unique(&mut out, p);
        }
    }

    Ok(out)
}

/// Filters a remote name listing by `pattern`.
///
/// A pattern without wildcards is returned as-is without consulting the
/// listing.
pub fn match_remote_names(names: &[String], pattern: &str) -> Result<Vec<String>, TransferError> {
    if !has_glob_meta(pattern) {
        return Ok(vec![pattern.to_string()]);
    }

    let matcher = compile(pattern)?;
    let mut matched: Vec<String> = names
        .iter()
        .filter(|n| matcher.is_match(n.as_str()))
        .cloned()
        .collect();
    matched.sort();
    matched.dedup();
    Ok(matched)
}

fn push_unique(out: &mut Vec<PathBuf>, path: PathBuf) {
    if !out.contains(&path) {
        out.push(path);
    }
}
