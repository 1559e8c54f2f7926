use std::path::{Component, Path};

use crate::TransferError;

/// Derives a safe local file name from a remote path.
///
/// Takes the last `/`-separated component and rejects anything that
/// could land outside the target directory.
pub fn local_name_for(remote: &str) -> Result<String, TransferError> {
    let name = remote.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    validate_local_name(name)?;
    Ok(name.to_string())
}

/// Checks that `name` is a single relative path component.
///
/// Rejects:
/// - Empty names and `.`
/// - Parent directory traversal (`..`)
/// - Absolute paths and Windows prefixes (`C:`, `\\server`)
/// - Anything with more than one component
pub fn validate_local_name(name: &str) -> Result<(), TransferError> {
    if name.is_empty() {
        return Err(TransferError::InvalidName("empty name".into()));
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        (Some(Component::ParentDir), _) => Err(TransferError::InvalidName(format!(
            "parent directory traversal not allowed: {name}"
        ))),
        (Some(Component::RootDir | Component::Prefix(_)), _) => Err(
            TransferError::InvalidName(format!("absolute path not allowed: {name}")),
        ),
        _ => Err(TransferError::InvalidName(format!(
            "not a plain file name: {name}"
        ))),
    }
}
