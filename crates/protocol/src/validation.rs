use std::path::{Component, Path, PathBuf};

use crate::ProtocolError;

/// Validates a device or transfer identifier.
///
/// Identifiers become part of staging file names, so they must be
/// non-empty and must not contain path separators or NUL bytes.
pub fn validate_identifier(name: &'static str, value: &str) -> Result<(), ProtocolError> {
    if value.trim().is_empty() {
        return Err(missing_property(name));
    }
    if value == "." || value == ".." {
        return Err(ProtocolError::InvalidProperty {
            name,
            reason: format!("reserved name: {value}"),
        });
    }
    if value.contains(['/', '\\', '\0']) {
        return Err(ProtocolError::InvalidProperty {
            name,
            reason: format!("path separators not allowed: {value}"),
        });
    }
    Ok(())
}

/// Normalizes a caller-supplied artifact path and splits it into a
/// relative directory and a file name.
///
/// Backslashes are treated as separators and `.` segments are dropped.
/// Rejects:
/// - Empty paths or paths without a file name
/// - Absolute paths (Unix `/` or Windows `C:\`)
/// - Parent directory traversal (`..`)
pub fn normalize_destination(raw: &str) -> Result<(PathBuf, String), ProtocolError> {
    let unified = raw.trim().replace('\\', "/");
    if unified.is_empty() {
        return Err(ProtocolError::InvalidPath("empty path".into()));
    }

    let path = Path::new(&unified);
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(segment) => normalized.push(segment),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(ProtocolError::InvalidPath(format!(
                    "parent directory traversal not allowed: {raw}"
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(ProtocolError::InvalidPath(format!(
                    "absolute path not allowed: {raw}"
                )));
            }
        }
    }

    if unified.ends_with('/') {
        return Err(ProtocolError::InvalidPath(format!(
            "path does not name a file: {raw}"
        )));
    }

    let filename = normalized
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ProtocolError::InvalidPath(format!("path does not name a file: {raw}")))?;
    let dir = normalized
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    Ok((dir, filename))
}

/// Checks that an already-split destination directory stays relative.
pub(crate) fn validate_relative_dir(dir: &Path) -> Result<(), ProtocolError> {
    for component in dir.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => {
                return Err(ProtocolError::InvalidPath(format!(
                    "parent directory traversal not allowed: {}",
                    dir.display()
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(ProtocolError::InvalidPath(format!(
                    "absolute path not allowed: {}",
                    dir.display()
                )));
            }
        }
    }
    Ok(())
}

pub(crate) fn missing_property(name: &'static str) -> ProtocolError {
    match name {
        "deviceId" => ProtocolError::MissingBodyProperty(name),
        _ => ProtocolError::MissingMessageProperty(name),
    }
}
