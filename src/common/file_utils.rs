use crate::error::Result;
use log::debug;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Write `content` to `path`, creating parent directories as needed
pub fn write_artifact(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, content)?;
    debug!("Wrote {} ({} bytes)", path.display(), content.len());
    Ok(())
}

/// Write a file that is created with `mode` already applied (ignored off Unix).
///
/// An existing file is truncated and its bits are reset to `mode` as well.
pub fn write_with_mode(path: &Path, content: &str, mode: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    let mut file = options.open(path)?;
    set_mode(path, mode)?;
    file.write_all(content.as_bytes())?;
    debug!("Wrote {} with mode {:o}", path.display(), mode);
    Ok(())
}

pub fn make_executable(path: &Path) -> Result<()> {
    set_mode(path, 0o755)
}

#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
pub fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

/// Remove an artifact a previous run left behind; `true` if something was removed
pub fn remove_stale(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// True when every path exists as a regular file
pub fn all_present(paths: &[&Path]) -> bool {
    paths.iter().all(|p| p.is_file())
}
