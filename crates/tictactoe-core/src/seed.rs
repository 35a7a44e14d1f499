// Seeding a `config/` directory from the shipped `defaults/` directory.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("neither defaults/ nor config/ directory found in {}", .0.display())]
    NoDirectories(PathBuf),

    #[error("failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

fn io_error(action: &'static str, path: &Path) -> impl FnOnce(std::io::Error) -> SeedError {
    let path = path.to_path_buf();
    move |source| SeedError::Io {
        action,
        path,
        source,
    }
}

/// Copy files from `base_dir/defaults/` into `base_dir/config/` when they
/// are missing there, and return the paths written.
///
/// Existing files in `config/` are never touched, and `.example` templates
/// stay in `defaults/`. A base dir with only `config/` is fine; one with
/// neither directory is an error.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, SeedError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(SeedError::NoDirectories(base_dir.to_path_buf()));
        }
        return Ok(vec![]);
    }

    fs::create_dir_all(&config_dir).map_err(io_error("create", &config_dir))?;
    let entries = fs::read_dir(&defaults_dir).map_err(io_error("read", &defaults_dir))?;

    let mut copied = Vec::new();
    for entry in entries {
        let path = entry.map_err(io_error("read", &defaults_dir))?.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }

        // Never overwrite an existing config file.
        let target = config_dir.join(file_name);
        let mut dest = match OpenOptions::new().write(true).create_new(true).open(&target) {
            Ok(dest) => dest,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(io_error("create", &target)(e)),
        };
        let content = fs::read(&path).map_err(io_error("read", &path))?;
        dest.write_all(&content).map_err(io_error("write", &target))?;
        copied.push(target);
    }

    Ok(copied)
}
