use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CityscanError;

/// Immediate subdirectories of `root`, sorted by name. Hidden entries are skipped.
pub fn subdirectories(root: &Path) -> Result<Vec<PathBuf>, CityscanError> {
    let entries = fs::read_dir(root)
        .map_err(|err| CityscanError::Filesystem(format!("read dir {}: {err}", root.display())))?;

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| CityscanError::Filesystem(err.to_string()))?;
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if path.is_dir() && !hidden {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// True when `path` is a directory containing at least one entry.
pub fn dir_has_entries(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

pub fn file_len(path: &Path) -> Option<u64> {
    fs::metadata(path)
        .ok()
        .filter(|meta| meta.is_file())
        .map(|meta| meta.len())
}

pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    find_in_dirs(name, std::env::split_paths(&path_var))
}

/// First `dir/name` that is a file. Windows also tries `name.exe`.
pub fn find_in_dirs<I>(name: &str, dirs: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    for dir in dirs {
        #[cfg(windows)]
        {
            let exe = dir.join(format!("{name}.exe"));
            if exe.is_file() {
                return Some(exe);
            }
        }
        let plain = dir.join(name);
        if plain.is_file() {
            return Some(plain);
        }
    }
    None
}
