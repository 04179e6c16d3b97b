use crate::error::{Error, Result};
use crate::xp4::archive::{FileRecord, InputFile, InputSource};
use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;

/// Converts a host path fragment into an archive storage name: forward
/// slashes, one leading `/`, no empty components.
pub fn normalize_storage_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len() + 1);
    for part in name.split(['/', '\\']).filter(|s| !s.is_empty()) {
        result.push('/');
        result.push_str(part);
    }
    if result.is_empty() {
        result.push('/');
    }
    result
}

/// Modification time in UTC, truncated to whole milliseconds.
pub fn file_time(time: SystemTime) -> NaiveDateTime {
    DateTime::<Utc>::from(time).naive_utc().trunc_subsecs(3)
}

/// Recursively lists every regular file under `dir`, skipping hidden
/// (dot-prefixed) files and directories.
///
/// The result is sorted by storage name. Every record has state
/// [`FileState::None`](crate::types::FileState::None), the on-disk size and
/// modification time, and a [`InputSource::File`] pointing back at the file.
pub fn scan_dir<P: AsRef<Path> + ?Sized>(dir: &P) -> Result<Vec<InputFile>> {
    let dir = dir.as_ref();
    let mut result = Vec::new();
    scan_into(dir, "", &mut result)?;
    result.sort_by(|a, b| a.record.name.cmp(&b.record.name));
    Ok(result)
}

fn scan_into(dir: &Path, prefix: &str, result: &mut Vec<InputFile>) -> Result<()> {
    let unreadable = |source: io::Error| Error::DirectoryUnreadable {
        path: dir.to_path_buf(),
        source,
    };
    for entry in fs::read_dir(dir).map_err(unreadable)? {
        let entry = entry.map_err(unreadable)?;
        let path = entry.path();
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            tracing::warn!("Skipping non UTF-8 path '{}'", path.display());
            continue;
        };
        if file_name.starts_with('.') {
            continue;
        }
        let name = normalize_storage_name(&format!("{}/{}", prefix, file_name));
        if path.is_dir() {
            scan_into(&path, &name, result)?;
        } else if path.is_file() {
            let meta = entry.metadata()?;
            let record = FileRecord::new(name, 0, Some(file_time(meta.modified()?)), meta.len());
            result.push(InputFile {
                record,
                source: InputSource::File(path),
            });
        }
    }
    Ok(())
}

pub fn make_sure_dir_exists<F: AsRef<Path> + ?Sized>(f: &F) -> io::Result<()> {
    let path = f.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
