//! Archive sets: a base volume, its split volumes and the patch generations
//! layered on top.
//!
//! Volumes are named `<stem>.xp4`, `<stem>.<digits and dots>.xp4`. The base
//! comes first; all other volumes are applied in lexicographic order of their
//! file names, which is chronological because generation ids are UTC
//! timestamps.
use super::archive::*;
use super::consts::XP4_EXTENSION;
use super::reader::{Xp4Archive, extract_record};
use crate::error::{Error, Result};
use crate::types::FileState;
use crate::utils::files::make_sure_dir_exists;
use crate::utils::progress::{Progress, ProgressRange};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

/// `strftime` format of generation ids.
pub const GENERATION_ID_FORMAT: &str = "%Y%m%d%H%M%S%3f";

/// Path of volume `index` of the generation rooted at `base`.
pub fn volume_path(base: &Path, index: usize) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    if index == 0 {
        name.push(format!(".{}", XP4_EXTENSION));
    } else {
        name.push(format!(".{:03}.{}", index, XP4_EXTENSION));
    }
    PathBuf::from(name)
}

/// Strips the `.xp4` extension of an archive path.
pub fn archive_base(archive: &Path) -> PathBuf {
    if archive
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case(XP4_EXTENSION))
    {
        archive.with_extension("")
    } else {
        archive.to_path_buf()
    }
}

pub fn new_generation_id() -> String {
    Utc::now().format(GENERATION_ID_FORMAT).to_string()
}

/// Volume base of the patch generation `generation` of `archive`.
pub fn generation_base(archive: &Path, generation: &str) -> PathBuf {
    let mut name = archive_base(archive).into_os_string();
    name.push(".");
    name.push(generation);
    PathBuf::from(name)
}

/// Lists every volume of the set whose base volume is `archive`.
pub fn enumerate_archive_files(archive: &Path) -> Result<Vec<PathBuf>> {
    if !archive.is_file() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("archive '{}' does not exist", archive.display()),
        )));
    }
    let base = archive_base(archive);
    let stem = base
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid archive name '{}'", archive.display()),
            ))
        })?;
    let dir = match base.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let prefix = format!("{}.", stem);
    let suffix = format!(".{}", XP4_EXTENSION);
    let mut others = Vec::new();
    let unreadable = |source| Error::DirectoryUnreadable {
        path: dir.clone(),
        source,
    };
    for entry in fs::read_dir(&dir).map_err(unreadable)? {
        let entry = entry.map_err(unreadable)?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(middle) = name
            .strip_prefix(&prefix)
            .and_then(|n| n.strip_suffix(&suffix))
        else {
            continue;
        };
        if middle.is_empty() || !middle.chars().all(|c| c.is_ascii_digit() || c == '.') {
            continue;
        }
        if entry.path().is_file() {
            others.push(name.to_string());
        }
    }
    others.sort();
    let mut result = Vec::with_capacity(others.len() + 1);
    result.push(archive.to_path_buf());
    result.extend(others.into_iter().map(|name| base.with_file_name(name)));
    Ok(result)
}

/// Removes every volume of the set. Returns how many files were deleted.
pub fn delete_archive_set(archive: &Path) -> Result<usize> {
    if !archive.exists() {
        return Ok(0);
    }
    let volumes = enumerate_archive_files(archive)?;
    for volume in &volumes {
        fs::remove_file(volume)?;
        tracing::debug!("Removed '{}'", volume.display());
    }
    Ok(volumes.len())
}

/// A merged record and the volume holding its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetEntry {
    /// Index into [`ArchiveSet::volumes`].
    pub volume: usize,
    pub record: FileRecord,
}

/// Replays one volume's records onto the merged map.
pub fn apply_generation(
    files: &mut BTreeMap<String, SetEntry>,
    volume: usize,
    records: Vec<FileRecord>,
) {
    for mut record in records {
        if record.is_deleted() {
            files.remove(&record.name);
        } else {
            record.set_state(FileState::None);
            files.insert(record.name.clone(), SetEntry { volume, record });
        }
    }
}

/// The merged view of all generations of an archive.
#[derive(Debug, Clone)]
pub struct ArchiveSet {
    volumes: Vec<PathBuf>,
    files: BTreeMap<String, SetEntry>,
    target_dir: Option<String>,
}

impl ArchiveSet {
    /// Reads every volume of the set and merges the generations.
    pub fn open(archive: &Path, progress: &mut dyn Progress) -> Result<Self> {
        let volumes = enumerate_archive_files(archive)?;
        let mut files = BTreeMap::new();
        let mut target_dir = None;
        let count = volumes.len();
        for (index, path) in volumes.iter().enumerate() {
            let mut progress = ProgressRange::step(&mut *progress, index, count);
            progress.report(0)?;
            let index_data = Xp4Archive::open(path)?.into_index();
            if index_data.target_dir.is_some() {
                target_dir = index_data.target_dir;
            }
            apply_generation(&mut files, index, index_data.files);
            progress.report(100)?;
        }
        tracing::debug!(
            "Merged {} volumes of '{}' into {} files",
            volumes.len(),
            archive.display(),
            files.len()
        );
        Ok(Self {
            volumes,
            files,
            target_dir,
        })
    }

    pub fn volumes(&self) -> &[PathBuf] {
        &self.volumes
    }

    pub fn files(&self) -> &BTreeMap<String, SetEntry> {
        &self.files
    }

    pub fn into_files(self) -> BTreeMap<String, SetEntry> {
        self.files
    }

    /// Source directory recorded by the most recent volume that has one.
    pub fn target_dir(&self) -> Option<&str> {
        self.target_dir.as_deref()
    }

    pub fn get(&self, name: &str) -> Option<&SetEntry> {
        self.files.get(name)
    }

    /// Reads the content of `name`, verifying its size and hash.
    pub fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let entry = self.get(name).ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("'{}' is not in the archive", name),
            ))
        })?;
        let mut data = Vec::new();
        extract_record(&self.volumes[entry.volume], &entry.record, &mut data)?;
        Ok(data)
    }

    /// Writes every merged file below `out_dir`, restoring modification
    /// times. Returns the number of files written.
    pub fn extract_all(&self, out_dir: &Path, progress: &mut dyn Progress) -> Result<usize> {
        let count = self.files.len();
        for (index, (name, entry)) in self.files.iter().enumerate() {
            let mut progress = ProgressRange::step(&mut *progress, index, count);
            progress.report(0)?;
            let dest = out_dir.join(relative_storage_path(name)?);
            make_sure_dir_exists(&dest)?;
            let mut file = BufWriter::new(fs::File::create(&dest)?);
            extract_record(&self.volumes[entry.volume], &entry.record, &mut file)?;
            file.flush()?;
            if let Some(time) = entry.record.time {
                file.get_ref()
                    .set_modified(SystemTime::from(time.and_utc()))?;
            }
            tracing::debug!("Extracted '{}'", dest.display());
            progress.report(100)?;
        }
        Ok(count)
    }

    /// Turns the merged view back into writer input that reads its content
    /// from the existing volumes.
    pub fn to_inputs(&self) -> Vec<InputFile> {
        self.files
            .values()
            .map(|entry| InputFile {
                record: entry.record.clone(),
                source: InputSource::Volume {
                    path: self.volumes[entry.volume].clone(),
                    segments: entry.record.segments.clone(),
                },
            })
            .collect()
    }
}

/// One record as shown by the volume listing.
#[derive(Debug, Clone, Serialize)]
pub struct ListedFile {
    pub name: String,
    pub state: FileState,
    pub flags: u16,
    pub time: Option<String>,
    pub size: u64,
    pub archived_size: u64,
    pub hash: Option<String>,
}

impl From<&FileRecord> for ListedFile {
    fn from(record: &FileRecord) -> Self {
        Self {
            name: record.name.clone(),
            state: record.state(),
            flags: record.flags,
            time: record
                .time
                .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f").to_string()),
            size: record.size,
            archived_size: record.archived_size(),
            hash: record.hash.map(|h| h.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VolumeListing {
    pub path: PathBuf,
    pub target_dir: Option<String>,
    pub files: Vec<ListedFile>,
}

/// Reads every volume of the set without merging them.
pub fn list_archive_set(archive: &Path) -> Result<Vec<VolumeListing>> {
    enumerate_archive_files(archive)?
        .into_iter()
        .map(|path| {
            let volume = Xp4Archive::open(&path)?;
            let files = volume.files().iter().map(ListedFile::from).collect();
            Ok(VolumeListing {
                target_dir: volume.target_dir().map(str::to_string),
                path,
                files,
            })
        })
        .collect()
}

/// Maps a storage name onto a relative path, rejecting anything that could
/// escape the output directory.
pub fn relative_storage_path(name: &str) -> Result<PathBuf> {
    let rel = Path::new(name.trim_start_matches('/'));
    if rel.as_os_str().is_empty() || rel.components().any(|c| !matches!(c, Component::Normal(_))) {
        return Err(Error::corrupt(format!("unsafe storage name '{}'", name)));
    }
    Ok(rel.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_names() {
        let base = Path::new("out/data");
        assert_eq!(volume_path(base, 0), Path::new("out/data.xp4"));
        assert_eq!(volume_path(base, 2), Path::new("out/data.002.xp4"));
        assert_eq!(archive_base(Path::new("out/data.xp4")), base);
        assert_eq!(
            generation_base(Path::new("out/data.xp4"), "20240101000000000"),
            Path::new("out/data.20240101000000000")
        );
    }

    #[test]
    fn test_generation_id_sorts_after_split_suffix() {
        let id = new_generation_id();
        assert_eq!(id.len(), 17);
        assert!(id.chars().all(|c| c.is_ascii_digit()));
        assert!(id.as_str() > "999");
    }

    #[test]
    fn test_enumerate_orders_volumes() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "data.xp4",
            "data.20240102000000000.xp4",
            "data.001.xp4",
            "data.20240101000000000.xp4",
            "data.backup.xp4",
            "other.001.xp4",
            "data.001.xp3",
        ] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let found = enumerate_archive_files(&dir.path().join("data.xp4")).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "data.xp4",
                "data.001.xp4",
                "data.20240101000000000.xp4",
                "data.20240102000000000.xp4",
            ]
        );
        assert_eq!(delete_archive_set(&dir.path().join("data.xp4")).unwrap(), 4);
        assert!(dir.path().join("data.backup.xp4").exists());
        assert!(!dir.path().join("data.001.xp4").exists());
    }

    #[test]
    fn test_apply_generation_replaces_and_removes() {
        let mut files = BTreeMap::new();
        let mut a = FileRecord::new("/a", 0, None, 1);
        a.set_state(FileState::Added);
        apply_generation(&mut files, 0, vec![a.clone(), FileRecord::new("/b", 0, None, 2)]);
        let mut a2 = FileRecord::new("/a", 0, None, 3);
        a2.set_state(FileState::Modified);
        apply_generation(
            &mut files,
            1,
            vec![a2, FileRecord::deleted("/b"), FileRecord::new("/c", 0, None, 4)],
        );
        let keys: Vec<_> = files.keys().cloned().collect();
        assert_eq!(keys, vec!["/a", "/c"]);
        assert_eq!(files["/a"].volume, 1);
        assert_eq!(files["/a"].record.size, 3);
        assert_eq!(files["/a"].record.state(), FileState::None);
    }

    #[test]
    fn test_relative_storage_path_rejects_escape() {
        assert_eq!(
            relative_storage_path("/a/b.txt").unwrap(),
            PathBuf::from("a/b.txt")
        );
        assert!(relative_storage_path("/../x").is_err());
        assert!(relative_storage_path("/").is_err());
    }
}
