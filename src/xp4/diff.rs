use super::archive::InputFile;
use super::hash::hash_stream;
use super::set::SetEntry;
use super::writer::open_source;
use crate::error::Result;
use crate::types::FileState;
use crate::utils::progress::{Progress, ProgressRange};
use std::collections::BTreeMap;

/// Compares a directory scan against the merged archive and returns the
/// records a new generation has to carry.
///
/// Scanned files get state `Added` or `Modified`; unchanged ones are
/// dropped. Archived paths missing from the scan come back as deletion
/// records after the scanned ones. A file whose timestamp moved but whose
/// size did not is hashed, and only counts as modified when the hash
/// differs; the computed hash stays on the returned record.
pub fn compare(
    archived: &mut BTreeMap<String, SetEntry>,
    scanned: Vec<InputFile>,
    progress: &mut dyn Progress,
) -> Result<Vec<InputFile>> {
    let count = scanned.len();
    let mut changes = Vec::new();
    for (index, mut input) in scanned.into_iter().enumerate() {
        let mut progress = ProgressRange::step(&mut *progress, index, count);
        progress.report(0)?;
        let state = match archived.get_mut(&input.record.name) {
            None => FileState::Added,
            Some(entry) => {
                entry.record.set_marked(true);
                let old = &entry.record;
                if old.size != input.record.size {
                    FileState::Modified
                } else if old.time == input.record.time {
                    FileState::None
                } else {
                    let hash = match input.record.hash {
                        Some(hash) => hash,
                        None => {
                            let reader = open_source(&input.source)?;
                            let hash = hash_stream(reader, input.record.size, &mut progress)?;
                            input.record.hash = Some(hash);
                            hash
                        }
                    };
                    if old.hash == Some(hash) {
                        FileState::None
                    } else {
                        FileState::Modified
                    }
                }
            }
        };
        progress.report(100)?;
        if state != FileState::None {
            tracing::debug!("{} {}", state.tag(), input.record.name);
            input.record.set_state(state);
            changes.push(input);
        }
    }
    for entry in archived.values_mut() {
        if entry.record.is_marked() {
            entry.record.set_marked(false);
        } else {
            tracing::debug!("{} {}", FileState::Deleted.tag(), entry.record.name);
            changes.push(InputFile::deleted(entry.record.name.clone()));
        }
    }
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::progress::NoProgress;
    use crate::xp4::archive::{FileRecord, InputSource};
    use crate::xp4::hash::ContentHash;
    use chrono::NaiveDate;
    use std::fs;

    fn time(sec: u32) -> Option<chrono::NaiveDateTime> {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .and_then(|d| d.and_hms_opt(12, 0, sec))
    }

    fn archived(name: &str, size: u64, sec: u32, content: &[u8]) -> (String, SetEntry) {
        let mut record = FileRecord::new(name, 0, time(sec), size);
        record.hash = Some(ContentHash::of(content));
        (name.to_string(), SetEntry { volume: 0, record })
    }

    fn scanned(dir: &std::path::Path, name: &str, content: &[u8], sec: u32) -> InputFile {
        let path = dir.join(name.trim_start_matches('/'));
        fs::write(&path, content).unwrap();
        InputFile {
            record: FileRecord::new(name, 0, time(sec), content.len() as u64),
            source: InputSource::File(path),
        }
    }

    #[test]
    fn test_touched_file_with_same_content_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = BTreeMap::from([archived("/a", 5, 1, b"hello")]);
        let changes =
            compare(&mut map, vec![scanned(dir.path(), "/a", b"hello", 2)], &mut NoProgress).unwrap();
        assert!(changes.is_empty());
        assert!(!map["/a"].record.is_marked());
    }

    #[test]
    fn test_touched_file_with_new_content_is_modified() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = BTreeMap::from([archived("/a", 5, 1, b"hello")]);
        let changes =
            compare(&mut map, vec![scanned(dir.path(), "/a", b"world", 2)], &mut NoProgress).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].record.state(), FileState::Modified);
        assert_eq!(changes[0].record.hash, Some(ContentHash::of(b"world")));
    }

    #[test]
    fn test_added_deleted_and_resized() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = BTreeMap::from([
            archived("/gone", 3, 1, b"old"),
            archived("/grown", 3, 1, b"abc"),
            archived("/same", 4, 1, b"same"),
        ]);
        let changes = compare(
            &mut map,
            vec![
                scanned(dir.path(), "/grown", b"abcd", 1),
                scanned(dir.path(), "/new", b"n", 1),
                scanned(dir.path(), "/same", b"same", 1),
            ],
            &mut NoProgress,
        )
        .unwrap();
        let summary: Vec<_> = changes
            .iter()
            .map(|c| (c.record.name.as_str(), c.record.state()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("/grown", FileState::Modified),
                ("/new", FileState::Added),
                ("/gone", FileState::Deleted),
            ]
        );
    }
}
