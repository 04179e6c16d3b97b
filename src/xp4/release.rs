//! The release driver: scans a content directory and writes either a fresh
//! base archive or a patch generation holding only what changed.
use super::archive::InputFile;
use super::classify::ClassList;
use super::diff::compare;
use super::set::*;
use super::writer::build_archive;
use crate::error::{Error, Result};
use crate::types::{BuildConfig, Change, FileState, Generation};
use crate::utils::counter::ChangeCounter;
use crate::utils::files::scan_dir;
use crate::utils::progress::{Progress, ProgressRange};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
pub struct ReleaseOptions {
    /// Path of the base volume, `name.xp4`.
    pub archive: PathBuf,
    /// Directory to pack. Defaults to the one recorded in the existing set.
    pub target_dir: Option<PathBuf>,
    pub class_list: ClassList,
    pub config: BuildConfig,
    /// Delete the existing set and write a new base.
    pub force_new: bool,
    /// Compute the change list without writing anything.
    pub dry_run: bool,
}

impl ReleaseOptions {
    pub fn new(archive: impl Into<PathBuf>) -> Self {
        Self {
            archive: archive.into(),
            target_dir: None,
            class_list: ClassList::default_list().clone(),
            config: BuildConfig::default(),
            force_new: false,
            dry_run: false,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ReleaseReport {
    pub generation: Generation,
    pub target_dir: PathBuf,
    /// Volumes written by this session; empty for a dry run or a patch
    /// without changes.
    pub volumes: Vec<PathBuf>,
    pub changes: Vec<Change>,
    pub summary: ChangeCounter,
}

fn no_target_dir(archive: &Path) -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        format!(
            "no target directory given and '{}' does not record one",
            archive.display()
        ),
    ))
}

/// The recorded target directory must not depend on the working directory
/// of the build that wrote it.
fn absolute_dir(dir: &Path) -> Result<PathBuf> {
    match dir.canonicalize() {
        Ok(dir) => Ok(dir),
        Err(_) => Ok(std::path::absolute(dir)?),
    }
}

/// Resolves `path` through its parent directory so that aliases of the same
/// location compare equal.
fn resolved_location(path: &Path) -> Result<PathBuf> {
    let path = std::path::absolute(path)?;
    let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
        return Ok(path);
    };
    match parent.canonicalize() {
        Ok(parent) => Ok(parent.join(name)),
        Err(_) => Ok(path),
    }
}

/// Runs one build session.
pub fn release(options: &ReleaseOptions, progress: &mut dyn Progress) -> Result<ReleaseReport> {
    let archive = options.archive.as_path();
    let need_set = !options.force_new || options.target_dir.is_none();
    let set = if need_set && archive.is_file() {
        Some(ArchiveSet::open(archive, &mut ProgressRange::new(progress, 0, 10))?)
    } else {
        None
    };
    let target_dir = match (&options.target_dir, set.as_ref().and_then(|s| s.target_dir())) {
        (Some(dir), _) => absolute_dir(dir)?,
        (None, Some(dir)) => PathBuf::from(dir),
        (None, None) => return Err(no_target_dir(archive)),
    };
    tracing::info!("Scanning '{}'", target_dir.display());
    let scanned = scan_dir(&target_dir)?;
    progress.report(15)?;
    let scanned = options
        .class_list
        .classify(scanned, &mut ProgressRange::new(progress, 15, 20))?;
    let scanned_count = scanned.len();

    let (generation, inputs) = match set {
        Some(set) if !options.force_new => {
            let mut files = set.into_files();
            let changes = compare(&mut files, scanned, &mut ProgressRange::new(progress, 20, 40))?;
            (Generation::Patch(new_generation_id()), changes)
        }
        _ => {
            let mut inputs = scanned;
            for input in &mut inputs {
                input.record.set_state(FileState::Added);
            }
            (Generation::Base, inputs)
        }
    };
    progress.report(40)?;

    let mut summary = ChangeCounter::new();
    let changes: Vec<Change> = inputs
        .iter()
        .map(|input| {
            summary.inc(input.record.state());
            Change {
                path: input.record.name.clone(),
                state: input.record.state(),
            }
        })
        .collect();
    summary.unchanged = scanned_count - summary.added - summary.modified;
    tracing::info!("{}", summary);

    let mut report = ReleaseReport {
        generation,
        target_dir,
        volumes: Vec::new(),
        changes,
        summary,
    };
    if options.dry_run {
        progress.report(100)?;
        return Ok(report);
    }
    let base = match &report.generation {
        Generation::Patch(_) if report.summary.changed() == 0 => {
            tracing::info!("No changes since the last generation, nothing written");
            progress.report(100)?;
            return Ok(report);
        }
        Generation::Patch(id) => generation_base(archive, id),
        Generation::Base => {
            let removed = delete_archive_set(archive)?;
            if removed > 0 {
                tracing::info!("Removed {} volumes of the previous archive set", removed);
            }
            archive_base(archive)
        }
    };
    report.volumes = build_archive(
        inputs,
        &base,
        &report.target_dir.to_string_lossy(),
        &options.config,
        &mut ProgressRange::new(progress, 40, 100),
    )?;
    for volume in &report.volumes {
        tracing::info!("Wrote '{}'", volume.display());
    }
    Ok(report)
}

/// Writes the merged content of `archive` as a new single-generation set at
/// `output`, reading file bodies from the existing volumes.
pub fn compact(
    archive: &Path,
    output: &Path,
    config: &BuildConfig,
    progress: &mut dyn Progress,
) -> Result<Vec<PathBuf>> {
    let source = resolved_location(&archive_base(archive))?;
    if source == resolved_location(&archive_base(output))? {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "the compacted archive must not replace its source",
        )));
    }
    let set = ArchiveSet::open(archive, &mut ProgressRange::new(progress, 0, 10))?;
    let target_dir = set.target_dir().unwrap_or_default().to_string();
    let mut inputs: Vec<InputFile> = set.to_inputs();
    for input in &mut inputs {
        input.record.set_state(FileState::Added);
    }
    let removed = delete_archive_set(output)?;
    if removed > 0 {
        tracing::info!("Replacing {} existing volumes at '{}'", removed, output.display());
    }
    build_archive(
        inputs,
        &archive_base(output),
        &target_dir,
        config,
        &mut ProgressRange::new(progress, 10, 100),
    )
}
