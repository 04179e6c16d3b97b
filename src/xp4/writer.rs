use super::archive::*;
use super::chunk::write_chunk;
use super::consts::*;
use super::hash::{ContentHash, hash_stream};
use super::reader::ContentReader;
use super::segmenter::*;
use super::set::volume_path;
use crate::error::{Error, Result};
use crate::ext::io::*;
use crate::types::BuildConfig;
use crate::utils::progress::{Progress, ProgressRange};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub files: usize,
    pub deleted: usize,
    pub total_original_size: u64,
    pub final_archive_size: u64,
    pub total_segments: usize,
    pub deduplicated_files: usize,
    pub deduplication_savings: u64,
    pub volumes: usize,
}

impl std::fmt::Display for BuildStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Files: {}\nDeleted Records: {}\nTotal Original Size: {} bytes\nFinal Archive Size: {} bytes\nTotal Segments: {}\nDeduplicated Files: {}\nDeduplication Savings: {} bytes\nVolumes: {}",
            self.files,
            self.deleted,
            self.total_original_size,
            self.final_archive_size,
            self.total_segments,
            self.deduplicated_files,
            self.deduplication_savings,
            self.volumes,
        )
    }
}

fn invalid_input(message: String) -> Error {
    Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, message))
}

/// Opens a sequential reader over the logical content of an input.
pub fn open_source(source: &InputSource) -> Result<Box<dyn Read>> {
    Ok(match source {
        InputSource::None => Box::new(std::io::empty()),
        InputSource::File(path) => Box::new(BufReader::new(File::open(path)?)),
        InputSource::Volume { path, segments } => Box::new(ContentReader::new(
            BufReader::new(File::open(path)?),
            segments,
        )),
    })
}

/// One volume file being written.
struct VolumeWriter {
    path: PathBuf,
    file: BufWriter<File>,
    records: Vec<FileRecord>,
    size: u64,
}

impl VolumeWriter {
    fn create(path: PathBuf) -> Result<Self> {
        let file = File::create(&path)?;
        let mut file = BufWriter::new(file);
        // The first magic byte stays zero until the index is complete.
        file.write_u8(XP4_MAGIC_PENDING)?;
        file.write_all(&XP4_MAGIC[1..])?;
        file.write_u64(0)?; // Placeholder for index offset
        tracing::debug!("Created volume '{}'", path.display());
        Ok(Self {
            path,
            file,
            records: Vec::new(),
            size: HEADER_SIZE,
        })
    }

    fn remaining(&self, limit: u64) -> u64 {
        limit.saturating_sub(self.size)
    }

    fn push(&mut self, record: FileRecord) -> usize {
        self.records.push(record);
        self.records.len() - 1
    }

    /// Writes the planned segments of `record` and stores the resulting
    /// segment list in it.
    fn write_body(
        &mut self,
        record: &mut FileRecord,
        plan: Vec<Segment>,
        source: &InputSource,
        level: Compression,
        progress: &mut dyn Progress,
    ) -> Result<()> {
        let mut reader = open_source(source)?;
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let count = plan.len();
        for (index, mut seg) in plan.into_iter().enumerate() {
            let mut progress = ProgressRange::step(&mut *progress, index, count);
            progress.report(0)?;
            seg.start = self.file.align_to(ALIGNMENT)?;
            if seg.is_compressed {
                let mut data = vec![0u8; seg.original_size as usize];
                reader.read_exact(&mut data).map_err(Error::from_io)?;
                let mut e = ZlibEncoder::new(Vec::new(), level);
                e.write_all(&data)?;
                let compressed = e.finish()?;
                if (compressed.len() as u64) < seg.original_size {
                    self.file.write_all(&compressed)?;
                    seg.archived_size = compressed.len() as u64;
                } else {
                    seg.is_compressed = false;
                    self.file.write_all(&data)?;
                    seg.archived_size = seg.original_size;
                }
            } else {
                let mut left = seg.original_size;
                while left > 0 {
                    let want = left.min(buf.len() as u64) as usize;
                    let n = reader.read(&mut buf[..want]).map_err(Error::from_io)?;
                    if n == 0 {
                        return Err(invalid_input(format!(
                            "'{}' ended {} bytes before its recorded size",
                            record.name, left
                        )));
                    }
                    self.file.write_all(&buf[..n])?;
                    left -= n as u64;
                    progress.report(((seg.original_size - left) * 100 / seg.original_size) as u32)?;
                }
                seg.archived_size = seg.original_size;
            }
            progress.report(100)?;
            record.segments.push(seg);
        }
        self.size = self.file.stream_position()?;
        Ok(())
    }

    /// Writes the index and commits the volume by patching the first magic byte.
    fn finish(&mut self, target_dir: &str, config: &BuildConfig) -> Result<()> {
        let index = serialize_index(&self.records, target_dir)?;
        let raw_size = u32::try_from(index.len())
            .map_err(|_| invalid_input(format!("index of '{}' is too large", self.path.display())))?;
        let index_offset = self.file.align_to(ALIGNMENT)?;
        if config.compress_index {
            let mut e = ZlibEncoder::new(
                Vec::new(),
                Compression::new(config.zlib_compression_level),
            );
            e.write_all(&index)?;
            let compressed = e.finish()?;
            self.file.write_u8(XP4_INDEX_ENCODE_ZLIB)?;
            self.file.write_u32(self.records.len() as u32)?;
            self.file.write_u32(raw_size)?;
            self.file.write_u32(compressed.len() as u32)?;
            self.file.write_all(&compressed)?;
        } else {
            self.file.write_u8(XP4_INDEX_ENCODE_RAW)?;
            self.file.write_u32(self.records.len() as u32)?;
            self.file.write_u32(raw_size)?;
            self.file.write_u32(raw_size)?;
            self.file.write_all(&index)?;
        }
        self.size = self.file.align_to(ALIGNMENT)?;
        self.file.write_u64_at(INDEX_OFFSET_POS, index_offset)?; // Write index offset to header
        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        self.file.write_all_at(0, &XP4_MAGIC[..1])?;
        self.file.flush()?;
        tracing::debug!(
            "Committed volume '{}' with {} records ({} bytes)",
            self.path.display(),
            self.records.len(),
            self.size
        );
        Ok(())
    }
}

/// Serializes the index payload of one volume.
pub fn serialize_index(records: &[FileRecord], target_dir: &str) -> Result<Vec<u8>> {
    let mut items = Vec::new();
    for record in records {
        let mut file = Vec::new();
        write_file_record(record, &mut file)?;
        write_chunk(&mut items, CHUNK_FILE, &file)?;
    }
    let mut targ = target_dir.as_bytes().to_vec();
    targ.push(0);
    let mut meta = Vec::new();
    write_chunk(&mut meta, CHUNK_TARG, &targ)?;
    let mut out = Vec::new();
    write_chunk(&mut out, CHUNK_ITEM, &items)?;
    write_chunk(&mut out, CHUNK_META, &meta)?;
    Ok(out)
}

/// Serializes the content of one `File` chunk.
pub fn write_file_record(record: &FileRecord, out: &mut Vec<u8>) -> Result<()> {
    if !record.is_deleted() {
        let mut segm = Vec::new();
        for seg in &record.segments {
            let mut entry = Vec::with_capacity(SEGM_ENTRY_SIZE);
            entry.write_u8(seg.flags())?;
            entry.write_u64(seg.offset_in_file)?;
            entry.write_u64(seg.original_size)?;
            entry.write_u64(seg.start)?;
            entry.write_u64(seg.archived_size)?;
            write_chunk(&mut segm, CHUNK_SEGM, &entry)?;
        }
        write_chunk(out, CHUNK_SEGM_LIST, &segm)?;
        let hash = record
            .hash
            .ok_or_else(|| invalid_input(format!("'{}' has no content hash", record.name)))?;
        write_chunk(out, CHUNK_HASH, hash.as_bytes())?;
        let time = record
            .time
            .ok_or_else(|| invalid_input(format!("'{}' has no timestamp", record.name)))?;
        write_chunk(out, CHUNK_TIME, &encode_time(&time))?;
    }
    let name = record.name.strip_prefix('/').unwrap_or(&record.name);
    let mut info = Vec::with_capacity(name.len() + 3);
    info.write_u16(record.stored_flags())?;
    info.extend_from_slice(name.as_bytes());
    info.push(0);
    write_chunk(out, CHUNK_INFO, &info)
}

/// Writes one generation of an archive set, splitting it into volumes when
/// a size limit is configured.
pub struct Xp4ArchiveWriter {
    base: PathBuf,
    target_dir: String,
    config: BuildConfig,
    volumes: Vec<VolumeWriter>,
    /// Content hash to the volume and record that first stored it.
    stored: HashMap<ContentHash, (usize, usize)>,
    stats: BuildStats,
}

impl Xp4ArchiveWriter {
    /// `base` is the volume path without the `.xp4` extension.
    pub fn new(base: impl Into<PathBuf>, target_dir: impl Into<String>, config: BuildConfig) -> Self {
        Self {
            base: base.into(),
            target_dir: target_dir.into(),
            config,
            volumes: Vec::new(),
            stored: HashMap::new(),
            stats: BuildStats::default(),
        }
    }

    /// Writes `inputs` and returns the paths of the committed volumes, base
    /// volume first. At least one volume is always written.
    pub fn build(mut self, mut inputs: Vec<InputFile>, progress: &mut dyn Progress) -> Result<Vec<PathBuf>> {
        self.hash_inputs(&mut inputs, &mut ProgressRange::new(progress, 0, 22))?;
        if self.config.volume_size_limit > 0 {
            inputs.sort_by(|a, b| b.record.size.cmp(&a.record.size));
        }
        {
            let mut placing = ProgressRange::new(progress, 22, 99);
            let count = inputs.len();
            for (index, input) in inputs.into_iter().enumerate() {
                self.add(input, &mut ProgressRange::step(&mut placing, index, count))?;
            }
        }
        if self.volumes.is_empty() {
            self.open_volume()?;
        }
        let mut finishing = ProgressRange::new(progress, 99, 100);
        let volumes = std::mem::take(&mut self.volumes);
        let count = volumes.len();
        let mut paths = Vec::with_capacity(count);
        for (index, mut volume) in volumes.into_iter().enumerate() {
            volume.finish(&self.target_dir, &self.config)?;
            self.stats.final_archive_size += volume.size;
            ProgressRange::step(&mut finishing, index, count).report(100)?;
            paths.push(volume.path);
        }
        self.stats.volumes = count;
        tracing::info!("XP4 Archive Statistics:\n{}", self.stats);
        Ok(paths)
    }

    fn hash_inputs(&mut self, inputs: &mut [InputFile], progress: &mut dyn Progress) -> Result<()> {
        let count = inputs.len();
        for (index, input) in inputs.iter_mut().enumerate() {
            let mut progress = ProgressRange::step(&mut *progress, index, count);
            if input.record.is_deleted() || input.record.hash.is_some() {
                progress.report(100)?;
                continue;
            }
            let reader = open_source(&input.source)?;
            input.record.hash = Some(hash_stream(reader, input.record.size, &mut progress)?);
        }
        Ok(())
    }

    fn add(&mut self, input: InputFile, progress: &mut dyn Progress) -> Result<()> {
        let InputFile { mut record, source } = input;
        record.segments.clear();
        if record.is_deleted() {
            record.time = None;
            record.hash = None;
            record.size = 0;
            let vol = self.first_volume()?;
            self.volumes[vol].push(record);
            self.stats.deleted += 1;
            return progress.report(100);
        }
        let hash = record
            .hash
            .ok_or_else(|| invalid_input(format!("'{}' has no content hash", record.name)))?;
        self.stats.files += 1;
        self.stats.total_original_size += record.size;
        if let Some(&(vol, idx)) = self.stored.get(&hash) {
            let original = &self.volumes[vol].records[idx];
            tracing::debug!("'{}' shares its content with '{}'", record.name, original.name);
            record.size = original.size;
            record.segments = original.segments.clone();
            self.stats.deduplicated_files += 1;
            self.stats.deduplication_savings += original.archived_size();
            self.stats.total_segments += record.segments.len();
            self.volumes[vol].push(record);
            return progress.report(100);
        }
        let plan = SegmenterConfig::for_file(record.is_compress_hint(), self.config.compress_unit)
            .plan(record.size);
        let vol = self.select_volume(record.size, reserve_size(&plan))?;
        let level = Compression::new(self.config.zlib_compression_level);
        self.volumes[vol].write_body(&mut record, plan, &source, level, progress)?;
        self.stats.total_segments += record.segments.len();
        let idx = self.volumes[vol].push(record);
        self.stored.insert(hash, (vol, idx));
        Ok(())
    }

    /// First-fit placement: the first volume whose remaining budget can take
    /// `reserve` bytes, or a new one.
    fn select_volume(&mut self, size: u64, reserve: u64) -> Result<usize> {
        let limit = self.config.volume_size_limit;
        if limit == 0 {
            return self.first_volume();
        }
        if size <= limit {
            if let Some(index) = self.volumes.iter().position(|v| v.remaining(limit) > reserve) {
                return Ok(index);
            }
        }
        self.open_volume()
    }

    fn first_volume(&mut self) -> Result<usize> {
        if self.volumes.is_empty() {
            self.open_volume()
        } else {
            Ok(0)
        }
    }

    fn open_volume(&mut self) -> Result<usize> {
        let path = volume_path(&self.base, self.volumes.len());
        self.volumes.push(VolumeWriter::create(path)?);
        Ok(self.volumes.len() - 1)
    }
}

/// Writes `inputs` as volumes of the set rooted at `base`.
pub fn build_archive(
    inputs: Vec<InputFile>,
    base: &Path,
    target_dir: &str,
    config: &BuildConfig,
    progress: &mut dyn Progress,
) -> Result<Vec<PathBuf>> {
    Xp4ArchiveWriter::new(base, target_dir, config.clone()).build(inputs, progress)
}
