use super::archive::Segment;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
/// How the body of one file is cut into segments.
pub enum SegmenterConfig {
    /// Store the whole file as one raw segment.
    None,
    /// Fixed-size slices, each compressed on its own.
    Fixed(u64),
}

impl SegmenterConfig {
    pub fn for_file(compress: bool, compress_unit: u64) -> Self {
        if compress && compress_unit > 0 {
            SegmenterConfig::Fixed(compress_unit)
        } else {
            SegmenterConfig::None
        }
    }

    /// Splits `size` bytes into segments. `start` and `archived_size` are
    /// left at zero for the writer to fill in.
    ///
    /// A compressed plan for an empty file has no segments; a raw plan always
    /// has exactly one.
    pub fn plan(&self, size: u64) -> Vec<Segment> {
        match *self {
            SegmenterConfig::None => vec![Segment {
                is_compressed: false,
                offset_in_file: 0,
                original_size: size,
                start: 0,
                archived_size: 0,
            }],
            SegmenterConfig::Fixed(unit) => {
                let mut result = Vec::with_capacity(size.div_ceil(unit) as usize);
                let mut offset = 0;
                while offset < size {
                    let len = unit.min(size - offset);
                    result.push(Segment {
                        is_compressed: true,
                        offset_in_file: offset,
                        original_size: len,
                        start: 0,
                        archived_size: 0,
                    });
                    offset += len;
                }
                result
            }
        }
    }
}

/// Worst-case number of bytes the planned segments need in a volume,
/// counting alignment padding in front of every segment.
pub fn reserve_size(plan: &[Segment]) -> u64 {
    plan.iter()
        .map(|s| s.original_size + super::consts::ALIGNMENT - 1)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_plan() {
        let plan = SegmenterConfig::Fixed(100).plan(250);
        let sizes: Vec<_> = plan.iter().map(|s| (s.offset_in_file, s.original_size)).collect();
        assert_eq!(sizes, vec![(0, 100), (100, 100), (200, 50)]);
        assert!(plan.iter().all(|s| s.is_compressed));
    }

    #[test]
    fn test_empty_files() {
        assert!(SegmenterConfig::Fixed(100).plan(0).is_empty());
        let raw = SegmenterConfig::None.plan(0);
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].original_size, 0);
    }

    #[test]
    fn test_reserve_counts_padding() {
        let plan = SegmenterConfig::Fixed(100).plan(150);
        assert_eq!(reserve_size(&plan), 150 + 14);
        assert_eq!(SegmenterConfig::for_file(false, 100), SegmenterConfig::None);
    }
}
