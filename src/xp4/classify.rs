//! Include/exclude/compress classification of input files.
//!
//! A class list is a sequence of lines `<kind>:<regex>` applied in order to
//! every storage name (with its leading `/`):
//!
//! - `e:` exclude, `i:` include (undo an exclusion)
//! - `c:` compress, `a:` store as-is (undo a compression)
//!
//! An upper-case kind letter makes the pattern case-insensitive. Lines with
//! any other prefix are ignored.
use super::archive::InputFile;
use super::consts::{XP4_FILE_COMPRESSED, XP4_FILE_EXCLUDED};
use crate::error::{Error, Result};
use crate::utils::progress::{Progress, ProgressRange};
use fancy_regex::Regex;
use std::path::Path;

/// Built-in rules used unless disabled.
pub const DEFAULT_CLASS_RULES: &[&str] = &[
    r"C:\.wav$",
    r"C:\.dll$",
    r"C:\.tpi$",
    r"C:\.spi$",
    r"C:\.txt$",
    r"C:\.mid$",
    r"C:\.smf$",
    r"C:\.swf$",
    r"C:\.ks$",
    r"C:\.risse$",
    r"C:\.ma$",
    r"C:\.asq$",
    r"C:\.asd$",
    r"C:\.ttf$",
    r"C:\.ttc$",
    r"C:\.bff$",
    r"C:\.bmp$",
    r"C:\.tft$",
    r"C:\.cks$",
    r"e:/CVS/",
    r"E:/\.",
    r"E:\.xpk$",
    r"E:\.xp3$",
    r"E:\.xp4$",
    r"E:\.exe$",
    r"E:\.bat$",
    r"E:\.tmp$",
    r"E:\.db$",
    r"E:\.sue$",
    r"E:\.vix$",
    r"E:\.ico$",
    r"E:\.aul$",
    r"E:\.aue$",
    r"E:\.rpf$",
    r"E:\.bak$",
    r"E:\.kep$",
    r"E:\.~[^./]*$",
];

lazy_static::lazy_static! {
    static ref DEFAULT_CLASS_LIST: ClassList =
        ClassList::parse(DEFAULT_CLASS_RULES.iter()).expect("Failed to compile the built-in class list");
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassKind {
    Include,
    Exclude,
    Compress,
    AsIs,
}

#[derive(Clone, Debug)]
pub struct ClassRule {
    pub kind: ClassKind,
    pub pattern: String,
    regex: Regex,
}

impl ClassRule {
    /// Parses one class list line. Lines without a known prefix yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let mut chars = line.chars();
        let (Some(prefix), Some(':')) = (chars.next(), chars.next()) else {
            return Ok(None);
        };
        let kind = match prefix {
            'i' | 'I' => ClassKind::Include,
            'e' | 'E' => ClassKind::Exclude,
            'c' | 'C' => ClassKind::Compress,
            'a' | 'A' => ClassKind::AsIs,
            _ => return Ok(None),
        };
        let pattern = &line[2..];
        let source = if prefix.is_ascii_uppercase() {
            format!("(?i){}", pattern)
        } else {
            pattern.to_string()
        };
        let regex = Regex::new(&source).map_err(|e| Error::InvalidPattern {
            pattern: line.to_string(),
            message: e.to_string(),
        })?;
        Ok(Some(Self {
            kind,
            pattern: pattern.to_string(),
            regex,
        }))
    }

    pub fn is_match(&self, name: &str) -> Result<bool> {
        self.regex.is_match(name).map_err(|e| Error::InvalidPattern {
            pattern: self.pattern.clone(),
            message: e.to_string(),
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct ClassList {
    rules: Vec<ClassRule>,
}

impl ClassList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse<I, S>(lines: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rules = Vec::new();
        for line in lines {
            let line = line.as_ref().trim_end_matches(['\r', '\n']);
            if let Some(rule) = ClassRule::parse(line)? {
                rules.push(rule);
            }
        }
        Ok(Self { rules })
    }

    pub fn from_file<P: AsRef<Path> + ?Sized>(path: &P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(text.lines())
    }

    pub fn default_list() -> &'static ClassList {
        &DEFAULT_CLASS_LIST
    }

    /// Appends the rules of `other` after this list's rules.
    pub fn extend(&mut self, other: &ClassList) {
        self.rules.extend(other.rules.iter().cloned());
    }

    pub fn rules(&self) -> &[ClassRule] {
        &self.rules
    }

    /// Returns the exclude/compress bits for `name`.
    pub fn classify_name(&self, name: &str) -> Result<u16> {
        let mut flags = 0;
        for rule in &self.rules {
            if rule.is_match(name)? {
                match rule.kind {
                    ClassKind::Exclude => flags |= XP4_FILE_EXCLUDED,
                    ClassKind::Include => flags &= !XP4_FILE_EXCLUDED,
                    ClassKind::Compress => flags |= XP4_FILE_COMPRESSED,
                    ClassKind::AsIs => flags &= !XP4_FILE_COMPRESSED,
                }
            }
        }
        Ok(flags)
    }

    /// Sets the compress hint of every file and drops excluded ones.
    pub fn classify(
        &self,
        files: Vec<InputFile>,
        progress: &mut dyn Progress,
    ) -> Result<Vec<InputFile>> {
        let count = files.len();
        let mut result = Vec::with_capacity(count);
        for (index, mut file) in files.into_iter().enumerate() {
            ProgressRange::step(&mut *progress, index, count).report(0)?;
            let flags = self.classify_name(&file.record.name)?;
            if flags & XP4_FILE_EXCLUDED != 0 {
                tracing::debug!("Excluded '{}'", file.record.name);
                continue;
            }
            file.record.flags =
                (file.record.flags & !(XP4_FILE_EXCLUDED | XP4_FILE_COMPRESSED)) | flags;
            result.push(file);
        }
        progress.report(100)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::progress::NoProgress;
    use crate::xp4::archive::{FileRecord, InputSource};

    #[test]
    fn test_default_list() {
        let list = ClassList::default_list();
        assert_eq!(list.classify_name("/scenario/first.KS").unwrap(), XP4_FILE_COMPRESSED);
        assert_eq!(list.classify_name("/image/bg.png").unwrap(), 0);
        assert_eq!(list.classify_name("/CVS/Entries").unwrap(), XP4_FILE_EXCLUDED);
        assert_eq!(list.classify_name("/cvs/Entries").unwrap(), 0);
        assert_eq!(list.classify_name("/.svn/entries").unwrap(), XP4_FILE_EXCLUDED);
        assert_eq!(list.classify_name("/data.XP3").unwrap(), XP4_FILE_EXCLUDED);
        assert_eq!(list.classify_name("/save.~1").unwrap(), XP4_FILE_EXCLUDED);
    }

    #[test]
    fn test_rules_apply_in_order() {
        let list = ClassList::parse([
            r"c:\.txt$",
            "e:^/tmp/",
            "i:keep",
            "a:^/tmp/raw",
            "# comment",
            "x:ignored",
        ])
        .unwrap();
        assert_eq!(list.rules().len(), 4);
        assert_eq!(list.classify_name("/a.txt").unwrap(), XP4_FILE_COMPRESSED);
        assert_eq!(list.classify_name("/tmp/a.bin").unwrap(), XP4_FILE_EXCLUDED);
        assert_eq!(list.classify_name("/tmp/keep.txt").unwrap(), XP4_FILE_COMPRESSED);
        assert_eq!(list.classify_name("/tmp/raw_keep.txt").unwrap(), 0);
        assert_eq!(list.classify_name("/A.TXT").unwrap(), 0);
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            ClassList::parse(["e:("]),
            Err(Error::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_classify_drops_excluded() {
        let files = ["/x.tmp", "/x.txt", "/x.png"]
            .into_iter()
            .map(|name| InputFile {
                record: FileRecord::new(name, 0, None, 0),
                source: InputSource::None,
            })
            .collect();
        let out = ClassList::default_list()
            .classify(files, &mut NoProgress)
            .unwrap();
        let names: Vec<_> = out
            .iter()
            .map(|f| (f.record.name.as_str(), f.record.is_compress_hint()))
            .collect();
        assert_eq!(names, vec![("/x.txt", true), ("/x.png", false)]);
    }
}
