use std::error;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Subdirectories of a sample working directory. Each stage writes
/// into exactly one of these and reads from its predecessor's.
#[derive(Debug, Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Hash)]
pub enum StageDir {
    Untrimmed,
    AdapterTrimmed,
    SplitAdapterTrimmed,
    SplitAdapterQualityTrimmed,
    InterleavedAdapterQualityTrimmed,
    Stats,
}

impl StageDir {
    pub fn name(&self) -> &'static str {
        match self {
            StageDir::Untrimmed => "untrimmed",
            StageDir::AdapterTrimmed => "adapter-trimmed",
            StageDir::SplitAdapterTrimmed => "split-adapter-trimmed",
            StageDir::SplitAdapterQualityTrimmed => "split-adapter-quality-trimmed",
            StageDir::InterleavedAdapterQualityTrimmed => "interleaved-adapter-quality-trimmed",
            StageDir::Stats => "stats",
        }
    }

    /// Path of this stage directory under a sample working directory
    pub fn path<P: AsRef<Path>>(&self, sample_dir: P) -> PathBuf {
        sample_dir.as_ref().join(self.name())
    }

    /// Returns the path of a predecessor stage directory, which must
    /// already exist.
    pub fn require<P: AsRef<Path>>(&self, sample_dir: P) -> Result<PathBuf, StageError> {
        let path = self.path(sample_dir);
        if path.is_dir() {
            Ok(path)
        } else {
            Err(StageError::MissingStageInput(path))
        }
    }

    /// Creates the stage directory if needed and returns its path
    pub fn create<P: AsRef<Path>>(&self, sample_dir: P) -> io::Result<PathBuf> {
        let path = self.path(sample_dir);
        fs::DirBuilder::new().recursive(true).create(&path)?;
        Ok(path)
    }
}

impl fmt::Display for StageDir {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Canonical file name of a single-file sample, e.g. `tag.fastq.gz`
pub fn single_name(tag: &str) -> String {
    format!("{}.fastq.gz", tag)
}

/// Canonical file name of one mate, e.g. `tag-READ1.fastq.gz`
pub fn mate_name(tag: &str, mate: usize) -> String {
    format!("{}-READ{}.fastq.gz", tag, mate)
}

/// Uncompressed output name used by the quality trimmer for one mate
pub fn mate_name_plain(tag: &str, mate: usize) -> String {
    format!("{}-READ{}.fastq", tag, mate)
}

pub fn singleton_name(tag: &str) -> String {
    format!("{}-READ-singleton.fastq.gz", tag)
}

pub fn singleton_name_plain(tag: &str) -> String {
    format!("{}-READ-singleton.fastq", tag)
}

pub fn interleaved_name(tag: &str) -> String {
    format!("{}-READ1and2-interleaved.fastq.gz", tag)
}

/// Sample tag of a working directory, i.e. its final path component
pub fn sample_tag(sample_dir: &Path) -> String {
    sample_dir
        .file_name()
        .map_or_else(String::new, |name| name.to_string_lossy().into_owned())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    /// Predecessor directory or file has not been written
    MissingStageInput(PathBuf),
    /// External tool exited unsuccessfully; `None` when killed by a signal
    ToolFailed(String, Option<i32>),
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StageError::MissingStageInput(path) => {
                write!(f, "Stage input {} does not exist", path.display())
            }
            StageError::ToolFailed(tool, Some(code)) => {
                write!(f, "{} exited with status {}", tool, code)
            }
            StageError::ToolFailed(tool, None) => write!(f, "{} killed by signal", tool),
        }
    }
}

impl error::Error for StageError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_paths() {
        let sample = Path::new("/data/out/bfc1000");
        assert!(StageDir::Untrimmed.path(sample) == Path::new("/data/out/bfc1000/untrimmed"));
        assert!(
            StageDir::InterleavedAdapterQualityTrimmed.path(sample)
                == Path::new("/data/out/bfc1000/interleaved-adapter-quality-trimmed")
        );
        assert!(sample_tag(sample) == "bfc1000");
        assert!(format!("{}", StageDir::SplitAdapterTrimmed) == "split-adapter-trimmed");
    }

    #[test]
    fn require_predecessor() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(
            StageDir::AdapterTrimmed.require(tmp.path())
                == Err(StageError::MissingStageInput(tmp.path().join("adapter-trimmed")))
        );

        let created = StageDir::AdapterTrimmed.create(tmp.path()).unwrap();
        assert!(StageDir::AdapterTrimmed.require(tmp.path()) == Ok(created));
    }

    #[test]
    fn canonical_names() {
        assert!(single_name("A") == "A.fastq.gz");
        assert!(mate_name("A", 2) == "A-READ2.fastq.gz");
        assert!(mate_name_plain("A", 1) == "A-READ1.fastq");
        assert!(singleton_name("A") == "A-READ-singleton.fastq.gz");
        assert!(interleaved_name("A") == "A-READ1and2-interleaved.fastq.gz");
    }
}
