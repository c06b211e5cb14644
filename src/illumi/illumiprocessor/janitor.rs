use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;

use crate::illumiprocessor::stage_dir::StageDir;

/// Intermediate stage directories deleted by cleanup. The quality
/// trimmed mates are only intermediate when they get interleaved.
pub fn cleanup_dirs(interleave: bool) -> Vec<StageDir> {
    let mut dirs = vec![StageDir::AdapterTrimmed, StageDir::SplitAdapterTrimmed];
    if interleave {
        dirs.push(StageDir::SplitAdapterQualityTrimmed);
    }
    dirs
}

/// Deletes the intermediate stage directories of one sample. Missing
/// directories are skipped.
///
/// Returns the directories actually removed.
pub fn cleanup_sample(sample_dir: &Path, dirs: &[StageDir]) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for stage in dirs.iter() {
        let path = stage.path(sample_dir);
        match fs::remove_dir_all(&path) {
            Ok(()) => {
                info!("removed {}", path.display());
                removed.push(path);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => (),
            Err(e) => return Err(e).with_context(|| format!("removing {}", path.display())),
        }
    }
    Ok(removed)
}

/// Cleans up every sample working directory
pub fn cleanup_samples(sample_dirs: &[PathBuf], interleave: bool) -> Result<()> {
    let dirs = cleanup_dirs(interleave);
    for sample_dir in sample_dirs.iter() {
        cleanup_sample(sample_dir, &dirs)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    const ALL: [StageDir; 6] = [
        StageDir::Untrimmed,
        StageDir::AdapterTrimmed,
        StageDir::SplitAdapterTrimmed,
        StageDir::SplitAdapterQualityTrimmed,
        StageDir::InterleavedAdapterQualityTrimmed,
        StageDir::Stats,
    ];

    fn populate(sample_dir: &Path, stages: &[StageDir]) {
        for stage in stages.iter() {
            let path = stage.create(sample_dir).unwrap();
            fs::write(path.join("reads.fastq.gz"), b"x").unwrap();
        }
    }

    fn present(sample_dir: &Path) -> Vec<StageDir> {
        ALL.iter().copied().filter(|s| s.path(sample_dir).exists()).collect()
    }

    #[test]
    fn removes_only_named() {
        let tmp = TempDir::new().unwrap();
        populate(tmp.path(), &ALL);

        let removed = cleanup_sample(tmp.path(), &cleanup_dirs(true)).unwrap();
        assert!(removed.len() == 3);
        assert!(
            present(tmp.path())
                == vec![StageDir::Untrimmed, StageDir::InterleavedAdapterQualityTrimmed, StageDir::Stats]
        );
    }

    #[test]
    fn keeps_quality_trimmed_without_interleave() {
        let tmp = TempDir::new().unwrap();
        populate(tmp.path(), &ALL);

        cleanup_samples(&[tmp.path().to_path_buf()], false).unwrap();
        assert!(StageDir::SplitAdapterQualityTrimmed.path(tmp.path()).is_dir());
        assert!(!StageDir::AdapterTrimmed.path(tmp.path()).exists());
    }

    #[test]
    fn tolerates_missing() {
        let tmp = TempDir::new().unwrap();
        populate(tmp.path(), &[StageDir::Untrimmed, StageDir::SplitAdapterTrimmed]);

        let removed = cleanup_sample(tmp.path(), &cleanup_dirs(true)).unwrap();
        assert!(removed == vec![tmp.path().join("split-adapter-trimmed")]);
        assert!(present(tmp.path()) == vec![StageDir::Untrimmed]);

        assert!(cleanup_sample(tmp.path(), &cleanup_dirs(true)).unwrap().is_empty());
    }
}
