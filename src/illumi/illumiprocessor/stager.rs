use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};

use crate::illumiprocessor::sample::Sample;
use crate::illumiprocessor::stage_dir::{self, StageDir};

/// How raw input files get into the `untrimmed` stage directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageMode {
    Symlink,
    Copy,
    /// Files are already in place under their canonical names
    InPlace,
}

/// Canonical staged file names for a sample with `ninputs` files
pub fn staged_names(tag: &str, ninputs: usize) -> Vec<String> {
    if ninputs == 1 {
        vec![stage_dir::single_name(tag)]
    } else {
        (1..=ninputs).map(|mate| stage_dir::mate_name(tag, mate)).collect()
    }
}

/// Creates `<output>/<tag>/untrimmed/` for every sample and links or
/// copies each raw input there under its canonical name. Files that
/// already exist are left alone, so staging can be re-run over a
/// populated output directory.
///
/// Returns the per-sample working directories, in sample order. With
/// `StageMode::InPlace` nothing is written and the working
/// directories are assumed to exist already.
pub fn stage_samples(output_dir: &Path, samples: &[Sample], mode: StageMode) -> Result<Vec<PathBuf>> {
    let mut sample_dirs = Vec::with_capacity(samples.len());

    for sample in samples.iter() {
        let sample_dir = output_dir.join(sample.tag());
        debug!("{}: {} input files for {}", sample, sample.inputs().len(), sample.raw_tag());

        if mode != StageMode::InPlace {
            let untrimmed = StageDir::Untrimmed
                .create(&sample_dir)
                .with_context(|| format!("creating {}", sample_dir.display()))?;

            let names = staged_names(sample.tag(), sample.inputs().len());
            for (input, name) in sample.inputs().iter().zip(names.iter()) {
                stage_file(input, &untrimmed.join(name), mode)?;
            }
        }

        sample_dirs.push(sample_dir);
    }

    Ok(sample_dirs)
}

fn stage_file(input: &Path, staged: &Path, mode: StageMode) -> Result<()> {
    if staged.symlink_metadata().is_ok() {
        debug!("{} already staged", staged.display());
        return Ok(());
    }

    match mode {
        StageMode::Symlink => {
            let target = fs::canonicalize(input)
                .with_context(|| format!("resolving {}", input.display()))?;
            symlink(&target, staged)
                .with_context(|| format!("linking {}", staged.display()))?;
            info!("{} (sym =>) {}", target.display(), staged.display());
        }
        StageMode::Copy => {
            fs::copy(input, staged)
                .with_context(|| format!("copying {} to {}", input.display(), staged.display()))?;
            info!("{} => {}", input.display(), staged.display());
        }
        StageMode::InPlace => (),
    }

    Ok(())
}

#[cfg(unix)]
pub fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
pub fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    use crate::illumiprocessor::conf::ReadParams;
    use crate::illumiprocessor::sample::resolve_samples;

    fn setup() -> (TempDir, Vec<Sample>) {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("raw");
        fs::create_dir(&input).unwrap();
        fs::write(input.join("S1_R1.fastq.gz"), b"one").unwrap();
        fs::write(input.join("S1_R2.fastq.gz"), b"two").unwrap();

        let params = ReadParams {
            separate_reads: true,
            read1: "{name}_R1.fastq.gz".to_string(),
            read2: Some("{name}_R2.fastq.gz".to_string()),
        };
        let names = vec![("S1".to_string(), "alpha".to_string())];
        let samples = resolve_samples(&input, &names, true, &params).unwrap();
        (tmp, samples)
    }

    #[test]
    fn names() {
        assert!(staged_names("A", 1) == vec!["A.fastq.gz".to_string()]);
        assert!(staged_names("A", 2) == vec!["A-READ1.fastq.gz".to_string(), "A-READ2.fastq.gz".to_string()]);
    }

    #[test]
    fn stage_symlinks() {
        let (tmp, samples) = setup();
        let output = tmp.path().join("out");

        let dirs = stage_samples(&output, &samples, StageMode::Symlink).unwrap();
        assert!(dirs == vec![output.join("alpha")]);

        let staged = output.join("alpha").join("untrimmed").join("alpha-READ2.fastq.gz");
        assert!(staged.symlink_metadata().unwrap().file_type().is_symlink());
        assert!(fs::read(&staged).unwrap() == b"two");

        // Re-running over the populated tree is fine
        let again = stage_samples(&output, &samples, StageMode::Symlink).unwrap();
        assert!(again == dirs);
    }

    #[test]
    fn stage_copies() {
        let (tmp, samples) = setup();
        let output = tmp.path().join("out");

        stage_samples(&output, &samples, StageMode::Copy).unwrap();
        let staged = output.join("alpha").join("untrimmed").join("alpha-READ1.fastq.gz");
        assert!(!staged.symlink_metadata().unwrap().file_type().is_symlink());
        assert!(fs::read(&staged).unwrap() == b"one");
    }

    #[test]
    fn stage_in_place() {
        let (tmp, samples) = setup();
        let output = tmp.path().join("out");

        let dirs = stage_samples(&output, &samples, StageMode::InPlace).unwrap();
        assert!(dirs == vec![output.join("alpha")]);
        assert!(!output.exists());
    }
}
