use std::error;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};

use crate::fastq_io::{GzFastqWriter, header_identity, mate_marker, read_records};
use crate::illumiprocessor::stage_dir::{self, StageDir, StageError};
use crate::illumiprocessor::stager::symlink;

/// Mate marker of read 1 in an interleaved file
pub const MATE1_MARKER: &str = "1";

/// Splits an interleaved fastq file into mate 1 and mate 2 files.
/// Records whose mate marker is `1` go to `out1`, all others to
/// `out2`. The input must alternate strictly 1,2,1,2... with each
/// mate 2 carrying the identity of the mate 1 before it.
///
/// Returns the number of pairs written. On error both outputs are
/// removed.
pub fn split_interleaved(input: &Path, out1: &Path, out2: &Path) -> Result<usize> {
    let res = write_split(input, out1, out2);
    if res.is_err() {
        let _ = fs::remove_file(out1);
        let _ = fs::remove_file(out2);
    }
    res
}

fn write_split(input: &Path, out1: &Path, out2: &Path) -> Result<usize> {
    let mut read1 = GzFastqWriter::create(out1)?;
    let mut read2 = GzFastqWriter::create(out2)?;

    let mut first: Option<String> = None;
    for (i, fqres) in read_records(input)?.enumerate() {
        let fq = fqres.with_context(|| format!("reading {}", input.display()))?;
        let recno = i + 1;

        let marker = mate_marker(&fq)
            .ok_or_else(|| MateError::Pairing(recno, format!("no mate marker on \"{}\"", fq.id())))?;

        match first.take() {
            None if marker == MATE1_MARKER => {
                read1.write_record(&fq)?;
                first = Some(header_identity(&fq).to_string());
            }
            None => {
                return Err(MateError::Pairing(recno, format!("expected mate 1, found mate {}", marker)).into());
            }
            Some(_) if marker == MATE1_MARKER => {
                return Err(MateError::Pairing(recno, "expected mate 2, found mate 1".to_string()).into());
            }
            Some(id) if id != header_identity(&fq) => {
                return Err(MateError::Pairing(
                    recno,
                    format!("\"{}\" follows \"{}\"", header_identity(&fq), id),
                )
                .into());
            }
            Some(_) => read2.write_record(&fq)?,
        }
    }

    if let Some(id) = first {
        return Err(MateError::Pairing(read1.total() * 2 - 1, format!("no mate 2 for \"{}\"", id)).into());
    }

    read1.finish()?;
    read2.finish()
        .with_context(|| format!("writing {}", out2.display()))
}

/// Interleaves two mate files into one, alternating mate 1 and mate 2
/// records. The records at each position must share their header
/// identity. The output is written under a temporary name and only
/// moved into place once every pair has been checked, so a mismatch
/// never leaves a partial interleaved file behind.
///
/// Returns the number of pairs written.
pub fn interleave_mates(in1: &Path, in2: &Path, out: &Path) -> Result<usize> {
    let mut partial = out.as_os_str().to_owned();
    partial.push(".partial");
    let partial = PathBuf::from(partial);

    match write_interleaved(in1, in2, &partial) {
        Ok(pairs) => {
            fs::rename(&partial, out)
                .with_context(|| format!("renaming {} to {}", partial.display(), out.display()))?;
            Ok(pairs)
        }
        Err(e) => {
            let _ = fs::remove_file(&partial);
            Err(e)
        }
    }
}

fn write_interleaved(in1: &Path, in2: &Path, out: &Path) -> Result<usize> {
    let mut reads1 = read_records(in1)?;
    let mut reads2 = read_records(in2)?;
    let mut writer = GzFastqWriter::create(out)?;

    let mut pairs = 0;
    loop {
        match (reads1.next(), reads2.next()) {
            (None, None) => break,
            (Some(fq1), Some(fq2)) => {
                let fq1 = fq1.with_context(|| format!("reading {}", in1.display()))?;
                let fq2 = fq2.with_context(|| format!("reading {}", in2.display()))?;
                pairs += 1;

                if header_identity(&fq1) != header_identity(&fq2) {
                    return Err(MateError::HeaderMismatch(
                        pairs,
                        header_identity(&fq1).to_string(),
                        header_identity(&fq2).to_string(),
                    )
                    .into());
                }

                writer.write_record(&fq1)?;
                writer.write_record(&fq2)?;
            }
            (Some(_), None) => return Err(MateError::UnequalLength(pairs, 1).into()),
            (None, Some(_)) => return Err(MateError::UnequalLength(pairs, 2).into()),
        }
    }

    writer.finish()?;
    Ok(pairs)
}

/// Splits `adapter-trimmed/<tag>.fastq.gz` into
/// `split-adapter-trimmed/<tag>-READ{1,2}.fastq.gz`
pub fn split_sample(sample_dir: &Path) -> Result<(PathBuf, PathBuf)> {
    let tag = stage_dir::sample_tag(sample_dir);
    let input = StageDir::AdapterTrimmed
        .require(sample_dir)?
        .join(stage_dir::single_name(&tag));
    if !input.is_file() {
        return Err(StageError::MissingStageInput(input).into());
    }

    let split_dir = StageDir::SplitAdapterTrimmed.create(sample_dir)?;
    let out1 = split_dir.join(stage_dir::mate_name(&tag, 1));
    let out2 = split_dir.join(stage_dir::mate_name(&tag, 2));

    info!("{}: splitting reads", tag);
    let pairs = split_interleaved(&input, &out1, &out2)
        .with_context(|| format!("splitting {}", input.display()))?;
    debug!("{}: {} pairs split", tag, pairs);

    Ok((out1, out2))
}

/// Interleaves the quality-trimmed mates of a sample into
/// `interleaved-adapter-quality-trimmed/<tag>-READ1and2-interleaved.fastq.gz`,
/// then moves the singleton file next to it and leaves a relative
/// link to it at the old location.
///
/// Returns the interleaved file.
pub fn interleave_sample(sample_dir: &Path) -> Result<PathBuf> {
    let tag = stage_dir::sample_tag(sample_dir);
    let qual_dir = StageDir::SplitAdapterQualityTrimmed.require(sample_dir)?;
    let in1 = qual_dir.join(stage_dir::mate_name(&tag, 1));
    let in2 = qual_dir.join(stage_dir::mate_name(&tag, 2));
    for input in [&in1, &in2] {
        if !input.is_file() {
            return Err(StageError::MissingStageInput(input.to_path_buf()).into());
        }
    }

    let inter_dir = StageDir::InterleavedAdapterQualityTrimmed.create(sample_dir)?;
    let out = inter_dir.join(stage_dir::interleaved_name(&tag));

    info!("{}: interleaving reads", tag);
    let pairs = interleave_mates(&in1, &in2, &out)
        .with_context(|| format!("interleaving {} and {}", in1.display(), in2.display()))?;
    debug!("{}: {} pairs interleaved", tag, pairs);

    relocate_singleton(&qual_dir, &inter_dir, &tag)?;

    Ok(out)
}

/// Moves the singleton file from `from_dir` into `to_dir` and links
/// the old name to the new location through a relative path.
pub fn relocate_singleton(from_dir: &Path, to_dir: &Path, tag: &str) -> Result<PathBuf> {
    let name = stage_dir::singleton_name(tag);
    let old = from_dir.join(&name);
    let new = to_dir.join(&name);

    let already_linked = old
        .symlink_metadata()
        .map_or(false, |meta| meta.file_type().is_symlink());
    if already_linked && new.is_file() {
        debug!("{} already relocated", new.display());
        return Ok(new);
    }
    if !old.is_file() {
        return Err(StageError::MissingStageInput(old).into());
    }

    fs::rename(&old, &new)
        .with_context(|| format!("moving {} to {}", old.display(), new.display()))?;

    let to_name = to_dir
        .file_name()
        .map_or_else(|| to_dir.as_os_str().to_owned(), |name| name.to_owned());
    let link = Path::new("..").join(to_name).join(&name);
    symlink(&link, &old).with_context(|| format!("linking {}", old.display()))?;

    Ok(new)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MateError {
    /// Record number and description of an interleaving violation
    Pairing(usize, String),
    /// Pair number and the two mismatched header identities
    HeaderMismatch(usize, String, String),
    /// Pairs read before one mate file ended, and which file was longer
    UnequalLength(usize, usize),
}

impl fmt::Display for MateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MateError::Pairing(recno, why) => write!(
                f,
                "File does not appear interleaved (record {}): {}",
                recno, why
            ),
            MateError::HeaderMismatch(pair, id1, id2) => write!(
                f,
                "Read FASTQ headers mismatch at pair {}: \"{}\" vs \"{}\"",
                pair, id1, id2
            ),
            MateError::UnequalLength(pairs, longer) => write!(
                f,
                "Mate files differ in length: read {} has records beyond pair {}",
                longer, pairs
            ),
        }
    }
}

impl error::Error for MateError {}
