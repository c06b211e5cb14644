use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};

use anyhow::{Context, Result, anyhow};
use log::{debug, info};

use crate::illumiprocessor::adapters;
use crate::illumiprocessor::conf::AdapterTables;
use crate::illumiprocessor::stage_dir::{self, StageDir, StageError};

/// Quality score encoding passed to both trimmers
pub const QUALITY_ENCODING: &str = "sanger";

/// Diagnostics file of the quality trimmer, under `stats/`
pub const QUALITY_STATS_FILE: &str = "sickle-trim.txt";

/// External executables driven by the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tools {
    pub adapter_trim: PathBuf,
    pub quality_trim: PathBuf,
    pub compress: PathBuf,
}

impl Default for Tools {
    fn default() -> Self {
        Tools {
            adapter_trim: PathBuf::from("scythe"),
            quality_trim: PathBuf::from("sickle"),
            compress: PathBuf::from("gzip"),
        }
    }
}

fn tool_name(tool: &Path) -> String {
    tool.file_name()
        .map_or_else(|| tool.display().to_string(), |name| name.to_string_lossy().into_owned())
}

fn check_status(tool: &Path, status: ExitStatus) -> Result<()> {
    if status.success() {
        Ok(())
    } else {
        Err(StageError::ToolFailed(tool_name(tool), status.code()).into())
    }
}

fn spawn(cmd: &mut Command, tool: &Path) -> Result<Child> {
    cmd.spawn()
        .with_context(|| format!("running {}", tool.display()))
}

/// Read files staged for a sample, in name order
pub fn stage_read_files(stage_path: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(stage_path)
        .with_context(|| format!("listing {}", stage_path.display()))?
    {
        let entry = entry?;
        if entry.file_name().to_string_lossy().contains(".fastq") {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Adapter-trims every untrimmed read file of a sample.
///
/// The sample's `adapters.fasta` is written first if absent. Each read
/// file is passed through the adapter trimmer, whose output is piped
/// straight into the compressor and lands under the same name in
/// `out_stage`. The trimmer's diagnostics go to
/// `stats/<file>-adapter-contam.txt`.
///
/// Returns the trimmed files.
pub fn adapter_trim_sample(
    sample_dir: &Path,
    tools: &Tools,
    tables: &AdapterTables,
    out_stage: StageDir,
) -> Result<Vec<PathBuf>> {
    let untrimmed = StageDir::Untrimmed.require(sample_dir)?;
    let adapter_file = adapters::write_adapter_file(sample_dir, tables)?;

    let out_dir = out_stage.create(sample_dir)?;
    let stats_dir = StageDir::Stats.create(sample_dir)?;

    let mut trimmed = Vec::new();
    for infile in stage_read_files(&untrimmed)? {
        let name = infile
            .file_name()
            .ok_or_else(|| anyhow!("bad read file name {}", infile.display()))?
            .to_string_lossy()
            .into_owned();
        let outfile = out_dir.join(&name);
        let statfile = stats_dir.join(format!("{}-adapter-contam.txt", name));

        info!("{}: trimming adapters from {}", stage_dir::sample_tag(sample_dir), name);
        adapter_trim_file(tools, &adapter_file, &infile, &outfile, &statfile)?;
        trimmed.push(outfile);
    }

    Ok(trimmed)
}

/// Runs `adapter_trim -a ADAPTERS -q sanger INFILE | compress -c > OUTFILE`
pub fn adapter_trim_file(
    tools: &Tools,
    adapter_file: &Path,
    infile: &Path,
    outfile: &Path,
    statfile: &Path,
) -> Result<()> {
    let stats = fs::File::create(statfile)
        .with_context(|| format!("creating {}", statfile.display()))?;
    let output = fs::File::create(outfile)
        .with_context(|| format!("creating {}", outfile.display()))?;

    let mut trim = spawn(
        Command::new(&tools.adapter_trim)
            .arg("-a")
            .arg(adapter_file)
            .arg("-q")
            .arg(QUALITY_ENCODING)
            .arg(infile)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::from(stats)),
        &tools.adapter_trim,
    )?;

    let trimmed = trim
        .stdout
        .take()
        .ok_or_else(|| anyhow!("no output pipe from {}", tools.adapter_trim.display()))?;

    let compress = spawn(
        Command::new(&tools.compress)
            .arg("-c")
            .stdin(Stdio::from(trimmed))
            .stdout(Stdio::from(output)),
        &tools.compress,
    );
    let mut compress = match compress {
        Ok(child) => child,
        Err(e) => {
            let _ = trim.kill();
            let _ = trim.wait();
            return Err(e);
        }
    };

    let compress_status = compress.wait()?;
    let trim_status = trim.wait()?;
    debug!(
        "{}: {} {}, {} {}",
        infile.display(),
        tool_name(&tools.adapter_trim),
        trim_status,
        tool_name(&tools.compress),
        compress_status
    );

    // A dead compressor takes the trimmer down with it (SIGPIPE), so
    // its status is the one to report
    check_status(&tools.compress, compress_status)?;
    check_status(&tools.adapter_trim, trim_status)?;
    Ok(())
}

/// Output files of the paired quality trimmer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityTrimmed {
    pub read1: PathBuf,
    pub read2: PathBuf,
    pub singleton: PathBuf,
}

/// Quality-trims the two mate files of a sample from
/// `split-adapter-trimmed/`, discarding reads with ambiguous bases.
/// The trimmer writes plain fastq into
/// `split-adapter-quality-trimmed/`, and each output is then
/// compressed in place. Diagnostics go to `stats/sickle-trim.txt`.
pub fn quality_trim_sample(sample_dir: &Path, tools: &Tools) -> Result<QualityTrimmed> {
    let tag = stage_dir::sample_tag(sample_dir);
    let split_dir = StageDir::SplitAdapterTrimmed.require(sample_dir)?;

    let in1 = split_dir.join(stage_dir::mate_name(&tag, 1));
    let in2 = split_dir.join(stage_dir::mate_name(&tag, 2));
    for input in [&in1, &in2] {
        if !input.is_file() {
            return Err(StageError::MissingStageInput(input.to_path_buf()).into());
        }
    }

    let qual_dir = StageDir::SplitAdapterQualityTrimmed.create(sample_dir)?;
    let out1 = qual_dir.join(stage_dir::mate_name_plain(&tag, 1));
    let out2 = qual_dir.join(stage_dir::mate_name_plain(&tag, 2));
    let out_single = qual_dir.join(stage_dir::singleton_name_plain(&tag));

    let statfile = StageDir::Stats.create(sample_dir)?.join(QUALITY_STATS_FILE);
    let stats = fs::File::create(&statfile)
        .with_context(|| format!("creating {}", statfile.display()))?;
    let stats_err = stats.try_clone()?;

    info!("{}: trimming low quality reads", tag);
    let status = spawn(
        Command::new(&tools.quality_trim)
            .arg("pe")
            .arg("-f")
            .arg(&in1)
            .arg("-r")
            .arg(&in2)
            .arg("-t")
            .arg(QUALITY_ENCODING)
            .arg("-o")
            .arg(&out1)
            .arg("-p")
            .arg(&out2)
            .arg("-s")
            .arg(&out_single)
            .arg("-n")
            .stdin(Stdio::null())
            .stdout(Stdio::from(stats))
            .stderr(Stdio::from(stats_err)),
        &tools.quality_trim,
    )?
    .wait()?;
    check_status(&tools.quality_trim, status)?;

    Ok(QualityTrimmed {
        read1: compress_in_place(tools, &out1)?,
        read2: compress_in_place(tools, &out2)?,
        singleton: compress_in_place(tools, &out_single)?,
    })
}

/// Compresses a file with `compress -f`, replacing it with `<file>.gz`
pub fn compress_in_place(tools: &Tools, path: &Path) -> Result<PathBuf> {
    let status = spawn(
        Command::new(&tools.compress)
            .arg("-f")
            .arg(path)
            .stdin(Stdio::null()),
        &tools.compress,
    )?
    .wait()?;
    check_status(&tools.compress, status)?;

    let mut gz = path.as_os_str().to_owned();
    gz.push(".gz");
    Ok(PathBuf::from(gz))
}
