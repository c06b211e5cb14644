use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Context, Result, anyhow};
use log::{error, info};
use rayon::prelude::*;

pub mod adapters;
pub mod conf;
pub mod external;
pub mod janitor;
pub mod mates;
pub mod plan;
pub mod sample;
pub mod stage_dir;
pub mod stager;

use crate::illumiprocessor::conf::{AdapterTables, ConfFile, ReadParams};
use crate::illumiprocessor::external::Tools;
use crate::illumiprocessor::plan::{SampleOutcome, StageFlags, StagePlan};
use crate::illumiprocessor::sample::{Sample, resolve_samples};
use crate::illumiprocessor::stager::{StageMode, stage_samples};

pub const SUMMARY_FILE: &str = "run-summary.tsv";

pub struct CLI {
    pub input: String,
    pub output: String,
    pub conf: String,
    pub rename: bool,
    pub adapter_trim: bool,
    pub quality_trim: bool,
    pub interleave: bool,
    pub remap: bool,
    pub paired: bool,
    pub copy: bool,
    pub cleanup: bool,
    pub only_cleanup: bool,
    pub cores: usize,
    pub scythe: String,
    pub sickle: String,
    pub gzip: String,
}

pub struct Config {
    output_dir: PathBuf,
    samples: Vec<Sample>,
    stage_mode: StageMode,
    flags: StageFlags,
    plan: StagePlan,
    cleanup: bool,
    only_cleanup: bool,
    workers: usize,
}

impl Config {
    /// Reads the configuration file and validates every sample's input
    /// files. Nothing is staged or trimmed yet, so any error here
    /// aborts the run before work starts.
    pub fn new(cli: &CLI) -> Result<Self> {
        let conf = ConfFile::from_path(&cli.conf)?;

        let names = conf.require_section(if cli.remap { "remap" } else { "map" })?;
        let params = ReadParams::new(&conf)?;

        let flags = StageFlags {
            adapter_trim: cli.adapter_trim,
            quality_trim: cli.quality_trim,
            interleave: cli.interleave,
            paired: cli.paired,
            separate_reads: params.separate_reads,
        };

        let tables = if cli.adapter_trim && !cli.only_cleanup {
            AdapterTables::new(&conf)?
        } else {
            AdapterTables::default()
        };

        let tools = Tools {
            adapter_trim: PathBuf::from(&cli.scythe),
            quality_trim: PathBuf::from(&cli.sickle),
            compress: PathBuf::from(&cli.gzip),
        };

        let samples = resolve_samples(Path::new(&cli.input), names, cli.remap, &params)?;
        info!("{} samples, {:?}", samples.len(), flags.mode());

        let output_dir = PathBuf::from(&cli.output);
        fs::DirBuilder::new()
            .recursive(true)
            .create(&output_dir)
            .with_context(|| format!("creating {}", output_dir.display()))?;

        Ok(Config {
            output_dir,
            samples,
            stage_mode: match (cli.rename, cli.copy) {
                (false, _) => StageMode::InPlace,
                (true, false) => StageMode::Symlink,
                (true, true) => StageMode::Copy,
            },
            flags,
            plan: StagePlan::new(&flags, tools, tables),
            cleanup: cli.cleanup,
            only_cleanup: cli.only_cleanup,
            workers: worker_count(cli.cores),
        })
    }
}

/// Pool size: the requested worker count, capped by the available
/// parallelism
pub fn worker_count(requested: usize) -> usize {
    let available = thread::available_parallelism().map_or(1, |n| n.get());
    requested.max(1).min(available)
}

/// Runs the plan for every sample, one task per sample, on up to
/// `workers` threads. A failing sample does not stop the others.
/// Outcomes are returned in sample order.
pub fn run_samples(plan: &StagePlan, sample_dirs: &[PathBuf], workers: usize) -> Result<Vec<SampleOutcome>> {
    let run_one = |sample_dir: &PathBuf| {
        let outcome = plan.run_sample(sample_dir);
        if let Err(e) = &outcome.result {
            error!("{:#}", e);
        }
        outcome
    };

    if workers <= 1 {
        Ok(sample_dirs.iter().map(run_one).collect())
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .context("starting worker pool")?;
        Ok(pool.install(|| sample_dirs.par_iter().map(run_one).collect()))
    }
}

/// Writes one tab-separated line per sample outcome, listing the
/// stage directories each sample completed
pub fn write_summary(path: &Path, outcomes: &[SampleOutcome]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;

    wtr.write_record(["sample", "status", "stages", "error"])?;
    for outcome in outcomes.iter() {
        let (status, err) = match &outcome.result {
            Ok(()) => ("ok", String::new()),
            Err(e) => ("failed", format!("{:#}", e)),
        };
        wtr.write_record([outcome.tag().as_str(), status, outcome.completed_names().as_str(), err.as_str()])?;
    }
    wtr.flush()?;

    Ok(())
}

pub fn illumiprocessor(config: Config) -> Result<()> {
    let sample_dirs = stage_samples(&config.output_dir, &config.samples, config.stage_mode)?;

    if config.only_cleanup {
        return janitor::cleanup_samples(&sample_dirs, config.flags.interleaving());
    }

    info!(
        "Running {} on {} workers",
        config
            .plan
            .stages()
            .iter()
            .map(|s| s.name())
            .collect::<Vec<&str>>()
            .join(" > "),
        config.workers
    );
    let outcomes = run_samples(&config.plan, &sample_dirs, config.workers)?;
    write_summary(&config.output_dir.join(SUMMARY_FILE), &outcomes)?;

    let (done, failed): (Vec<&SampleOutcome>, Vec<&SampleOutcome>) =
        outcomes.iter().partition(|o| o.result.is_ok());

    if config.cleanup {
        let done_dirs: Vec<PathBuf> = done.iter().map(|o| o.sample_dir.clone()).collect();
        janitor::cleanup_samples(&done_dirs, config.flags.interleaving())?;
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(anyhow!(
            "{} of {} samples failed: {}",
            failed.len(),
            outcomes.len(),
            failed
                .iter()
                .map(|o| o.tag())
                .collect::<Vec<String>>()
                .join(", ")
        ))
    }
}
