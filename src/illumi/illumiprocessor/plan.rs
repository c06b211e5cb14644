use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{info, warn};

use crate::illumiprocessor::conf::AdapterTables;
use crate::illumiprocessor::external::{self, Tools};
use crate::illumiprocessor::mates;
use crate::illumiprocessor::sample::PairingMode;
use crate::illumiprocessor::stage_dir::{self, StageDir};

/// Which parts of the pipeline are switched on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageFlags {
    pub adapter_trim: bool,
    pub quality_trim: bool,
    pub interleave: bool,
    pub paired: bool,
    /// Mates arrive as two files rather than one interleaved file
    pub separate_reads: bool,
}

impl StageFlags {
    pub fn mode(&self) -> PairingMode {
        PairingMode::new(self.paired, self.separate_reads)
    }

    /// True when quality-trimmed mates get interleaved, which makes
    /// them intermediate files
    pub fn interleaving(&self) -> bool {
        self.mode().is_paired() && self.interleave
    }
}

/// One processing stage of a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Adapter trimming of `untrimmed/` into the given directory
    AdapterTrim(StageDir),
    /// Split one interleaved file into mate files
    Split,
    /// Paired quality trimming
    QualityTrim,
    /// Re-interleave quality-trimmed mates
    Interleave,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::AdapterTrim(_) => "adapter-trim",
            Stage::Split => "split",
            Stage::QualityTrim => "quality-trim",
            Stage::Interleave => "interleave",
        }
    }

    /// Directory the stage writes into
    pub fn output(&self) -> StageDir {
        match self {
            Stage::AdapterTrim(out) => *out,
            Stage::Split => StageDir::SplitAdapterTrimmed,
            Stage::QualityTrim => StageDir::SplitAdapterQualityTrimmed,
            Stage::Interleave => StageDir::InterleavedAdapterQualityTrimmed,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Builds the ordered stage list for a set of flags.
///
/// Adapter trimming writes to `split-adapter-trimmed/` directly when
/// mates come as two files, and only interleaved paired-end input
/// needs splitting. Quality trimming and interleaving exist only for
/// paired-end reads.
pub fn build_stages(flags: &StageFlags) -> Vec<Stage> {
    let mut stages = Vec::new();
    let mode = flags.mode();

    if flags.adapter_trim {
        stages.push(Stage::AdapterTrim(if flags.separate_reads {
            StageDir::SplitAdapterTrimmed
        } else {
            StageDir::AdapterTrimmed
        }));
    }

    if flags.quality_trim {
        match mode {
            PairingMode::Interleaved => {
                stages.push(Stage::Split);
                stages.push(Stage::QualityTrim);
            }
            PairingMode::Separate => stages.push(Stage::QualityTrim),
            PairingMode::SingleEnd => warn!("No quality trimming for single-end reads"),
        }
    }

    if flags.interleaving() {
        stages.push(Stage::Interleave);
    }

    stages
}

/// Stage list together with everything the stages need to run. Shared
/// read-only by all workers.
#[derive(Debug, Clone)]
pub struct StagePlan {
    stages: Vec<Stage>,
    tools: Tools,
    tables: AdapterTables,
}

impl StagePlan {
    pub fn new(flags: &StageFlags, tools: Tools, tables: AdapterTables) -> Self {
        StagePlan {
            stages: build_stages(flags),
            tools,
            tables,
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Runs every stage, in order, for one sample working directory.
    /// Stops at the first failing stage.
    pub fn run_sample(&self, sample_dir: &Path) -> SampleOutcome {
        let tag = stage_dir::sample_tag(sample_dir);
        let mut outcome = SampleOutcome {
            sample_dir: sample_dir.to_path_buf(),
            completed: Vec::new(),
            result: Ok(()),
        };

        for stage in self.stages.iter() {
            if let Err(e) = self.run_stage(*stage, sample_dir) {
                outcome.result = Err(e.context(format!("{}: {} failed", tag, stage)));
                return outcome;
            }
            outcome.completed.push(stage.output());
        }

        info!("{}: done", tag);
        outcome
    }

    fn run_stage(&self, stage: Stage, sample_dir: &Path) -> Result<()> {
        match stage {
            Stage::AdapterTrim(out) => {
                external::adapter_trim_sample(sample_dir, &self.tools, &self.tables, out)?;
            }
            Stage::Split => {
                mates::split_sample(sample_dir)?;
            }
            Stage::QualityTrim => {
                external::quality_trim_sample(sample_dir, &self.tools)?;
            }
            Stage::Interleave => {
                mates::interleave_sample(sample_dir)?;
            }
        }
        Ok(())
    }
}

/// Result of running one sample's stage list
#[derive(Debug)]
pub struct SampleOutcome {
    pub sample_dir: PathBuf,
    /// Output directories of the stages that finished, in order
    pub completed: Vec<StageDir>,
    pub result: Result<()>,
}

impl SampleOutcome {
    pub fn tag(&self) -> String {
        stage_dir::sample_tag(&self.sample_dir)
    }

    /// Completed stage directory names, comma separated
    pub fn completed_names(&self) -> String {
        self.completed
            .iter()
            .map(|dir| dir.name())
            .collect::<Vec<&str>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    use crate::illumiprocessor::stage_dir::StageError;

    fn flags(separate_reads: bool) -> StageFlags {
        StageFlags {
            adapter_trim: true,
            quality_trim: true,
            interleave: true,
            paired: true,
            separate_reads,
        }
    }

    #[test]
    fn interleaved_input() {
        assert!(
            build_stages(&flags(false))
                == vec![
                    Stage::AdapterTrim(StageDir::AdapterTrimmed),
                    Stage::Split,
                    Stage::QualityTrim,
                    Stage::Interleave
                ]
        );
    }

    #[test]
    fn separate_input() {
        assert!(
            build_stages(&flags(true))
                == vec![
                    Stage::AdapterTrim(StageDir::SplitAdapterTrimmed),
                    Stage::QualityTrim,
                    Stage::Interleave
                ]
        );
    }

    #[test]
    fn single_end() {
        let se = StageFlags {
            paired: false,
            ..flags(false)
        };
        assert!(build_stages(&se) == vec![Stage::AdapterTrim(StageDir::AdapterTrimmed)]);
        assert!(!se.interleaving());
    }

    #[test]
    fn partial_flags() {
        let no_adapter = StageFlags {
            adapter_trim: false,
            interleave: false,
            ..flags(true)
        };
        assert!(build_stages(&no_adapter) == vec![Stage::QualityTrim]);

        let no_quality = StageFlags {
            quality_trim: false,
            ..flags(false)
        };
        assert!(
            build_stages(&no_quality)
                == vec![Stage::AdapterTrim(StageDir::AdapterTrimmed), Stage::Interleave]
        );
    }

    #[test]
    fn stage_outputs() {
        let names: Vec<&str> = build_stages(&flags(false))
            .iter()
            .map(|s| s.output().name())
            .collect();
        assert!(
            names
                == vec![
                    "adapter-trimmed",
                    "split-adapter-trimmed",
                    "split-adapter-quality-trimmed",
                    "interleaved-adapter-quality-trimmed"
                ]
        );
    }

    #[test]
    fn stops_at_missing_predecessor() {
        let tmp = TempDir::new().unwrap();
        let plan = StagePlan::new(
            &StageFlags {
                adapter_trim: false,
                ..flags(false)
            },
            Tools::default(),
            AdapterTables::default(),
        );
        assert!(plan.stages()[0] == Stage::Split);

        let outcome = plan.run_sample(tmp.path());
        assert!(outcome.completed.is_empty());
        let err = outcome.result.unwrap_err();
        assert!(
            err.downcast_ref::<StageError>()
                == Some(&StageError::MissingStageInput(tmp.path().join("adapter-trimmed")))
        );
        assert!(!tmp.path().join("split-adapter-quality-trimmed").exists());
    }

    #[cfg(unix)]
    #[test]
    fn records_completed_stages() {
        use bio::io::fastq;

        use crate::fastq_io::GzFastqWriter;

        let tmp = TempDir::new().unwrap();
        let sample_dir = tmp.path().join("E");
        let qual = StageDir::SplitAdapterQualityTrimmed.create(&sample_dir).unwrap();
        for (name, desc) in [("E-READ1.fastq.gz", "1:N"), ("E-READ2.fastq.gz", "2:N"), ("E-READ-singleton.fastq.gz", "1:N")] {
            let mut writer = GzFastqWriter::create(qual.join(name)).unwrap();
            writer
                .write_record(&fastq::Record::with_attrs("e1", Some(desc), b"ACGT", b"IIII"))
                .unwrap();
            writer.finish().unwrap();
        }

        let plan = StagePlan::new(
            &StageFlags {
                adapter_trim: false,
                quality_trim: false,
                ..flags(true)
            },
            Tools::default(),
            AdapterTables::default(),
        );
        let outcome = plan.run_sample(&sample_dir);
        assert!(outcome.result.is_ok());
        assert!(outcome.completed == vec![StageDir::InterleavedAdapterQualityTrimmed]);
        assert!(outcome.completed_names() == "interleaved-adapter-quality-trimmed");
        assert!(outcome.tag() == "E");
    }
}
