use std::io;
use std::io::Write;
use std::process;

use anyhow::{Result, anyhow};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use log::LevelFilter;

use illumi::illumiprocessor::*;

fn main() {
    if let Err(e) = wrapper() {
        let _ = io::stderr().write_all(format!("{:#}\n", e).as_bytes());
        process::exit(1);
    }
}

fn wrapper() -> Result<()> {
    let cli = get_cli()?;
    let config = Config::new(&cli)?;
    illumiprocessor(config)
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn string_arg(matches: &ArgMatches, name: &str) -> Result<String> {
    matches
        .get_one::<String>(name)
        .cloned()
        .ok_or_else(|| anyhow!("Missing argument {}", name))
}

fn get_cli() -> Result<CLI> {
    let matches = Command::new("illumiprocessor")
        .version("0.1.0")
        .author("Nick Ingolia <ingolia@berkeley.edu>")
        .about("Batch adapter and quality trimming of Illumina reads")
        .arg(
            Arg::new("input")
                .value_name("INPUT")
                .help("Directory of raw read files")
                .required(true),
        )
        .arg(
            Arg::new("output")
                .value_name("OUTPUT")
                .help("Output directory")
                .required(true),
        )
        .arg(
            Arg::new("conf")
                .value_name("CONF")
                .help("Configuration file")
                .required(true),
        )
        .arg(
            Arg::new("rename")
                .long("no-rename")
                .help("Use existing sample directories instead of staging inputs")
                .action(ArgAction::SetFalse),
        )
        .arg(
            Arg::new("adapter_trim")
                .long("no-adapter-trim")
                .help("Skip adapter trimming")
                .action(ArgAction::SetFalse),
        )
        .arg(
            Arg::new("quality_trim")
                .long("no-quality-trim")
                .help("Skip quality trimming")
                .action(ArgAction::SetFalse),
        )
        .arg(
            Arg::new("interleave")
                .long("no-interleave")
                .help("Leave quality-trimmed mates in separate files")
                .action(ArgAction::SetFalse),
        )
        .arg(
            Arg::new("remap")
                .long("remap")
                .help("Rename samples with the [remap] table")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("paired")
                .long("se")
                .help("Single-end reads")
                .action(ArgAction::SetFalse),
        )
        .arg(
            Arg::new("copy")
                .long("copy")
                .help("Copy raw files instead of linking them")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("cleanup")
                .long("cleanup")
                .help("Delete intermediate files of finished samples")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("only_cleanup")
                .long("only-cleanup")
                .help("Only delete intermediate files")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("cores")
                .long("cores")
                .value_name("N")
                .help("Number of samples processed in parallel")
                .value_parser(value_parser!(usize))
                .default_value("1"),
        )
        .arg(
            Arg::new("scythe")
                .long("scythe")
                .value_name("PATH")
                .help("Adapter trimmer executable")
                .default_value("scythe"),
        )
        .arg(
            Arg::new("sickle")
                .long("sickle")
                .value_name("PATH")
                .help("Quality trimmer executable")
                .default_value("sickle"),
        )
        .arg(
            Arg::new("gzip")
                .long("gzip")
                .value_name("PATH")
                .help("Compressor executable")
                .default_value("gzip"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("More logging, repeat for even more")
                .action(ArgAction::Count),
        )
        .get_matches();

    init_logging(matches.get_count("verbose"));

    Ok(CLI {
        input: string_arg(&matches, "input")?,
        output: string_arg(&matches, "output")?,
        conf: string_arg(&matches, "conf")?,
        rename: matches.get_flag("rename"),
        adapter_trim: matches.get_flag("adapter_trim"),
        quality_trim: matches.get_flag("quality_trim"),
        interleave: matches.get_flag("interleave"),
        remap: matches.get_flag("remap"),
        paired: matches.get_flag("paired"),
        copy: matches.get_flag("copy"),
        cleanup: matches.get_flag("cleanup"),
        only_cleanup: matches.get_flag("only_cleanup"),
        cores: matches.get_one::<usize>("cores").copied().unwrap_or(1),
        scythe: string_arg(&matches, "scythe")?,
        sickle: string_arg(&matches, "sickle")?,
        gzip: string_arg(&matches, "gzip")?,
    })
}
