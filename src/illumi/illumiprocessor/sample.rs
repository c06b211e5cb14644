use std::collections::HashSet;
use std::error;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;

use crate::illumiprocessor::conf::{Entries, ReadParams};

/// Placeholder for the raw sample tag in read name templates
pub const NAME_PLACEHOLDER: &str = "{name}";

/// How the reads of one sample arrive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PairingMode {
    SingleEnd,
    /// Paired-end, both mates interleaved in one file
    Interleaved,
    /// Paired-end, one file per mate
    Separate,
}

impl PairingMode {
    pub fn new(paired: bool, separate_reads: bool) -> Self {
        match (paired, separate_reads) {
            (false, _) => PairingMode::SingleEnd,
            (true, false) => PairingMode::Interleaved,
            (true, true) => PairingMode::Separate,
        }
    }

    pub fn is_paired(&self) -> bool {
        *self != PairingMode::SingleEnd
    }
}

/// One sample as named in the input directory and in the output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    raw_tag: String,
    tag: String,
    inputs: Vec<PathBuf>,
}

impl Sample {
    /// Tag used to find the input files
    pub fn raw_tag(&self) -> &str {
        &self.raw_tag
    }

    /// Canonical tag, used for the working directory and file names
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Raw input files, in mate order
    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.tag)
    }
}

/// Raw -> canonical tag pairs. With `remap` the entries of the remap
/// table are used as given; otherwise each key maps onto itself.
pub fn tag_pairs(names: &Entries, remap: bool) -> Vec<(String, String)> {
    names
        .iter()
        .map(|(raw, canonical)| {
            if remap {
                (raw.to_string(), canonical.to_string())
            } else {
                (raw.to_string(), raw.to_string())
            }
        })
        .collect()
}

/// Builds the validated sample list, locating every input file for
/// every sample.
///
/// # Arguments
///
/// * `input_dir` is the directory holding raw read files
///
/// * `names` is the `[map]` or `[remap]` section
///
/// * `remap` selects explicit renaming rather than the identity map
///
/// * `params` gives the read name templates
///
/// # Errors
///
/// Fails if two samples share a tag, if a name template matches no
/// file or several files, or if a required file is absent.
pub fn resolve_samples(
    input_dir: &Path,
    names: &Entries,
    remap: bool,
    params: &ReadParams,
) -> Result<Vec<Sample>> {
    let pairs = tag_pairs(names, remap);

    let mut raw_seen = HashSet::new();
    let mut tag_seen = HashSet::new();
    for (raw, tag) in pairs.iter() {
        if !raw_seen.insert(raw.as_str()) {
            return Err(ResolveError::DuplicateTag(raw.to_string()).into());
        }
        if !tag_seen.insert(tag.as_str()) {
            return Err(ResolveError::DuplicateTag(tag.to_string()).into());
        }
    }

    let mut samples = Vec::with_capacity(pairs.len());
    for (raw_tag, tag) in pairs.into_iter() {
        let inputs = params
            .templates()
            .into_iter()
            .map(|template| find_input(input_dir, template, &raw_tag))
            .collect::<Result<Vec<PathBuf>>>()?;
        samples.push(Sample {
            raw_tag,
            tag,
            inputs,
        });
    }

    Ok(samples)
}

/// Finds the unique file in `input_dir` matching `template` with the
/// raw tag substituted for `{name}`. `*` and `?` in the template are
/// shell-style wildcards over the file name.
pub fn find_input(input_dir: &Path, template: &str, raw_tag: &str) -> Result<PathBuf> {
    let (dir_part, file_part) = match template.rfind('/') {
        Some(pos) => (&template[..pos], &template[(pos + 1)..]),
        None => ("", template),
    };
    let search_dir = input_dir.join(dir_part.replace(NAME_PLACEHOLDER, raw_tag));
    let display = search_dir.join(file_part.replace(NAME_PLACEHOLDER, raw_tag));

    if !file_part.contains(['*', '?']) {
        return if display.is_file() {
            Ok(display)
        } else {
            Err(ResolveError::MissingInput(display).into())
        };
    }

    let pattern = template_regex(file_part, raw_tag)?;
    let mut matches = Vec::new();
    for entry in fs::read_dir(&search_dir)
        .with_context(|| format!("listing input directory {}", search_dir.display()))?
    {
        let entry = entry?;
        if pattern.is_match(&entry.file_name().to_string_lossy()) {
            matches.push(entry.path());
        }
    }
    matches.sort();

    match matches.len() {
        0 => Err(ResolveError::NoMatch(display).into()),
        1 => {
            let found = matches.remove(0);
            if found.is_file() {
                Ok(found)
            } else {
                Err(ResolveError::MissingInput(found).into())
            }
        }
        _ => Err(ResolveError::Ambiguous(display, matches).into()),
    }
}

fn template_regex(file_template: &str, raw_tag: &str) -> Result<Regex> {
    let mut re = String::from("^");
    for (i, part) in file_template.split(NAME_PLACEHOLDER).enumerate() {
        if i > 0 {
            re.push_str(&regex::escape(raw_tag));
        }
        for ch in part.chars() {
            match ch {
                '*' => re.push_str(".*"),
                '?' => re.push('.'),
                _ => re.push_str(&regex::escape(&ch.to_string())),
            }
        }
    }
    re.push('$');
    Ok(Regex::new(&re)?)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Name template matched nothing
    NoMatch(PathBuf),
    /// Name template matched more than one file
    Ambiguous(PathBuf, Vec<PathBuf>),
    /// Required input file is absent
    MissingInput(PathBuf),
    DuplicateTag(String),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ResolveError::NoMatch(pattern) => {
                write!(f, "Name format \"{}\" matches no file", pattern.display())
            }
            ResolveError::Ambiguous(pattern, found) => write!(
                f,
                "Name format \"{}\" matches more than one file ({})",
                pattern.display(),
                found
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<String>>()
                    .join(", ")
            ),
            ResolveError::MissingInput(path) => write!(f, "{} does not exist", path.display()),
            ResolveError::DuplicateTag(tag) => write!(f, "Sample tag \"{}\" used twice", tag),
        }
    }
}

impl error::Error for ResolveError {}
