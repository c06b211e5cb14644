use std::error;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};

use crate::illumiprocessor::conf::AdapterTables;
use crate::illumiprocessor::stage_dir;

pub const ADAPTER_FILE: &str = "adapters.fasta";

/// Placeholder for the sample index inside an adapter template
pub const INDEX_PLACEHOLDER: &str = "*";

/// Combo prefixes naming a single index-bearing adapter family
pub const INDEX_FAMILIES: [&str; 2] = ["n7", "n5"];

/// Combo substrings naming full-length adapters, indexed on every template
pub const FULL_LENGTH_MARKERS: [&str; 2] = ["truseq", "idt"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComboRule<'a> {
    /// Substitute only this adapter family's template
    Family(&'a str),
    /// Substitute every template
    FullLength,
    /// Unrecognized token, treated like a full-length one
    Other,
}

impl<'a> ComboRule<'a> {
    pub fn classify(token: &str) -> Self {
        if let Some(family) = INDEX_FAMILIES.iter().find(|fam| token.starts_with(**fam)) {
            ComboRule::Family(*family)
        } else if FULL_LENGTH_MARKERS.iter().any(|mark| token.contains(*mark)) {
            ComboRule::FullLength
        } else {
            ComboRule::Other
        }
    }
}

/// One FASTA entry of an adapter reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adapter {
    pub name: String,
    pub sequence: String,
}

impl Adapter {
    fn new(name: &str, sequence: String) -> Self {
        Adapter {
            name: name.to_string(),
            sequence,
        }
    }
}

/// Splits a `[combos]` value into its tokens
pub fn combo_tokens(combos: &str) -> Vec<&str> {
    combos
        .split(',')
        .map(str::trim)
        .filter(|tok| !tok.is_empty())
        .collect()
}

/// Builds the adapter reference for one list of combo tokens.
///
/// Tokens are taken in order. A token starting with an index family
/// marker (`n7`, `n5`) adds that family's template, with the token's
/// index sequence substituted, under the token's name. Any other token
/// substitutes its index into every template and ends the scan. The
/// templates of families no token touched are kept as they are, so an
/// empty combo list yields the raw templates.
///
/// # Errors
///
/// Fails if a token has no index sequence, or names a family with no
/// template.
pub fn compose_adapters(tokens: &[&str], tables: &AdapterTables) -> Result<Vec<Adapter>> {
    let mut family_hits: Vec<(&str, Adapter)> = Vec::new();
    let mut full_index = None;

    for token in tokens.iter() {
        let index = tables
            .indexes
            .get(*token)
            .ok_or_else(|| AdapterError::NoIndex(token.to_string()))?;

        match ComboRule::classify(token) {
            ComboRule::Family(family) => {
                let template = template(tables, family)?;
                family_hits.push((family, Adapter::new(token, template.replace(INDEX_PLACEHOLDER, index))));
            }
            rule => {
                debug!("combo {} ({:?}) indexes every adapter", token, rule);
                full_index = Some(index);
                break;
            }
        }
    }

    let mut adapters = Vec::new();
    for (family, template) in tables.adapters.iter() {
        let mut hit = false;
        for (_, adapter) in family_hits.iter().filter(|(fam, _)| fam == family) {
            adapters.push(adapter.clone());
            hit = true;
        }

        match full_index {
            Some(index) => adapters.push(Adapter::new(family, template.replace(INDEX_PLACEHOLDER, index))),
            None if !hit => adapters.push(Adapter::new(family, template.to_string())),
            None => (),
        }
    }

    Ok(adapters)
}

fn template<'t>(tables: &'t AdapterTables, family: &str) -> Result<&'t str> {
    tables
        .adapters
        .iter()
        .find(|(fam, _)| fam == family)
        .map(|(_, template)| template.as_str())
        .ok_or_else(|| AdapterError::NoTemplate(family.to_string()).into())
}

/// Formats adapters as FASTA text
pub fn adapters_fasta(adapters: &[Adapter]) -> String {
    let mut fasta = String::new();
    for adapter in adapters.iter() {
        fasta.push_str(&format!(">{}\n{}\n", adapter.name, adapter.sequence));
    }
    fasta
}

/// Writes `adapters.fasta` into a sample working directory, choosing
/// the combo list by the directory's base name. An existing file is
/// kept as is and never regenerated.
///
/// Returns the path of the adapter file.
pub fn write_adapter_file(sample_dir: &Path, tables: &AdapterTables) -> Result<PathBuf> {
    let path = sample_dir.join(ADAPTER_FILE);
    if path.exists() {
        debug!("{} exists, not regenerating", path.display());
        return Ok(path);
    }

    let key = stage_dir::sample_tag(sample_dir);
    let combos = tables
        .combos
        .get(&key)
        .ok_or_else(|| AdapterError::NoCombo(key.to_string()))?;
    let fasta = adapters_fasta(&compose_adapters(&combo_tokens(combos), tables)?);

    if create_once(&path, &fasta)? {
        info!("{}: wrote {}", key, path.display());
    }

    Ok(path)
}

/// Creates `path` holding `contents` unless it already exists, in one
/// atomic step. A concurrent writer that got there first wins.
///
/// Returns false when the file was already present.
pub fn create_once(path: &Path, contents: &str) -> Result<bool> {
    let mut file = match fs::OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            debug!("{} created concurrently", path.display());
            return Ok(false);
        }
        Err(e) => return Err(e).with_context(|| format!("creating {}", path.display())),
    };
    file.write_all(contents.as_bytes())
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(true)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    NoCombo(String),
    NoIndex(String),
    NoTemplate(String),
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AdapterError::NoCombo(key) => write!(f, "No [combos] entry for \"{}\"", key),
            AdapterError::NoIndex(token) => write!(f, "No [indexes] entry for combo \"{}\"", token),
            AdapterError::NoTemplate(family) => {
                write!(f, "No [adapters] template for family \"{}\"", family)
            }
        }
    }
}

impl error::Error for AdapterError {}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    fn tables() -> AdapterTables {
        let mut tables = AdapterTables::default();
        for (family, template) in [("n7", "GATC*GATC"), ("n5", "AATG*AATG"), ("truseq", "AGAT*CTCG")] {
            tables.adapters.push((family.to_string(), template.to_string()));
        }
        for (token, index) in [("n7-03", "ACGTACGT"), ("n5-10", "TTTTCCCC"), ("truseq-12", "CTTGTA"), ("custom", "GGGG")] {
            tables.indexes.insert(token.to_string(), index.to_string());
        }
        tables.combos.insert("A".to_string(), "n7-03".to_string());
        tables
    }

    #[test]
    fn classify_tokens() {
        assert!(ComboRule::classify("n7-03") == ComboRule::Family("n7"));
        assert!(ComboRule::classify("n5-10") == ComboRule::Family("n5"));
        assert!(ComboRule::classify("truseq-12") == ComboRule::FullLength);
        assert!(ComboRule::classify("idt-i7-5") == ComboRule::FullLength);
        assert!(ComboRule::classify("custom") == ComboRule::Other);
    }

    #[test]
    fn single_family() {
        let fasta = adapters_fasta(&compose_adapters(&["n7-03"], &tables()).unwrap());
        assert!(fasta == ">n7-03\nGATCACGTACGTGATC\n>n5\nAATG*AATG\n>truseq\nAGAT*CTCG\n");
    }

    #[test]
    fn dual_family() {
        let fasta = adapters_fasta(&compose_adapters(&["n7-03", "n5-10"], &tables()).unwrap());
        assert!(fasta == ">n7-03\nGATCACGTACGTGATC\n>n5-10\nAATGTTTTCCCCAATG\n>truseq\nAGAT*CTCG\n");
    }

    #[test]
    fn full_length_stops() {
        let adapters = compose_adapters(&["truseq-12", "n7-03"], &tables()).unwrap();
        let fasta = adapters_fasta(&adapters);
        assert!(fasta == ">n7\nGATCCTTGTAGATC\n>n5\nAATGCTTGTAAATG\n>truseq\nAGATCTTGTACTCG\n");

        let other = compose_adapters(&["custom"], &tables()).unwrap();
        assert!(other.iter().all(|a| a.sequence.contains("GGGG")));
    }

    #[test]
    fn raw_fallback() {
        let adapters = compose_adapters(&[], &tables()).unwrap();
        assert!(adapters_fasta(&adapters) == ">n7\nGATC*GATC\n>n5\nAATG*AATG\n>truseq\nAGAT*CTCG\n");
    }

    #[test]
    fn deterministic() {
        let tokens = combo_tokens("n5-10, n7-03,");
        assert!(tokens == vec!["n5-10", "n7-03"]);
        let one = compose_adapters(&tokens, &tables()).unwrap();
        let two = compose_adapters(&tokens, &tables()).unwrap();
        assert!(one == two);
    }

    #[test]
    fn lookup_errors() {
        let err = compose_adapters(&["n7-99"], &tables()).unwrap_err();
        assert!(err.downcast_ref::<AdapterError>() == Some(&AdapterError::NoIndex("n7-99".to_string())));

        let tmp = TempDir::new().unwrap();
        let err = write_adapter_file(&tmp.path().join("B"), &tables()).unwrap_err();
        assert!(err.downcast_ref::<AdapterError>() == Some(&AdapterError::NoCombo("B".to_string())));
    }

    #[test]
    fn written_once() {
        let tmp = TempDir::new().unwrap();
        let sample_dir = tmp.path().join("A");
        fs::create_dir(&sample_dir).unwrap();

        let path = write_adapter_file(&sample_dir, &tables()).unwrap();
        assert!(fs::read_to_string(&path).unwrap().starts_with(">n7-03\nGATCACGTACGTGATC\n"));

        fs::write(&path, ">kept\nA\n").unwrap();
        let again = write_adapter_file(&sample_dir, &tables()).unwrap();
        assert!(again == path);
        assert!(fs::read_to_string(&path).unwrap() == ">kept\nA\n");
    }

    #[test]
    fn lost_create_race() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(ADAPTER_FILE);

        assert!(create_once(&path, ">first\nA\n").unwrap());
        assert!(!create_once(&path, ">second\nC\n").unwrap());
        assert!(fs::read_to_string(&path).unwrap() == ">first\nA\n");
    }
}
