use std::collections::HashMap;
use std::error;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;

/// Ordered `key -> value` entries of one configuration section
pub type Entries = Vec<(String, String)>;

/// Parsed INI-style configuration file. Sections and the entries
/// within them keep their file order; keys keep their case.
#[derive(Debug, Clone, Default)]
pub struct ConfFile {
    sections: Vec<(String, Entries)>,
}

impl ConfFile {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let txt = fs::read_to_string(path)
            .with_context(|| format!("reading configuration {}", path.display()))?;
        Self::parse(&txt).with_context(|| format!("parsing configuration {}", path.display()))
    }

    pub fn parse(txt: &str) -> Result<Self> {
        let section_re = Regex::new(r"^\[\s*([^\]]+?)\s*\]$")?;
        let entry_re = Regex::new(r"^([^:=]+?)\s*[:=]\s*(.*)$")?;

        let mut conf = ConfFile::default();

        for (lineno, raw) in txt.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(caps) = section_re.captures(line) {
                let name = caps[1].to_string();
                if conf.section(&name).is_some() {
                    return Err(ConfError::DuplicateSection(name).into());
                }
                conf.sections.push((name, Vec::new()));
            } else if let Some(caps) = entry_re.captures(line) {
                let (_, entries) = conf
                    .sections
                    .last_mut()
                    .ok_or_else(|| ConfError::BadLine(lineno + 1, raw.to_string()))?;
                let key = caps[1].to_string();
                if entries.iter().any(|(k, _)| *k == key) {
                    return Err(ConfError::DuplicateKey(lineno + 1, key).into());
                }
                entries.push((key, caps[2].trim().to_string()));
            } else {
                return Err(ConfError::BadLine(lineno + 1, raw.to_string()).into());
            }
        }

        Ok(conf)
    }

    pub fn section(&self, name: &str) -> Option<&Entries> {
        self.sections
            .iter()
            .find(|(sect, _)| sect == name)
            .map(|(_, entries)| entries)
    }

    pub fn require_section(&self, name: &str) -> Result<&Entries> {
        self.section(name)
            .ok_or_else(|| ConfError::MissingSection(name.to_string()).into())
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section)?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn require(&self, section: &str, key: &str) -> Result<&str> {
        self.require_section(section)?;
        self.get(section, key)
            .ok_or_else(|| ConfError::MissingKey(section.to_string(), key.to_string()).into())
    }

    pub fn require_bool(&self, section: &str, key: &str) -> Result<bool> {
        let value = self.require(section, key)?;
        match value.to_ascii_lowercase().as_str() {
            "1" | "yes" | "true" | "on" => Ok(true),
            "0" | "no" | "false" | "off" => Ok(false),
            _ => Err(ConfError::BadBool(key.to_string(), value.to_string()).into()),
        }
    }
}

/// How raw read files are named in the input directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadParams {
    pub separate_reads: bool,
    pub read1: String,
    pub read2: Option<String>,
}

impl ReadParams {
    pub fn new(conf: &ConfFile) -> Result<Self> {
        let separate_reads = conf.require_bool("params", "separate reads")?;
        let read1 = conf.require("params", "read1")?.to_string();
        let read2 = if separate_reads {
            Some(conf.require("params", "read2")?.to_string())
        } else {
            None
        };

        Ok(ReadParams {
            separate_reads,
            read1,
            read2,
        })
    }

    /// Name templates for each input file of a sample, in mate order
    pub fn templates(&self) -> Vec<&str> {
        let mut templates = vec![self.read1.as_str()];
        if let Some(read2) = &self.read2 {
            templates.push(read2.as_str());
        }
        templates
    }
}

/// Configuration sections used to build per-sample adapter files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterTables {
    pub combos: HashMap<String, String>,
    pub indexes: HashMap<String, String>,
    pub adapters: Entries,
}

impl AdapterTables {
    pub fn new(conf: &ConfFile) -> Result<Self> {
        Ok(AdapterTables {
            combos: conf.require_section("combos")?.iter().cloned().collect(),
            indexes: conf.require_section("indexes")?.iter().cloned().collect(),
            adapters: conf.require_section("adapters")?.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfError {
    BadLine(usize, String),
    DuplicateSection(String),
    DuplicateKey(usize, String),
    MissingSection(String),
    MissingKey(String, String),
    BadBool(String, String),
}

impl fmt::Display for ConfError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfError::BadLine(lineno, line) => {
                write!(f, "Bad configuration line {}: \"{}\"", lineno, line)
            }
            ConfError::DuplicateSection(name) => write!(f, "Duplicate section [{}]", name),
            ConfError::DuplicateKey(lineno, key) => {
                write!(f, "Duplicate key \"{}\" on line {}", key, lineno)
            }
            ConfError::MissingSection(name) => write!(f, "Missing section [{}]", name),
            ConfError::MissingKey(sect, key) => write!(f, "Missing \"{}\" in [{}]", key, sect),
            ConfError::BadBool(key, value) => {
                write!(f, "Bad boolean for \"{}\": \"{}\"", key, value)
            }
        }
    }
}

impl error::Error for ConfError {}
