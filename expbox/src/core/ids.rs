//! Experiment id generation.
//!
//! The id doubles as the directory name under the results root, so the
//! timestamp part is fixed-width and ids sort by creation time.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ExpboxError, Result};

const DATETIME_FMT: &str = "%y%m%d-%H%M";
const DATE_FMT: &str = "%y%m%d";

/// Base id style. `Seq` and `Rand` are reserved and currently produce the
/// same stamp as `Datetime`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdStyle {
    #[default]
    Datetime,
    Date,
    Seq,
    Rand,
}

impl FromStr for IdStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "datetime" => Ok(Self::Datetime),
            "date" => Ok(Self::Date),
            "seq" => Ok(Self::Seq),
            "rand" => Ok(Self::Rand),
            other => Err(format!("unknown id style '{other}'")),
        }
    }
}

/// Separator used to attach prefix and suffix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStyle {
    #[default]
    Kebab,
    Snake,
}

impl LinkStyle {
    fn separator(self) -> char {
        match self {
            Self::Kebab => '-',
            Self::Snake => '_',
        }
    }
}

impl FromStr for LinkStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kebab" | "-" => Ok(Self::Kebab),
            "snake" | "_" => Ok(Self::Snake),
            other => Err(format!("unknown link style '{other}'")),
        }
    }
}

impl fmt::Display for LinkStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kebab => f.write_str("kebab"),
            Self::Snake => f.write_str("snake"),
        }
    }
}

/// Inputs for id generation.
#[derive(Debug, Clone, Default)]
pub struct IdSpec {
    pub style: IdStyle,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub link_style: LinkStyle,
}

/// Generate an id stamped with the current UTC time.
pub fn generate_exp_id(spec: &IdSpec) -> String {
    generate_exp_id_at(spec, Utc::now())
}

/// Generate an id for an explicit instant.
pub fn generate_exp_id_at(spec: &IdSpec, now: DateTime<Utc>) -> String {
    let base = match spec.style {
        IdStyle::Date => now.format(DATE_FMT).to_string(),
        IdStyle::Datetime | IdStyle::Seq | IdStyle::Rand => now.format(DATETIME_FMT).to_string(),
    };
    decorate(base, spec)
}

/// Attach prefix/suffix to an id produced by a caller-supplied generator.
pub fn generate_exp_id_with<F>(spec: &IdSpec, generator: F) -> String
where
    F: FnOnce() -> String,
{
    decorate(generator(), spec)
}

fn decorate(base: String, spec: &IdSpec) -> String {
    let mut full = base;
    if let Some(prefix) = spec.prefix.as_deref().filter(|p| !p.is_empty()) {
        full = link(prefix, &full, spec.link_style);
    }
    if let Some(suffix) = spec.suffix.as_deref().filter(|s| !s.is_empty()) {
        full = link(&full, suffix, spec.link_style);
    }
    full
}

/// Join two segments; an empty side degrades to the other one.
fn link(a: &str, b: &str, style: LinkStyle) -> String {
    match (a.is_empty(), b.is_empty()) {
        (true, _) => b.to_string(),
        (_, true) => a.to_string(),
        _ => format!("{a}{}{b}", style.separator()),
    }
}

/// Reject ids that cannot be used as a single directory name.
pub fn validate_exp_id(id: &str) -> Result<()> {
    let bad = id.trim().is_empty()
        || id == "."
        || id == ".."
        || id.contains(['/', '\\', '\0'])
        || id != id.trim();
    if bad {
        return Err(ExpboxError::InvalidId(id.to_string()));
    }
    Ok(())
}
