//! Ordered pattern tables.
//!
//! `VendorRegistry` labels a source document with its manufacturer; the first
//! matching rule wins and no match yields no label. `PatternTable` is the
//! label-less form used by the query classifier.

use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

use figment::providers::{Format, Toml};
use figment::Figment;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
struct Rule {
    pattern: Regex,
    label: String,
}

#[derive(Debug, Clone, Default)]
pub struct VendorRegistry {
    rules: Vec<Rule>,
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    vendor: Vec<VendorEntry>,
}

#[derive(Debug, Deserialize)]
struct VendorEntry {
    name: String,
    #[serde(default)]
    patterns: Vec<String>,
}

impl VendorRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from `(pattern, label)` pairs in priority order.
    /// Patterns that fail to compile are skipped with a warning.
    pub fn from_rules<I, P, L>(rules: I) -> Self
    where
        I: IntoIterator<Item = (P, L)>,
        P: AsRef<str>,
        L: Into<String>,
    {
        let mut out = Vec::new();
        for (pattern, label) in rules {
            let label = label.into();
            match Regex::new(pattern.as_ref()) {
                Ok(pattern) => out.push(Rule { pattern, label }),
                Err(e) => warn!(vendor = %label, pattern = pattern.as_ref(), error = %e, "invalid vendor pattern skipped"),
            }
        }
        Self { rules: out }
    }

    /// Load a TOML registry of `[[vendor]] name = "..", patterns = [..]` tables.
    ///
    /// A missing file disables vendor detection rather than failing.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "vendor registry not found; vendor detection disabled");
            return Ok(Self::empty());
        }
        let file: RegistryFile = Figment::new()
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| Error::InvalidConfig(format!("vendor registry {}: {e}", path.display())))?;
        let registry = Self::from_rules(
            file.vendor
                .into_iter()
                .flat_map(|v| {
                    let name = v.name;
                    v.patterns.into_iter().map(move |p| (p, name.clone()))
                }),
        );
        debug!(rules = registry.len(), "loaded vendor registry");
        Ok(registry)
    }

    pub fn detect(&self, source: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|r| r.pattern.is_match(source))
            .map(|r| r.label.as_str())
    }

    pub fn len(&self) -> usize { self.rules.len() }
    pub fn is_empty(&self) -> bool { self.rules.is_empty() }
}

/// Case-insensitive patterns checked in order; matches if any rule matches.
#[derive(Debug, Clone)]
pub struct PatternTable {
    rules: Vec<Regex>,
}

impl PatternTable {
    pub fn case_insensitive(patterns: &[&str]) -> Result<Self> {
        let rules = patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| Error::InvalidConfig(format!("pattern {p:?}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn first_match(&self, text: &str) -> Option<usize> {
        self.rules.iter().position(|r| r.is_match(text))
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.first_match(text).is_some()
    }
}
