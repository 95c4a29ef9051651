//! Backend option schema and parsed option values
//!
//! Each backend declares its knobs as an [`OptionSchema`]. The driver's generic
//! argument parser feeds raw `name=value` pairs through [`OptionSchema::parse`]
//! and hands the resulting [`OptionValues`] to the backend at initialize.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Whether an option must be set before the backend initializes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgRequirement {
    Required,
    Optional,
}

/// Type of the option's argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionKind {
    String,
    Integer,
    /// Takes no argument; presence means `true`
    Flag,
}

impl OptionKind {
    /// Single-character type code used in help output
    pub fn code(&self) -> char {
        match self {
            OptionKind::String => 's',
            OptionKind::Integer => 'd',
            OptionKind::Flag => 'b',
        }
    }
}

/// One declared option
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionEntry {
    /// Fully qualified name, e.g. `INFINIFS.prefix`
    pub name: &'static str,

    /// Help text
    pub help: &'static str,

    pub requirement: ArgRequirement,

    pub kind: OptionKind,

    /// Value used when the option is optional and unset
    pub default: Option<&'static str>,
}

impl OptionEntry {
    pub const fn required(name: &'static str, help: &'static str, kind: OptionKind) -> Self {
        Self {
            name,
            help,
            requirement: ArgRequirement::Required,
            kind,
            default: None,
        }
    }

    pub const fn optional(
        name: &'static str,
        help: &'static str,
        kind: OptionKind,
        default: Option<&'static str>,
    ) -> Self {
        Self {
            name,
            help,
            requirement: ArgRequirement::Optional,
            kind,
            default,
        }
    }

    fn parse_value(&self, raw: &str) -> Result<OptionValue> {
        match self.kind {
            OptionKind::String => Ok(OptionValue::String(raw.to_string())),
            OptionKind::Integer => {
                raw.trim()
                    .parse::<i64>()
                    .map(OptionValue::Integer)
                    .map_err(|e| Error::InvalidOption {
                        option: self.name.to_string(),
                        message: format!("expected an integer, got {:?}: {}", raw, e),
                    })
            }
            OptionKind::Flag => match raw.trim() {
                "" | "1" | "true" | "yes" | "on" => Ok(OptionValue::Flag(true)),
                "0" | "false" | "no" | "off" => Ok(OptionValue::Flag(false)),
                other => Err(Error::InvalidOption {
                    option: self.name.to_string(),
                    message: format!("expected a boolean, got {:?}", other),
                }),
            },
        }
    }
}

/// A parsed option value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    String(String),
    Integer(i64),
    Flag(bool),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::String(s) => f.write_str(s),
            OptionValue::Integer(i) => write!(f, "{}", i),
            OptionValue::Flag(b) => write!(f, "{}", b),
        }
    }
}

/// Option declarations for one backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OptionSchema {
    entries: Vec<OptionEntry>,
}

impl OptionSchema {
    pub fn new(entries: Vec<OptionEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[OptionEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&OptionEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Parse raw `name`/`value` pairs against this schema
    ///
    /// Unknown names and malformed values are rejected. Later pairs override
    /// earlier ones.
    pub fn parse<I, K, V>(&self, pairs: I) -> Result<OptionValues>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut values = OptionValues::default();
        for (name, raw) in pairs {
            let name = name.as_ref();
            let entry = self.get(name).ok_or_else(|| Error::UnknownOption {
                option: name.to_string(),
            })?;
            values.set(entry.name, entry.parse_value(raw.as_ref())?);
        }
        Ok(values)
    }

    /// Required options that `values` leaves unset
    pub fn missing(&self, values: &OptionValues) -> Vec<&'static str> {
        self.entries
            .iter()
            .filter(|e| e.requirement == ArgRequirement::Required && !values.contains(e.name))
            .map(|e| e.name)
            .collect()
    }

    /// Resolve `values` with defaults for unset optional entries
    pub fn with_defaults(&self, values: &OptionValues) -> Result<OptionValues> {
        let mut resolved = values.clone();
        for entry in &self.entries {
            if resolved.contains(entry.name) {
                continue;
            }
            if let Some(default) = entry.default {
                resolved.set(entry.name, entry.parse_value(default)?);
            } else if entry.kind == OptionKind::Flag {
                resolved.set(entry.name, OptionValue::Flag(false));
            }
        }
        Ok(resolved)
    }

    /// One line per option, for the driver's `--help`
    pub fn help(&self) -> String {
        self.entries
            .iter()
            .map(|e| {
                let req = match e.requirement {
                    ArgRequirement::Required => "required",
                    ArgRequirement::Optional => "optional",
                };
                match e.default {
                    Some(d) => format!(
                        "  --{} ({}, {}) {} [default: {}]",
                        e.name,
                        e.kind.code(),
                        req,
                        e.help,
                        d
                    ),
                    None => format!("  --{} ({}, {}) {}", e.name, e.kind.code(), req, e.help),
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Parsed option values keyed by option name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionValues {
    values: BTreeMap<String, OptionValue>,
}

impl OptionValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: OptionValue) {
        self.values.insert(name.into(), value);
    }

    /// Builder-style string setter
    pub fn with_str(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, OptionValue::String(value.into()));
        self
    }

    /// Builder-style flag setter
    pub fn with_flag(mut self, name: impl Into<String>, value: bool) -> Self {
        self.set(name, OptionValue::Flag(value));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.values.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(OptionValue::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(OptionValue::Integer(i)) => Some(*i),
            _ => None,
        }
    }

    /// Flag value; unset counts as `false`
    pub fn get_flag(&self, name: &str) -> bool {
        matches!(self.values.get(name), Some(OptionValue::Flag(true)))
    }

    /// String value or `MissingOption`
    pub fn require_str(&self, name: &str) -> Result<&str> {
        self.get_str(name).ok_or_else(|| Error::MissingOption {
            option: name.to_string(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}
