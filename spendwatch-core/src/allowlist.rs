//! Entity allowlist — the reporting entities whose transactions are kept.
//!
//! Stored as a TOML file, either as a flat `codes` list or grouped per
//! community under `[groups]` (both may be combined):
//!
//! ```toml
//! codes = ["04358000"]
//!
//! [groups]
//! bucha = ["04360586", "26376375"]
//! ```
//!
//! Loaded once at startup and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;

use crate::domain::{EntityCode, EntityCodeError};

#[derive(Debug, Error)]
pub enum AllowlistError {
    #[error("read allowlist file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("parse allowlist TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid entity code in allowlist: {0}")]
    InvalidCode(#[from] EntityCodeError),

    #[error("allowlist is empty")]
    Empty,
}

/// On-disk shape of the allowlist.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllowlistFile {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub codes: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub groups: BTreeMap<String, Vec<String>>,
}

/// Immutable set of allowed entity codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allowlist {
    codes: BTreeSet<EntityCode>,
}

impl Allowlist {
    /// Build from raw code strings. Codes are normalized; an empty result is an error.
    pub fn from_codes<I, S>(codes: I) -> Result<Self, AllowlistError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let codes = codes
            .into_iter()
            .map(|c| EntityCode::parse(c.as_ref()))
            .collect::<Result<BTreeSet<_>, _>>()?;
        if codes.is_empty() {
            return Err(AllowlistError::Empty);
        }
        Ok(Self { codes })
    }

    /// Load an allowlist from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, AllowlistError> {
        let content = std::fs::read_to_string(path).map_err(|source| AllowlistError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse an allowlist from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, AllowlistError> {
        let file: AllowlistFile = toml::from_str(content)?;
        Self::from_allowlist_file(&file)
    }

    pub fn from_allowlist_file(file: &AllowlistFile) -> Result<Self, AllowlistError> {
        let all = file
            .codes
            .iter()
            .chain(file.groups.values().flatten());
        Self::from_codes(all)
    }

    pub fn contains(&self, code: &EntityCode) -> bool {
        self.codes.contains(code)
    }

    /// Row predicate: either party is allowlisted.
    pub fn admits(&self, payer: &EntityCode, recipient: &EntityCode) -> bool {
        self.contains(payer) || self.contains(recipient)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityCode> {
        self.codes.iter()
    }

    /// Starter file listing the Kyiv-region community bodies. Used by
    /// `config init`; at runtime the allowlist always comes from config.
    pub fn default_kyiv_region() -> AllowlistFile {
        AllowlistFile {
            codes: KYIV_REGION_CODES.iter().map(|c| c.to_string()).collect(),
            groups: BTreeMap::new(),
        }
    }
}

impl AllowlistFile {
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

const KYIV_REGION_CODES: [&str; 69] = [
    "04358000", "33800777", "04360623", "04376624", "04369848", "25299709", "04054903",
    "04363662", "04362489", "04054636", "26376375", "04360586", "04358477", "26376300",
    "34627780", "04363834", "04054866", "04054628", "04359732", "04363509", "04358508",
    "04359146", "04360617", "04359152", "04363647", "04359488", "04412395", "04361491",
    "04363876", "04360296", "04363538", "04054613", "04359873", "04363886", "04363811",
    "04359287", "04359904", "04362697", "04360600", "04362183", "04358619", "04363343",
    "04054984", "04359867", "35161650", "04054978", "04359620", "04361723", "04527520",
    "04359643", "40883878", "04358218", "04358997", "04054961", "26425731", "04360913",
    "04358916", "04054955", "04361605", "42096329", "04361284", "04054990", "35161509",
    "34446857", "04362148", "04363225", "04361628", "04362160", "05408823",
];
