//! Mapper configuration.
//!
//! Precedence: explicit path > `NEXUSMAP_CONFIG` > `./nexusmap.toml` > defaults, then the
//! `NEXUSMAP_MAX_DEPTH` / `NEXUSMAP_CONVERT_OBJECT_IDS` environment overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{MappingError, Result};

pub const CONFIG_ENV: &str = "NEXUSMAP_CONFIG";
pub const MAX_DEPTH_ENV: &str = "NEXUSMAP_MAX_DEPTH";
pub const CONVERT_OBJECT_IDS_ENV: &str = "NEXUSMAP_CONVERT_OBJECT_IDS";
pub const DEFAULT_FILE: &str = "nexusmap.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Maximum nesting the mappers descend before failing.
    pub max_depth: usize,
    /// Convert 24-hex identifier strings to native object ids.
    pub convert_object_ids: bool,
    /// Type discriminator key that is never written into queries.
    pub type_key: String,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self { max_depth: 64, convert_object_ids: true, type_key: "_class".to_string() }
    }
}

impl MapperConfig {
    /// Parses a TOML document; missing keys keep their defaults.
    ///
    /// # Errors
    /// Returns `Config` if the text is not valid TOML for this structure.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(s).map_err(|e| MappingError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// # Errors
    /// Returns `Io` if the file cannot be read, `Config` if it does not parse.
    pub fn from_file(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| MappingError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&s)
    }

    /// Loads the first existing config file by precedence, then applies env overrides.
    ///
    /// An explicit path that does not exist is an error; the implicit locations are optional.
    ///
    /// # Errors
    /// Returns an error if a selected file cannot be read or parsed, or an override is invalid.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(p) = explicit
            && !p.exists()
        {
            return Err(MappingError::Config(format!("config file {} not found", p.display())));
        }
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(p) = explicit {
            candidates.push(p.to_path_buf());
        }
        if let Ok(p) = std::env::var(CONFIG_ENV) {
            candidates.push(PathBuf::from(p));
        }
        if let Ok(cur) = std::env::current_dir() {
            candidates.push(cur.join(DEFAULT_FILE));
        }
        let mut cfg = match candidates.iter().find(|p| p.exists()) {
            Some(p) => {
                log::debug!("loading mapper config from {}", p.display());
                Self::from_file(p)?
            }
            None => Self::default(),
        };
        cfg.apply_env()?;
        Ok(cfg)
    }

    /// # Errors
    /// Returns `Config` if an override does not parse.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(s) = std::env::var(MAX_DEPTH_ENV) {
            self.max_depth = s
                .trim()
                .parse()
                .map_err(|_| MappingError::Config(format!("{MAX_DEPTH_ENV}: invalid depth '{s}'")))?;
        }
        if let Ok(s) = std::env::var(CONVERT_OBJECT_IDS_ENV) {
            self.convert_object_ids = match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(MappingError::Config(format!(
                        "{CONVERT_OBJECT_IDS_ENV}: invalid flag '{s}'"
                    )));
                }
            };
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(MappingError::Config("max_depth must be at least 1".into()));
        }
        if self.type_key.is_empty() {
            return Err(MappingError::Config("type_key must not be empty".into()));
        }
        Ok(())
    }
}
