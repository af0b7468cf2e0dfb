//! Filter options as supplied by the host pipeline.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use metadata::METADATA_SERVICE_ADDR;
use serde::{Deserialize, Serialize};

use crate::PluginError;

fn default_metadata_host() -> String {
    METADATA_SERVICE_ADDR.to_string()
}

/// Options recognized by the `gcp_dlp` filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    /// Info types to detect, e.g. `EMAIL_ADDRESS`. Required, non-empty.
    pub info_types: Vec<String>,
    /// Probe the metadata server to detect the platform. Off by default.
    #[serde(default)]
    pub use_metadata_service: bool,
    /// Credentials file to infer the project from, overriding the ambient lookup.
    #[serde(default)]
    pub google_credential_file: Option<PathBuf>,
    /// Explicit project id; wins over every other source.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Metadata server address.
    #[serde(default = "default_metadata_host")]
    pub metadata_host: String,
}

impl FilterConfig {
    /// Config with `info_types` and defaults for everything else.
    pub fn new<I, S>(info_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            info_types: info_types.into_iter().map(Into::into).collect(),
            use_metadata_service: false,
            google_credential_file: None,
            project_id: None,
            metadata_host: default_metadata_host(),
        }
    }

    /// Parse and validate a YAML mapping of options.
    ///
    /// # Errors
    /// [`PluginError::Yaml`] on malformed input or unknown keys,
    /// [`PluginError::Config`] on invalid values.
    pub fn from_yaml_str(s: &str) -> Result<Self, PluginError> {
        let cfg: Self = serde_yaml::from_str(s)?;
        cfg.validated()
    }

    /// Parse and validate an options value handed over by the host.
    ///
    /// # Errors
    /// As [`FilterConfig::from_yaml_str`].
    pub fn from_value(v: serde_yaml::Value) -> Result<Self, PluginError> {
        let cfg: Self = serde_yaml::from_value(v)?;
        cfg.validated()
    }

    /// Load options from a YAML file.
    ///
    /// # Errors
    /// I/O errors plus those of [`FilterConfig::from_yaml_str`].
    pub fn from_yaml_path<P: AsRef<Path>>(path: P) -> Result<Self, PluginError> {
        let f = File::open(&path)?;
        let cfg: Self = serde_yaml::from_reader(BufReader::new(f))?;
        cfg.validated()
    }

    /// Validate, normalizing empty optional values to `None`.
    ///
    /// # Errors
    /// [`PluginError::Config`] when `info_types` is empty or holds a blank name,
    /// `metadata_host` is blank, or `project_id` is whitespace only.
    pub fn validated(mut self) -> Result<Self, PluginError> {
        if self.info_types.is_empty() {
            return Err(PluginError::Config("info_types must list at least one info type".into()));
        }
        for (i, t) in self.info_types.iter_mut().enumerate() {
            let trimmed = t.trim();
            if trimmed.is_empty() {
                return Err(PluginError::Config(format!("info_types[{i}] must be non-empty")));
            }
            *t = trimmed.to_string();
        }
        if self.metadata_host.trim().is_empty() {
            return Err(PluginError::Config("metadata_host must be non-empty".into()));
        }
        self.project_id = self.project_id.filter(|p| !p.is_empty());
        if self.project_id.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(PluginError::Config("project_id must not be whitespace only".into()));
        }
        self.google_credential_file = self.google_credential_file.filter(|p| !p.as_os_str().is_empty());
        Ok(self)
    }
}
