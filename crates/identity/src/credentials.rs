//! Ambient Google credential material: where to find it and what project it names.

use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Environment variable naming the application-default credentials file.
pub const CREDENTIALS_PATH_ENV_VAR: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// System-wide application-default credentials location.
pub const SYSTEM_CREDENTIAL_FILE: &str = "/etc/google/auth/application_default_credentials.json";

static PROJECT_ID_PATTERNS: Lazy<[Regex; 2]> = Lazy::new(|| {
    [
        Regex::new(r"^.*@(?P<project_id>.+)\.iam\.gserviceaccount\.com").unwrap(),
        Regex::new(r"^(?P<project_id>\d+)-").unwrap(),
    ]
});

/// Errors reading a credentials file. Never escape the resolver chain.
#[derive(Debug, Error)]
pub enum CredentialsError {
    /// The file could not be read.
    #[error("read {}: {source}", path.display())]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The file is not a credentials JSON document.
    #[error("parse {}: {source}", path.display())]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
}

/// The subset of a credentials JSON document relevant to project resolution.
///
/// Service-account keys carry `project_id`, `client_email` and `client_id`;
/// authorized-user files only `client_id`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    /// Credential kind (`service_account`, `authorized_user`, ...).
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Project id, when the document names one directly.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Issuer of tokens minted from these credentials (service-account email).
    #[serde(rename = "client_email", default)]
    pub issuer: Option<String>,
    /// OAuth client id.
    #[serde(default)]
    pub client_id: Option<String>,
}

impl Credentials {
    /// Parse a credentials file.
    ///
    /// # Errors
    /// I/O or JSON errors, tagged with the path.
    pub fn from_path(path: &Path) -> Result<Self, CredentialsError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| CredentialsError::Io { path: path.to_path_buf(), source })?;
        serde_json::from_str(&raw)
            .map_err(|source| CredentialsError::Parse { path: path.to_path_buf(), source })
    }

    /// Project id named or implied by these credentials.
    ///
    /// A non-empty `project_id` wins; otherwise the issuer and then the client id
    /// are matched against the known id shapes (see [`extract_project_id`]).
    pub fn project_id(&self) -> Option<String> {
        if let Some(id) = self.project_id.as_deref().filter(|s| !s.is_empty()) {
            return Some(id.to_string());
        }
        [self.issuer.as_deref(), self.client_id.as_deref()]
            .into_iter()
            .flatten()
            .find_map(extract_project_id)
    }
}

/// Pull a project id out of a service-account email
/// (`name@<project>.iam.gserviceaccount.com`) or a numeric-prefixed client id
/// (`<project number>-...`).
pub fn extract_project_id(s: &str) -> Option<String> {
    PROJECT_ID_PATTERNS
        .iter()
        .find_map(|re| re.captures(s))
        .map(|caps| caps["project_id"].to_string())
}

/// gcloud's per-user application-default credentials file: `%APPDATA%\gcloud`
/// on Windows, `$HOME/.config/gcloud` on every other platform (macOS included).
fn user_credential_file() -> Option<PathBuf> {
    #[cfg(windows)]
    let gcloud = dirs::config_dir()?.join("gcloud");
    #[cfg(not(windows))]
    let gcloud = dirs::home_dir()?.join(".config").join("gcloud");
    Some(gcloud.join("application_default_credentials.json"))
}

/// Finds the ambient credentials file.
///
/// Search order: the explicitly configured file, the path in
/// `GOOGLE_APPLICATION_CREDENTIALS`, the gcloud user file, then the system file.
/// The explicit and environment paths are returned even when the file is
/// missing; reading it then fails and inference yields nothing.
#[derive(Debug, Clone, Default)]
pub struct CredentialLocator {
    explicit: Option<PathBuf>,
    env_path: Option<PathBuf>,
    well_known: Vec<PathBuf>,
}

impl CredentialLocator {
    /// Locator reading the process environment and the standard file locations.
    pub fn from_env(explicit: Option<PathBuf>) -> Self {
        let env_path = std::env::var_os(CREDENTIALS_PATH_ENV_VAR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        let mut well_known = Vec::new();
        if let Some(user) = user_credential_file() {
            well_known.push(user);
        }
        well_known.push(PathBuf::from(SYSTEM_CREDENTIAL_FILE));
        Self { explicit, env_path, well_known }
    }

    /// Locator with fully specified candidates (no environment access).
    pub fn with_candidates(
        explicit: Option<PathBuf>,
        env_path: Option<PathBuf>,
        well_known: Vec<PathBuf>,
    ) -> Self {
        Self { explicit, env_path, well_known }
    }

    /// Path of the credentials file to use, if any.
    pub fn locate(&self) -> Option<PathBuf> {
        if let Some(p) = &self.explicit {
            return Some(p.clone());
        }
        if let Some(p) = &self.env_path {
            return Some(p.clone());
        }
        let found = self.well_known.iter().find(|p| p.is_file()).cloned();
        if found.is_none() {
            debug!("no application default credentials file found");
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issuer_shape() {
        assert_eq!(
            extract_project_id("svc@my-project-123.iam.gserviceaccount.com").as_deref(),
            Some("my-project-123")
        );
    }

    #[test]
    fn client_id_shape() {
        assert_eq!(extract_project_id("123456789-abc").as_deref(), Some("123456789"));
    }

    #[test]
    fn unrecognized_shapes() {
        assert_eq!(extract_project_id("someone@example.com"), None);
        assert_eq!(extract_project_id("abc-123"), None);
        assert_eq!(extract_project_id(""), None);
    }

    #[test]
    fn issuer_is_tried_before_client_id() {
        let c = Credentials {
            issuer: Some("svc@from-issuer.iam.gserviceaccount.com".into()),
            client_id: Some("42-xyz".into()),
            ..Credentials::default()
        };
        assert_eq!(c.project_id().as_deref(), Some("from-issuer"));
    }

    #[test]
    fn client_id_used_when_issuer_does_not_match() {
        let c = Credentials {
            issuer: Some("user@example.com".into()),
            client_id: Some("42-xyz.apps.googleusercontent.com".into()),
            ..Credentials::default()
        };
        assert_eq!(c.project_id().as_deref(), Some("42"));
    }

    #[test]
    fn direct_project_id_wins() {
        let c = Credentials {
            project_id: Some("direct".into()),
            issuer: Some("svc@other.iam.gserviceaccount.com".into()),
            ..Credentials::default()
        };
        assert_eq!(c.project_id().as_deref(), Some("direct"));
    }

    #[test]
    fn nothing_matches() {
        let c = Credentials {
            issuer: Some("user@example.com".into()),
            client_id: Some("client".into()),
            ..Credentials::default()
        };
        assert_eq!(c.project_id(), None);
    }

    #[test]
    fn parses_service_account_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.json");
        fs::write(
            &path,
            r#"{"type":"service_account","client_email":"svc@proj-7.iam.gserviceaccount.com","private_key":"x"}"#,
        )
        .unwrap();
        let c = Credentials::from_path(&path).unwrap();
        assert_eq!(c.kind.as_deref(), Some("service_account"));
        assert_eq!(c.project_id().as_deref(), Some("proj-7"));
    }

    #[cfg(not(windows))]
    #[test]
    fn user_file_lives_under_home_config_gcloud() {
        let home = dirs::home_dir().expect("home directory");
        let locator = CredentialLocator::from_env(None);
        assert_eq!(
            locator.well_known.first(),
            Some(&home.join(".config/gcloud/application_default_credentials.json"))
        );
        assert_eq!(locator.well_known.last(), Some(&PathBuf::from(SYSTEM_CREDENTIAL_FILE)));
    }

    #[test]
    fn locator_prefers_explicit_then_env() {
        let l = CredentialLocator::with_candidates(
            Some("/a.json".into()),
            Some("/b.json".into()),
            vec![],
        );
        assert_eq!(l.locate(), Some(PathBuf::from("/a.json")));
        let l = CredentialLocator::with_candidates(None, Some("/b.json".into()), vec![]);
        assert_eq!(l.locate(), Some(PathBuf::from("/b.json")));
        let l = CredentialLocator::with_candidates(None, None, vec!["/nonexistent/x.json".into()]);
        assert_eq!(l.locate(), None);
    }
}
