//! Project id resolution.
//!
//! The project that scopes DLP requests is resolved once at start-up from an
//! ordered chain of sources; the first one that yields a non-empty id wins:
//! 1) the operator-configured `project_id`
//! 2) inference from the ambient credentials file
//! 3) the GCE metadata server (only when running on GCE)
//!
//! No source ever fails the chain: unreadable credentials or an unreachable
//! metadata server are logged and treated as "no id from here".

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod credentials;

use std::fmt;

use dlp_core::platform::Platform;
use metadata::MetadataClient;
use tracing::{debug, info, warn};

pub use credentials::{extract_project_id, CredentialLocator, Credentials};

/// Metadata path holding the project id on GCE.
pub const PROJECT_ID_METADATA_PATH: &str = "project/project-id";

/// A resolved, non-empty project id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectId(String);

impl ProjectId {
    /// Wrap `id`; `None` when it is empty or all whitespace.
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            None
        } else {
            Some(Self(id))
        }
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Request scope for this project (`projects/<id>`).
    pub fn parent(&self) -> String {
        format!("projects/{}", self.0)
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One link of the resolution chain.
pub trait ProjectIdSource {
    /// Short label used in logs.
    fn name(&self) -> &'static str;
    /// The id this source can offer, if any.
    fn project_id(&self) -> Option<ProjectId>;
}

/// Operator-supplied id, used verbatim.
#[derive(Debug, Clone)]
pub struct Configured(pub Option<String>);

impl ProjectIdSource for Configured {
    fn name(&self) -> &'static str {
        "configured"
    }
    fn project_id(&self) -> Option<ProjectId> {
        self.0.clone().and_then(ProjectId::new)
    }
}

/// Id inferred from the ambient credentials file.
#[derive(Debug, Clone)]
pub struct CredentialInference {
    locator: CredentialLocator,
}

impl CredentialInference {
    /// Infer from whatever file `locator` finds.
    pub const fn new(locator: CredentialLocator) -> Self {
        Self { locator }
    }
}

impl ProjectIdSource for CredentialInference {
    fn name(&self) -> &'static str {
        "credentials"
    }
    fn project_id(&self) -> Option<ProjectId> {
        let path = self.locator.locate()?;
        match Credentials::from_path(&path) {
            Ok(creds) => {
                debug!(
                    path = %path.display(),
                    kind = creds.kind.as_deref().unwrap_or("unknown"),
                    "inferring project id from credentials"
                );
                creds.project_id().and_then(ProjectId::new)
            }
            Err(e) => {
                warn!(error = %e, path = %path.display(), "ignoring unreadable credentials file");
                None
            }
        }
    }
}

/// Id served by the GCE metadata server.
#[derive(Debug, Clone)]
pub struct MetadataServer {
    client: MetadataClient,
    platform: Platform,
}

impl MetadataServer {
    /// Query `client` when `platform` is GCE; a no-op source otherwise.
    pub const fn new(client: MetadataClient, platform: Platform) -> Self {
        Self { client, platform }
    }
}

impl ProjectIdSource for MetadataServer {
    fn name(&self) -> &'static str {
        "metadata"
    }
    fn project_id(&self) -> Option<ProjectId> {
        if self.platform != Platform::Gce {
            return None;
        }
        match self.client.fetch_gce_metadata(self.platform, PROJECT_ID_METADATA_PATH) {
            Ok(body) => ProjectId::new(body),
            Err(e) => {
                warn!(error = %e, "project id lookup on metadata server failed");
                None
            }
        }
    }
}

/// Ordered chain of project id sources.
#[derive(Default)]
pub struct ResolverChain {
    sources: Vec<Box<dyn ProjectIdSource>>,
}

impl ResolverChain {
    /// Empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard chain: configured value, credentials, metadata server.
    #[must_use]
    pub fn standard(
        configured: Option<String>,
        locator: CredentialLocator,
        client: MetadataClient,
        platform: Platform,
    ) -> Self {
        Self::new()
            .with(Configured(configured))
            .with(CredentialInference::new(locator))
            .with(MetadataServer::new(client, platform))
    }

    /// Append a source; sources are consulted in insertion order.
    #[must_use]
    pub fn with(mut self, source: impl ProjectIdSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// First id offered by any source, in order.
    pub fn resolve(&self) -> Option<ProjectId> {
        for source in &self.sources {
            if let Some(id) = source.project_id() {
                info!(source = source.name(), project_id = %id, "resolved project id");
                return Some(id);
            }
            debug!(source = source.name(), "no project id from source");
        }
        warn!("project id could not be resolved from any source");
        None
    }
}

/// Resolve the project id with the standard chain.
pub fn resolve(
    configured: Option<String>,
    platform: Platform,
    locator: CredentialLocator,
    client: MetadataClient,
) -> Option<ProjectId> {
    ResolverChain::standard(configured, locator, client, platform).resolve()
}
