//! Metadata server client.
//!
//! Two jobs, both run once at filter start-up:
//! - sniff the hosting platform from the headers the link-local metadata server
//!   answers with (GCE, EC2 and Azure each leave a distinct signature);
//! - on GCE, read instance metadata such as `project/project-id`.
//!
//! Platform detection never fails: transport problems are logged and reported as
//! [`Platform::Other`].

#![deny(unsafe_code)]

use std::time::Duration;

use dlp_core::platform::Platform;
use thiserror::Error;
use tracing::{debug, error, info};

/// Link-local address of the metadata server on all supported clouds.
pub const METADATA_SERVICE_ADDR: &str = "169.254.169.254";

/// Request/response header carrying the GCE metadata flavor.
pub const METADATA_FLAVOR_HEADER: &str = "Metadata-Flavor";

const GCE_FLAVOR: &str = "Google";
const EC2_SERVER: &str = "EC2ws";
const AZURE_SERVER: &str = "Microsoft-IIS/10.0";

/// Errors from metadata lookups.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Metadata lookups are only meaningful on GCE.
    #[error("metadata lookup requires GCE, detected platform is {0}")]
    NotOnGce(Platform),
    /// The server answered with a non-success status.
    #[error("metadata server returned status {0}")]
    Status(u16),
    /// Connecting or talking to the server failed.
    #[error("metadata transport: {0}")]
    Transport(String),
    /// The response body could not be read.
    #[error("metadata body: {0}")]
    Body(String),
}

/// Blocking client for the metadata server.
#[derive(Clone)]
pub struct MetadataClient {
    agent: ureq::Agent,
    host: String,
}

impl Default for MetadataClient {
    fn default() -> Self {
        Self::new(METADATA_SERVICE_ADDR)
    }
}

impl std::fmt::Debug for MetadataClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataClient").field("host", &self.host).finish_non_exhaustive()
    }
}

impl MetadataClient {
    /// Client for the metadata server at `host` (`ip` or `ip:port`), 2 s timeout.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self::with_timeout(host, Duration::from_secs(2))
    }

    /// Client with an explicit overall request timeout.
    #[must_use]
    pub fn with_timeout(host: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self { agent, host: host.into() }
    }

    /// Host this client talks to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Determine the hosting platform.
    ///
    /// With `use_metadata_service == false` this returns [`Platform::Other`]
    /// without touching the network. Otherwise a single GET to the server root
    /// decides:
    /// - `Metadata-Flavor: Google` ⇒ GCE
    /// - `Server: EC2ws` ⇒ EC2
    /// - an error status with `Server: Microsoft-IIS/10.0` ⇒ Azure
    /// - anything else ⇒ Other
    pub fn detect_platform(&self, use_metadata_service: bool) -> Platform {
        if !use_metadata_service {
            info!("use_metadata_service is false; not detecting platform");
            return Platform::Other;
        }

        let url = format!("http://{}", self.host);
        match self.agent.get(&url).call() {
            Ok(resp) => {
                if resp.header(METADATA_FLAVOR_HEADER) == Some(GCE_FLAVOR) {
                    info!("Detected GCE platform");
                    return Platform::Gce;
                }
                if resp.header("Server") == Some(EC2_SERVER) {
                    info!("Detected EC2 platform");
                    return Platform::Ec2;
                }
            }
            Err(ureq::Error::Status(code, resp)) => {
                if resp.header("Server") == Some(AZURE_SERVER) {
                    info!("Detected Azure platform");
                    return Platform::Azure;
                }
                debug!(status = code, "metadata server answered with an error status");
            }
            Err(e) => {
                error!(error = %e, "Failed to access metadata service");
            }
        }

        info!("Unable to determine platform");
        Platform::Other
    }

    /// Fetch `computeMetadata/v1/<path>` from the GCE metadata server and return
    /// the body verbatim.
    ///
    /// # Errors
    /// [`MetadataError::NotOnGce`] unless `platform` is GCE; transport, status and
    /// body errors otherwise.
    pub fn fetch_gce_metadata(
        &self,
        platform: Platform,
        path: &str,
    ) -> Result<String, MetadataError> {
        if platform != Platform::Gce {
            return Err(MetadataError::NotOnGce(platform));
        }
        let url = format!("http://{}/computeMetadata/v1/{}", self.host, path);
        let resp = self
            .agent
            .get(&url)
            .set(METADATA_FLAVOR_HEADER, GCE_FLAVOR)
            .call()
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => MetadataError::Status(code),
                other => MetadataError::Transport(other.to_string()),
            })?;
        resp.into_string().map_err(|e| MetadataError::Body(e.to_string()))
    }
}
