//! `gcp_dlp` log pipeline filter.
//!
//! Lifecycle, as driven by the host pipeline:
//! - `configure(options)`: parse and validate [`FilterConfig`]
//! - `start()`: detect the platform, resolve the project id and freeze both in
//!   an immutable [`FilterContext`]; fails when no project id can be resolved
//! - `filter(tag, time, record)`: redact one record, `None` drops it
//! - `shutdown()`: release the context
//!
//! Records reaching `filter` before `start` are dropped.

#![deny(unsafe_code)]

pub mod config;

use std::collections::HashMap;
use std::sync::Arc;

use dlp_core::platform::Platform;
use dlp_core::record::Record;
use dlp_core::PLUGIN_NAME;
use identity::{CredentialLocator, ProjectId};
use metadata::MetadataClient;
use redactor::{record_outcome, DlpClient, DropReason, FilterOutcome, RecordRedactor};
use thiserror::Error;
use tracing::{debug_span, info, warn};

pub use config::FilterConfig;

/// Errors from the plugin lifecycle hooks. `filter` itself never fails.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Options are syntactically valid but unusable.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Options could not be parsed.
    #[error("malformed configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// Options file could not be read.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// `start` was called before `configure`.
    #[error("plugin is not configured")]
    NotConfigured,
    /// No source yielded a project id.
    #[error("project id could not be resolved; set project_id or provide credentials")]
    UnresolvedProject,
    /// No plugin is registered under the requested name.
    #[error("unknown plugin: {0}")]
    UnknownPlugin(String),
}

/// Host pipeline filter contract.
pub trait FilterPlugin: Send {
    /// Registered name.
    fn name(&self) -> &'static str;
    /// Accept options.
    ///
    /// # Errors
    /// Invalid options.
    fn configure(&mut self, options: serde_yaml::Value) -> Result<(), PluginError>;
    /// Prepare for record processing.
    ///
    /// # Errors
    /// Start-up could not complete; no records will be processed.
    fn start(&mut self) -> Result<(), PluginError>;
    /// Release resources.
    fn shutdown(&mut self);
    /// Process one record; `None` drops it.
    fn filter(&self, tag: &str, time: u64, record: Record) -> Option<Record>;
}

/// State resolved once at start and read by every `filter` call.
pub struct FilterContext {
    /// Detected hosting platform.
    pub platform: Platform,
    /// Project scoping every DLP request.
    pub project_id: ProjectId,
    /// Redactor bound to the configured info types.
    pub redactor: RecordRedactor,
}

/// The DLP redaction filter.
pub struct GcpDlpFilter {
    client: Arc<dyn DlpClient>,
    config: Option<FilterConfig>,
    locator: Option<CredentialLocator>,
    context: Option<Arc<FilterContext>>,
}

impl GcpDlpFilter {
    /// Filter sending records through `client`.
    pub fn new(client: Arc<dyn DlpClient>) -> Self {
        Self { client, config: None, locator: None, context: None }
    }

    /// Use `locator` for ambient credentials instead of the process environment.
    #[must_use]
    pub fn with_credential_locator(mut self, locator: CredentialLocator) -> Self {
        self.locator = Some(locator);
        self
    }

    /// Apply an already-built config.
    ///
    /// # Errors
    /// [`PluginError::Config`] when validation fails.
    pub fn configure_with(&mut self, config: FilterConfig) -> Result<(), PluginError> {
        self.config = Some(config.validated()?);
        Ok(())
    }

    /// Active configuration, once configured.
    pub fn config(&self) -> Option<&FilterConfig> {
        self.config.as_ref()
    }

    /// Start-up state, once started.
    pub fn context(&self) -> Option<&Arc<FilterContext>> {
        self.context.as_ref()
    }
}

impl FilterPlugin for GcpDlpFilter {
    fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn configure(&mut self, options: serde_yaml::Value) -> Result<(), PluginError> {
        self.config = Some(FilterConfig::from_value(options)?);
        Ok(())
    }

    fn start(&mut self) -> Result<(), PluginError> {
        let cfg = self.config.as_ref().ok_or(PluginError::NotConfigured)?;

        let metadata = MetadataClient::new(cfg.metadata_host.clone());
        let platform = metadata.detect_platform(cfg.use_metadata_service);

        let locator = self
            .locator
            .clone()
            .unwrap_or_else(|| CredentialLocator::from_env(cfg.google_credential_file.clone()));
        let project_id = identity::resolve(cfg.project_id.clone(), platform, locator, metadata)
            .ok_or(PluginError::UnresolvedProject)?;

        let redactor = RecordRedactor::new(cfg.info_types.iter().cloned(), self.client.clone());
        info!(
            plugin = PLUGIN_NAME,
            platform = %platform,
            project_id = %project_id,
            info_types = ?cfg.info_types,
            "filter started"
        );
        self.context = Some(Arc::new(FilterContext { platform, project_id, redactor }));
        Ok(())
    }

    fn shutdown(&mut self) {
        self.context = None;
        info!(plugin = PLUGIN_NAME, "filter shut down");
    }

    fn filter(&self, tag: &str, _time: u64, record: Record) -> Option<Record> {
        let Some(ctx) = self.context.as_ref() else {
            warn!(plugin = PLUGIN_NAME, tag, "record received before start; dropping");
            record_outcome(FilterOutcome::Dropped(DropReason::NotStarted));
            return None;
        };
        let _span = debug_span!("gcp_dlp", tag).entered();
        ctx.redactor.filter(&ctx.project_id, record)
    }
}

fn gcp_dlp_factory(client: Arc<dyn DlpClient>) -> Box<dyn FilterPlugin> {
    Box::new(GcpDlpFilter::new(client))
}

/// Builds a plugin around a DLP client.
pub type PluginFactory = fn(Arc<dyn DlpClient>) -> Box<dyn FilterPlugin>;

/// Name-to-factory table the host looks plugins up in.
#[derive(Default)]
pub struct PluginRegistry {
    factories: HashMap<&'static str, PluginFactory>,
}

impl PluginRegistry {
    /// Registry with the built-in `gcp_dlp` filter.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut r = Self::default();
        r.register(PLUGIN_NAME, gcp_dlp_factory);
        r
    }

    /// Register `factory` under `name`, replacing any previous registration.
    pub fn register(&mut self, name: &'static str, factory: PluginFactory) {
        self.factories.insert(name, factory);
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut v: Vec<_> = self.factories.keys().copied().collect();
        v.sort_unstable();
        v
    }

    /// Instantiate the plugin registered under `name`.
    ///
    /// # Errors
    /// [`PluginError::UnknownPlugin`] when nothing is registered under `name`.
    pub fn create(
        &self,
        name: &str,
        client: Arc<dyn DlpClient>,
    ) -> Result<Box<dyn FilterPlugin>, PluginError> {
        let factory =
            self.factories.get(name).ok_or_else(|| PluginError::UnknownPlugin(name.to_string()))?;
        Ok(factory(client))
    }
}
