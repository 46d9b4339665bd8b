//! A discovery run, start to finish.
//!
//! start -> startup delay -> wait for ports -> probe -> build -> write -> stop.
//! The waiting and probing phases race the service exiting and Ctrl-C;
//! whatever happens, the service is stopped before the result is returned.

use hyper::Uri;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::DiscoveryError;
use crate::manifest::{self, OutputTarget};
use crate::probe::{DiscoveredSchema, SchemaProber, ServiceEndpoint};
use crate::routes::{Manifest, PathRewrite};
use crate::service::ServiceSpec;
use crate::supervisor::{ServiceHandle, ServiceLauncher, cleanup_stale_locks_in};

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct DiscoveryReport {
    /// The manifest that was written.
    pub manifest: Manifest,
    /// Where it was written.
    pub output: OutputTarget,
    /// URL of the schema document, if one was found.
    pub schema_url: Option<String>,
}

enum Phase<T> {
    Finished(T),
    Interrupted,
}

/// Drives the supervisor, prober and manifest writer for one service.
pub struct DiscoveryPipeline {
    config: EngineConfig,
    launcher: ServiceLauncher,
    prober: SchemaProber,
}

impl DiscoveryPipeline {
    /// Build a pipeline from resolved settings.
    pub fn new(config: EngineConfig) -> Self {
        let launcher = ServiceLauncher::from_config(&config);
        let prober = SchemaProber::from_config(&config);
        Self {
            config,
            launcher,
            prober,
        }
    }

    /// Use a custom launcher.
    #[must_use]
    pub fn with_launcher(mut self, launcher: ServiceLauncher) -> Self {
        self.launcher = launcher;
        self
    }

    /// Settings in use.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start `spec`, discover its routes and write the manifest to `output`.
    pub async fn run(
        &self,
        spec: &ServiceSpec,
        output: OutputTarget,
    ) -> Result<DiscoveryReport, DiscoveryError> {
        let swept = cleanup_stale_locks_in(self.launcher.lock_dir());
        if swept > 0 {
            info!("Removed {} stale instance lock(s)", swept);
        }

        info!("Starting {} to discover its routes", spec.name);
        let mut handle = self.launcher.launch(spec.launch_spec())?;

        let phase = tokio::select! {
            result = self.discover(&mut handle) => Phase::Finished(result),
            () = interrupted() => Phase::Interrupted,
        };

        if let Err(e) = handle.stop().await {
            warn!("Failed to stop {} cleanly: {}", handle.name(), e);
        }

        let schema = match phase {
            Phase::Finished(result) => result?,
            Phase::Interrupted => {
                warn!("Interrupted; {} stopped", spec.name);
                return Err(DiscoveryError::Interrupted);
            }
        };

        if schema.is_none() {
            let ports: Vec<String> = spec.ports.iter().map(u16::to_string).collect();
            warn!(
                "No API schema found for {} on port(s) {}; using static routes only",
                spec.name,
                ports.join(", ")
            );
        }

        self.finish(
            schema,
            spec.static_routes.clone(),
            &spec.rewrite,
            Some(spec.name.clone()),
            output,
        )
    }

    /// Probe a service that is already running at `base_url`.
    ///
    /// Routes are recorded against `service_port`, which may differ from the
    /// port in the URL when the service sits behind a port mapping.
    pub async fn probe_running(
        &self,
        base_url: &str,
        service_port: u16,
        rewrite: &PathRewrite,
        source: Option<String>,
        output: OutputTarget,
    ) -> Result<DiscoveryReport, DiscoveryError> {
        let endpoint = parse_base_url(base_url, service_port)?;
        info!("Probing {} for an API schema", endpoint.url(""));

        let endpoints = [endpoint];
        let phase = tokio::select! {
            schema = self.prober.probe(&endpoints, self.config.probe_timeout) => Phase::Finished(schema),
            () = interrupted() => Phase::Interrupted,
        };
        let schema = match phase {
            Phase::Finished(schema) => schema,
            Phase::Interrupted => return Err(DiscoveryError::Interrupted),
        };

        if schema.is_none() {
            warn!("No API schema found at {}", base_url);
        }
        self.finish(schema, Vec::new(), rewrite, source, output)
    }

    async fn discover(
        &self,
        handle: &mut ServiceHandle,
    ) -> Result<Option<DiscoveredSchema>, DiscoveryError> {
        handle.startup_delay(self.config.startup_delay).await?;
        handle
            .wait_reachable(self.config.wait_timeout, self.config.poll_interval)
            .await?;
        debug!("{} is reachable", handle.name());

        let endpoints = handle.endpoints().to_vec();
        handle
            .while_running(self.prober.probe(&endpoints, self.config.probe_timeout))
            .await
    }

    fn finish(
        &self,
        schema: Option<DiscoveredSchema>,
        static_routes: Vec<crate::routes::Route>,
        rewrite: &PathRewrite,
        source: Option<String>,
        output: OutputTarget,
    ) -> Result<DiscoveryReport, DiscoveryError> {
        let schema_url = schema
            .as_ref()
            .map(|s| s.endpoint().url(s.candidate_path()));
        let manifest = manifest::build(
            schema.as_ref(),
            static_routes,
            &self.config.route_filter(),
            rewrite,
            source,
        );
        if manifest.is_empty() {
            warn!("Manifest has no routes");
        }

        manifest::write_to(&manifest, &output)?;
        info!("Wrote {} route(s) to {}", manifest.len(), output);

        Ok(DiscoveryReport {
            manifest,
            output,
            schema_url,
        })
    }
}

/// Resolves on Ctrl-C. Never resolves if the signal cannot be watched.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// `http://host[:port]` to an endpoint recording `service_port`.
fn parse_base_url(base_url: &str, service_port: u16) -> Result<ServiceEndpoint, DiscoveryError> {
    let invalid = |message: &str| DiscoveryError::InvalidTarget(format!("{base_url}: {message}"));

    let uri: Uri = base_url
        .trim_end_matches('/')
        .parse()
        .map_err(|_| invalid("not a URL"))?;
    match uri.scheme_str() {
        Some("http") => {}
        Some(other) => return Err(invalid(&format!("unsupported scheme '{other}'"))),
        None => return Err(invalid("missing scheme")),
    }
    let host = uri.host().ok_or_else(|| invalid("missing host"))?;
    if !matches!(uri.path(), "" | "/") {
        return Err(invalid("must not contain a path"));
    }
    if service_port == 0 {
        return Err(invalid("service port must be greater than zero"));
    }

    let host = host.trim_start_matches('[').trim_end_matches(']');
    Ok(ServiceEndpoint::new(
        host,
        uri.port_u16().unwrap_or(80),
        service_port,
    ))
}
