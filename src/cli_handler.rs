//! Command handling for routescout.
//!
//! Each subcommand loads the layered configuration, builds its own tokio
//! runtime where it needs one, and reports errors with context for `main`.

use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::{Cli, Commands, DiscoverArgs, ProbeArgs, ShowArgs};
use crate::config::{ConfigLoader, ConfigOverrides, EngineConfig};
use crate::manifest::{ManifestLoader, ManifestSources, OutputTarget};
use crate::pipeline::DiscoveryPipeline;
use crate::routes::Route;
use crate::service::ServiceSpec;

/// Env var with a comma-separated port list used when a spec declares none.
pub const ROUTESCOUT_PORTS: &str = "ROUTESCOUT_PORTS";

/// Run the parsed command line.
pub fn handle_command(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match &cli.command {
        Commands::Discover(args) => discover(args, config_path),
        Commands::Probe(args) => probe(args, config_path),
        Commands::Show(args) => show(args),
    }
}

/// Load the config layers and apply command-line overrides.
pub fn load_engine_config(
    config_path: Option<&Path>,
    overrides: ConfigOverrides,
) -> Result<EngineConfig> {
    let config = ConfigLoader::new()
        .load(config_path)
        .context("Failed to load configuration")?;
    let engine = EngineConfig::resolve(&config)
        .and_then(|engine| engine.with_overrides(overrides))
        .context("Invalid configuration")?;
    tracing::debug!("Resolved configuration: {:?}", engine);
    Ok(engine)
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")
}

fn load_spec(path: &Path) -> Result<ServiceSpec> {
    let fallback_ports = std::env::var(ROUTESCOUT_PORTS).ok();
    ServiceSpec::load(path, fallback_ports.as_deref())
        .with_context(|| format!("Failed to load service spec {}", path.display()))
}

fn discover(args: &DiscoverArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_engine_config(config_path, args.overrides())?;

    let mut spec = load_spec(&args.spec)?;
    spec.apply_env_overrides(&args.env)
        .context("Invalid --env value")?;
    if let Some(gpus) = &args.gpus {
        spec.gpus = Some(gpus.clone());
    }
    spec.extra_args.extend(args.extra_args.iter().cloned());

    let output = args
        .output
        .as_deref()
        .map(OutputTarget::parse)
        .unwrap_or_else(|| OutputTarget::File(spec.default_manifest_path()));

    let rt = build_runtime()?;
    let report = rt
        .block_on(DiscoveryPipeline::new(config).run(&spec, output))
        .with_context(|| format!("Route discovery failed for '{}'", spec.name))?;

    if let Some(url) = &report.schema_url {
        tracing::info!("Schema found at {}", url);
    }
    if let OutputTarget::File(path) = &report.output {
        println!("{}", path.display());
    }
    Ok(())
}

fn probe(args: &ProbeArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_engine_config(config_path, args.overrides())?;
    let output = OutputTarget::parse(&args.output);

    let rt = build_runtime()?;
    let report = rt
        .block_on(DiscoveryPipeline::new(config).probe_running(
            &args.base_url,
            args.port,
            &Default::default(),
            args.source.clone(),
            output,
        ))
        .with_context(|| format!("Probing {} failed", args.base_url))?;

    if let OutputTarget::File(path) = &report.output {
        println!("{}", path.display());
    }
    Ok(())
}

fn show(args: &ShowArgs) -> Result<()> {
    let spec = load_spec(&args.spec)?;
    let loaded = ManifestLoader::new(ManifestSources::from_env())
        .for_spec(spec.path())
        .default_port(args.default_port.or(spec.default_port()))
        .static_routes(spec.static_routes.clone())
        .load()
        .with_context(|| format!("Failed to resolve routes for '{}'", spec.name))?;

    println!("# {} ({} routes from {})", spec.name, loaded.routes.len(), loaded.origin);
    for route in &loaded.routes {
        println!("{}", format_route(route));
    }
    Ok(())
}

/// One line per route: `METHOD  /path -> :port/target [stream]`.
pub fn format_route(route: &Route) -> String {
    let mut line = format!(
        "{:<7}{} -> :{}{}",
        route.method.as_str(),
        route.path,
        route.port,
        route.target_path
    );
    if route.stream {
        line.push_str(" [stream]");
    }
    line
}
