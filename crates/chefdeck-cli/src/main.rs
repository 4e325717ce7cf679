//! `chefdeckd` - HTTP daemon exposing Chef node inventory to RunDeck.
//!
//! Loads layered configuration, opens the node ledger, connects to the Chef
//! server and serves the JSON API until interrupted.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod config_bridge;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;

use chefdeck_auth::{AuthSource, Authorizer};
use chefdeck_chef::HttpChefClient;
use chefdeck_config::{Config, LoadOptions, ResolvedConfig};
use chefdeck_gateway::{GatewayServer, NodeService};
use chefdeck_ledger::Ledger;

/// Chefdeck daemon - RunDeck node source backed by a Chef server.
#[derive(Debug, Parser)]
#[command(name = "chefdeckd")]
#[command(author, version, about = "Chefdeck daemon - RunDeck node source backed by a Chef server")]
struct Args {
    /// Configuration file (TOML or JSON).
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Authorization document.
    #[arg(short, long = "auth-json", value_name = "FILE")]
    auth_json: Option<PathBuf>,

    /// Node state ledger.
    #[arg(short, long = "state-json", value_name = "FILE")]
    state_json: Option<PathBuf>,

    /// Project settings document.
    #[arg(long = "projects-json", value_name = "FILE")]
    projects_json: Option<PathBuf>,

    /// Listen on this interface or IP.
    #[arg(short, long, value_name = "HOST")]
    bind: Option<String>,

    /// Listen on this port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Cache timeout for API responses, in seconds.
    #[arg(short = 't', long = "timeout", value_name = "CACHE_TIMEOUT")]
    cache_timeout: Option<u64>,

    /// Environment: production, development or test.
    #[arg(short, long = "env", value_name = "ENV")]
    environment: Option<String>,

    /// Chef server URL.
    #[arg(long, value_name = "URL")]
    chef_endpoint: Option<String>,

    /// PEM private key of the Chef API client.
    #[arg(long, value_name = "FILE")]
    chef_key: Option<PathBuf>,

    /// Print the resolved configuration and exit.
    #[arg(long)]
    print_config: bool,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Turn the flags into config overrides.
    fn load_options(&self) -> LoadOptions {
        let mut options = LoadOptions::new();
        if let Some(path) = &self.config {
            options = options.with_config_file(path);
        }

        let paths = [
            ("files.auth_json", &self.auth_json),
            ("files.state_json", &self.state_json),
            ("files.projects_json", &self.projects_json),
            ("chef.client_key", &self.chef_key),
        ];
        for (field, path) in paths {
            if let Some(path) = path {
                options = options.with_override(field, path.to_string_lossy().into_owned());
            }
        }

        if let Some(bind) = &self.bind {
            options = options.with_override("server.bind", bind.clone());
        }
        if let Some(port) = self.port {
            options = options.with_override("server.port", i64::from(port));
        }
        if let Some(secs) = self.cache_timeout {
            options = options.with_override(
                "cache.timeout_secs",
                i64::try_from(secs).unwrap_or(i64::MAX),
            );
        }
        if let Some(env) = &self.environment {
            options = options.with_override("environment", env.to_ascii_lowercase());
        }
        if let Some(endpoint) = &self.chef_endpoint {
            options = options.with_override("chef.endpoint", endpoint.clone());
        }
        if self.verbose {
            options = options.with_override("logging.level", "debug");
        }
        options
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let resolved = Config::load(&args.load_options()).context("failed to load configuration")?;

    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&resolved)?);
        return Ok(());
    }

    let log_config = config_bridge::log_config(&resolved.config, &resolved.field_sources);
    if let Err(e) = chefdeck_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }

    run(resolved).await
}

async fn run(resolved: ResolvedConfig) -> Result<()> {
    let dump = serde_json::to_value(&resolved).ok();
    let ResolvedConfig {
        config,
        loaded_files,
        ..
    } = resolved;

    for file in &loaded_files {
        tracing::info!(file = %file, "loaded configuration file");
    }

    let ledger = Arc::new(Ledger::open(&config.files.state_json));
    let authorizer = Authorizer::new(
        Arc::clone(&ledger),
        AuthSource::File(config.files.auth_json.clone()),
    )
    .with_empty_run_list_policy(config_bridge::empty_run_list_policy(
        config.auth.empty_run_list,
    ));
    let chef = HttpChefClient::new(config_bridge::chef_config(&config)?)
        .context("failed to build Chef client")?;

    let service = NodeService::new(Arc::clone(&ledger), authorizer, Arc::new(chef))
        .with_projects(&config.files.projects_json)
        .with_timeout(Duration::from_secs(config.chef.timeout_secs));
    let settings = config_bridge::gateway_settings(&config, dump);
    let server = GatewayServer::new(service, settings);

    let addr = config.server.address();
    println!(
        "{}",
        format!(
            "chefdeckd listening on {addr} (env: {}, {} nodes in state)",
            config.environment,
            ledger.len()
        )
        .cyan()
        .bold()
    );

    server
        .serve_with_shutdown(&addr, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for Ctrl+C");
            }
            println!("\n{}", "Shutting down chefdeckd...".yellow());
        })
        .await
        .with_context(|| format!("failed to serve on {addr}"))?;

    println!("{}", "chefdeckd stopped".green().bold());
    Ok(())
}
