mod cli;
mod error;

use std::process;
use std::time::Duration;

use clap::Parser;
use offline_gateway::collector::GenerationCollector;
use offline_gateway::{
    GatewayConfig, HttpNetwork, Interception, InterceptedRequest, ManifestSynchronizer,
    OfflineGateway,
};
use tracing::{Level, error, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::cli::{Args, Commands};
use crate::error::{AppError, Result};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Application error: {}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet)?;

    let config = build_config(&args)?;
    info!(origin = %config.origin, generation = %config.generation, "Starting gateway-cli");

    match args.command {
        Commands::Install => {
            let gateway = OfflineGateway::from_config(config)?;
            let report = gateway.install().await?;
            println!(
                "Installed generation {}: {}/{} stored{}",
                gateway.config().generation,
                report.populate.stored,
                report.populate.attempted(),
                if report.manifest_changed { "" } else { " (no manifest)" }
            );
            for url in &report.populate.failed {
                println!("  failed: {url}");
            }
        }

        Commands::Fetch {
            url,
            navigate,
            output,
        } => {
            let gateway = OfflineGateway::from_config(config)?;
            gateway.install().await?;
            gateway.activate().await?;

            let request = if navigate {
                InterceptedRequest::navigate(url.as_str())
            } else {
                InterceptedRequest::get(url.as_str())
            };

            match gateway.intercept(request).await? {
                Interception::PassThrough => {
                    println!("{url}: not handled by the gateway");
                }
                Interception::Respond(response) => {
                    println!(
                        "{} {} ({:?}, {} bytes)",
                        response.status,
                        response.url,
                        response.source,
                        response.body.len()
                    );
                    if let Some(path) = output {
                        tokio::fs::write(&path, &response.body).await?;
                        println!("Body written to {}", path.display());
                    }
                }
            }
        }

        Commands::Sync => {
            let manifest = ManifestSynchronizer::new(&config)?;
            let network = HttpNetwork::from_config(&config)?;
            let outcome = manifest.sync(&network).await;
            match manifest.last_known_hash() {
                Some(hash) => {
                    println!("Manifest hash: {hash}");
                    println!("{}", serde_json::to_string_pretty(&outcome.assets)?);
                }
                None => println!("Manifest unavailable"),
            }
        }

        Commands::Generations => {
            let gateway = OfflineGateway::from_config(config)?;
            let current = gateway.config().generation.clone();
            for generation in gateway.store().list_generations().await? {
                let marker = if generation == current { "*" } else { " " };
                println!("{marker} {generation}");
            }
        }

        Commands::Collect => {
            let gateway = OfflineGateway::from_config(config)?;
            let removed =
                GenerationCollector::collect(gateway.store(), &gateway.config().generation).await?;
            println!("Removed {} generation(s)", removed.len());
            for generation in removed {
                println!("  {generation}");
            }
        }
    }

    Ok(())
}

fn build_config(args: &Args) -> Result<GatewayConfig> {
    let mut builder = GatewayConfig::builder()
        .with_origin(&args.origin)?
        .with_generation(args.generation.as_str())
        .with_manifest_path(args.manifest_path.as_str())
        .with_fallback_path(args.fallback_path.as_str())
        .with_request_timeout(Duration::from_secs(args.timeout))
        .with_ignore_query_on_miss(!args.strict_query);

    if let Some(dir) = &args.store_dir {
        builder = builder.with_store_dir(dir);
    }

    for pattern in &args.excluded_patterns {
        builder = builder.with_excluded_pattern(pattern.as_str());
    }

    for header in &args.headers {
        let Some((name, value)) = header.split_once(':') else {
            return Err(AppError::InvalidInput(format!(
                "header '{header}' is not in 'Name: value' form"
            )));
        };
        builder = builder.with_header(name.trim(), value.trim());
    }

    Ok(builder.build())
}

fn init_logging(verbose: bool, quiet: bool) -> Result<()> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_level(verbose))
        .with(filter)
        .try_init()
        .map_err(|e| AppError::Initialization(e.to_string()))
}
