//! Lambdabox CLI
//!
//! Runs the invoke service, or a single handler invocation locally.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lambdabox::{Config, EXAMPLE_CONFIG, InvocationRequest, Runner};
use serde_json::Value;
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lambdabox")]
#[command(about = "Run untrusted handler functions in isolated workers")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP invoke service
    Serve {
        /// Port to listen on (overrides the configured port)
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,
    },

    /// Run a handler once and print its result
    Invoke {
        /// Python source file defining handler(event, context)
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Event as inline JSON
        #[arg(short, long, conflicts_with = "event_file")]
        event: Option<String>,

        /// Read the event from a JSON file
        #[arg(long, value_name = "PATH")]
        event_file: Option<PathBuf>,

        /// Timeout in seconds
        #[arg(short, long)]
        timeout: Option<f64>,
    },

    /// Initialize a new configuration file
    Init {
        /// Output path (default: lambdabox.toml)
        #[arg(short, long, default_value = "lambdabox.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Show the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Init { output, force } = &cli.command {
        return init_config(output, *force).await;
    }

    if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
    } else {
        debug!("using default configuration");
    }
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Serve { port } => run_serve(config, port).await,
        Commands::Invoke {
            source,
            event,
            event_file,
            timeout,
        } => {
            run_invoke(
                config,
                &source,
                event.as_deref(),
                event_file.as_deref(),
                timeout,
            )
            .await
        }
        Commands::ShowConfig => show_config(&config),
        Commands::Init { .. } => Ok(()),
    }
}

async fn run_serve(mut config: Config, port: Option<u16>) -> Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    let addr = config.listen_addr()?;

    info!(
        %addr,
        max_concurrency = config.max_concurrency,
        default_timeout = config.default_timeout,
        "starting invoke service"
    );

    let runner = Runner::new(config);
    lambdabox::serve(runner, addr, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    })
    .await
    .context("invoke service failed")?;

    Ok(())
}

async fn run_invoke(
    config: Config,
    source: &Path,
    event: Option<&str>,
    event_file: Option<&Path>,
    timeout: Option<f64>,
) -> Result<()> {
    let code = tokio::fs::read_to_string(source)
        .await
        .context("failed to read source file")?;

    let event: Value = match (event, event_file) {
        (Some(inline), _) => serde_json::from_str(inline).context("invalid --event JSON")?,
        (None, Some(path)) => {
            let content = tokio::fs::read(path)
                .await
                .context("failed to read event file")?;
            serde_json::from_slice(&content).context("invalid event file JSON")?
        }
        (None, None) => Value::Object(Default::default()),
    };

    let timeout = timeout.unwrap_or(config.default_timeout);
    let request = InvocationRequest::new(code, event, timeout);

    info!(source = %source.display(), timeout, "invoking handler");

    let runner = Runner::new(config);
    let result = runner.invoke(&request).await.context("invocation failed")?;

    // Result on stdout, logs on stderr, so the output can be piped
    println!("{}", serde_json::to_string_pretty(&result.to_json())?);

    if result.is_success() {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

fn show_config(config: &Config) -> Result<()> {
    println!("Timeouts:");
    println!("  Default: {}s", config.default_timeout);
    println!("  Max: {}s", config.max_timeout);
    println!("Memory limit reported to handlers: {} MB", config.memory_limit_mb);
    println!("Max concurrency: {}", config.max_concurrency);
    println!("Work root: {}", config.work_root().display());
    println!();
    println!("Listen address: {}:{}", config.server.host, config.server.port);
    println!("Max body: {} bytes", config.server.max_body_bytes);
    println!();
    println!("Interpreter command: {}", config.interpreter.command.join(" "));
    println!("Interpreter PATH: {}", config.interpreter.path);

    let mut env: Vec<_> = config.interpreter.env.iter().collect();
    env.sort();
    for (key, value) in env {
        println!("  {key}={value}");
    }
    Ok(())
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
