//! Chat relay CLI and stats API entry point.
//!
//! Binary name: `relayd`
//!
//! Parses CLI arguments, loads `relay.toml`, starts the dispatch pipeline,
//! then dispatches to the console front end or the HTTP server.

mod cli;
mod http;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::chat::ConsoleExit;
use cli::{Cli, Commands};
use relay_observe::TracingOptions;
use state::AppState;

/// Filter directives for a verbosity level when `RUST_LOG` is unset.
fn default_filter(verbose: u8, quiet: bool) -> &'static str {
    match verbose {
        0 if quiet => "error",
        0 => "warn,relay_core=info,relay_api=info",
        1 => "info,relay_core=debug,relay_infra=debug,relay_api=debug",
        _ => "trace",
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    relay_observe::init_tracing(&TracingOptions {
        default_filter: default_filter(cli.verbose, cli.quiet).to_string(),
        format: cli.log_format,
        with_target: cli.verbose > 0,
        otel: cli.otel,
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    relay_observe::shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            generate(shell, &mut cmd, "relayd", &mut std::io::stdout());
        }

        Commands::Config { action } => {
            cli::config::handle(action, config_path, cli.json).await?;
        }

        Commands::Status { url } => {
            let url = match url {
                Some(url) => url,
                None => {
                    let loaded = relay_infra::config::load_config(config_path).await?;
                    cli::status::default_base_url(&loaded.config)
                }
            };
            cli::status::status(&url, cli.json).await?;
        }

        Commands::Chat { chat_id } => {
            let loaded = relay_infra::config::load_config(config_path).await?;
            let state = AppState::init(loaded)?;
            cli::chat::run_chat(state, &chat_id).await?;
        }

        Commands::Serve {
            port,
            host,
            no_console,
        } => {
            let mut loaded = relay_infra::config::load_config(config_path).await?;
            if let Some(port) = port {
                loaded.config.server.port = port;
            }
            if let Some(host) = host {
                loaded.config.server.host = host;
            }
            serve(AppState::init(loaded)?, no_console).await?;
        }
    }

    Ok(())
}

/// Run the stats API, and the console unless disabled, until Ctrl+C,
/// SIGTERM or `/exit`. Drains the pipeline before returning.
async fn serve(state: AppState, no_console: bool) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!(
        "  {} relay API listening on {}",
        console::style("⚡").bold(),
        console::style(format!("http://{addr}")).cyan()
    );
    if !no_console {
        println!(
            "  {}",
            console::style("Type `chat_id: message` to chat, /help for commands").dim()
        );
    }
    println!("  {}", console::style("Press Ctrl+C to stop").dim());

    let (exit_tx, exit_rx) = tokio::sync::oneshot::channel::<()>();
    if !no_console {
        let console_state = state.clone();
        tokio::spawn(async move {
            match cli::chat::run_routed_console(console_state).await {
                Ok(ConsoleExit::Requested) => {
                    let _ = exit_tx.send(());
                }
                // Closed stdin leaves the server running.
                Ok(ConsoleExit::Eof) => tracing::debug!("console input closed"),
                Err(err) => tracing::warn!(error = %err, "console input failed"),
            }
        });
    }

    let router = http::router::build_router(state.clone());
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown_signal() => {},
                Ok(()) = exit_rx => {},
            }
        })
        .await?;

    println!("\n  {}", console::style("Draining pending replies...").dim());
    state.pipeline.shutdown().await;
    println!("  Server stopped.");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
