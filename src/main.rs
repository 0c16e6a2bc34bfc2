//! sandbox-gateway - HTTP demo gateway for a policy-enforcing sandbox backend.
//!
//! Usage:
//!   sandbox-gateway serve [--port 8787]     # Start HTTP server
//!   sandbox-gateway --run -- <command>      # One-shot command via the backend

mod backend;
mod batch;
mod classify;
mod config;
mod demo;
mod executor;
mod http_server;
mod limiter;
mod state;
mod store;

use clap::{Parser, Subcommand};

use config::Config;
use executor::CommandSpec;
use state::AppState;

#[derive(Parser, Debug)]
#[command(name = "sandbox-gateway")]
#[command(about = "HTTP demo gateway for a policy-enforcing sandbox backend")]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Run one command against the backend and exit
    #[arg(long)]
    run: bool,

    /// With --run: send the command unwrapped, bypassing the policy entry
    /// point. For inspecting the backend environment only.
    #[arg(long)]
    raw: bool,

    /// Base URL of the sandbox backend
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    backend_url: String,

    /// Rate-limit window length in seconds
    #[arg(long, default_value = "60")]
    window: u64,

    /// Maximum requests per client per window
    #[arg(long, default_value = "10")]
    max_requests: u32,

    /// Default command timeout in milliseconds
    #[arg(long, default_value = "30000")]
    timeout: u64,

    /// Backoff before retrying a transient backend failure, in milliseconds
    #[arg(long, default_value = "2000")]
    retry_backoff: u64,

    /// Maximum in-flight backend calls per demo batch
    #[arg(long, default_value = "3")]
    concurrency: usize,

    /// Command to run (with --run)
    #[arg(last = true)]
    cmd_args: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8787")]
        port: u16,
    },
}

#[tokio::main]
async fn main() {
    use std::process::exit;

    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = Config {
        window_secs: args.window,
        max_requests: args.max_requests,
        default_timeout_ms: args.timeout,
        retry_backoff_ms: args.retry_backoff,
        concurrency: args.concurrency,
        backend_url: args.backend_url,
    };

    match args.command {
        Some(Commands::Serve { port }) => {
            http_server::run_server(port, AppState::new(config)).await;
        }
        None if args.run => {
            if args.cmd_args.is_empty() {
                eprintln!("Error: No command specified");
                exit(1);
            }
            let state = AppState::new(config.clone());
            let spec = CommandSpec {
                text: args.cmd_args.join(" "),
                timeout_ms: config.default_timeout_ms,
                use_wrapper: !args.raw,
            };
            let outcome = state.executor.execute(&spec).await;
            if !outcome.stdout.is_empty() {
                println!("{}", outcome.stdout);
            }
            eprint!("{}", outcome.stderr);
            if let Some(message) = &outcome.message {
                eprintln!("{message}");
            }
            exit(if outcome.success {
                0
            } else if outcome.exit_code > 0 {
                outcome.exit_code
            } else {
                1
            });
        }
        None => {
            eprintln!("Error: Use 'serve' subcommand or --run flag");
            exit(1);
        }
    }
}
