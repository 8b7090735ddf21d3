use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Surfaces PHP_CodeSniffer reports as editor diagnostics.
#[derive(Parser, Debug)]
#[command(name = "sniffles", version, about)]
struct Args {
    /// Communicate over stdio (the only supported transport).
    #[arg(long)]
    stdio: bool,
}

fn main() {
    let args = Args::parse();

    // stdout carries the LSP stream; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if !args.stdio {
        tracing::debug!("--stdio not passed; stdio transport is the default anyway");
    }

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to create tokio runtime")
        .block_on(sniffles::lsp::run());
}
