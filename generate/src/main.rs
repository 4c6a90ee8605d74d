use cbind_generate::cli::{self, Args};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() {
    let args = Args::parse();
    let log_level = if args.verbose { "debug" } else { "info" };
    // Logs go to stderr; stdout is reserved for the generated bindings.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .with_writer(std::io::stderr)
        .init();
    let Some(config) = cli::initialize(&args) else {
        return;
    };
    if let Err(e) = run(config) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run(config: cbind_core::config::Config) -> Result<(), Box<dyn std::error::Error>> {
    if config.header.as_os_str().is_empty() {
        return Err("no input header; pass a header path or set `header` in the config".into());
    }
    cbind_generate::generate_to(&config)?;
    Ok(())
}
