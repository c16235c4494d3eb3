use std::process::ExitCode;

use clap::Parser;

/// Entry point of ctrace.
///
/// # Examples
///
/// ```bash
/// sudo RUST_LOG=info ctrace trace
/// docker run --label ctrace.output-file=/tmp/traces/web nginx
/// ctrace options -o /tmp/web.json /tmp/traces/web
/// ```
#[tokio::main]
async fn main() -> std::result::Result<ExitCode, Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = ctrace::cli::Cli::parse();
    let code = ctrace::cli::run(cli).await?;
    Ok(ExitCode::from(code))
}
