use clap::Parser;
use roadnet_api::cli::{Cli, OutputFormat};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_format = OutputFormat::from_cli(&cli);

    if let Err(e) = roadnet_api::cli::run(cli).await {
        // JSON mode already reported the error on stdout
        if matches!(output_format, OutputFormat::Text) {
            match std::env::var("CLI_VERBOSE").as_deref() {
                Ok("true") | Ok("1") => eprintln!("Error: {e:?}"),
                _ => eprintln!("Error: {e}"),
            }
        }
        std::process::exit(1);
    }

    Ok(())
}
