mod cli;
mod logging;
mod runner;

use anyhow::{Context, Result};
use std::io::Read;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    logging::setup_logging(args.verbose);

    let input = match &args.input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read stdin")?;
            buffer
        }
    };

    for line in runner::run(&args, &input).await? {
        println!("{line}");
    }

    Ok(())
}
