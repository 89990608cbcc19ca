mod cli;
mod run;

use clap::Parser;
use cli::{Cli, Commands};
use docpull::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run::run(args).await?,
        Commands::Config(args) => {
            let config = Config::load_with(args.config)?;
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}
