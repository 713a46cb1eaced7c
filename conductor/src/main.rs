use clap::Parser;
use conductor::{init_logging, invoke, Cli};
use model::prelude::*;
use tracing::error;

fn load_config(cli: &Cli) -> ConfigResult<ConductorConfig> {
    let mut config = ConductorConfig::load_or_default(&cli.config)?;
    if let Some(data) = &cli.data {
        config = config.with_data_file(data);
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            // No usable config, so log at the default level.
            init_logging(&ConductorConfig::default())?;
            error!(error = %e, path = %cli.config.display(), "could not load configuration");
            return Err(e.into());
        }
    };
    init_logging(&config)?;

    let store = JsonFileStore::new(&config.data_file);
    match invoke(&store, &config, cli).await {
        Ok(outcome) => {
            if !outcome.output.is_empty() {
                println!("{}", outcome.output);
            }
            Ok(())
        }
        Err(e) => {
            error!(error = %e, data_file = %config.data_file.display(), "command failed");
            Err(e.into())
        }
    }
}
