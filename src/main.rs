use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::info;

use spesa::{AppConfig, GeminiBackend, OffersMode, WeeklyUpdate};

#[derive(Parser)]
#[command(name = "spesa", version, about = "Weekly flyer offers and recipe corpus builder")]
struct Cli {
    /// Configuration file (defaults to ./spesa.toml when present)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract offers, import submissions, generate recipes and save the snapshot
    Update {
        /// Reuse the previous snapshot's offers instead of reading flyers
        #[arg(long)]
        keep_offers: bool,
        /// Skip AI recipe generation
        #[arg(long)]
        no_generate: bool,
    },
    /// Extract offers from the flyers and print them as JSON
    Offers,
    /// Import user submissions into the snapshot without calling the backend
    Import,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Update {
            keep_offers,
            no_generate,
        } => {
            let generate = config.generator.enabled && !no_generate;
            let mode = if keep_offers {
                OffersMode::KeepPrevious
            } else {
                OffersMode::Extract
            };

            let mut builder = WeeklyUpdate::builder(config.clone())
                .offers_mode(mode)
                .generation(generate);
            if mode == OffersMode::Extract || generate {
                // Fails before any work when the credential is missing
                builder = builder.backend(Arc::new(GeminiBackend::new(&config.backend)?));
            }

            let summary = builder.run().await?;
            info!(
                "Snapshot updated: {} stores, {} offers, {} imported, {} generated, {} recipes total",
                summary.stores, summary.offers, summary.imported, summary.generated, summary.recipes
            );
        }
        Command::Offers => {
            let offers = spesa::extract_flyer_offers(&config).await?;
            println!("{}", serde_json::to_string_pretty(&offers)?);
        }
        Command::Import => {
            let summary = WeeklyUpdate::builder(config)
                .offers_mode(OffersMode::KeepPrevious)
                .generation(false)
                .run()
                .await?;
            info!(
                "Imported {} user recipes, {} recipes total",
                summary.imported, summary.recipes
            );
        }
    }

    Ok(())
}
