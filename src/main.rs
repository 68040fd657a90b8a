use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

mod app;
mod catalog;
mod cli;
mod config;
mod history;
mod offers;
mod scrape;
mod search;
#[cfg(test)]
mod tests;
mod vision;
mod web;

use app::{App, LinkResponse};
use config::Config;
use scrape::ScraperRegistry;

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn catalog_progress() -> ProgressBar {
    let bar = ProgressBar::new(0);
    if let Ok(style) =
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {wide_bar} {pos}/{len} catalog images")
    {
        bar.set_style(style);
    }
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();

    init_logging();

    let base_path = config::base_path()?;
    let config = Config::load_with(&base_path)
        .with_context(|| format!("failed to load config from {}", base_path.display()))?;

    match args.command {
        cli::Command::Serve { bind } => {
            // the index is built before the runtime starts; nothing is served until it is complete
            let (app, report) = App::build(&config, Some(catalog_progress()))?;
            if report.degraded > 0 {
                log::warn!(
                    "{} of {} catalog entries use fallback embeddings",
                    report.degraded,
                    report.total
                );
            }

            let mut server = config.server.clone();
            if let Some(bind) = bind {
                server.bind = bind;
            }

            web::start_daemon(app, server)
        }

        cli::Command::Image { path, top_k } => {
            let top_k = top_k.unwrap_or(config.search.top_k);
            if top_k == 0 {
                bail!("--top-k must be greater than 0");
            }

            let image = std::fs::read(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;

            let (app, _) = App::build(&config, Some(catalog_progress()))?;
            let response = app.search_image_top(&image, top_k)?;

            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }

        cli::Command::Link { url } => {
            let scrapers = ScraperRegistry::with_defaults(&config.scrape);

            match app::lookup_link(&scrapers, &url)? {
                LinkResponse::Unsupported => {
                    println!("{}", serde_json::json!({"error": "Platform not supported"}));
                }
                LinkResponse::Found(response) => {
                    println!("{}", serde_json::to_string_pretty(&response)?);
                }
            }
            Ok(())
        }

        cli::Command::Catalog => {
            let (app, report) = App::build(&config, Some(catalog_progress()))?;
            let index = app.index();

            for (position, entry) in index.entries().iter().enumerate() {
                let status = if index.is_degraded(position) {
                    "degraded"
                } else {
                    "ok"
                };
                println!("{:<12} {:<9} {}", entry.id, status, entry.title);
            }

            println!(
                "{} entries, {} degraded, built in {:.1?}",
                report.total, report.degraded, report.elapsed
            );
            Ok(())
        }
    }
}
