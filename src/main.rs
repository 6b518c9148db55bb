use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use floorsheet_scraper::api::{self, AppState};
use floorsheet_scraper::{
    ApiConfig, AppConfig, ArtifactStore, BrowserSettings, DocumentStore, GitHubStore, LocalStore,
    Pipeline, ScraperConfig, StoreBackend,
};

#[derive(Parser)]
#[command(name = "floorsheet", version, about = "Floor sheet scraper and artifact API")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape every page of the floor sheet and save today's CSV
    Scrape {
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        data_dir: Option<PathBuf>,
        #[arg(long)]
        items_per_page: Option<u32>,
        #[arg(long)]
        max_pages: Option<usize>,
    },
    /// Serve saved CSV files over HTTP
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long, value_enum)]
        backend: Option<StoreBackend>,
    },
}

fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Scrape {
            url,
            data_dir,
            items_per_page,
            max_pages,
        } => {
            let mut scraper = config.scraper;
            if let Some(url) = url {
                scraper.target_url = url;
            }
            if let Some(dir) = data_dir {
                scraper.data_dir = dir;
            }
            if items_per_page.is_some() {
                scraper.items_per_page = items_per_page;
            }
            if max_pages.is_some() {
                scraper.max_pages = max_pages;
            }
            scraper.validate()?;
            let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
            runtime.block_on(scrape(scraper, config.browser))
        }
        Command::Serve {
            host,
            port,
            backend,
        } => {
            let mut api_config = config.api;
            api_config.apply_env()?;
            if let Some(host) = host {
                api_config.host = host;
            }
            if let Some(port) = port {
                api_config.port = port;
            }
            if let Some(backend) = backend {
                api_config.backend = backend;
            }
            actix_web::rt::System::new().block_on(serve(api_config))
        }
    }
}

async fn scrape(scraper: ScraperConfig, browser: BrowserSettings) -> Result<()> {
    log::info!("Starting floor sheet scraper for {}", scraper.target_url);

    let summary = Pipeline::new(scraper).run(&browser).await?;
    match &summary.artifact {
        Some(path) => log::info!(
            "Scraped {} pages, {} rows saved to {}",
            summary.pages,
            summary.cleaned_rows,
            path.display()
        ),
        None => log::warn!("Scraped {} pages but nothing was saved", summary.pages),
    }
    Ok(())
}

async fn serve(config: ApiConfig) -> Result<()> {
    let store: Arc<dyn DocumentStore> = match config.backend {
        StoreBackend::Local => Arc::new(LocalStore::new(ArtifactStore::new(
            config.data_dir.clone(),
            config.source_name.clone(),
        ))),
        StoreBackend::Github => Arc::new(GitHubStore::new(
            &config.github_owner,
            &config.github_repo,
            &config.github_path,
            config.github_token.clone(),
        )?),
    };
    let state = web::Data::new(AppState { store });

    log::info!("🌐 Server running at http://{}:{}", config.host, config.port);
    log::info!("📖 API docs available at http://{}:{}/", config.host, config.port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .wrap(cors)
            .configure(api::configure)
    })
    .bind((config.host.as_str(), config.port))
    .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?
    .run()
    .await
    .context("HTTP server failed")
}
