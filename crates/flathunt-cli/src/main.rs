use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use flathunt_client::{BrowserRenderer, ExportBacklog, TelegramClient};
use flathunt_core::config::{parse_cutoff, parse_timezone};
use flathunt_core::pipeline::TracingReporter;
use flathunt_core::traits::{DryRunPublisher, Publisher};
use flathunt_core::{
    EnrichmentResolver, FilterConfig, IngestService, PipelineConfig, extract_fields,
    format_advert,
};
use flathunt_db::{AdvertRepository, Database, DatabaseConfig};

#[derive(Parser)]
#[command(name = "flathunt", version, about = "Rental listing pipeline for Telegram channels")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay the exported backlog, then follow the channel until Ctrl+C
    Run(RunArgs),

    /// Extract listing fields from a message text (file or stdin)
    Parse {
        /// File holding the message text; reads stdin when omitted
        file: Option<PathBuf>,
    },

    /// Open a listing page and print what enrichment finds
    Enrich {
        #[arg(short, long)]
        url: String,

        #[arg(long, env = "PAGE_TIMEOUT_SECS", default_value_t = 30)]
        page_timeout_secs: u64,
    },

    /// Show a stored advert and the announcement it produces
    Show {
        #[arg(short, long)]
        url: String,
    },

    /// List the most recently stored adverts
    List {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Bot API token
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    bot_token: String,

    /// Channel the listings are posted in
    #[arg(long, env = "TELEGRAM_INPUT_CHANNEL_ID", allow_hyphen_values = true)]
    input_channel: i64,

    /// Chat that receives accepted adverts
    #[arg(long, env = "TELEGRAM_OUTPUT_GROUP_ID", allow_hyphen_values = true)]
    output_group: i64,

    /// Ignore messages sent before this local time (YYYY-MM-DD HH:MM:SS)
    #[arg(long, env = "PROCESS_FROM_DATE")]
    from_date: String,

    /// Timezone of the cutoff and of the dates inside messages
    #[arg(long, env = "SOURCE_TIMEZONE", default_value = "Europe/Warsaw")]
    timezone: String,

    /// Pause after a listing site answers 403
    #[arg(long, env = "BACKOFF_SECS", default_value_t = 300)]
    backoff_secs: u64,

    #[arg(long, env = "PAGE_TIMEOUT_SECS", default_value_t = 30)]
    page_timeout_secs: u64,

    /// Telegram Desktop export (result.json) to replay before going live
    #[arg(long, env = "TELEGRAM_EXPORT")]
    export: Option<PathBuf>,

    /// Stop after the backlog instead of following the channel
    #[arg(long, default_value_t = false)]
    backlog_only: bool,

    /// Log announcements instead of sending them
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("flathunt=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => cmd_run(args).await?,
        Commands::Parse { file } => cmd_parse(file)?,
        Commands::Enrich {
            url,
            page_timeout_secs,
        } => cmd_enrich(&url, page_timeout_secs).await?,
        Commands::Show { url } => cmd_show(&url, &connect_db().await?).await?,
        Commands::List { limit } => cmd_list(limit, &connect_db().await?).await?,
    }

    Ok(())
}

/// Connect with `DATABASE_URL` and apply migrations.
async fn connect_db() -> Result<AdvertRepository> {
    let config = DatabaseConfig::from_env()?;
    let db = Database::connect(&config)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await?;
    Ok(db.advert_repo())
}

async fn cmd_run(args: RunArgs) -> Result<()> {
    let tz = parse_timezone(&args.timezone)?;
    let cutoff = parse_cutoff(&args.from_date, tz)?;
    let config = PipelineConfig::new(cutoff, args.output_group)
        .with_backoff(Duration::from_secs(args.backoff_secs));
    let filters = FilterConfig::from_env()?;
    tracing::info!(%cutoff, ?filters, "Starting pipeline");

    let repo = connect_db().await?;
    let renderer = BrowserRenderer::with_timeout(Duration::from_secs(args.page_timeout_secs));
    let telegram = TelegramClient::new(&args.bot_token)?;

    if args.dry_run {
        run_pipeline(&args, repo, renderer, DryRunPublisher, &telegram, filters, config).await
    } else {
        let publisher = telegram.clone();
        run_pipeline(&args, repo, renderer, publisher, &telegram, filters, config).await
    }
}

async fn run_pipeline<P: Publisher>(
    args: &RunArgs,
    repo: AdvertRepository,
    renderer: BrowserRenderer,
    publisher: P,
    telegram: &TelegramClient,
    filters: FilterConfig,
    config: PipelineConfig,
) -> Result<()> {
    let service = IngestService::new(
        repo,
        EnrichmentResolver::new(renderer),
        filters.build_chain(),
        publisher,
        config,
    );
    let reporter = TracingReporter;

    if let Some(path) = &args.export {
        let mut backlog = ExportBacklog::open(path).await?;
        let stats = service.run_backlog(&mut backlog, &reporter).await?;
        tracing::info!(?stats, "Backlog finished");
    }

    if args.backlog_only {
        return Ok(());
    }

    let cancel_token = CancellationToken::new();
    let shutdown = cancel_token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C"),
        }
        shutdown.cancel();
    });

    let mut feed = telegram.updates(args.input_channel);
    tracing::info!(channel = args.input_channel, "Listening for new posts");
    let stats = service.run_live(&mut feed, cancel_token, &reporter).await?;
    tracing::info!(?stats, "Pipeline stopped");

    Ok(())
}

fn cmd_parse(file: Option<PathBuf>) -> Result<()> {
    let text = match file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };

    let fields = extract_fields(&text);
    println!("{}", serde_json::to_string_pretty(&fields)?);
    Ok(())
}

async fn cmd_enrich(url: &str, page_timeout_secs: u64) -> Result<()> {
    let renderer = BrowserRenderer::with_timeout(Duration::from_secs(page_timeout_secs));
    let resolver = EnrichmentResolver::new(renderer);

    match resolver.strategy_for(url) {
        Some(strategy) => tracing::info!(source = strategy.name(), "Rendering {url}"),
        None => tracing::info!("No enrichment source matches {url}"),
    }

    let enrichment = resolver.resolve(url).await?;
    println!("{}", serde_json::to_string_pretty(&enrichment)?);
    Ok(())
}

async fn cmd_show(url: &str, repo: &AdvertRepository) -> Result<()> {
    let Some(stored) = repo.get_by_url(url).await? else {
        println!("No advert stored for {url}");
        return Ok(());
    };

    println!("{}", serde_json::to_string_pretty(&stored)?);
    println!("\n{}", format_advert(&stored.advert));
    Ok(())
}

async fn cmd_list(limit: usize, repo: &AdvertRepository) -> Result<()> {
    let adverts = repo.list_recent(limit).await?;

    if adverts.is_empty() {
        println!("No adverts stored yet");
        return Ok(());
    }

    for stored in &adverts {
        let advert = &stored.advert;
        println!(
            "  {}  {:<16} {:>8} zł  {:>5} m²  {}",
            stored.created_at.format("%Y-%m-%d %H:%M"),
            advert.district.as_deref().unwrap_or("?"),
            advert.price.map_or("?".to_string(), |p| p.to_string()),
            advert.area.map_or("?".to_string(), |a| a.to_string()),
            advert.url,
        );
    }

    println!("\nTotal: {} adverts", adverts.len());
    Ok(())
}
