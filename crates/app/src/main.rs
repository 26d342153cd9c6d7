use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use showroom_search_core::config::DEFAULT_IMAGE_DELIVERY;
use showroom_search_core::{
    load_facet_options, optimized_image_url, srcset, FacetSource, GatewayConfig,
    ImageDeliveryConfig, ImageFit, ImageFormat, ImageOptions, IndexUpstream, MeilisearchStore,
    Pagination, PostgrestStore, PresentationState, RedisCache, ResultCache, SearchGateway,
    SearchSession, SessionConfig, SessionUpdate, TableUpstream, Upstream,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "showroom-search", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Search index base URL
    #[arg(long, env = "MEILISEARCH_HOST", default_value = "http://localhost:7700")]
    meilisearch_host: String,

    /// Search index API key
    #[arg(long, env = "MEILISEARCH_API_KEY", default_value = "", hide_env_values = true)]
    meilisearch_api_key: String,

    /// Database REST base URL
    #[arg(long, env = "SUPABASE_URL", default_value = "http://localhost:54321")]
    supabase_url: String,

    /// Database anonymous key
    #[arg(long, env = "SUPABASE_ANON_KEY", default_value = "", hide_env_values = true)]
    supabase_anon_key: String,

    /// Shared cache URL. Results are cached in process when unset or unreachable.
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Image delivery base URL
    #[arg(long, env = "IMAGE_DELIVERY_BASE", default_value = DEFAULT_IMAGE_DELIVERY)]
    image_delivery_base: String,

    /// Cache TTL in seconds.
    #[arg(long, default_value = "3600")]
    cache_ttl: u64,

    /// Always query the collaborators.
    #[arg(long, default_value_t = false)]
    no_cache: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Query a search index.
    Search {
        #[arg(long)]
        query: String,
        #[arg(long, value_enum, default_value = "deliveries")]
        index: IndexName,
        /// Facet selection as name=value; repeatable.
        #[arg(long = "facet", value_parser = parse_facet)]
        facets: Vec<(String, String)>,
        #[arg(long, default_value = "1")]
        page: u32,
        #[arg(long, default_value = "10")]
        page_size: u32,
    },
    /// Query a database table.
    Browse {
        #[arg(long)]
        query: String,
        #[arg(long, value_enum, default_value = "deliveries")]
        table: TableName,
        /// Facet selection as name=value; repeatable.
        #[arg(long = "facet", value_parser = parse_facet)]
        facets: Vec<(String, String)>,
        #[arg(long, default_value = "1")]
        page: u32,
        #[arg(long, default_value = "10")]
        page_size: u32,
    },
    /// List the selectable values of a facet with their counts.
    Facets {
        #[arg(long, value_enum)]
        facet: FacetName,
    },
    /// Print an optimized image URL, or a srcset when widths are given.
    ImageUrl {
        #[arg(long)]
        image: String,
        #[arg(long, default_value = "public")]
        variant: String,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
        #[arg(long)]
        quality: Option<u8>,
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
        #[arg(long, value_enum)]
        fit: Option<FitArg>,
        /// Comma separated widths.
        #[arg(long, value_delimiter = ',')]
        srcset: Vec<u32>,
    },
    /// Read keystroke-level term input from stdin, one line per update.
    ///
    /// Lines starting with ':' are commands: `:facet name value`,
    /// `:page n`, `:next`, `:prev`, `:clear`.
    Interactive {
        #[arg(long, value_enum, default_value = "deliveries")]
        index: IndexName,
        #[arg(long, default_value = "300")]
        debounce_ms: u64,
        #[arg(long, default_value = "10")]
        page_size: u32,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum IndexName {
    Deliveries,
    Unified,
}

#[derive(Clone, Copy, ValueEnum)]
enum TableName {
    Deliveries,
    Posts,
    Jobs,
}

#[derive(Clone, Copy, ValueEnum)]
enum FacetName {
    DeliveryLocations,
    DeliveryTowns,
    PostLocations,
    PostCategories,
    JobLocations,
    JobDepartments,
    JobCities,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Auto,
    Webp,
    Avif,
}

#[derive(Clone, Copy, ValueEnum)]
enum FitArg {
    Cover,
    Contain,
    Fill,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "showroom-search boot"
    );

    match &cli.command {
        Command::Search {
            query,
            index,
            facets,
            page,
            page_size,
        } => {
            let gateway = build_gateway(&cli, index_upstream(&cli, *index)).await?;
            run_query(gateway, query, facets, *page, *page_size).await?;
        }
        Command::Browse {
            query,
            table,
            facets,
            page,
            page_size,
        } => {
            let gateway = build_gateway(&cli, table_upstream(&cli, *table)).await?;
            run_query(gateway, query, facets, *page, *page_size).await?;
        }
        Command::Facets { facet } => {
            let cache = build_cache(&cli).await;
            let store = PostgrestStore::new(&cli.supabase_url, &cli.supabase_anon_key);
            let options = load_facet_options(&store, &facet_source(*facet), &cache)
                .await
                .context("failed to load facet options")?;

            if options.is_empty() {
                println!("no options");
            }
            for option in options {
                println!("{}\t{} ({})", option.value, option.label, option.count);
            }
        }
        Command::ImageUrl {
            image,
            variant,
            width,
            height,
            quality,
            format,
            fit,
            srcset: widths,
        } => {
            let config = ImageDeliveryConfig {
                delivery_base: cli.image_delivery_base.clone(),
            };
            let options = ImageOptions {
                width: *width,
                height: *height,
                quality: *quality,
                format: format.map(ImageFormat::from),
                fit: fit.map(ImageFit::from),
            };

            if widths.is_empty() {
                println!("{}", optimized_image_url(&config, image, variant, &options)?);
            } else {
                println!("{}", srcset(&config, image, widths, &options)?);
            }
        }
        Command::Interactive {
            index,
            debounce_ms,
            page_size,
        } => {
            let gateway = build_gateway(&cli, index_upstream(&cli, *index)).await?;
            let config = SessionConfig {
                debounce: Duration::from_millis(*debounce_ms),
                page_size: *page_size,
            };
            run_interactive(SearchSession::new(Arc::new(gateway), config)).await?;
        }
    }

    Ok(())
}

async fn build_cache(cli: &Cli) -> ResultCache {
    let cache = match &cli.redis_url {
        Some(url) => match RedisCache::connect(url).await {
            Ok(redis) => ResultCache::with_primary(Arc::new(redis)),
            Err(error) => {
                warn!(%error, "redis unreachable, caching in process only");
                ResultCache::in_memory()
            }
        },
        None => ResultCache::in_memory(),
    };
    cache.with_default_ttl(Duration::from_secs(cli.cache_ttl))
}

async fn build_gateway(
    cli: &Cli,
    upstream: Box<dyn Upstream>,
) -> anyhow::Result<SearchGateway<Box<dyn Upstream>>> {
    let cache = build_cache(cli).await;
    let config = GatewayConfig {
        cache_ttl: Duration::from_secs(cli.cache_ttl),
        cache_enabled: !cli.no_cache,
        ..GatewayConfig::default()
    };
    info!(
        source = upstream.source(),
        cache = cache.backend_name(),
        "search gateway ready"
    );
    Ok(SearchGateway::new(upstream, Arc::new(cache), config)?)
}

fn index_upstream(cli: &Cli, index: IndexName) -> Box<dyn Upstream> {
    let store = MeilisearchStore::new(&cli.meilisearch_host, &cli.meilisearch_api_key);
    match index {
        IndexName::Deliveries => Box::new(IndexUpstream::deliveries(store)),
        IndexName::Unified => Box::new(IndexUpstream::unified(store)),
    }
}

fn table_upstream(cli: &Cli, table: TableName) -> Box<dyn Upstream> {
    let store = PostgrestStore::new(&cli.supabase_url, &cli.supabase_anon_key);
    match table {
        TableName::Deliveries => Box::new(TableUpstream::deliveries(store)),
        TableName::Posts => Box::new(TableUpstream::posts(store)),
        TableName::Jobs => Box::new(TableUpstream::jobs(store)),
    }
}

fn facet_source(facet: FacetName) -> FacetSource {
    match facet {
        FacetName::DeliveryLocations => FacetSource::delivery_locations(),
        FacetName::DeliveryTowns => FacetSource::delivery_towns(),
        FacetName::PostLocations => FacetSource::post_locations(),
        FacetName::PostCategories => FacetSource::post_categories(),
        FacetName::JobLocations => FacetSource::job_locations(),
        FacetName::JobDepartments => FacetSource::job_departments(),
        FacetName::JobCities => FacetSource::job_cities(),
    }
}

async fn run_query(
    gateway: SearchGateway<Box<dyn Upstream>>,
    query: &str,
    facets: &[(String, String)],
    page: u32,
    page_size: u32,
) -> anyhow::Result<()> {
    let config = SessionConfig {
        page_size,
        ..SessionConfig::default()
    };
    let mut session = SearchSession::new(Arc::new(gateway), config);

    for (name, value) in facets {
        session.select_facet(name, value);
    }
    session.submit_term(query);
    session.settle().await;

    // The page count is only known after the first response.
    if page > 1 && session.go_to_page(page) == SessionUpdate::Issued {
        session.settle().await;
    }

    print_state(session.state(), session.pagination());
    if let PresentationState::Error { reason, .. } = session.state() {
        bail!("{reason}");
    }
    Ok(())
}

async fn run_interactive(mut session: SearchSession<Box<dyn Upstream>>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                match line? {
                    Some(line) => {
                        if let Some(update) = apply_line(&mut session, &line) {
                            report(&session, update);
                        }
                    }
                    None => stdin_open = false,
                }
            }
            Some(update) = session.next_update(), if session.has_pending() => {
                report(&session, update);
            }
            else => break,
        }
    }
    Ok(())
}

fn apply_line(session: &mut SearchSession<Box<dyn Upstream>>, line: &str) -> Option<SessionUpdate> {
    let Some(command) = line.strip_prefix(':') else {
        session.input_term(line);
        return None;
    };

    let mut parts = command.split_whitespace();
    let update = match (parts.next(), parts.next(), parts.next()) {
        (Some("facet"), Some(name), Some(value)) => session.select_facet(name, value),
        (Some("facet"), Some(name), None) => session.clear_facet(name),
        (Some("page"), Some(page), None) => match page.parse() {
            Ok(page) => session.go_to_page(page),
            Err(_) => {
                eprintln!("not a page number: {page}");
                return None;
            }
        },
        (Some("next"), None, None) => session.next_page(),
        (Some("prev"), None, None) => session.prev_page(),
        (Some("clear"), None, None) => session.clear_filters(),
        _ => {
            eprintln!("unknown command: {line}");
            return None;
        }
    };
    Some(update)
}

fn report(session: &SearchSession<Box<dyn Upstream>>, update: SessionUpdate) {
    match update {
        SessionUpdate::Unchanged | SessionUpdate::Stale => {}
        _ => print_state(session.state(), session.pagination()),
    }
}

fn print_state(state: &PresentationState, pagination: &Pagination) {
    match state {
        PresentationState::Idle => println!("idle: enter at least 2 characters"),
        PresentationState::Loading(descriptor) => {
            println!("loading: term={:?} page={}", descriptor.term(), descriptor.page());
        }
        PresentationState::Empty(descriptor) => {
            println!("no results for {:?}", descriptor.term());
        }
        PresentationState::Error { reason, .. } => println!("error: {reason}"),
        PresentationState::Success(page) => {
            println!(
                "{} results, page {} of {}",
                page.total_hits,
                pagination.page(),
                pagination.total_pages()
            );
            for record in &page.records {
                println!("[{}] {} -> {}", record.kind, record.title, record.target_url);
                if !record.summary.is_empty() {
                    println!("  {}", record.summary);
                }
                for tag in &record.facet_tags {
                    println!("  {}: {}", tag.label, tag.value);
                }
            }
        }
    }
}

fn parse_facet(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected name=value, got {raw:?}")),
    }
}

impl From<FormatArg> for ImageFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Auto => ImageFormat::Auto,
            FormatArg::Webp => ImageFormat::Webp,
            FormatArg::Avif => ImageFormat::Avif,
        }
    }
}

impl From<FitArg> for ImageFit {
    fn from(fit: FitArg) -> Self {
        match fit {
            FitArg::Cover => ImageFit::Cover,
            FitArg::Contain => ImageFit::Contain,
            FitArg::Fill => ImageFit::Fill,
        }
    }
}
