// config.rs
use crate::browser::{LaunchOptions, WaitPolicy};
use crate::errors::CrawlError;
use crate::scraper::{FetchStrategy, Layout, LayoutProfile};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "listing_crawler")]
#[command(about = "Crawls property search results into a local SQLite store")]
#[command(version)]
pub struct Cli {
    /// SQLite database file
    #[arg(long, env = "CRAWLER_DB", default_value = "listings.sqlite3", global = true)]
    pub db: PathBuf,

    /// Default log filter; RUST_LOG takes precedence
    #[arg(long, env = "CRAWLER_LOG", default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Walk the search results and store new listings
    Crawl(CrawlArgs),

    /// Write every stored listing to a JSON file
    Export {
        #[arg(short, long, default_value = "listings.json")]
        output: PathBuf,
    },

    /// Print the most recent crawl runs as JSON
    Runs {
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },
}

#[derive(Args, Debug, Clone)]
pub struct CrawlArgs {
    #[arg(long, value_enum, env = "CRAWLER_LAYOUT", default_value_t = Layout::Resale)]
    pub layout: Layout,

    /// Search results URL; defaults to the layout's own search page
    #[arg(long, env = "CRAWLER_SEARCH_URL")]
    pub search_url: Option<String>,

    /// Extra query parameter for the search URL, e.g. `--filter cityId=5`
    #[arg(long = "filter", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub filters: Vec<(String, String)>,

    /// Wall-clock budget for the whole run
    #[arg(long, env = "CRAWLER_BUDGET_SECS", default_value_t = 3600)]
    pub budget_secs: u64,

    /// Highest page number to crawl
    #[arg(long, env = "CRAWLER_MAX_PAGES", default_value_t = 50)]
    pub max_pages: u32,

    /// Page to start from; earlier pages are skipped over
    #[arg(long, env = "CRAWLER_START_PAGE", default_value_t = 1)]
    pub start_page: u32,

    #[arg(long, value_enum, env = "CRAWLER_STRATEGY", default_value_t = FetchStrategy::Interactive)]
    pub strategy: FetchStrategy,

    /// Chrome or Chromium binary; the usual install paths are searched when unset
    #[arg(long, env = "CHROMIUM_PATH")]
    pub chrome_path: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    #[arg(long, env = "CRAWLER_WAIT_TIMEOUT_SECS", default_value_t = 10)]
    pub wait_timeout_secs: u64,

    #[arg(long, default_value_t = 250)]
    pub poll_ms: u64,

    /// Pause after scrolling and after opening or closing panels
    #[arg(long, default_value_t = 1500)]
    pub settle_ms: u64,

    /// Pause after clicking a pagination control
    #[arg(long, default_value_t = 2000)]
    pub post_click_ms: u64,

    /// Pause after a detail page is ready, before it is read
    #[arg(long, default_value_t = 1000)]
    pub detail_settle_ms: u64,

    /// Override one layout selector, e.g. `--selector detail.price=div.cost`
    #[arg(long = "selector", value_name = "FIELD=CSS", value_parser = parse_key_value)]
    pub selectors: Vec<(String, String)>,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{s}`"))?;
    if key.trim().is_empty() {
        return Err(format!("empty key in `{s}`"));
    }
    Ok((key.trim().to_string(), value.trim().to_string()))
}

/// Waits and pauses used across the crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub wait: WaitPolicy,
    pub settle: Duration,
    pub post_click: Duration,
    pub detail_settle: Duration,
    pub scroll_step: i64,
    pub scroll_rounds: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            wait: WaitPolicy::default(),
            settle: Duration::from_millis(1500),
            post_click: Duration::from_millis(2000),
            detail_settle: Duration::from_millis(1000),
            scroll_step: 1000,
            scroll_rounds: 5,
        }
    }
}

/// Validated settings for one crawl run.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub profile: LayoutProfile,
    pub search_url: String,
    pub budget: Duration,
    pub start_page: u32,
    pub max_pages: u32,
    pub strategy: FetchStrategy,
    pub chrome_path: Option<PathBuf>,
    pub headless: bool,
    pub timing: Timing,
}

impl CrawlConfig {
    pub fn from_args(args: &CrawlArgs) -> Result<Self, CrawlError> {
        let mut profile = LayoutProfile::for_layout(args.layout);
        for (key, css) in &args.selectors {
            profile.apply_override(key, css)?;
        }

        let base = args
            .search_url
            .as_deref()
            .unwrap_or(&profile.default_search_url);
        let search_url = build_search_url(base, &args.filters)?;

        let timing = Timing {
            wait: WaitPolicy::new(
                Duration::from_secs(args.wait_timeout_secs),
                Duration::from_millis(args.poll_ms),
            ),
            settle: Duration::from_millis(args.settle_ms),
            post_click: Duration::from_millis(args.post_click_ms),
            detail_settle: Duration::from_millis(args.detail_settle_ms),
            ..Timing::default()
        };

        let config = Self {
            profile,
            search_url,
            budget: Duration::from_secs(args.budget_secs),
            start_page: args.start_page,
            max_pages: args.max_pages,
            strategy: args.strategy,
            chrome_path: args.chrome_path.clone(),
            headless: !args.headed,
            timing,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn launch_options(&self) -> LaunchOptions {
        LaunchOptions {
            executable: self.chrome_path.clone(),
            headless: self.headless,
            page_load_timeout: self.timing.wait.timeout,
        }
    }

    pub fn validate(&self) -> Result<(), CrawlError> {
        if self.start_page < 1 {
            return Err(CrawlError::Config("start page must be at least 1".into()));
        }
        if self.max_pages < self.start_page {
            return Err(CrawlError::Config(format!(
                "max pages ({}) is below the start page ({})",
                self.max_pages, self.start_page
            )));
        }
        if self.timing.wait.poll_interval.is_zero() {
            return Err(CrawlError::Config("poll interval must be positive".into()));
        }
        Ok(())
    }
}

/// Appends the filters to `base` as query parameters.
pub fn build_search_url(base: &str, filters: &[(String, String)]) -> Result<String, CrawlError> {
    let mut url = Url::parse(base)
        .map_err(|e| CrawlError::Config(format!("invalid search URL `{base}`: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(CrawlError::Config(format!("search URL must be http(s): `{base}`")));
    }
    if !filters.is_empty() {
        let mut query = url.query_pairs_mut();
        for (key, value) in filters {
            query.append_pair(key, value);
        }
    }
    Ok(url.into())
}
