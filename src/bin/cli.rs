//! browser-harvest command line
//!
//! `analyze` prints what the page analyzer learns about a page. `scrape` turns the page
//! into a CSV or JSON-lines table, optionally resuming from hashes of an earlier run.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use browser_harvest::escalation::{HumanEscalation, InteractionKind};
use browser_harvest::{
    BrowserSession, Column, ColumnType, ConnectionOptions, CsvSink, DecisionModel, JsonLinesSink, LaunchOptions,
    OpenAiConfig, OpenAiModel, PageAnalyzer, PageContext, RowSink, ScrapingType, StreamOptions, Summarizer,
    WebScraper, WebScraperConfig,
};
use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "browser-harvest", version, about = "Analyze web pages and scrape them into tables")]
struct Cli {
    /// Show the browser window
    #[arg(long, global = true)]
    headed: bool,

    /// DevTools WebSocket URL of a running browser to use instead of launching one
    #[arg(long, global = true, env = "HARVEST_WS_URL")]
    ws_url: Option<String>,

    /// Decision model name
    #[arg(long, global = true, env = "HARVEST_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the page analysis as JSON
    Analyze {
        url: String,
    },

    /// Scrape a page into a .csv or .jsonl file
    Scrape {
        url: String,

        /// Output file; the extension picks the format
        #[arg(short, long)]
        output: PathBuf,

        /// Output column as name:type:description, repeatable; inferred from a sample when omitted
        #[arg(long = "column", value_parser = parse_column)]
        columns: Vec<Column>,

        /// What to extract, used when inferring columns
        #[arg(long)]
        goal: Option<String>,

        /// Items sampled when inferring columns
        #[arg(long, default_value_t = 5)]
        sample_size: usize,

        /// Maximum number of rows
        #[arg(long)]
        limit: Option<usize>,

        #[arg(long, default_value_t = 10)]
        batch_size: usize,

        /// Batches summarized in parallel
        #[arg(long, default_value_t = 4)]
        concurrency: usize,

        /// Skip analysis: single or list-like
        #[arg(long)]
        scraping_type: Option<ScrapingType>,

        /// Skip analysis: selector matching each item
        #[arg(long)]
        items_selector: Option<String>,

        #[arg(long)]
        ancestor_selector: Option<String>,

        #[arg(long)]
        pagination_button: Option<String>,

        /// Hashes from an earlier run, one per line; those items are skipped
        #[arg(long)]
        skip_hashes: Option<PathBuf>,

        /// Write the skipped hashes that were seen again during this run
        #[arg(long)]
        matched_hashes: Option<PathBuf>,

        /// Append the hashes of every row written by this run
        #[arg(long)]
        hashes_out: Option<PathBuf>,
    },
}

/// Parse `name:type:description`; type and description may be omitted
fn parse_column(raw: &str) -> std::result::Result<Column, String> {
    let mut parts = raw.splitn(3, ':');
    let name = parts.next().unwrap_or_default().trim();
    if name.is_empty() {
        return Err("column name must not be empty".to_string());
    }
    let column_type = match parts.next().map(|t| t.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("text") => ColumnType::Text,
        Some("number") => ColumnType::Number,
        Some("link") => ColumnType::Link,
        Some("image") => ColumnType::Image,
        Some(other) => return Err(format!("unknown column type '{}' (text, number, link, image)", other)),
    };
    let description = parts.next().unwrap_or_default().trim();
    Ok(Column::new(name, column_type, description))
}

/// Asks on the terminal and waits for Enter
struct TerminalEscalation;

#[async_trait]
impl HumanEscalation for TerminalEscalation {
    async fn web_interaction(
        &self,
        message: &str,
        url: &str,
        action: InteractionKind,
    ) -> browser_harvest::Result<String> {
        eprintln!();
        eprintln!("[{}] {}", action, message);
        eprintln!("    page: {}", url);
        eprint!("Press Enter when finished (optionally type a note first): ");

        let mut line = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        let note = line.trim();
        Ok(if note.is_empty() { "done".to_string() } else { note.to_string() })
    }
}

fn read_hashes(path: &Path) -> Result<HashSet<String>> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

fn write_hashes<'a>(path: &Path, hashes: impl IntoIterator<Item = &'a String>, append: bool) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for hash in hashes {
        writeln!(writer, "{}", hash)?;
    }
    writer.flush()?;
    Ok(())
}

fn open_sink(path: &Path) -> Result<Box<dyn RowSink>> {
    let file = BufWriter::new(File::create(path).with_context(|| format!("Failed to create {}", path.display()))?);
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "csv" => Ok(Box::new(CsvSink::new(file))),
        "jsonl" | "ndjson" => Ok(Box::new(JsonLinesSink::new(file))),
        other => bail!("unsupported output format '.{}' (use .csv or .jsonl)", other),
    }
}

fn open_session(cli: &Cli) -> Result<BrowserSession> {
    let session = match &cli.ws_url {
        Some(ws_url) => BrowserSession::connect(ConnectionOptions::new(ws_url.clone()))?,
        None => BrowserSession::launch(LaunchOptions::new().headless(!cli.headed))?,
    };
    Ok(session)
}

fn decision_model(cli: &Cli) -> Result<Arc<dyn DecisionModel>> {
    let mut config = OpenAiConfig::from_env()?;
    if let Some(model) = &cli.model {
        config = config.model(model.clone());
    }
    log::info!("Using decision model {}", config.model);
    Ok(Arc::new(OpenAiModel::new(config)?))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let model = decision_model(&cli)?;
    let session = open_session(&cli)?;
    let page: Arc<dyn PageContext> = Arc::new(session.open_page()?);

    match &cli.command {
        Commands::Analyze { url } => {
            let analysis = PageAnalyzer::new(model).analyze(page.as_ref(), url).await?;
            println!("{}", serde_json::to_string_pretty(&analysis)?);
        }
        Commands::Scrape {
            url,
            output,
            columns,
            goal,
            sample_size,
            limit,
            batch_size,
            concurrency,
            scraping_type,
            items_selector,
            ancestor_selector,
            pagination_button,
            skip_hashes,
            matched_hashes,
            hashes_out,
        } => {
            let options = StreamOptions::new(*batch_size, *limit, *concurrency);
            options.validate()?;
            let sink = open_sink(output)?;

            let mut config = if scraping_type.is_some() || items_selector.is_some() {
                WebScraperConfig::new(url.clone(), scraping_type.unwrap_or(ScrapingType::ListLike))
            } else {
                let analysis = PageAnalyzer::new(model.clone()).analyze(page.as_ref(), url).await?;
                log::info!("Analysis: {}", serde_json::to_string(&analysis)?);
                WebScraperConfig::from_analysis(&analysis)
            };
            if let Some(selector) = items_selector {
                config = config.items_selector(selector.clone());
            }
            if let Some(selector) = ancestor_selector {
                config = config.ancestor_selector(selector.clone());
            }
            if let Some(selector) = pagination_button {
                config = config.pagination_button_selector(selector.clone());
            }
            if let Some(path) = skip_hashes {
                let hashes = read_hashes(path)?;
                log::info!("Skipping {} items from an earlier run", hashes.len());
                config = config.skip_item_hashes(hashes);
            }

            let scraper = Arc::new(WebScraper::new(page.clone(), config)?.with_escalation(Arc::new(TerminalEscalation)));
            let summarizer = Summarizer::new(scraper.clone(), model);

            let columns = if columns.is_empty() {
                match summarizer.infer_columns(*sample_size, goal.as_deref()).await? {
                    Some(columns) => columns,
                    None => bail!("no items found on {}", url),
                }
            } else {
                columns.clone()
            };
            log::info!(
                "Columns: {}",
                columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(", ")
            );

            let mut sink = sink;
            let report = summarizer.summarize(columns, options, sink.as_mut()).await?;
            drop(sink);

            for diagnostic in &report.diagnostics {
                log::warn!("{}", diagnostic);
            }
            if let Some(path) = hashes_out {
                write_hashes(path, &report.hashes, true)?;
            }
            if let Some(path) = matched_hashes {
                let matched = scraper.matched_hashes().await;
                write_hashes(path, &matched, false)?;
            }
            eprintln!(
                "Wrote {} rows in {} batches to {}",
                report.rows,
                report.batches,
                output.display()
            );
        }
    }

    if let Err(e) = session.close() {
        log::debug!("Browser close: {}", e);
    }
    Ok(())
}
