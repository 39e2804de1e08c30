//! CLI binary for pdf2po.
//!
//! A thin shim over the library crate: maps flags to `ExtractionConfig`,
//! drives the processing queue, runs the HTTP backend and manages the
//! stored Fortnox credentials.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdf2po::credentials::DEFAULT_REDIRECT_URI;
use pdf2po::queue::EXPORT_FAILURE_PREFIX;
use pdf2po::{
    complete_authorization, server, ApiKeys, AppState, CredentialStore, ExtractedData,
    ExtractionConfig, FileCredentialStore, FortnoxClient, FortnoxConfig, OAuthCallback,
    PdfDocument, ProcessingQueue, ProgressCallback, PurchaseOrder, QueueProgressCallback,
    QueueStatus, ServerConfig, TokenRequest, VisionExtractor,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Progress bar over the queued documents plus one log line per finished
/// extraction.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<String, Instant>>,
}

impl CliProgressCallback {
    fn new(total: usize) -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        let bar = ProgressBar::new(total as u64);
        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, id: &str) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(id))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl QueueProgressCallback for CliProgressCallback {
    fn on_item_start(&self, id: &str, file_name: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(id.to_string(), Instant::now());
        }
        self.bar.set_message(file_name.to_string());
    }

    fn on_item_complete(&self, id: &str, file_name: &str, confidence: f64) {
        let secs = self.elapsed_secs(id);
        self.bar.println(format!(
            "  {} {:<40}  {}  {}",
            green("✓"),
            file_name,
            dim(&format!("{:>3.0}% confidence", confidence * 100.0)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, id: &str, file_name: &str, error: &str) {
        let secs = self.elapsed_secs(id);
        let msg = match error.char_indices().nth(79) {
            Some((cut, _)) => format!("{}\u{2026}", &error[..cut]),
            None => error.to_string(),
        };
        self.bar.println(format!(
            "  {} {:<40}  {}  {}",
            red("✗"),
            file_name,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_export_complete(&self, succeeded: usize, failed: usize) {
        let mark = if failed == 0 { green("✔") } else { cyan("⚠") };
        eprintln!(
            "{mark} {} purchase orders exported  ({} failed)",
            bold(&succeeded.to_string()),
            if failed == 0 {
                failed.to_string()
            } else {
                red(&failed.to_string())
            },
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract one order and print the JSON
  pdf2po extract order.pdf

  # Extract a batch into a directory, then send them to Fortnox
  pdf2po extract --output-dir out/ --export orders/*.pdf

  # Submit a reviewed order
  pdf2po submit out/order.json

  # Run the HTTP backend
  pdf2po serve --port 3000

FORTNOX AUTHORIZATION:
  1. pdf2po auth set --client-id ID --client-secret SECRET
  2. pdf2po auth url                 (open the printed URL and approve)
  3. pdf2po auth callback 'http://localhost:3000/oauth-callback?code=...'
  4. pdf2po auth test

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Directory containing libpdfium
  FORTNOX_ACCESS_TOKEN    Fallback access token when none is stored or sent
  FORTNOX_CLIENT_SECRET   Fallback client secret
  PORT                    HTTP backend port
  RUST_LOG                Log filter (overrides --verbose/--quiet)

A .env file in the working directory is loaded before flags are parsed.
"#;

/// Extract purchase orders from PDFs with Vision LLMs and submit them to Fortnox.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2po",
    version,
    about = "Extract purchase orders from PDFs with Vision LLMs and submit them to Fortnox",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF2PO_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDF2PO_QUIET")]
    quiet: bool,

    /// Override the API-key file location.
    #[arg(long, global = true, env = "PDF2PO_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// Fortnox base URL (API and OAuth roots are derived from it).
    #[arg(long, global = true, env = "FORTNOX_BASE_URL")]
    fortnox_url: Option<String>,
}

#[derive(clap::Args, Debug)]
struct ModelArgs {
    /// Vision model ID (default: gpt-4o).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Rendering DPI for page 1 (72–600).
    #[arg(long, env = "PDF2PO_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Model call timeout in seconds.
    #[arg(long, env = "PDF2PO_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Directory containing the pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "PDF2PO_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP backend.
    Serve {
        #[arg(long, env = "HOST", default_value = "0.0.0.0")]
        host: String,
        #[arg(short, long, env = "PORT", default_value_t = 3000)]
        port: u16,
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Extract purchase orders from one or more PDFs.
    Extract {
        /// PDF files, processed one at a time in the given order.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Write `<name>.json` per document here instead of printing.
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Submit every successful extraction to Fortnox afterwards.
        #[arg(long)]
        export: bool,
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Submit a reviewed order JSON file to Fortnox.
    Submit {
        /// A purchase order, or the `{purchaseOrder, confidence}` output of `extract`.
        order: PathBuf,
    },
    /// Manage stored Fortnox credentials and the OAuth flow.
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
}

#[derive(Subcommand, Debug)]
enum AuthAction {
    /// Store or update API keys. Omitted fields keep their current value.
    Set {
        #[arg(long)]
        client_id: Option<String>,
        #[arg(long)]
        client_secret: Option<String>,
        #[arg(long)]
        access_token: Option<String>,
        #[arg(long)]
        redirect_uri: Option<String>,
    },
    /// Show the stored keys with secrets redacted.
    Show,
    /// Delete the stored keys.
    Clear,
    /// Print the consent URL for the stored client id.
    Url,
    /// Finish authorization from the redirect URL Fortnox sent you to.
    Callback { url: String },
    /// Exchange a bare authorization code using the stored client keys.
    Exchange { code: String },
    /// Check the stored token against the company endpoint.
    Test,
}

/// Either a bare order or the extraction output wrapping one.
#[derive(Deserialize)]
#[serde(untagged)]
enum OrderFile {
    Extracted(ExtractedData),
    Order(PurchaseOrder),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs during batch extraction.
    let show_progress = !cli.quiet && matches!(cli.command, Command::Extract { .. });
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let store = match &cli.credentials {
        Some(path) => FileCredentialStore::new(path.clone()),
        None => FileCredentialStore::default_location()?,
    };
    let mut fortnox_config = FortnoxConfig::from_env();
    if let Some(url) = &cli.fortnox_url {
        fortnox_config = fortnox_config.with_base_url(url);
    }
    let fortnox = FortnoxClient::new(fortnox_config).context("Failed to build Fortnox client")?;

    match cli.command {
        Command::Serve { host, port, model } => {
            let config = build_config(&model).await?;
            let extractor = VisionExtractor::from_config(&config)
                .await
                .context("Failed to initialise the vision extractor")?;
            let state = AppState {
                extractor: Arc::new(extractor),
                fortnox: Arc::new(fortnox),
            };
            let server_config = ServerConfig {
                host,
                port,
                ..ServerConfig::default()
            };
            server::serve(state, &server_config)
                .await
                .context("HTTP backend stopped")?;
        }
        Command::Extract {
            inputs,
            output_dir,
            export,
            model,
        } => {
            let config = build_config(&model).await?;
            run_extract(
                &config,
                &inputs,
                output_dir.as_deref(),
                export.then_some((&fortnox, &store)),
                show_progress,
            )
            .await?;
        }
        Command::Submit { order } => {
            let text = tokio::fs::read_to_string(&order)
                .await
                .with_context(|| format!("Failed to read {}", order.display()))?;
            let order = match serde_json::from_str::<OrderFile>(&text)
                .context("File is neither a purchase order nor an extraction result")?
            {
                OrderFile::Extracted(data) => data.purchase_order,
                OrderFile::Order(order) => order,
            };
            let creds = store.load()?.and_then(|k| k.credentials());
            let response = fortnox
                .create_purchase_order(&order.normalized(), creds)
                .await
                .context("Submission failed")?;
            if !cli.quiet {
                eprintln!("{} {}", green("✔"), response.message);
            }
            println!("{}", serde_json::to_string_pretty(&response.data)?);
        }
        Command::Auth { action } => run_auth(action, &store, &fortnox).await?,
    }

    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(args: &ModelArgs) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .dpi(args.dpi)
        .api_timeout_secs(args.api_timeout);
    if let Some(model) = &args.model {
        builder = builder.model(model);
    }
    if let Some(provider) = &args.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(path) = &args.pdfium_lib_path {
        builder = builder.pdfium_lib_path(path);
    }
    if let Some(path) = &args.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {path:?}"))?;
        builder = builder.system_prompt(prompt);
    }
    builder.build().context("Invalid configuration")
}

async fn run_extract(
    config: &ExtractionConfig,
    inputs: &[PathBuf],
    output_dir: Option<&Path>,
    export: Option<(&FortnoxClient, &FileCredentialStore)>,
    show_progress: bool,
) -> Result<()> {
    let mut docs = Vec::with_capacity(inputs.len());
    for path in inputs {
        docs.push(
            PdfDocument::from_path(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?,
        );
    }

    let extractor = VisionExtractor::from_config(config)
        .await
        .context("Failed to initialise the vision extractor")?;

    let bar = show_progress.then(|| CliProgressCallback::new(docs.len()));
    let queue = match &bar {
        Some(cb) => ProcessingQueue::with_progress(
            Arc::new(extractor),
            Arc::clone(cb) as ProgressCallback,
        ),
        None => ProcessingQueue::new(Arc::new(extractor)),
    };

    queue.enqueue(docs);
    queue.wait_idle().await;
    if let Some(cb) = &bar {
        cb.finish();
    }

    if let Some(dir) = output_dir {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let items = queue.items();
    for item in &items {
        let Some(data) = &item.extracted_data else {
            continue;
        };
        let json = serde_json::to_string_pretty(data).context("Failed to serialise order")?;
        match output_dir {
            Some(dir) => {
                let stem = Path::new(&item.file_name)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| item.id.clone());
                let path = dir.join(format!("{stem}.json"));
                tokio::fs::write(&path, json)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
            None => println!("{json}"),
        }
    }

    if !show_progress {
        for item in items.iter().filter(|i| i.status == QueueStatus::Error) {
            eprintln!(
                "{} {}: {}",
                red("✗"),
                item.file_name,
                item.error.as_deref().unwrap_or_default()
            );
        }
    }

    let counts = queue.counts();
    if let Some((fortnox, store)) = export {
        let creds = store.load()?.and_then(|k| k.credentials());
        let summary = queue.export_all(fortnox, creds).await;
        if !show_progress {
            eprintln!(
                "Exported {}/{} purchase orders",
                summary.succeeded,
                summary.attempted()
            );
        }
        for item in queue.items().iter().filter(|i| i.status == QueueStatus::Error) {
            if let Some(err) = item.error.as_deref().filter(|e| e.starts_with(EXPORT_FAILURE_PREFIX)) {
                eprintln!("  {} {}: {}", red("✗"), item.file_name, err);
            }
        }
    }

    eprintln!(
        "{}  {} extracted  {} failed",
        if counts.error == 0 { green("✔") } else { cyan("⚠") },
        bold(&counts.completed.to_string()),
        counts.error,
    );
    if counts.completed == 0 && counts.error > 0 {
        anyhow::bail!("No document could be extracted");
    }
    Ok(())
}

async fn run_auth(
    action: AuthAction,
    store: &FileCredentialStore,
    fortnox: &FortnoxClient,
) -> Result<()> {
    match action {
        AuthAction::Set {
            client_id,
            client_secret,
            access_token,
            redirect_uri,
        } => {
            let mut keys = store.load()?.unwrap_or_default();
            if let Some(v) = client_id {
                keys.fortnox_client_id = v;
            }
            if let Some(v) = client_secret {
                keys.fortnox_client_secret = v;
            }
            if let Some(v) = access_token {
                keys.fortnox_access_token = v;
            }
            if let Some(v) = redirect_uri {
                keys.fortnox_redirect_uri = v;
            }
            store.save(&keys)?;
            eprintln!("{} Saved to {}", green("✔"), store.path().display());
        }
        AuthAction::Show => match store.load()? {
            Some(keys) => {
                println!("File:          {}", store.path().display());
                println!("Client ID:     {}", keys.fortnox_client_id);
                println!(
                    "Client secret: {}",
                    if keys.fortnox_client_secret.is_empty() { "" } else { "<set>" }
                );
                println!(
                    "Access token:  {}",
                    if keys.fortnox_access_token.is_empty() {
                        String::new()
                    } else {
                        pdf2po::fortnox::preview(&keys.fortnox_access_token)
                    }
                );
                println!("Redirect URI:  {}", keys.fortnox_redirect_uri);
                println!("API ready:     {}", keys.has_api_keys());
                println!("OAuth ready:   {}", keys.has_oauth_configured());
            }
            None => println!("No API keys stored at {}", store.path().display()),
        },
        AuthAction::Clear => {
            store.clear()?;
            eprintln!("{} Cleared {}", green("✔"), store.path().display());
        }
        AuthAction::Url => {
            let mut keys = store.load()?.unwrap_or_default();
            if keys.fortnox_redirect_uri.is_empty() {
                keys.fortnox_redirect_uri = DEFAULT_REDIRECT_URI.to_string();
            }
            let state = uuid::Uuid::new_v4().to_string();
            let url = fortnox.authorization_url(
                &keys.fortnox_client_id,
                &keys.fortnox_redirect_uri,
                &state,
            )?;
            store.save(&keys)?;
            println!("{url}");
        }
        AuthAction::Callback { url } => {
            let callback = OAuthCallback::from_url(&url)?;
            let token = complete_authorization(store, fortnox, callback).await?;
            print_token_saved(token.scope.as_deref());
        }
        AuthAction::Exchange { code } => {
            let mut keys: ApiKeys = store.load()?.unwrap_or_default();
            let token = fortnox
                .exchange_code(&TokenRequest::from_keys(code, &keys))
                .await?;
            keys.fortnox_access_token = token.access_token.clone();
            store.save(&keys)?;
            print_token_saved(token.scope.as_deref());
        }
        AuthAction::Test => {
            let creds = store.load()?.and_then(|k| k.credentials());
            let company = fortnox.test_connection(creds).await?;
            println!("{} Connected to {}", green("✔"), bold(&company));
        }
    }
    Ok(())
}

fn print_token_saved(scope: Option<&str>) {
    eprintln!(
        "{} Access token saved  {}",
        green("✔"),
        dim(&format!("scope: {}", scope.unwrap_or("-")))
    );
}
