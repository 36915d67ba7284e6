//! SIRIM Capture - certification serial capture and SKU session grouping
//!
//! Replays recorded text recognizer output through the serial selector and
//! capture workflow, and manages stored SKU events, captures and exports.

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use sirim_capture::analysis::{partition, SessionGrouping};
use sirim_capture::capture::frame::{CapturedFrame, Frame};
use sirim_capture::capture::{AnalysisWorker, Submission, WorkflowState};
use sirim_capture::config::{self, AppConfig};
use sirim_capture::export;
use sirim_capture::storage::{
    format_timestamp, now_millis, CaptureStore, Database, PreferencesStore, SkuContext,
};
use sirim_capture::vision::{RecordedTextRecognizer, ReferenceKeywordSet, TextAnalyzer};
use sirim_capture::{CaptureDetails, SaveOutcome, ScannerApp};

/// SIRIM Capture - certification serial capture
#[derive(Parser, Debug)]
#[command(name = "sirim-capture")]
#[command(about = "Capture certification serials and group them by scanned SKU")]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding the configured one
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run recorded recognizer output (JSON) through the scanner
    Scan(ScanArgs),
    /// Manage scanned SKU barcodes
    Sku {
        #[command(subcommand)]
        action: SkuCommand,
    },
    /// Manage stored captures
    Captures {
        #[command(subcommand)]
        action: CapturesCommand,
    },
    /// Show captures grouped by SKU session
    Sessions,
    /// Write session reports
    Export {
        /// Output directory (defaults to the configured export directory)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Only refresh the current SKU's report
        #[arg(long)]
        current: bool,
    },
    /// Show or change reference keywords
    Keywords {
        #[command(subcommand)]
        action: KeywordsCommand,
    },
}

#[derive(ClapArgs, Debug)]
struct ScanArgs {
    /// Recognized text JSON files, one per frame, in capture order
    #[arg(required = true)]
    frames: Vec<PathBuf>,

    /// Frame width in pixels
    #[arg(long, default_value = "1280", conflicts_with = "image")]
    width: u32,

    /// Frame height in pixels
    #[arg(long, default_value = "720", conflicts_with = "image")]
    height: u32,

    /// Display rotation of the frames in degrees
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    rotation: i32,

    /// Take frame dimensions from this image
    #[arg(long)]
    image: Option<PathBuf>,

    /// Treat the single input as a still image (no confirmation over frames)
    #[arg(long)]
    still: bool,

    /// Save the confirmed serial
    #[arg(long)]
    save: bool,

    /// Label stored with the capture
    #[arg(long, requires = "save")]
    label: Option<String>,

    /// Where on the product the code was found
    #[arg(long, requires = "save")]
    source: Option<String>,

    /// Free-form note stored with the capture
    #[arg(long, requires = "save")]
    note: Option<String>,
}

#[derive(Subcommand, Debug)]
enum SkuCommand {
    /// Record a scanned barcode and make it current
    Add { barcode: String },
    /// List recorded barcodes
    List,
    /// Make an existing SKU event current
    Select { id: i64 },
    /// Clear the current SKU
    Clear,
    /// Delete a SKU event; its captures become orphans
    Delete { id: i64 },
}

#[derive(Subcommand, Debug)]
enum CapturesCommand {
    /// List stored captures
    List,
    /// Delete a capture
    Delete { id: i64 },
}

#[derive(Subcommand, Debug)]
enum KeywordsCommand {
    /// Show configured and effective keywords
    Show,
    /// Replace the configured keywords; no keywords restores the built-in set
    Set { keywords: Vec<String> },
}

/// Opened stores and settings for one command
struct Runtime {
    config: AppConfig,
    config_path: PathBuf,
    database: Arc<Database>,
    preferences: Arc<PreferencesStore>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => config::default_config_path()?,
    };
    let config = config::load_or_default(&config_path)?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.general.log_level))
        .context("invalid log level")?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("SIRIM Capture starting...");

    let database_path = match &args.database {
        Some(path) => path.clone(),
        None => config.storage.database_path()?,
    };
    let database = Arc::new(Database::open(&database_path)?);
    let preferences = Arc::new(PreferencesStore::open(config.storage.preferences_path()?));

    let mut ctx = Runtime {
        config,
        config_path,
        database,
        preferences,
    };

    match args.command {
        Command::Scan(scan) => run_scan(&ctx, scan),
        Command::Sku { action } => run_sku(&ctx, action),
        Command::Captures { action } => run_captures(&ctx, action),
        Command::Sessions => run_sessions(&ctx),
        Command::Export { out, current } => run_export(&ctx, out, current),
        Command::Keywords { action } => run_keywords(&mut ctx, action),
    }
}

fn run_scan(ctx: &Runtime, args: ScanArgs) -> Result<()> {
    let selector = ctx.config.scanner.selector()?;
    info!("Scanning with serial rule {}", selector.rule.describe());
    let analyzer = Arc::new(TextAnalyzer::new(Arc::new(RecordedTextRecognizer), selector));
    let app = Arc::new(ScannerApp::new(ctx.database.clone(), ctx.preferences.clone()));
    let status = app.status_receiver();

    let (width, height) = match &args.image {
        Some(path) => image::image_dimensions(path)
            .with_context(|| format!("failed to read image dimensions from {}", path.display()))?,
        None => (args.width, args.height),
    };

    if args.still {
        let [path] = args.frames.as_slice() else {
            bail!("--still takes exactly one input");
        };
        // Still images are analyzed upright
        let mut frame = load_frame(path, width, height, 0)?;
        let result = analyzer.analyze(&frame);
        frame.close();
        app.handle_still_image(result);
    } else {
        let worker = AnalysisWorker::spawn(analyzer, app.clone())?;
        for path in &args.frames {
            let frame = load_frame(path, width, height, args.rotation)?;
            match worker.submit(Box::new(frame)) {
                Submission::Accepted => wait_until_idle(&worker),
                skipped => info!("Frame {} not analyzed: {:?}", path.display(), skipped),
            }
        }
    }

    for message in status.try_iter() {
        println!("{message}");
    }

    let state = app.state();
    match state.detection() {
        Some(detection) => println!("State: {} ({})", state.name(), detection.payload),
        None => println!("State: {}", state.name()),
    }

    if args.save {
        if !matches!(state, WorkflowState::Confirmed { .. }) {
            bail!("nothing confirmed to save");
        }
        let details = CaptureDetails {
            label: args.label,
            source: args.source,
            note: args.note,
        };
        match app.save(details)? {
            SaveOutcome::Saved { payload, capture_id } => {
                println!("Saved {payload} as capture #{capture_id}")
            }
            SaveOutcome::Duplicate { payload, existing_id } => {
                println!("{payload} is already saved as capture #{existing_id}")
            }
            SaveOutcome::InProgress | SaveOutcome::NothingToSave => {}
        }
    }

    Ok(())
}

fn load_frame(path: &Path, width: u32, height: u32, rotation: i32) -> Result<CapturedFrame> {
    let data = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(CapturedFrame::new(data, width, height).with_rotation(rotation))
}

fn wait_until_idle(worker: &AnalysisWorker) {
    while worker.is_busy() {
        std::thread::sleep(Duration::from_millis(1));
    }
}

fn run_sku(ctx: &Runtime, action: SkuCommand) -> Result<()> {
    match action {
        SkuCommand::Add { barcode } => {
            let barcode = barcode.trim();
            if barcode.is_empty() {
                bail!("barcode must not be empty");
            }
            let event = ctx.database.insert_sku_event(barcode, now_millis())?;
            ctx.preferences.set_current_sku_event_id(Some(event.id))?;
            println!("SKU #{} {} is now current", event.id, event.barcode);
        }
        SkuCommand::List => {
            let current = ctx.preferences.current_sku_event_id()?;
            for event in ctx.database.list_sku_events()? {
                let marker = if current == Some(event.id) { "*" } else { " " };
                println!(
                    "{marker} #{:<5} {:<20} {}",
                    event.id,
                    event.barcode,
                    format_timestamp(event.created_at)
                );
            }
        }
        SkuCommand::Select { id } => {
            let Some(event) = ctx.database.find_sku_event(id)? else {
                bail!("no SKU event #{id}");
            };
            ctx.preferences.set_current_sku_event_id(Some(event.id))?;
            println!("SKU #{} {} is now current", event.id, event.barcode);
        }
        SkuCommand::Clear => {
            ctx.preferences.set_current_sku_event_id(None)?;
            println!("No current SKU");
        }
        SkuCommand::Delete { id } => {
            if !ctx.database.delete_sku_event(id)? {
                bail!("no SKU event #{id}");
            }
            if ctx.preferences.current_sku_event_id()? == Some(id) {
                ctx.preferences.set_current_sku_event_id(None)?;
            }
            println!("Deleted SKU #{id}");
        }
    }
    Ok(())
}

fn run_captures(ctx: &Runtime, action: CapturesCommand) -> Result<()> {
    match action {
        CapturesCommand::List => {
            for capture in ctx.database.list_text_captures()? {
                let sku = capture
                    .sku_event_id
                    .map(|id| format!("SKU #{id}"))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "#{:<5} {:<16} {} {:<10} {}",
                    capture.id,
                    capture.payload,
                    format_timestamp(capture.captured_at),
                    sku,
                    capture.label.as_deref().unwrap_or("")
                );
            }
        }
        CapturesCommand::Delete { id } => {
            if !ctx.database.delete_capture(id)? {
                bail!("no capture #{id}");
            }
            println!("Deleted capture #{id}");
        }
    }
    Ok(())
}

fn session_grouping(ctx: &Runtime) -> Result<SessionGrouping> {
    let events = ctx.database.list_sku_events()?;
    let captures = ctx.database.list_text_captures()?;
    Ok(partition(&events, &captures))
}

fn run_sessions(ctx: &Runtime) -> Result<()> {
    let grouping = session_grouping(ctx)?;
    for session in &grouping.sessions {
        println!(
            "SKU #{} {} ({}) - {} captures",
            session.event.id,
            session.event.barcode,
            format_timestamp(session.event.created_at),
            session.captures.len()
        );
        for capture in &session.captures {
            println!("    {} {}", format_timestamp(capture.captured_at), capture.payload);
        }
    }
    if !grouping.orphans.is_empty() {
        println!("Orphans - {} captures", grouping.orphans.len());
        for capture in &grouping.orphans {
            println!("    {} {}", format_timestamp(capture.captured_at), capture.payload);
        }
    }
    Ok(())
}

fn run_export(ctx: &Runtime, out: Option<PathBuf>, current: bool) -> Result<()> {
    let dir = match out {
        Some(dir) => dir,
        None => ctx.config.export.directory()?,
    };
    let grouping = session_grouping(ctx)?;

    if current {
        let current_id = ctx.preferences.current_sku_event_id()?;
        let Some(file) = export::export_current_session(&grouping, current_id, &dir)? else {
            bail!("no current SKU to export");
        };
        export::record_exports(&ctx.database, std::slice::from_ref(&file), now_millis())?;
        println!("{} ({} captures)", file.path.display(), file.capture_count);
    } else {
        let files = export::export_grouping(&grouping, &dir)?;
        export::record_exports(&ctx.database, &files, now_millis())?;
        for file in &files {
            println!("{} ({} captures)", file.path.display(), file.capture_count);
        }
    }
    Ok(())
}

fn run_keywords(ctx: &mut Runtime, action: KeywordsCommand) -> Result<()> {
    match action {
        KeywordsCommand::Show => {
            let keywords = &ctx.config.scanner.reference_keywords;
            println!("Configured: {}", keywords.configured().join(", "));
            println!("Effective:  {}", keywords.effective().join(", "));
            let rule = ctx.config.scanner.selector()?.rule;
            println!("Serial rule: {}", rule.describe());
        }
        KeywordsCommand::Set { keywords } => {
            ctx.config.scanner.reference_keywords = ReferenceKeywordSet::new(&keywords);
            config::save_config(&ctx.config, &ctx.config_path).with_context(|| {
                format!("failed to save config to {}", ctx.config_path.display())
            })?;
            info!("Saved configuration to {}", ctx.config_path.display());
            println!(
                "Effective:  {}",
                ctx.config.scanner.reference_keywords.effective().join(", ")
            );
        }
    }
    Ok(())
}
