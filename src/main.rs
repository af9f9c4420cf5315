//! Shelf Dispatch
//!
//! Command line front end for the store and collect workflows. Each run
//! loads the inventory snapshot, performs one operation, prints its outcome
//! as JSON, waits for pending LED work (flash auto-off included) and writes
//! the snapshot back when anything changed.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use shelf_dispatch::{
    Color, DriverOptions, Error, InventorySnapshot, InventoryStore, LedTaskRunner, MemoryInventory, Outcome, Result,
    ShelfRegistry, Side, WorkflowConfig, Workflows,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Shelf Dispatch - LED guided storing and collecting of component carriers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Inventory snapshot (YAML)
    #[arg(long, env = "INVENTORY_FILE", default_value = "inventory.yaml")]
    inventory: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Duration of confirm/reject flashes in milliseconds
    #[arg(long, env = "FLASH_MS", default_value = "2000")]
    flash_ms: u64,

    /// Use the no-op driver for every storage
    #[arg(long, env = "NO_HARDWARE")]
    no_hardware: bool,

    /// Controller I/O timeout in milliseconds, replacing per-device settings
    #[arg(long, env = "REQUEST_TIMEOUT_MS")]
    request_timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reserve the first free fitting slot for a carrier
    Store { carrier: String, storage: String },
    /// Confirm a nomination with the scanned slot code
    StoreConfirm { carrier: String, storage: String, code: String },
    /// Light every free fitting slot for the operator to choose from
    StoreChoose { carrier: String, storage: String },
    /// Store a carrier in the scanned candidate slot
    StoreChooseConfirm { carrier: String, storage: String, code: String },
    /// Drop a carrier's nomination
    StoreCancel { carrier: String },
    /// Switch off the candidates lit for a choice
    StoreChooseCancel { storage: String },
    /// Queue a carrier for collection
    Collect { carrier: String },
    /// Confirm a collection with the scanned slot code
    CollectConfirm { carrier: String, storage: String, code: String },
    /// Take a carrier off the collect queue
    CollectCancel { carrier: String },
    /// Light every stored carrier of an article
    CollectArticle { article: String },
    /// Collect the article's carrier in the scanned slot
    CollectArticleConfirm { article: String, storage: String, code: String },
    /// Switch off an article's candidates
    CollectArticleCancel { article: String },
    /// Queue every stored carrier of a prepared job
    CollectJob { job: String },
    /// Collect a job carrier from the scanned slot
    CollectJobConfirm { job: String, storage: String, code: String },
    /// Take a job's carriers off the collect queue
    CollectJobCancel { job: String },
    /// Show the collect queue
    Queue,
    /// List free logical slots fitting the given dimensions
    FreeSlots {
        storage: String,
        #[arg(long, default_value = "0")]
        diameter: u32,
        #[arg(long, default_value = "0")]
        width: u32,
    },
    /// Combine slots into one logical slot
    Merge {
        storage: String,
        primary: String,
        #[arg(required = true)]
        others: Vec<String>,
    },
    /// Drive a rack's LEDs directly
    #[command(subcommand)]
    Led(LedCommand),
}

#[derive(Subcommand, Debug)]
enum LedCommand {
    /// Light one slot
    On { storage: String, slot: String, color: Color },
    /// Turn one slot off
    Off { storage: String, slot: String },
    /// Turn a rack off, or every rack when none is named
    Reset {
        storage: Option<String>,
        /// Turn the working lights off too
        #[arg(long)]
        working_light: bool,
    },
    /// Light a working light
    LightOn { storage: String, side: Side, color: Color },
    /// Turn a working light off
    LightOff { storage: String, side: Side },
    /// Check every controller
    Health,
}

#[derive(Debug, Serialize)]
struct LedReport {
    storage: String,
    action: String,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting Shelf Dispatch {}", shelf_dispatch::VERSION);
    debug!("  Inventory: {}", args.inventory.display());
    debug!("  Hardware disabled: {}", args.no_hardware);

    let snapshot = InventorySnapshot::load(&args.inventory).await?;
    let inventory = Arc::new(MemoryInventory::from_snapshot(snapshot));

    let runner = LedTaskRunner::new();
    let options = DriverOptions {
        request_timeout: args.request_timeout_ms.map(Duration::from_millis),
        disable_hardware: args.no_hardware,
    };
    let shelves = Arc::new(ShelfRegistry::new(options, runner.clone()));
    let config = WorkflowConfig {
        flash: Duration::from_millis(args.flash_ms),
        ..Default::default()
    };
    let workflows = Workflows::new(inventory.clone(), shelves, config);

    let writes = inventory.write_count();
    let output = run(&workflows, inventory.as_ref(), args.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    // Delayed auto-off must fire before the process exits
    if runner.pending() > 0 {
        debug!("Waiting for {} LED tasks", runner.pending());
    }
    runner.wait_idle().await;

    if inventory.write_count() != writes {
        inventory.snapshot().save(&args.inventory).await?;
        info!("Saved inventory {}", args.inventory.display());
    }

    let success = output.get("success").and_then(|v| v.as_bool()).unwrap_or(false);
    Ok(if success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn emit<T: Serialize>(outcome: Outcome<T>) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(outcome)?)
}

async fn run(workflows: &Workflows, inventory: &MemoryInventory, command: Command) -> Result<serde_json::Value> {
    match command {
        Command::Store { carrier, storage } => emit(workflows.store_carrier(&carrier, &storage).await),
        Command::StoreConfirm { carrier, storage, code } => {
            emit(workflows.store_carrier_confirm(&carrier, &storage, &code).await)
        }
        Command::StoreChoose { carrier, storage } => {
            emit(workflows.store_carrier_choose_slot(&carrier, &storage).await)
        }
        Command::StoreChooseConfirm { carrier, storage, code } => {
            emit(workflows.store_carrier_choose_slot_confirm(&carrier, &storage, &code).await)
        }
        Command::StoreCancel { carrier } => emit(workflows.store_carrier_cancel(&carrier).await),
        Command::StoreChooseCancel { storage } => emit(workflows.store_carrier_choose_slot_cancel(&storage).await),
        Command::Collect { carrier } => emit(workflows.collect_carrier(&carrier).await),
        Command::CollectConfirm { carrier, storage, code } => {
            emit(workflows.collect_carrier_confirm(&carrier, &storage, &code).await)
        }
        Command::CollectCancel { carrier } => emit(workflows.collect_carrier_cancel(&carrier).await),
        Command::CollectArticle { article } => emit(workflows.collect_carrier_by_article(&article).await),
        Command::CollectArticleConfirm { article, storage, code } => {
            emit(workflows.collect_carrier_by_article_confirm(&article, &storage, &code).await)
        }
        Command::CollectArticleCancel { article } => {
            emit(workflows.collect_carrier_by_article_cancel(&article).await)
        }
        Command::CollectJob { job } => emit(workflows.collect_job(&job).await),
        Command::CollectJobConfirm { job, storage, code } => {
            emit(workflows.collect_job_confirm(&job, &storage, &code).await)
        }
        Command::CollectJobCancel { job } => emit(workflows.collect_job_cancel(&job).await),
        Command::Queue => emit(workflows.collect_queue().await),
        Command::FreeSlots { storage, diameter, width } => {
            emit(workflows.free_slots(&storage, diameter, width).await)
        }
        Command::Merge { storage, primary, others } => {
            emit(workflows.merge_slots(&storage, &primary, &others).await)
        }
        Command::Led(command) => run_led(workflows.shelves(), inventory, command).await,
    }
}

// =============================================================================
// Direct LED Control
// =============================================================================

async fn run_led(shelves: &ShelfRegistry, inventory: &MemoryInventory, command: LedCommand) -> Result<serde_json::Value> {
    if let LedCommand::Health = command {
        let storages = inventory.list_storages().await?;
        let health = shelves.health(&storages).await;
        return emit(Outcome::ok(health));
    }
    if let LedCommand::Reset { storage: None, working_light } = command {
        let storages = inventory.list_storages().await?;
        let results = shelves.reset_all(&storages, working_light).await;
        let failed: Vec<String> = results
            .into_iter()
            .filter_map(|(name, result)| result.err().map(|e| format!("{}: {}", name, e)))
            .collect();
        let outcome = if failed.is_empty() {
            Outcome::ok(LedReport {
                storage: "*".into(),
                action: "reset".into(),
            })
        } else {
            Outcome::fail(&Error::DeviceUnreachable {
                device: "reset".into(),
                reason: failed.join("; "),
            })
        };
        return emit(outcome);
    }

    let result = led_action(shelves, inventory, command).await;
    emit(Outcome::from_result("led", result))
}

async fn led_action(shelves: &ShelfRegistry, inventory: &MemoryInventory, command: LedCommand) -> Result<LedReport> {
    let storage_name = match &command {
        LedCommand::On { storage, .. }
        | LedCommand::Off { storage, .. }
        | LedCommand::LightOn { storage, .. }
        | LedCommand::LightOff { storage, .. } => storage.clone(),
        LedCommand::Reset { storage: Some(storage), .. } => storage.clone(),
        LedCommand::Reset { storage: None, .. } | LedCommand::Health => {
            return Err(Error::Internal("rack-wide command routed to a single rack".into()))
        }
    };
    let storage = inventory
        .get_storage(&storage_name)
        .await?
        .ok_or_else(|| Error::not_found("Storage", &storage_name))?;
    let shelf = shelves.shelf_for(&storage)?;

    let action = match command {
        LedCommand::On { slot, color, .. } => {
            shelf.led_on(&slot, color).await?;
            format!("{} -> {}", slot, color)
        }
        LedCommand::Off { slot, .. } => {
            shelf.led_off(&slot).await?;
            format!("{} -> off", slot)
        }
        LedCommand::Reset { working_light, .. } => {
            shelf.reset(working_light).await?;
            "reset".to_string()
        }
        LedCommand::LightOn { side, color, .. } => {
            shelf.working_light_on(side, color).await?;
            format!("working light {} -> {}", side, color)
        }
        LedCommand::LightOff { side, .. } => {
            shelf.working_light_off(side).await?;
            format!("working light {} -> off", side)
        }
        LedCommand::Health => return Err(Error::Internal("health is not a single rack command".into())),
    };

    Ok(LedReport {
        storage: storage.name,
        action,
    })
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    // JSON on stdout belongs to the outcome; logs go to stderr
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
