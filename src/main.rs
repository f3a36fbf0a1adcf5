use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::Path;

use shopflow::config::ShopflowConfig;
use shopflow::external::{
    AuditContext, BackupDispatcher, BatchSyncer, CommandBackupDispatcher, EnvIdentity,
    FileSyncAdapter,
};
use shopflow::pipeline::{
    ActionOutcome, OrderRecord, PartStatus, PipelineEngine, RecordPatch, RepairType, Stage,
};
use shopflow::session::{SessionError, SessionLock, SessionStore};
use shopflow::telemetry;

#[derive(Parser)]
#[command(name = "shopflow")]
#[command(about = "Vehicle-service order pipeline with VIN auto-promotion and undo/redo")]
#[command(long_about = "Shopflow tracks vehicle-service orders through intake, ordering, \
                       call-list, booking and archive stages. Orders sharing a VIN are \
                       promoted automatically once every part has arrived, and every \
                       mutating action can be undone and redone.")]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter shopflow.toml into the current directory
    Init {
        /// Overwrite an existing shopflow.toml
        #[arg(long)]
        force: bool,
    },
    /// Take a new order into the pending stage
    Intake {
        /// 17-character vehicle identification number
        #[arg(long)]
        vin: String,
        /// Customer name for the order
        #[arg(long)]
        customer: String,
        /// Initial part status
        #[arg(long, default_value = "pending")]
        status: PartStatus,
        /// Odometer reading in miles
        #[arg(long)]
        mileage: Option<u32>,
        /// Repair type: warranty, customer-pay or internal
        #[arg(long)]
        repair_type: Option<RepairType>,
    },
    /// Update an order in place (merge patch)
    Update {
        #[arg(long)]
        stage: Stage,
        #[arg(long)]
        id: String,
        #[arg(long)]
        vin: Option<String>,
        #[arg(long)]
        customer: Option<String>,
        #[arg(long)]
        status: Option<PartStatus>,
        #[arg(long)]
        mileage: Option<u32>,
        #[arg(long)]
        repair_type: Option<RepairType>,
    },
    /// Atomically move orders between stages
    Move {
        #[arg(long)]
        from: Stage,
        #[arg(long)]
        to: Stage,
        /// Record ids to move; any missing id aborts the whole move
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Move an order to the archive stage
    Archive {
        #[arg(long)]
        stage: Stage,
        #[arg(long)]
        id: String,
    },
    /// Permanently delete an order
    Delete {
        #[arg(long)]
        stage: Stage,
        #[arg(long)]
        id: String,
    },
    /// Revert the most recent action
    Undo,
    /// Re-apply the most recently undone action
    Redo,
    /// Show stage counts, history status and recent notifications
    Status,
    /// Push every stage collection to the remote store, one record at a time
    Sync,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = ShopflowConfig::load()?;
    telemetry::init_telemetry(&config.observability.log_level, config.observability.json_logs)?;

    tokio::runtime::Runtime::new()?.block_on(run(cli, config))
}

async fn run(cli: Cli, config: ShopflowConfig) -> Result<()> {
    if let Commands::Init { force } = &cli.command {
        return init_command(&config, *force);
    }

    let audit = AuditContext::capture(&EnvIdentity);
    let span = telemetry::create_action_span(
        command_name(&cli.command),
        audit.user.as_deref(),
        &audit.hostname,
    );
    let _enter = span.enter();

    let mut lock = SessionLock::open(Path::new(&config.session.lock_file))?;
    let _session_guard = match lock.try_acquire() {
        Ok(guard) => guard,
        Err(SessionError::Locked { path }) => {
            println!("❌ Another shopflow session holds the lock at {}", path.display());
            println!("   → Finish or close the other session, then retry");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    let store = SessionStore::new(&config.session.state_file);
    let mut session = store.load().await?;
    let mut engine = PipelineEngine::new(
        config.pipeline.watched_stage,
        config.pipeline.target_stage,
        config.history.max_depth,
    )
    .with_state(std::mem::take(&mut session.pipeline))
    .with_history(std::mem::take(&mut session.history))
    .with_actor(audit.user.clone());

    let mutated = match &cli.command {
        Commands::Intake {
            vin,
            customer,
            status,
            mileage,
            repair_type,
        } => {
            let mut record = OrderRecord::new(vin.clone(), customer.clone()).with_status(*status);
            if let Some(mileage) = mileage {
                record = record.with_mileage(*mileage);
            }
            if let Some(repair_type) = repair_type {
                record = record.with_repair_type(*repair_type);
            }
            let id = record.id.clone();
            match engine.intake(record) {
                Ok(outcome) => {
                    println!("✅ Order {} added to pending", id);
                    report_promotion(&outcome);
                    true
                }
                Err(err) => {
                    println!("❌ Intake rejected: {err}");
                    false
                }
            }
        }
        Commands::Update {
            stage,
            id,
            vin,
            customer,
            status,
            mileage,
            repair_type,
        } => {
            let patch = RecordPatch {
                vin: vin.clone(),
                customer_name: customer.clone(),
                part_status: *status,
                mileage: *mileage,
                repair_type: *repair_type,
                metadata: Default::default(),
            };
            if patch.is_empty() {
                println!("ℹ️  Nothing to update, no fields given");
                false
            } else {
                match engine.update_order(*stage, id, patch) {
                    Ok(outcome) => {
                        println!("✅ Order {} updated in {}", id, stage);
                        report_promotion(&outcome);
                        true
                    }
                    Err(err) => {
                        println!("❌ Update rejected: {err}");
                        false
                    }
                }
            }
        }
        Commands::Move { from, to, ids } => match engine.move_orders(ids, *from, *to) {
            Ok(outcome) => {
                println!("✅ Moved {} order(s) from {} to {}", ids.len(), from, to);
                report_promotion(&outcome);
                true
            }
            Err(err) => {
                println!("❌ Move rejected: {err}");
                println!("   → Nothing was moved; fix the id list and retry");
                false
            }
        },
        Commands::Archive { stage, id } => match engine.archive_order(*stage, id) {
            Ok(_) => {
                println!("📦 Order {} archived", id);
                true
            }
            Err(err) => {
                println!("❌ Archive rejected: {err}");
                false
            }
        },
        Commands::Delete { stage, id } => match engine.delete_order(*stage, id) {
            Ok(_) => {
                println!("🗑️  Order {} deleted from {}", id, stage);
                true
            }
            Err(err) => {
                println!("❌ Delete rejected: {err}");
                false
            }
        },
        Commands::Undo => match engine.undo() {
            Ok(()) => {
                println!("↩️  Reverted the last action");
                true
            }
            Err(err) => {
                println!("ℹ️  {err}");
                false
            }
        },
        Commands::Redo => match engine.redo() {
            Ok(()) => {
                println!("↪️  Re-applied the undone action");
                true
            }
            Err(err) => {
                println!("ℹ️  {err}");
                false
            }
        },
        Commands::Status => {
            print_status(&engine, &audit);
            false
        }
        Commands::Sync => {
            sync_command(&config, &engine).await;
            false
        }
        Commands::Init { .. } => false, // handled above
    };

    let (pipeline, history) = engine.into_parts();
    session.pipeline = pipeline;
    session.history = history;
    store.save(&mut session).await?;

    if mutated && config.backup.enabled {
        if let Some(command) = &config.backup.command {
            let dispatcher =
                CommandBackupDispatcher::new(command.clone(), config.backup.args.clone());
            dispatcher.dispatch("pipeline-mutation");
        }
    }

    Ok(())
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Init { .. } => "init",
        Commands::Intake { .. } => "intake",
        Commands::Update { .. } => "update",
        Commands::Move { .. } => "move",
        Commands::Archive { .. } => "archive",
        Commands::Delete { .. } => "delete",
        Commands::Undo => "undo",
        Commands::Redo => "redo",
        Commands::Status => "status",
        Commands::Sync => "sync",
    }
}

fn init_command(config: &ShopflowConfig, force: bool) -> Result<()> {
    let path = Path::new("shopflow.toml");
    ShopflowConfig::write_starter(path, force)?;
    println!("✅ Wrote {}", path.display());
    println!("📂 Session state will live at {}", config.session.state_file);
    println!();
    println!("🎯 QUICK START:");
    println!("   → Take an order in: shopflow intake --vin <VIN> --customer 'Name'");
    println!("   → Mark parts arrived: shopflow update --stage pending --id <ID> --status arrived");
    println!("   → See the pipeline: shopflow status");
    Ok(())
}

fn report_promotion(outcome: &ActionOutcome) {
    if let Some(notice) = &outcome.promoted {
        println!(
            "🚚 {} order(s) auto-promoted {} -> {} (VIN: {})",
            notice.count(),
            notice.from,
            notice.to,
            notice.vins.join(", ")
        );
    }
}

fn print_status(engine: &PipelineEngine, audit: &AuditContext) {
    println!("🔧 SHOPFLOW PIPELINE STATUS");
    println!("───────────────────────────");
    for (stage, count) in engine.registry().counts() {
        let marker = if count > 0 { "🟡" } else { "⚪" };
        println!(" {} {:<8} {} order(s)", marker, stage.to_string(), count);
        for record in engine.registry().records(stage) {
            println!(
                "     {} | {} | {} | {}",
                record.id, record.vin, record.customer_name, record.part_status
            );
        }
    }
    println!();
    println!("🕑 HISTORY:");
    println!(
        "   {} undo step(s), {} redo step(s)",
        engine.history().commits().len(),
        engine.history().redo_depth()
    );
    let notifications = engine.state().notifications.as_slice();
    if !notifications.is_empty() {
        println!();
        println!("🔔 RECENT PROMOTIONS:");
        for notification in notifications.iter().rev().take(3) {
            println!(
                "   {} ({} record(s))",
                notification.message,
                notification.moved.len()
            );
        }
    }
    println!();
    match &audit.user {
        Some(user) => println!("👤 Session: {}@{}", user, audit.hostname),
        None => println!("👤 Session: anonymous@{}", audit.hostname),
    }
}

async fn sync_command(config: &ShopflowConfig, engine: &PipelineEngine) {
    let adapter = FileSyncAdapter::new(&config.sync.remote_dir);
    let syncer = BatchSyncer::new(config.sync.writes_per_second, config.sync.burst_capacity);

    println!("🔄 Syncing {} record(s) to {}", engine.registry().total_len(), config.sync.remote_dir);
    match syncer.run(&adapter, engine.registry()).await {
        Ok(report) => {
            println!("✅ Synced {} record(s)", report.saved);
            for (stage, count) in &report.per_stage {
                println!("   {} → {} record(s)", stage, count);
            }
        }
        Err(err) => {
            println!("❌ Sync aborted: {err}");
            println!("   → Already-saved records remain on the remote store");
            println!("   → Fix the cause and run 'shopflow sync' again for a full resync");
        }
    }
}
