//! The `vmctl` binary: wires the Connection Manager, the five worker
//! loops and the `/api/v4` HTTP Intake into one running process, plus a
//! `migrate` subcommand that applies pending SQL migrations.

mod shutdown;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use vmctl_config::Settings;
use vmctl_hypervisor::mock::MockAdapter;
use vmctl_hypervisor::HypervisorAdapter;
use vmctl_migration::{MigrationConfig, MigrationManager};
use vmctl_store::adapter;
use vmctl_store::conn::{async_pool, blocking_pool, BlockingPool};
use vmctl_types::{Action, ActionLock, DeployTicket, Request};
use vmctl_workers::loop_runner::{self, LoopIntervals};
use vmctl_workers::{deploy, hostinfo, ops, reaper, ticketeer};

#[derive(Parser)]
#[command(name = "vmctl")]
#[command(author, version, about = "Durable VM-orchestration queue", long_about = None)]
struct Cli {
    /// Path to a YAML settings file; falls back to coded defaults and
    /// `VMCTL__*` environment variables when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs every worker loop plus the HTTP Intake until a shutdown signal arrives.
    Serve,

    /// Applies every pending SQL migration under `migrations/` to the configured database.
    Migrate {
        /// Directory holding numbered `.sql` migration files.
        #[arg(long, default_value = "migrations")]
        migrations_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("loading settings")?;

    match cli.command {
        Commands::Serve => serve(settings),
        Commands::Migrate { migrations_dir } => migrate(&settings, &migrations_dir),
    }
}

/// Applies every pending migration under `migrations_dir`, in order,
/// recording each one in the file-based tracker as it commits.
fn migrate(settings: &Settings, migrations_dir: &std::path::Path) -> Result<()> {
    let config = MigrationConfig::with_migrations_dir(migrations_dir.clone());
    let manager = MigrationManager::new(config).context("initializing migration tracker")?;
    manager.validate().context("validating migration sequence/checksums")?;

    let pending = manager.list_pending().context("listing pending migrations")?;
    if pending.is_empty() {
        info!("no pending migrations");
        return Ok(());
    }

    let pool = blocking_pool(&settings.db.dsn, 1).context("connecting to database")?;
    let mut conn = pool.get().context("checking out a connection")?;

    for file in &pending {
        info!(id = file.migration.id, name = %file.migration.name, "applying migration");
        let sql = MigrationManager::up_sql(file);
        let mut tx = conn.transaction().context("beginning migration transaction")?;
        tx.batch_execute(sql).with_context(|| format!("applying migration {}", file.migration.id))?;
        tx.commit().context("committing migration")?;
        manager.record_applied(file).context("recording migration as applied")?;
    }

    info!(count = pending.len(), "migrations applied");
    Ok(())
}

#[tokio::main]
async fn serve(settings: Settings) -> Result<()> {
    let blocking = blocking_pool(&settings.db.dsn, settings.db.blocking_pool_size).context("building blocking pool")?;
    let asynchronous = async_pool(&settings.db.dsn, settings.db.async_pool_size).context("building async pool")?;

    let run = Arc::new(AtomicBool::new(true));
    let hosts_folder_configured = !settings.vsphere.hosts_folder_name.is_empty();

    let mut handles = Vec::new();
    handles.push(spawn_deploy_worker(&blocking, &settings, &run));
    handles.push(spawn_ops_worker(&blocking, &settings, &run));
    handles.push(spawn_reaper(&blocking, &settings, &run));
    handles.push(spawn_ticketeer(&blocking, &settings, &run));
    if hosts_folder_configured {
        handles.push(spawn_hostinfo(&blocking, &settings, &run));
    }

    let state = vmctl_server::AppState::new(asynchronous, settings.clone());
    let app = vmctl_server::router(state);
    let bind_address = settings.http.bind_address.clone();

    let run_for_shutdown = run.clone();
    let result = vmctl_server::serve(&bind_address, app, async move {
        shutdown::wait_for_signal().await;
        info!("shutdown signal received, draining worker loops");
        run_for_shutdown.store(false, Ordering::SeqCst);
    })
    .await;

    for handle in handles {
        if let Err(err) = handle.join() {
            warn!(?err, "worker thread panicked");
        }
    }

    result.context("HTTP Intake exited with an error")
}

/// Each worker owns a `MockAdapter` instance: the real hypervisor client
/// is explicitly out of scope here, so every loop drives the same
/// deterministic in-memory stand-in [`vmctl_hypervisor`] ships for tests.
fn hypervisor() -> Box<dyn HypervisorAdapter> {
    Box::new(MockAdapter::new())
}

fn spawn_deploy_worker(pool: &BlockingPool, settings: &Settings, run: &Arc<AtomicBool>) -> std::thread::JoinHandle<()> {
    let pool = pool.clone();
    let run = run.clone();
    let intervals = worker_intervals(settings);
    let hosts_folder_configured = !settings.vsphere.hosts_folder_name.is_empty();
    std::thread::Builder::new()
        .name("deploy-worker".into())
        .spawn(move || {
            let hv = hypervisor();
            loop_runner::run(&pool, hv.as_ref(), &run, intervals, |tx, hv| {
                claim_and_dispatch(tx, hv, true, hosts_folder_configured)
            });
        })
        .expect("spawning deploy worker thread")
}

fn spawn_ops_worker(pool: &BlockingPool, settings: &Settings, run: &Arc<AtomicBool>) -> std::thread::JoinHandle<()> {
    let pool = pool.clone();
    let run = run.clone();
    let intervals = worker_intervals(settings);
    std::thread::Builder::new()
        .name("ops-worker".into())
        .spawn(move || {
            let hv = hypervisor();
            loop_runner::run(&pool, hv.as_ref(), &run, intervals, |tx, hv| claim_and_dispatch(tx, hv, false, false));
        })
        .expect("spawning ops worker thread")
}

fn spawn_reaper(pool: &BlockingPool, settings: &Settings, run: &Arc<AtomicBool>) -> std::thread::JoinHandle<()> {
    let pool = pool.clone();
    let run = run.clone();
    let intervals = LoopIntervals {
        initial_sleep: Duration::from_millis(settings.delayed.sleep_ms),
        idle_sleep: Duration::from_millis(settings.delayed.sleep_ms),
        idle_threshold: u32::MAX,
    };
    std::thread::Builder::new()
        .name("delayed-reaper".into())
        .spawn(move || {
            let hv = hypervisor();
            loop_runner::run(&pool, hv.as_ref(), &run, intervals, |tx, _hv| Ok(reaper::reap_one(tx)?));
        })
        .expect("spawning delayed reaper thread")
}

fn spawn_ticketeer(pool: &BlockingPool, settings: &Settings, run: &Arc<AtomicBool>) -> std::thread::JoinHandle<()> {
    let pool = pool.clone();
    let run = run.clone();
    let slot_limit = settings.ticketeer.slot_limit;
    let intervals = LoopIntervals {
        initial_sleep: Duration::from_millis(settings.ticketeer.sleep_ms),
        idle_sleep: Duration::from_millis(settings.ticketeer.sleep_ms),
        idle_threshold: u32::MAX,
    };
    std::thread::Builder::new()
        .name("ticket-scheduler".into())
        .spawn(move || {
            let hv = hypervisor();
            loop_runner::run(&pool, hv.as_ref(), &run, intervals, |tx, _hv| {
                ticketeer::run_revolution(tx, slot_limit)?;
                Ok(true)
            });
        })
        .expect("spawning ticket scheduler thread")
}

fn spawn_hostinfo(pool: &BlockingPool, settings: &Settings, run: &Arc<AtomicBool>) -> std::thread::JoinHandle<()> {
    let pool = pool.clone();
    let run = run.clone();
    let folder = settings.vsphere.hosts_folder_name.clone();
    let intervals = LoopIntervals {
        initial_sleep: Duration::from_secs(u64::from(settings.worker.load_refresh_interval)),
        idle_sleep: Duration::from_secs(u64::from(settings.worker.load_refresh_interval)),
        idle_threshold: u32::MAX,
    };
    std::thread::Builder::new()
        .name("host-info-obtainer".into())
        .spawn(move || {
            let hv = hypervisor();
            loop_runner::run(&pool, hv.as_ref(), &run, intervals, |tx, hv| Ok(hostinfo::refresh_hosts(tx, hv, &folder)? > 0));
        })
        .expect("spawning host-info obtainer thread")
}

fn worker_intervals(settings: &Settings) -> LoopIntervals {
    LoopIntervals {
        initial_sleep: Duration::from_millis(settings.worker.loop_initial_sleep_ms),
        idle_sleep: Duration::from_millis(settings.worker.loop_idle_sleep_ms),
        idle_threshold: settings.worker.idle_counter_threshold,
    }
}

/// Claims the oldest free [`Action`], checks whether its owning
/// [`Request`] is a deploy or an ops request, and dispatches it to
/// whichever of the two workers `want_deploy` names. An action that
/// belongs to the other worker is left untouched (the transaction
/// commits with no changes, releasing the row lock immediately) rather
/// than processed by the wrong loop.
fn claim_and_dispatch(
    tx: &mut postgres::Transaction<'_>,
    hv: &dyn HypervisorAdapter,
    want_deploy: bool,
    hosts_folder_configured: bool,
) -> std::result::Result<bool, Box<dyn std::error::Error>> {
    let Some(mut action) = adapter::claim_one_for_update_skip_locked::<Action>(tx, "lock", ActionLock::Free.into(), "")? else {
        return Ok(false);
    };

    let request_id: i64 = action.request.parse().unwrap_or_default();
    let Some(request) = adapter::get_by_id::<_, Request>(tx, request_id)? else {
        action.lock = ActionLock::Finished.into();
        adapter::update(tx, &action)?;
        return Ok(true);
    };

    if deploy::is_deploy_request(request.kind) != want_deploy {
        return Ok(false);
    }

    if want_deploy {
        let ticket_host = if hosts_folder_configured {
            match claim_deploy_ticket(tx)? {
                Some(host) => Some(host),
                None => return Ok(false),
            }
        } else {
            None
        };
        deploy::process_deploy_action(tx, &mut action, hv, ticket_host.as_deref())?;
    } else {
        ops::process_ops_action(tx, &mut action, hv)?;
    }

    Ok(true)
}

/// Claims the oldest free, enabled [`DeployTicket`] for host-slotted
/// placement and marks it taken, returning its `host_moref`.
fn claim_deploy_ticket(tx: &mut postgres::Transaction<'_>) -> vmctl_store::Result<Option<String>> {
    let Some(mut ticket) =
        adapter::claim_one_for_update_skip_locked::<DeployTicket>(tx, "taken", ActionLock::Free.into(), "AND (data->>'enabled')::bool = true")?
    else {
        return Ok(None);
    };
    ticket.taken = ActionLock::Sleeping.into();
    let host_moref = ticket.host_moref.clone();
    adapter::update(tx, &ticket)?;
    Ok(Some(host_moref))
}
