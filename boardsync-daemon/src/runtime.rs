use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::Instant;

use boardsync_core::Config;
use boardsync_engine::{Engine, SyncOptions};
use boardsync_repo::{GitRepository, Repository};
use boardsync_store::HttpStore;

use crate::error::{io_err, DaemonError};
use crate::paths::{run_dir, socket_path};
use crate::protocol::{
    DaemonCommand, DaemonReply, DaemonStatusInfo, ReconcileSummary, RunRecord,
};

/// What a queued reconciliation should do. `Tick` is the poller's cycle:
/// detect repository changes since the last seen revision and push them,
/// otherwise pull.
#[derive(Debug, Clone, Copy)]
enum JobKind {
    Tick,
    Pull,
    PushAll,
}

impl JobKind {
    fn label(&self) -> &'static str {
        match self {
            JobKind::Tick => "tick",
            JobKind::Pull => "pull",
            JobKind::PushAll => "push-all",
        }
    }
}

struct ReconcileJob {
    kind: JobKind,
    trigger: &'static str,
    respond_to: oneshot::Sender<Result<ReconcileSummary, String>>,
}

#[derive(Debug, Default)]
pub struct DaemonStatus {
    pub runs: usize,
    pub last_run: Option<RunRecord>,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(config: Config, home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config, home.to_path_buf()))
}

/// Run the daemon runtime: one poller, one reconcile processor, one socket
/// server. The processor is the single consumer of the job queue, so
/// reconciliations never overlap even when the poller and a socket client
/// trigger at the same time.
pub async fn run(config: Config, home: PathBuf) -> Result<(), DaemonError> {
    let run = run_dir(&home);
    if !run.exists() {
        fs::create_dir_all(&run).map_err(|e| io_err(&run, e))?;
    }

    let status = Arc::new(RwLock::new(DaemonStatus::default()));
    let started_at_unix = unix_seconds_now();

    let (job_tx, job_rx) = mpsc::channel::<ReconcileJob>(64);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let poller_handle = {
        let shutdown = shutdown_tx.clone();
        let job_tx = job_tx.clone();
        let interval_secs = config.poller.interval_secs;
        tokio::spawn(async move {
            let result = poller_task(interval_secs, job_tx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let config = config.clone();
        let status = status.clone();
        tokio::spawn(async move {
            let result = reconcile_processor_task(config, status, job_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let status = status.clone();
        let job_tx = job_tx.clone();
        tokio::spawn(async move {
            let result = socket_server_task(
                home,
                status,
                job_tx,
                shutdown.clone(),
                shutdown.subscribe(),
                started_at_unix,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (poller_result, processor_result, socket_result, signal_result) = tokio::join!(
        poller_handle,
        processor_handle,
        socket_handle,
        signal_handle
    );

    handle_join("poller", poller_result)?;
    handle_join("reconcile_processor", processor_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

async fn poller_task(
    interval_secs: u64,
    job_tx: mpsc::Sender<ReconcileJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                match enqueue_job(&job_tx, JobKind::Tick, "poller").await {
                    Ok(summary) => {
                        tracing::info!(
                            written = summary.pull.written,
                            deleted = summary.pull.deleted,
                            upserted = summary.push.map(|p| p.upserted).unwrap_or(0),
                            "poller reconciliation completed",
                        );
                    }
                    // A failed tick is retried by the next one; never exit.
                    Err(err) => {
                        tracing::error!(error = %err, "poller reconciliation failed");
                    }
                }
            }
        }
    }

    Ok(())
}

async fn reconcile_processor_task(
    config: Config,
    status: Arc<RwLock<DaemonStatus>>,
    mut job_rx: mpsc::Receiver<ReconcileJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    // Last repository revision this daemon has reconciled; owned by the
    // single consumer so no lock is needed.
    let mut prev_rev: Option<String> = None;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = job_rx.recv() => {
                let Some(job) = maybe_job else { break };
                let started = Instant::now();

                let config_for_job = config.clone();
                let prev = prev_rev.clone();
                let kind = job.kind;
                let result = tokio::task::spawn_blocking(move || {
                    run_job_blocking(&config_for_job, kind, prev.as_deref())
                })
                .await
                .map_err(|err| DaemonError::Protocol(format!("reconcile task join error: {err}")))?;

                let outcome = match result {
                    Ok((summary, new_rev)) => {
                        if new_rev.is_some() {
                            prev_rev = new_rev;
                        }
                        let mut guard = status.write().await;
                        guard.runs += 1;
                        guard.last_run = Some(RunRecord {
                            trigger: job.trigger.to_string(),
                            kind: kind.label().to_string(),
                            at_unix: unix_seconds_now(),
                            duration_ms: started.elapsed().as_millis() as u64,
                            summary: summary.clone(),
                        });
                        drop(guard);
                        Ok(summary)
                    }
                    Err(err) => {
                        tracing::error!(error = %err, kind = kind.label(), "reconciliation failed");
                        Err(err.to_string())
                    }
                };

                let _ = job.respond_to.send(outcome);
            }
        }
    }

    Ok(())
}

/// One reconciliation, end to end, on a blocking thread. Returns the
/// summary and the repository head after the run, so the processor never
/// mistakes the engine's own commit for an operator edit.
fn run_job_blocking(
    config: &Config,
    kind: JobKind,
    prev_rev: Option<&str>,
) -> Result<(ReconcileSummary, Option<String>), DaemonError> {
    let store = HttpStore::new(&config.store);
    let options = SyncOptions::from_config(config);

    let repo = match &config.repo {
        Some(repo_config) => Some(GitRepository::open(repo_config)?),
        None => None,
    };
    let repo_ref: Option<&dyn Repository> = repo.as_ref().map(|r| r as &dyn Repository);
    let engine = Engine::new(&store, repo_ref, options);

    let summary = match kind {
        JobKind::Pull => ReconcileSummary {
            revision: None,
            push: None,
            pull: engine.pull()?.into(),
        },
        JobKind::PushAll => {
            let (push, pull) = engine.push_all()?;
            ReconcileSummary {
                revision: None,
                push: Some(push.into()),
                pull: pull.into(),
            }
        }
        JobKind::Tick => match (&repo, prev_rev) {
            (Some(repo_handle), Some(prev)) => {
                repo_handle.sync()?;
                let head = repo_handle.head_rev()?;
                if head != prev {
                    let changes = repo_handle.changed_between(prev, &head)?;
                    let (push, pull) =
                        engine.push_changes(&changes, Some(prev), config.delete_removed)?;
                    ReconcileSummary {
                        revision: Some(head),
                        push: Some(push.into()),
                        pull: pull.into(),
                    }
                } else {
                    ReconcileSummary {
                        revision: Some(head),
                        push: None,
                        pull: engine.pull()?.into(),
                    }
                }
            }
            _ => ReconcileSummary {
                revision: None,
                push: None,
                pull: engine.pull()?.into(),
            },
        },
    };

    let head_after = match &repo {
        Some(repo_handle) => Some(repo_handle.head_rev()?),
        None => None,
    };
    Ok((summary, head_after))
}

async fn socket_server_task(
    home: PathBuf,
    status: Arc<RwLock<DaemonStatus>>,
    job_tx: mpsc::Sender<ReconcileJob>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let socket = socket_path(&home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let home = home.clone();
                let status = status.clone();
                let job_tx = job_tx.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(
                        stream,
                        home,
                        status,
                        job_tx,
                        shutdown_tx,
                        started_at_unix,
                    ).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

/// Serve one command on one connection, then close it. The client side
/// ([`crate::protocol::DaemonClient`]) opens a fresh connection per command.
async fn handle_socket_client(
    stream: UnixStream,
    home: PathBuf,
    status: Arc<RwLock<DaemonStatus>>,
    job_tx: mpsc::Sender<ReconcileJob>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut line = String::new();
    let read = BufReader::new(reader)
        .read_line(&mut line)
        .await
        .map_err(|e| io_err("daemon socket read", e))?;
    if read == 0 {
        return Ok(());
    }

    let reply = match serde_json::from_str::<DaemonCommand>(line.trim_end()) {
        Ok(command) => {
            reply_for(command, &home, &status, &job_tx, &shutdown_tx, started_at_unix).await
        }
        Err(err) => DaemonReply::Error {
            message: format!("invalid command: {err}"),
        },
    };

    let mut payload = serde_json::to_string(&reply)?;
    payload.push('\n');
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

async fn reply_for(
    command: DaemonCommand,
    home: &Path,
    status: &Arc<RwLock<DaemonStatus>>,
    job_tx: &mpsc::Sender<ReconcileJob>,
    shutdown_tx: &broadcast::Sender<()>,
    started_at_unix: u64,
) -> DaemonReply {
    match command {
        DaemonCommand::Status => {
            let guard = status.read().await;
            DaemonReply::Status(DaemonStatusInfo {
                running: true,
                started_at_unix,
                runs: guard.runs,
                last_run: guard.last_run.clone(),
                socket: socket_path(home).display().to_string(),
            })
        }
        DaemonCommand::Pull => reconcile_reply(job_tx, JobKind::Pull).await,
        DaemonCommand::Push => reconcile_reply(job_tx, JobKind::PushAll).await,
        DaemonCommand::Stop => {
            let _ = shutdown_tx.send(());
            DaemonReply::Stopping
        }
    }
}

async fn reconcile_reply(job_tx: &mpsc::Sender<ReconcileJob>, kind: JobKind) -> DaemonReply {
    match enqueue_job(job_tx, kind, "socket").await {
        Ok(summary) => DaemonReply::Reconciled(summary),
        Err(err) => DaemonReply::Error {
            message: err.to_string(),
        },
    }
}

async fn enqueue_job(
    job_tx: &mpsc::Sender<ReconcileJob>,
    kind: JobKind,
    trigger: &'static str,
) -> Result<ReconcileSummary, DaemonError> {
    let (tx, rx) = oneshot::channel();
    job_tx
        .send(ReconcileJob {
            kind,
            trigger,
            respond_to: tx,
        })
        .await
        .map_err(|_| DaemonError::ChannelClosed("reconcile queue"))?;

    let outcome = rx
        .await
        .map_err(|_| DaemonError::ChannelClosed("reconcile response"))?;
    outcome.map_err(DaemonError::Protocol)
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
