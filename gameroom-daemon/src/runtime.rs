use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;

use gameroom_core::{OrchestratorConfig, OrchestratorError, RoomId};

use crate::error::{io_err, DaemonError};
use crate::orchestrator::{Orchestrator, ShutdownReport};
use crate::paths::{gameroom_root, socket_path, DAEMON_LABEL};
use crate::protocol::{DaemonRequest, DaemonResponse};

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(
    home: &Path,
    config: OrchestratorConfig,
) -> Result<ShutdownReport, DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), config))
}

/// Run the daemon against the real runtime and bind checks.
pub async fn run(
    home: PathBuf,
    config: OrchestratorConfig,
) -> Result<ShutdownReport, DaemonError> {
    config.validate()?;
    tracing::info!(
        base = config.port_range.base,
        max = config.port_range.max,
        runtime = %config.runtime,
        image = %config.image,
        "room orchestrator starting",
    );
    serve(home, Arc::new(Orchestrator::from_config(&config))).await
}

/// Serve the control socket until `stop`, ctrl-c or SIGTERM, then sweep all
/// room workers. Once the socket is bound the sweep always runs to completion
/// before returning.
pub async fn serve(
    home: PathBuf,
    orchestrator: Arc<Orchestrator>,
) -> Result<ShutdownReport, DaemonError> {
    ensure_runtime_dirs(&home)?;
    let socket = socket_path(&home);
    prepare_socket_for_bind(&socket)?;
    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "control socket listening");

    let started_at_unix = unix_seconds_now();
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let orchestrator = orchestrator.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = socket_server_task(
                listener,
                socket,
                home,
                orchestrator,
                shutdown.clone(),
                shutdown_rx,
                started_at_unix,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = termination_signal() => {
                    match signal {
                        Ok(name) => {
                            tracing::info!(signal = name, "received signal, shutting down daemon");
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("signal handler failed: {err}"))),
                    }
                }
            };
            let _ = shutdown.send(());
            result
        })
    };

    let (socket_result, signal_result) = tokio::join!(socket_handle, signal_handle);

    // Sweep regardless of how the tasks ended.
    let sweeper = orchestrator.clone();
    let report = tokio::task::spawn_blocking(move || sweeper.shutdown_all())
        .await
        .map_err(|err| DaemonError::Protocol(format!("shutdown sweep join error: {err}")))?;

    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(report)
}

async fn termination_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

async fn socket_server_task(
    listener: UnixListener,
    socket: PathBuf,
    home: PathBuf,
    orchestrator: Arc<Orchestrator>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let home = home.clone();
                let orchestrator = orchestrator.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(
                        stream,
                        home,
                        orchestrator,
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

async fn handle_socket_client(
    stream: UnixStream,
    home: PathBuf,
    orchestrator: Arc<Orchestrator>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        if request.cmd == "stop" {
            let _ = shutdown_tx.send(());
            write_response(&mut writer, &DaemonResponse::ok(json!({ "stopping": true }))).await?;
            break;
        }

        let response = dispatch(&home, orchestrator.clone(), request, started_at_unix).await;
        write_response(&mut writer, &response).await?;
    }

    Ok(())
}

/// Map one request onto an orchestrator call. Orchestrator calls block on the
/// runtime, so they run on the blocking pool.
async fn dispatch(
    home: &Path,
    orchestrator: Arc<Orchestrator>,
    request: DaemonRequest,
    started_at_unix: u64,
) -> DaemonResponse {
    let room_id = request.room_id.map(RoomId::from);
    let needs_room = matches!(request.cmd.as_str(), "get" | "delete");
    if needs_room && room_id.is_none() {
        return DaemonResponse::error(format!("`{}` requires room_id", request.cmd));
    }

    let cmd = request.cmd.clone();
    let outcome = tokio::task::spawn_blocking(move || -> Result<Option<Value>, OrchestratorError> {
        let data = match (cmd.as_str(), room_id) {
            ("status", _) => Some(json!(orchestrator.status())),
            ("create", _) => {
                let room = orchestrator.create_room()?;
                Some(json!(room))
            }
            ("list", _) => {
                let rooms = orchestrator.list_rooms();
                Some(json!({ "count": rooms.len(), "rooms": rooms }))
            }
            ("get", Some(id)) => {
                let room = orchestrator.get_room(&id)?;
                Some(json!(room))
            }
            ("delete", Some(id)) => {
                let outcome = orchestrator.delete_room(&id)?;
                Some(json!({ "deleted": id, "stop": outcome }))
            }
            _ => None,
        };
        Ok(data)
    })
    .await;

    match outcome {
        Ok(Ok(Some(data))) if request.cmd == "status" => {
            DaemonResponse::ok(status_payload(home, data, started_at_unix))
        }
        Ok(Ok(Some(data))) => DaemonResponse::ok(data),
        Ok(Ok(None)) => DaemonResponse::error(format!("unknown command '{}'", request.cmd)),
        Ok(Err(err)) => {
            if err.is_server_fault() {
                tracing::error!(cmd = %request.cmd, error = %err, "request failed");
            }
            DaemonResponse::from_orchestrator_error(&err)
        }
        Err(err) => DaemonResponse::error(format!("request task join error: {err}")),
    }
}

fn status_payload(home: &Path, orchestrator_status: Value, started_at_unix: u64) -> Value {
    json!({
        "running": true,
        "label": DAEMON_LABEL,
        "pid": std::process::id(),
        "started_at_unix": started_at_unix,
        "rooms": orchestrator_status["rooms"],
        "reserved_ports": orchestrator_status["reserved_ports"],
        "closing": orchestrator_status["closing"],
        "socket": socket_path(home).display().to_string(),
    })
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

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    let root = gameroom_root(home);
    if !root.exists() {
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
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
