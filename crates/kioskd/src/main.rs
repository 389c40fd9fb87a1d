//! kioskd - The kiosk check-in service
//!
//! This is the main entry point for the kioskd service.
//! It wires together all the components:
//! - Configuration and the startup policy document
//! - Store initialization
//! - Access registry, check-in engine and admin queries
//! - Live record feed
//! - IPC server

use anyhow::{Context, Result};
use clap::Parser;
use kiosk_api::{
    CheckInResponse, ClientRole, Command, ErrorCode, ErrorInfo, HealthStatus, Request, Response,
    ResponsePayload,
};
use kiosk_config::{load_config, load_policy_document, policy_document_from_value, ServiceConfig};
use kiosk_core::{
    AccessRegistry, Admin, CheckInEngine, CheckInOutcome, DailyLog, LiveFeed,
    OUTSIDE_WINDOW_MESSAGE,
};
use kiosk_ipc::{IpcServer, ServerMessage};
use kiosk_store::{SqliteStore, Store};
use kiosk_util::{default_config_path, ClientId};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// kioskd - Kiosk check-in service
#[derive(Parser, Debug)]
#[command(name = "kioskd")]
#[command(about = "Kiosk check-in service with audit log and live feed", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/kioskd/kioskd.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set KIOSK_SOCKET env var)
    #[arg(short, long, env = "KIOSK_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set KIOSK_DATA_DIR env var)
    #[arg(short, long, env = "KIOSK_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Everything a request handler needs; shared by all request tasks
struct Handlers {
    store: Arc<dyn Store>,
    registry: Arc<AccessRegistry>,
    feed: Arc<LiveFeed>,
    engine: CheckInEngine,
    admin: Admin,
}

/// Main service state
struct Service {
    handlers: Arc<Handlers>,
    ipc: Arc<IpcServer>,
}

/// Run blocking store work off the async workers
async fn run_blocking<T, F>(f: F) -> Result<T, ErrorInfo>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!(error = %e, "Request task failed");
        ErrorInfo::new(ErrorCode::InternalError, "Request handler failed")
    })
}

fn reply<T>(
    request_id: u64,
    result: Result<T, ErrorInfo>,
    payload: impl FnOnce(T) -> ResponsePayload,
) -> Response {
    match result {
        Ok(value) => Response::success(request_id, payload(value)),
        Err(info) => Response::error(request_id, info),
    }
}

impl Service {
    async fn new(args: &Args) -> Result<Self> {
        // Load configuration; a missing file means defaults
        let mut config = if args.config.exists() {
            let config = load_config(&args.config)
                .with_context(|| format!("Failed to load config from {:?}", args.config))?;
            info!(config_path = %args.config.display(), "Configuration loaded");
            config
        } else {
            info!(config_path = %args.config.display(), "No config file, using defaults");
            ServiceConfig::default()
        };

        if let Some(socket) = &args.socket {
            config.socket_path = socket.clone();
        }
        if let Some(data_dir) = &args.data_dir {
            config.data_dir = data_dir.clone();
        }

        // Create data directory
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", config.data_dir))?;

        // Initialize store
        let db_path = config.database_path();
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open_with_timeout(&db_path, config.lock_timeout)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        info!(db_path = %db_path.display(), "Store initialized");

        let registry = Arc::new(
            AccessRegistry::load(store.clone()).context("Failed to load access registry")?,
        );

        if let Some(policy_file) = &config.policy_file {
            let policies = load_policy_document(policy_file)
                .with_context(|| format!("Failed to load policy document {:?}", policy_file))?;
            let summary = registry
                .reload(&policies)
                .context("Failed to apply startup policy document")?;
            info!(
                policy_file = %policy_file.display(),
                policy_count = summary.policy_count,
                token_count = summary.token_count,
                "Startup policy document applied"
            );
        }

        let feed = Arc::new(LiveFeed::new(store.clone(), config.live_window));
        let engine = CheckInEngine::new(
            store.clone(),
            registry.clone(),
            DailyLog::new(&config.log_dir),
            feed.clone(),
        );
        let admin = Admin::new(store.clone(), config.default_page_size);

        // Initialize IPC server
        let mut ipc = IpcServer::new(&config.socket_path);
        ipc.start().await?;

        info!(socket_path = %config.socket_path.display(), "IPC server started");

        Ok(Self {
            handlers: Arc::new(Handlers {
                store,
                registry,
                feed,
                engine,
                admin,
            }),
            ipc: Arc::new(ipc),
        })
    }

    async fn run(self) -> Result<()> {
        let ipc = self.ipc.clone();
        let mut ipc_messages = ipc
            .take_message_receiver()
            .await
            .context("IPC message receiver already taken")?;

        // Spawn IPC accept task
        let ipc_accept = ipc.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        // Set up signal handlers
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sighup =
            signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

        info!("Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, shutting down gracefully");
                    break;
                }

                Some(msg) = ipc_messages.recv() => {
                    Self::handle_ipc_message(&self.handlers, &ipc, msg).await;
                }
            }
        }

        info!("Shutting down kioskd");
        ipc.shutdown();
        info!("Shutdown complete");
        Ok(())
    }

    async fn handle_ipc_message(handlers: &Arc<Handlers>, ipc: &Arc<IpcServer>, msg: ServerMessage) {
        match msg {
            ServerMessage::Request { client_id, request } => {
                let role = ipc
                    .get_client_info(&client_id)
                    .await
                    .map(|info| info.role)
                    .unwrap_or(ClientRole::Kiosk);

                // One task per request; the loop never waits on the store
                let handlers = handlers.clone();
                let ipc = ipc.clone();
                tokio::spawn(async move {
                    let response =
                        Self::handle_request(&handlers, &ipc, &client_id, role, request).await;
                    if let Err(e) = ipc.send_response(&client_id, response).await {
                        debug!(client_id = %client_id, error = %e, "Response not delivered");
                    }
                });
            }

            ServerMessage::ClientConnected { client_id, info } => {
                info!(
                    client_id = %client_id,
                    role = ?info.role,
                    uid = ?info.uid,
                    clients = ipc.client_count().await,
                    "Client connected"
                );
            }

            ServerMessage::ClientDisconnected { client_id } => {
                debug!(client_id = %client_id, "Client disconnected");
                handlers.feed.unsubscribe(&client_id);
            }
        }
    }

    async fn handle_request(
        handlers: &Arc<Handlers>,
        ipc: &Arc<IpcServer>,
        client_id: &ClientId,
        role: ClientRole,
        request: Request,
    ) -> Response {
        let request_id = request.request_id;
        let command = request.command;

        if !command.allowed_for(role) {
            warn!(client_id = %client_id, role = ?role, command = ?command, "Command not permitted");
            return Response::error(
                request_id,
                ErrorInfo::new(ErrorCode::PermissionDenied, "Admin role required"),
            );
        }

        match command {
            Command::CheckIn {
                access_token,
                kiosk_name,
                student_id,
            } => {
                let h = handlers.clone();
                let result = run_blocking(move || {
                    h.engine
                        .check_in(&access_token, &kiosk_name, &student_id, kiosk_util::now())
                })
                .await;

                match result {
                    Ok(Ok(CheckInOutcome::Completed { status, .. })) => Response::success(
                        request_id,
                        ResponsePayload::CheckIn(CheckInResponse {
                            approval_status: status,
                        }),
                    ),
                    Ok(Ok(CheckInOutcome::OutsideWindow)) => Response::success(
                        request_id,
                        ResponsePayload::Advisory {
                            message: OUTSIDE_WINDOW_MESSAGE.into(),
                        },
                    ),
                    Ok(Err(e)) => {
                        if e.code() == ErrorCode::InternalError {
                            error!(error = %e, "Check-in failed");
                        }
                        Response::error(request_id, ErrorInfo::new(e.code(), e.to_string()))
                    }
                    Err(info) => Response::error(request_id, info),
                }
            }

            Command::ListRecords { query } => {
                let h = handlers.clone();
                let result = run_blocking(move || h.admin.list_records(&query)).await;
                reply(request_id, flatten(result, |e| e.code()), |records| {
                    ResponsePayload::Records { records }
                })
            }

            Command::CountRecords { query } => {
                let h = handlers.clone();
                let result = run_blocking(move || h.admin.count_records(&query)).await;
                reply(request_id, flatten(result, |e| e.code()), |count| {
                    ResponsePayload::Count { count }
                })
            }

            Command::ListStudents { query } => {
                let h = handlers.clone();
                let result = run_blocking(move || h.admin.list_students(&query)).await;
                reply(request_id, flatten(result, |e| e.code()), |students| {
                    ResponsePayload::Students { students }
                })
            }

            Command::CountStudents { query } => {
                let h = handlers.clone();
                let result = run_blocking(move || h.admin.count_students(&query)).await;
                reply(request_id, flatten(result, |e| e.code()), |count| {
                    ResponsePayload::Count { count }
                })
            }

            Command::ReloadPolicies { document } => {
                // A bad document never reaches the registry
                let policies = match policy_document_from_value(document) {
                    Ok(policies) => policies,
                    Err(e) => {
                        warn!(error = %e, "Rejected policy document");
                        return Response::error(
                            request_id,
                            ErrorInfo::new(ErrorCode::ConfigError, e.to_string()),
                        );
                    }
                };

                let h = handlers.clone();
                let result = run_blocking(move || h.registry.reload(&policies)).await;
                reply(request_id, flatten(result, |e| e.code()), |summary| {
                    ResponsePayload::PoliciesReloaded {
                        policy_count: summary.policy_count,
                        token_count: summary.token_count,
                    }
                })
            }

            Command::IssueToken { access_level } => {
                let h = handlers.clone();
                let result = run_blocking(move || h.registry.issue_token(access_level)).await;
                reply(request_id, flatten(result, |e| e.code()), |token| {
                    ResponsePayload::TokenIssued { token }
                })
            }

            Command::RemoveToken { token } => {
                let h = handlers.clone();
                let result = run_blocking(move || h.registry.remove_token(&token)).await;
                reply(request_id, flatten(result, |e| e.code()), |()| {
                    ResponsePayload::TokenRemoved
                })
            }

            Command::SetTokenEnabled { token, enabled } => {
                let h = handlers.clone();
                let result =
                    run_blocking(move || h.registry.set_token_enabled(&token, enabled)).await;
                reply(request_id, flatten(result, |e| e.code()), |outcome| {
                    ResponsePayload::TokenToggled { outcome }
                })
            }

            Command::SetStudentStatus { student_id, status } => {
                let h = handlers.clone();
                let result =
                    run_blocking(move || h.admin.set_student_status(student_id, status)).await;
                reply(request_id, flatten(result, |e| e.code()), |()| {
                    ResponsePayload::StudentUpdated
                })
            }

            Command::SetStudentPrivilege {
                student_id,
                privilege,
            } => {
                let h = handlers.clone();
                let result =
                    run_blocking(move || h.admin.set_student_privilege(student_id, privilege))
                        .await;
                reply(request_id, flatten(result, |e| e.code()), |()| {
                    ResponsePayload::StudentUpdated
                })
            }

            Command::SubscribeRecords => {
                let Some(sender) = ipc.event_sender(client_id).await else {
                    return Response::error(
                        request_id,
                        ErrorInfo::new(ErrorCode::InternalError, "Client is gone"),
                    );
                };

                let h = handlers.clone();
                let id = client_id.clone();
                let result = run_blocking(move || h.feed.subscribe(id, sender)).await;

                // The client may have left while the snapshot was being read
                if ipc.get_client_info(client_id).await.is_none() {
                    handlers.feed.unsubscribe(client_id);
                }

                reply(
                    request_id,
                    flatten(result, |_| ErrorCode::InternalError),
                    |()| ResponsePayload::Subscribed {
                        client_id: client_id.clone(),
                    },
                )
            }

            Command::UnsubscribeRecords => {
                handlers.feed.unsubscribe(client_id);
                Response::success(request_id, ResponsePayload::Unsubscribed)
            }

            Command::GetHealth => {
                let h = handlers.clone();
                let result = run_blocking(move || {
                    let store_ok = h.store.is_healthy();
                    HealthStatus {
                        live: true,
                        ready: store_ok,
                        store_ok,
                        policy_count: h.registry.policies().len(),
                        token_count: h.registry.tokens().len(),
                        subscriber_count: h.feed.subscriber_count(),
                    }
                })
                .await;
                reply(request_id, result, ResponsePayload::Health)
            }

            Command::Ping => Response::success(request_id, ResponsePayload::Pong),
        }
    }
}

/// Collapse a blocking task result and a domain error into one `ErrorInfo`
fn flatten<T, E: std::fmt::Display>(
    result: Result<Result<T, E>, ErrorInfo>,
    code: impl FnOnce(&E) -> ErrorCode,
) -> Result<T, ErrorInfo> {
    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            let code = code(&e);
            if code == ErrorCode::InternalError {
                error!(error = %e, "Request failed");
            }
            Err(ErrorInfo::new(code, e.to_string()))
        }
        Err(info) => Err(info),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "kioskd starting");

    // Create and run the service
    let service = Service::new(&args).await?;
    service.run().await
}
