use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use serde_json::Value;
use trellis::{
    AppState, build_app,
    config::AppConfig,
    db,
    deferred_insert::DeferredInsertQueue,
    deferred_sink::{DeferredInsertSink, RouteHistorySink},
    observability, retention,
    templates::{TemplateEnvironment, TemplateExtensions},
};

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "trellis.toml";

/// How long shutdown waits for the deferred insert worker's final flush.
const DEFERRED_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(version, about = "Route history service and template renderer", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (defaults to ./trellis.toml if it exists)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the HTTP server (default)
    Serve,
    /// Run database migrations and exit
    Migrate,
    /// Trim route history to the newest records per user and exit
    PruneRouteHistory {
        /// Report what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
    },
    /// Render a template path or inline source to stdout
    Render {
        /// Template path (e.g. templates/pages/home.html) or inline source
        template: String,
        /// JSON object used as the render context
        #[arg(long)]
        context: Option<String>,
        /// Treat the template argument as a path
        #[arg(long)]
        path: bool,
        /// Skip the unsafe attribute check on inline sources
        #[arg(long = "unsafe")]
        unsafe_render: bool,
    },
    /// Check a template file for syntax errors
    Validate {
        /// Template file on disk
        file: PathBuf,
    },
    /// Render the HTML and plain-text parts of an email template
    Email {
        /// Email template name under templates/emails/
        name: String,
        /// JSON object used as the render context
        #[arg(long)]
        args: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = load_config(args.config.as_deref());

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => run_server(config).await,
        Command::Migrate => run_migrate(config).await,
        Command::PruneRouteHistory { dry_run } => run_prune(config, dry_run).await,
        Command::Render {
            template,
            context,
            path,
            unsafe_render,
        } => run_render(&config, &template, context.as_deref(), path, !unsafe_render),
        Command::Validate { file } => run_validate(&config, &file),
        Command::Email { name, args } => run_email(&config, &name, args.as_deref()),
    }
}

fn load_config(explicit_path: Option<&str>) -> AppConfig {
    let path = match explicit_path {
        Some(path) => {
            let path = PathBuf::from(path);
            if !path.exists() {
                fail(format!("Config file not found: {}", path.display()));
            }
            Some(path)
        }
        None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()),
    };

    let Some(path) = path else {
        return AppConfig::default();
    };

    AppConfig::from_file(&path).unwrap_or_else(|e| {
        fail(format!(
            "Failed to load config from {}: {}",
            path.display(),
            e
        ))
    })
}

fn init_observability(config: &AppConfig) {
    if let Err(e) = observability::init_tracing(&config.observability.logging) {
        eprintln!("Warning: {e}");
    }
    if let Err(e) = observability::metrics::init_metrics(&config.observability.metrics) {
        tracing::warn!(error = %e, "Failed to initialize metrics");
    }
}

async fn run_server(config: AppConfig) {
    init_observability(&config);
    tracing::info!("Starting trellis");

    let state = match AppState::new(config.clone(), TemplateExtensions::new()).await {
        Ok(state) => state,
        Err(e) => fail(format!("Failed to initialize application state: {e}")),
    };

    let mut sinks: Vec<Arc<dyn DeferredInsertSink>> = Vec::new();
    if let Some(db) = &state.db {
        sinks.push(Arc::new(RouteHistorySink::new(db.route_history())));
    } else {
        tracing::warn!("No database configured, queued route history will be discarded");
    }
    let deferred_handle = state.deferred_inserts.start_worker(sinks);
    tracing::info!("Deferred insert worker started");

    if let Some(db) = state.db.clone() {
        let retention_config = config.retention.clone();
        tokio::spawn(async move {
            retention::start_retention_worker(db, retention_config).await;
        });
    }

    let queue = Arc::clone(&state.deferred_inserts);
    let app = build_app(&config, state);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => fail(format!("Failed to bind to {bind_addr}: {e}")),
    };
    tracing::info!("Server listening on http://{}", bind_addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(queue, deferred_handle))
        .await
    {
        tracing::error!(error = %e, "Server error");
    }
}

async fn shutdown_signal(
    queue: Arc<DeferredInsertQueue>,
    deferred_handle: tokio::task::JoinHandle<()>,
) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, flushing deferred inserts...");

    queue.shutdown();
    match tokio::time::timeout(DEFERRED_FLUSH_TIMEOUT, deferred_handle).await {
        Ok(_) => tracing::info!("Deferred inserts flushed"),
        Err(_) => tracing::warn!(
            pending = queue.len(),
            "Timeout waiting for deferred inserts to flush"
        ),
    }

    tracing::info!("Shutdown complete");
}

async fn connect_database(config: &AppConfig) -> db::DbPool {
    if config.database.is_none() {
        fail("Database is not configured".to_string());
    }
    match db::DbPool::from_config(&config.database).await {
        Ok(pool) => pool,
        Err(e) => fail(format!("Failed to connect to database: {e}")),
    }
}

async fn run_migrate(config: AppConfig) {
    init_observability(&config);
    tracing::info!("Running database migrations");

    let pool = connect_database(&config).await;
    match pool.run_migrations().await {
        Ok(()) => tracing::info!("Database migrations completed successfully"),
        Err(e) => fail(format!("Database migrations failed: {e}")),
    }
}

async fn run_prune(config: AppConfig, dry_run: bool) {
    init_observability(&config);

    let pool = connect_database(&config).await;
    if config.database.run_migrations()
        && let Err(e) = pool.run_migrations().await
    {
        fail(format!("Database migrations failed: {e}"));
    }

    let mut retention_config = config.retention.clone();
    retention_config.dry_run = dry_run || retention_config.dry_run;

    match retention::run_retention(&pool, &retention_config).await {
        Ok(result) => {
            let verb = if retention_config.dry_run {
                "Would delete"
            } else {
                "Deleted"
            };
            println!(
                "{verb} {} route history records for {} users (keeping {} per user)",
                result.records_deleted, result.users_pruned, retention_config.keep_per_user
            );
        }
        Err(e) => fail(format!("Route history pruning failed: {e}")),
    }
}

fn template_environment(config: &AppConfig) -> TemplateEnvironment {
    TemplateEnvironment::new(&config.templates, TemplateExtensions::new())
}

fn parse_context(raw: Option<&str>) -> Value {
    match raw {
        None => Value::Object(Default::default()),
        Some(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(value @ Value::Object(_)) => value,
            Ok(_) => fail("Context must be a JSON object".to_string()),
            Err(e) => fail(format!("Invalid context JSON: {e}")),
        },
    }
}

fn run_render(
    config: &AppConfig,
    template: &str,
    context: Option<&str>,
    is_path: bool,
    safe_render: bool,
) {
    init_observability(config);
    let env = template_environment(config);
    let context = parse_context(context);

    match env.render_template(template, &context, is_path, safe_render) {
        Ok(output) => println!("{output}"),
        Err(e) => fail(e.to_string()),
    }
}

fn run_validate(config: &AppConfig, file: &std::path::Path) {
    init_observability(config);
    let source = match std::fs::read_to_string(file) {
        Ok(source) => source,
        Err(e) => fail(format!("Failed to read {}: {e}", file.display())),
    };

    match template_environment(config).validate_template(&source) {
        Ok(()) => println!("{}: OK", file.display()),
        Err(e) => fail(format!("{}: Syntax error in template. {e}", file.display())),
    }
}

fn run_email(config: &AppConfig, name: &str, args: Option<&str>) {
    init_observability(config);
    let env = template_environment(config);
    let args = parse_context(args);

    match env.get_email_from_template(name, &args) {
        Ok((html, text)) => {
            println!("{html}");
            if let Some(text) = text {
                println!("---");
                println!("{text}");
            }
        }
        Err(e) => fail(e.to_string()),
    }
}

fn fail(message: String) -> ! {
    eprintln!("Error: {message}");
    std::process::exit(1);
}
