mod api;
mod collectors;
mod config;
mod context;
mod delta;
mod http;
mod metrics;
mod poll;
mod session;
mod settings;
mod state;
mod store;
mod update;
mod views;

use axum::serve;
use clap::{Parser, Subcommand};
use config::Config;
use context::AgentContext;
use metrics::{now_unix, Metrics};
use session::Session;
use settings::Settings;
use state::State;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use store::writer::PersistenceWriter;
use store::DbPool;
use tokio::net::TcpListener;
use tokio::sync::{watch, RwLock};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use update::{ReplaceOutcome, UpdateOutcome};

const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Parser, Debug)]
#[command(name = "inventoryd")]
#[command(version)]
struct Cli {
    #[arg(long, default_value = "./config.yaml")]
    config: String,
    #[arg(long)]
    print_default_config: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Collect inventory on this machine and serve the local dashboard API (default).
    Agent {
        /// Write every pass to the database.
        #[arg(long)]
        persist: bool,
    },
    /// Serve the CRUD API over the inventory database.
    Serve {
        #[arg(long, value_enum, default_value_t = api::ApiGroup::All)]
        group: api::ApiGroup,
    },
    /// Check for a newer release and install it.
    Update {
        #[arg(long)]
        check_only: bool,
    },
    /// Show or change local preferences.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    Show,
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let cfg = match load_config(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "не удалось загрузить конфигурацию");
            std::process::exit(1);
        }
    };

    match cli.command.unwrap_or(Command::Agent { persist: false }) {
        Command::Agent { persist } => run_agent(cfg, persist).await,
        Command::Serve { group } => run_api(cfg, group).await,
        Command::Update { check_only } => run_self_update(cfg, check_only).await,
        Command::Settings { action } => run_settings(&cfg, action),
    }
}

fn load_config(path: &str) -> Result<Config, config::ConfigError> {
    let mut cfg = Config::load_or_default(path)?;
    cfg.apply_env_overrides()?;
    Ok(cfg)
}

async fn run_agent(cfg: Config, persist_flag: bool) {
    let persist = persist_flag || cfg.agent.persist;
    info!(listen = %cfg.listen, persist, "запуск inventoryd");

    let db = match DbPool::connect(&cfg.database.url, cfg.database.max_connections).await {
        Ok(db) => Some(db),
        Err(err) if persist => {
            error!(error = %err, "не удалось подключиться к базе данных");
            std::process::exit(1);
        }
        Err(err) => {
            warn!(error = %err, "база данных недоступна, сохранение отключено");
            None
        }
    };

    let session = load_or_create_session(&cfg.local.session_path);

    let metrics = match Metrics::new() {
        Ok(m) => m,
        Err(err) => {
            error!(error = %err, "не удалось инициализировать метрики");
            std::process::exit(1);
        }
    };
    let addr: SocketAddr = match cfg.listen.parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!(error = %err, listen = %cfg.listen, "некорректный адрес listen");
            std::process::exit(1);
        }
    };

    let shared_state = Arc::new(RwLock::new(State::new(now_unix())));
    let ctx = AgentContext::new(
        cfg,
        shared_state,
        metrics.clone(),
        db.map(PersistenceWriter::new),
        persist,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = views::spawn_all(&ctx, shutdown_rx.clone());
    let triggers: HashMap<_, _> = handles
        .iter()
        .map(|handle| (handle.kind, handle.trigger.clone()))
        .collect();

    let http_task = {
        let app = http::build_router(http::HttpAppState {
            metrics,
            ctx: ctx.clone(),
            triggers: Arc::new(triggers),
            session_id: Some(session.session_id),
        });
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let listener = match TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(err) => {
                    error!(error = %err, "не удалось запустить HTTP-сервер");
                    return;
                }
            };
            let server = serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            });
            if let Err(err) = server.await {
                error!(error = %err, "ошибка HTTP-сервера");
            }
        })
    };

    wait_for_ctrl_c().await;
    let _ = shutdown_tx.send(true);

    for handle in handles {
        if let Err(err) = handle.task.await {
            error!(error = %err, view = %handle.kind, "цикл опроса завершился аварийно");
        }
    }
    let _ = http_task.await;
}

async fn run_api(cfg: Config, group: api::ApiGroup) {
    let db = match DbPool::connect(&cfg.database.url, cfg.database.max_connections).await {
        Ok(db) => db,
        Err(err) => {
            error!(error = %err, "не удалось подключиться к базе данных");
            std::process::exit(1);
        }
    };
    let listener = match TcpListener::bind(&cfg.api.listen).await {
        Ok(l) => l,
        Err(err) => {
            error!(error = %err, listen = %cfg.api.listen, "не удалось запустить API-сервер");
            std::process::exit(1);
        }
    };
    info!(listen = %cfg.api.listen, group = ?group, "API-сервер запущен");

    let server = serve(listener, api::build_router(db, group))
        .with_graceful_shutdown(wait_for_ctrl_c());
    if let Err(err) = server.await {
        error!(error = %err, "ошибка API-сервера");
        std::process::exit(1);
    }
}

async fn run_self_update(cfg: Config, check_only: bool) {
    let client = reqwest::Client::builder()
        .user_agent(concat!("inventoryd/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new());
    let session_path = std::path::Path::new(&cfg.local.session_path);
    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(err) => {
            error!(error = %err, "не удалось определить путь к исполняемому файлу");
            std::process::exit(1);
        }
    };

    match update::run_update(&client, &cfg.update, session_path, &exe, check_only).await {
        Ok(UpdateOutcome::UpToDate { .. }) => {}
        Ok(UpdateOutcome::Available { version, asset }) => {
            println!("доступна версия {version}: {asset}");
        }
        Ok(UpdateOutcome::Installed { version, replace }) => {
            info!(version = %version, "обновление установлено");
            if replace == ReplaceOutcome::Replaced {
                if let Err(err) = update::relaunch(&exe) {
                    error!(error = %err, "не удалось перезапустить приложение");
                    std::process::exit(1);
                }
            }
        }
        Err(err) => {
            error!(error = %err, "обновление не выполнено");
            std::process::exit(1);
        }
    }
}

fn run_settings(cfg: &Config, action: SettingsAction) {
    let path = &cfg.local.settings_path;
    let mut settings = Settings::load(path);
    match action {
        SettingsAction::Show => match serde_json::to_string_pretty(&settings) {
            Ok(text) => println!("{text}"),
            Err(err) => {
                error!(error = %err, "не удалось вывести настройки");
                std::process::exit(1);
            }
        },
        SettingsAction::Set { key, value } => {
            if let Err(err) = settings.set(&key, &value).and_then(|()| settings.save(path)) {
                error!(error = %err, "не удалось сохранить настройки");
                std::process::exit(1);
            }
            info!(key = %key, value = %value, "настройка сохранена");
        }
    }
}

fn load_or_create_session(path: &str) -> Session {
    match Session::load(path) {
        Ok(session) => return session,
        Err(err) => info!(reason = %err, "создаётся новая сессия"),
    }
    let session = Session::new(SESSION_TTL);
    if let Err(err) = session.save(path) {
        warn!(error = %err, "не удалось сохранить файл сессии");
    }
    session
}

async fn wait_for_ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "не удалось дождаться Ctrl+C");
    }
    info!("получен Ctrl+C, выполняется остановка");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
