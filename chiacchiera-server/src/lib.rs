use anyhow::Context;
use axum::http::StatusCode;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub mod auth;
pub mod config;
pub mod controllers;
pub mod error;
pub mod gateway;
pub mod groups;
pub mod presence;
pub mod routes;
pub mod service;
pub mod store;

pub use config::Config;
pub use error::ChatError;
pub use groups::{GroupDirectory, SqliteGroups};
pub use presence::{ConnectionId, Presence, RoomRegistry};
pub use service::{MessageService, PageLimits};
pub use store::{MessageStore, NewMessage};

/// Shared application state, handed to handlers through `Extension<Arc<AppState>>`.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    /// Group collaborator, also the membership oracle.
    pub groups: Arc<dyn GroupDirectory>,
    /// Live connections and rooms. Injected so it can be replaced by a distributed registry.
    pub presence: Arc<dyn Presence>,
    /// Single write path for messages, shared by HTTP and WebSocket.
    pub messages: MessageService,
}

impl AppState {
    /// State backed by SQLite groups and an in-process room registry.
    pub fn new(pool: SqlitePool, limits: PageLimits) -> Self {
        let groups: Arc<dyn GroupDirectory> = Arc::new(SqliteGroups::new(pool.clone()));
        let presence: Arc<dyn Presence> = Arc::new(RoomRegistry::new());
        Self::with_collaborators(pool, limits, groups, presence)
    }

    pub fn with_collaborators(
        pool: SqlitePool,
        limits: PageLimits,
        groups: Arc<dyn GroupDirectory>,
        presence: Arc<dyn Presence>,
    ) -> Self {
        let store = MessageStore::new(pool.clone());
        let messages = MessageService::new(store, groups.clone(), presence.clone(), limits);
        Self { pool, groups, presence, messages }
    }
}

// Dato un percorso di file, restituisce un URL SQLite valido. Crea le directory genitrici se non esistono.
pub fn sqlite_url_for_path(p: &Path) -> anyhow::Result<String> {
    let abs = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()?.join(p)
    };
    if let Some(parent) = abs.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create parent dirs for {:?}", parent))?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&abs)
        .with_context(|| format!("create/open sqlite file {:?}", abs))?;
    let s = abs.to_string_lossy().replace('\\', "/");
    Ok(format!("sqlite:///{}", s))
}

/// Crea un DB URL SQLite leggendo la variabile d'ambiente DATABASE_URL.
/// Se non è impostata, usa "chiacchiera.db" nella directory corrente.
pub fn build_sqlite_url() -> anyhow::Result<String> {
    let raw = std::env::var("DATABASE_URL").unwrap_or_else(|_| "chiacchiera.db".to_string());
    if raw == "sqlite::memory:" {
        return Ok(raw);
    }
    // Rimuovi il prefisso "sqlite://" se presente, per ottenere il percorso del file.
    let path_part = if raw.starts_with("sqlite://") {
        raw.trim_start_matches("sqlite:///")
            .trim_start_matches("sqlite://")
            .to_string()
    } else {
        raw
    };
    sqlite_url_for_path(&PathBuf::from(path_part))
}

// Connect to the database and return a connection pool.
pub async fn connect_pool(db_url: &str) -> anyhow::Result<SqlitePool> {
    let in_memory = db_url.contains(":memory:");
    let mut options = SqliteConnectOptions::from_str(db_url)
        .with_context(|| format!("parse sqlite url {}", db_url))?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));
    if !in_memory {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }
    // ogni connessione a sqlite::memory: apre un database diverso, quindi una sola connessione
    let max_connections = if in_memory { 1 } else { 8 };
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .with_context(|| format!("connect to sqlite via {}", db_url))?;
    Ok(pool)
}

// Esegue le migrazioni del database. Crea le tabelle se non esistono.
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let stmts = [
        r#"
        CREATE TABLE IF NOT EXISTS users (
            user_id       TEXT PRIMARY KEY,
            username      TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            token         TEXT,
            avatar_url    TEXT,
            role          TEXT NOT NULL DEFAULT 'user',
            created_at    TEXT NOT NULL
        );"#,
        r#"CREATE INDEX IF NOT EXISTS idx_users_token ON users(token);"#,
        r#"
        CREATE TABLE IF NOT EXISTS groups (
            group_id   TEXT PRIMARY KEY,
            name       TEXT NOT NULL,
            creator_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(creator_id) REFERENCES users(user_id)
        );"#,
        r#"
        CREATE TABLE IF NOT EXISTS memberships (
            membership_id TEXT PRIMARY KEY,
            group_id      TEXT NOT NULL,
            user_id       TEXT NOT NULL,
            joined_at     TEXT NOT NULL,
            UNIQUE(group_id, user_id),
            FOREIGN KEY(group_id) REFERENCES groups(group_id),
            FOREIGN KEY(user_id)  REFERENCES users(user_id)
        );"#,
        // seq è l'ordine di inserimento, usato a parità di created_ms
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            seq           INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id    TEXT NOT NULL UNIQUE,
            group_id      TEXT NOT NULL,
            sender_id     TEXT NOT NULL,
            sender_name   TEXT NOT NULL,
            sender_avatar TEXT,
            content       TEXT NOT NULL,
            kind          TEXT NOT NULL,
            media_url     TEXT,
            media_type    TEXT,
            reply_to      TEXT,
            deleted       INTEGER NOT NULL DEFAULT 0,
            deleted_by    TEXT,
            edited        INTEGER NOT NULL DEFAULT 0,
            edited_at     TEXT,
            created_at    TEXT NOT NULL,
            created_ms    INTEGER NOT NULL,
            updated_at    TEXT NOT NULL,
            FOREIGN KEY(group_id) REFERENCES groups(group_id),
            FOREIGN KEY(sender_id) REFERENCES users(user_id)
        );"#,
        r#"CREATE INDEX IF NOT EXISTS idx_messages_group_order ON messages(group_id, deleted, created_ms, seq);"#,
        r#"
        CREATE TABLE IF NOT EXISTS message_reads (
            message_id TEXT NOT NULL,
            user_id    TEXT NOT NULL,
            read_at    TEXT NOT NULL,
            PRIMARY KEY(message_id, user_id),
            FOREIGN KEY(message_id) REFERENCES messages(message_id)
        );"#,
    ];
    // applica ogni statement di migrazione
    for s in &stmts {
        sqlx::query(s)
            .execute(pool)
            .await
            .with_context(|| format!("apply migration: {}", &s[..s.len().min(40)].replace('\n', " ")))?;
    }
    Ok(())
}

/// Controlla lo stato di salute del database tentando di acquisire una connessione dal pool.
pub async fn health_with_pool(pool: &SqlitePool) -> StatusCode {
    match pool.acquire().await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}
