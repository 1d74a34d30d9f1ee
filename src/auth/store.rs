// Token persistence (SQLite key-value table or in-memory)

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use super::types::{from_epoch_millis, TokenState};

const ACCESS_TOKEN_KEY: &str = "gsc_access_token";
const REFRESH_TOKEN_KEY: &str = "gsc_refresh_token";
const EXPIRES_AT_KEY: &str = "gsc_token_expires_at";

/// Storage backend for the session token state
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<TokenState>;
    fn save(&self, state: &TokenState) -> Result<()>;
    /// Remove all three entries together
    fn clear(&self) -> Result<()>;
}

/// Token store backed by an `auth_kv` table in a SQLite database
pub struct SqliteTokenStore {
    conn: Mutex<Connection>,
}

impl SqliteTokenStore {
    /// Open (or create) the token database
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create token directory: {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database: {}", path.display()))?;
        Self::with_connection(conn)
    }

    /// In-memory SQLite database, used by tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory SQLite")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS auth_kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )
        .context("Failed to create auth_kv table")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Token store connection lock poisoned"))
    }
}

fn get_value(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row("SELECT value FROM auth_kv WHERE key = ?", [key], |row| {
        row.get(0)
    })
    .optional()
    .with_context(|| format!("Failed to read {} from token store", key))
}

impl TokenStore for SqliteTokenStore {
    fn load(&self) -> Result<TokenState> {
        let conn = self.lock()?;

        let access_token = get_value(&conn, ACCESS_TOKEN_KEY)?;
        let refresh_token = get_value(&conn, REFRESH_TOKEN_KEY)?;
        let expires_at = match get_value(&conn, EXPIRES_AT_KEY)? {
            Some(raw) => {
                let ms: i64 = raw
                    .parse()
                    .with_context(|| format!("Invalid token expiry in store: {}", raw))?;
                from_epoch_millis(ms)
            }
            None => None,
        };

        Ok(TokenState {
            access_token,
            refresh_token,
            expires_at,
        })
    }

    fn save(&self, state: &TokenState) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .context("Failed to start token store transaction")?;

        let entries = [
            (ACCESS_TOKEN_KEY, state.access_token.clone()),
            (REFRESH_TOKEN_KEY, state.refresh_token.clone()),
            (
                EXPIRES_AT_KEY,
                state.expires_at.map(|dt| dt.timestamp_millis().to_string()),
            ),
        ];

        for (key, value) in entries {
            match value {
                Some(value) => {
                    tx.execute(
                        "INSERT INTO auth_kv (key, value) VALUES (?1, ?2)
                         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                        params![key, value],
                    )
                    .with_context(|| format!("Failed to write {} to token store", key))?;
                }
                None => {
                    tx.execute("DELETE FROM auth_kv WHERE key = ?", [key])
                        .with_context(|| format!("Failed to delete {} from token store", key))?;
                }
            }
        }

        tx.commit().context("Failed to commit token state")
    }

    fn clear(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM auth_kv WHERE key IN (?1, ?2, ?3)",
            params![ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, EXPIRES_AT_KEY],
        )
        .context("Failed to clear token store")?;
        Ok(())
    }
}

/// Process-local token store
#[derive(Default)]
pub struct MemoryTokenStore {
    state: Mutex<TokenState>,
}

impl MemoryTokenStore {
    pub fn new(state: TokenState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<TokenState> {
        let state = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("Token state lock poisoned"))?;
        Ok(state.clone())
    }

    fn save(&self, state: &TokenState) -> Result<()> {
        let mut stored = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("Token state lock poisoned"))?;
        *stored = state.clone();
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut stored = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("Token state lock poisoned"))?;
        stored.clear();
        Ok(())
    }
}
