use crate::config::DaemonConfig;
use crate::store::SqliteStore;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Holder of an accepted identity token.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: String,
}

pub struct AppState {
    pub config: DaemonConfig,
    pub workspace: Option<PathBuf>,
    pub store: Option<SqliteStore>,
    pub session: Option<Session>,
}

impl AppState {
    pub fn new(config: DaemonConfig) -> Self {
        Self {
            config,
            workspace: None,
            store: None,
            session: None,
        }
    }

    pub fn open_workspace(&mut self, path: PathBuf) -> anyhow::Result<()> {
        let store = SqliteStore::open(&path, self.config.tx)?;
        tracing::info!(workspace = %path.display(), "workspace opened");
        self.workspace = Some(path);
        self.store = Some(store);
        Ok(())
    }
}
