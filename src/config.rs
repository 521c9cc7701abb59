use anyhow::bail;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for the `trackedud` sidecar.
///
/// Values come from CLI arguments or environment variables (a `.env` file in
/// the working directory is loaded first).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "trackedud",
    version,
    about = "TrackEdu school administration sidecar"
)]
pub struct CliArgs {
    /// Workspace directory opened at startup, as if `workspace.select` had
    /// been sent first.
    ///
    /// Environment variable: `TRACKEDU_WORKSPACE`
    #[arg(long, env = "TRACKEDU_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Identity token that `session.open` must present. When unset any
    /// non-empty token opens a session.
    ///
    /// Environment variable: `TRACKEDU_ADMIN_TOKEN`
    #[arg(long, env = "TRACKEDU_ADMIN_TOKEN", hide_env_values = true)]
    pub admin_token: Option<String>,

    /// Attempts a conflicting transaction gets before it is reported as
    /// exhausted.
    ///
    /// Environment variable: `TRACKEDU_TX_MAX_ATTEMPTS`
    #[arg(long, env = "TRACKEDU_TX_MAX_ATTEMPTS", default_value_t = 16)]
    pub tx_max_attempts: u32,

    /// Linear backoff step between conflicting attempts, in milliseconds.
    ///
    /// Environment variable: `TRACKEDU_TX_BACKOFF_MS`
    #[arg(long, env = "TRACKEDU_TX_BACKOFF_MS", default_value_t = 5)]
    pub tx_backoff_ms: u64,

    /// How long SQLite waits on a locked database before giving up.
    ///
    /// Environment variable: `TRACKEDU_BUSY_TIMEOUT_MS`
    #[arg(long, env = "TRACKEDU_BUSY_TIMEOUT_MS", default_value_t = 5000)]
    pub busy_timeout_ms: u64,

    /// Emit JSON log lines on stderr instead of human-readable output.
    ///
    /// Environment variable: `TRACKEDU_LOG_JSON`
    #[arg(long, env = "TRACKEDU_LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

/// Retry and locking knobs shared by every store the sidecar opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxPolicy {
    pub max_attempts: u32,
    pub backoff_step: Duration,
    pub busy_timeout: Duration,
}

impl Default for TxPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 16,
            backoff_step: Duration::from_millis(5),
            busy_timeout: Duration::from_millis(5000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub workspace: Option<PathBuf>,
    pub admin_token: Option<String>,
    pub tx: TxPolicy,
    pub log_json: bool,
}

impl TryFrom<CliArgs> for DaemonConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.tx_max_attempts == 0 {
            bail!("TRACKEDU_TX_MAX_ATTEMPTS must be greater than 0");
        }
        if args.busy_timeout_ms == 0 {
            bail!("TRACKEDU_BUSY_TIMEOUT_MS must be greater than 0");
        }

        // An empty token in the environment means "not configured".
        let admin_token = args
            .admin_token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        Ok(Self {
            workspace: args.workspace,
            admin_token,
            tx: TxPolicy {
                max_attempts: args.tx_max_attempts,
                backoff_step: Duration::from_millis(args.tx_backoff_ms),
                busy_timeout: Duration::from_millis(args.busy_timeout_ms),
            },
            log_json: args.log_json,
        })
    }
}
