use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

use vouch_api::uploads::MAX_UPLOAD_BYTES;

/// Runtime settings, read from the environment (and `.env` if present).
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub upload_dir: PathBuf,
    pub store_timeout: Duration,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let host = get("VOUCH_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = get("VOUCH_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("VOUCH_PORT must be a port number")?;
        let db_path: PathBuf = get("VOUCH_DB_PATH").unwrap_or_else(|| "vouch.db".into()).into();
        let upload_dir: PathBuf = get("VOUCH_UPLOAD_DIR")
            .unwrap_or_else(|| "./uploads".into())
            .into();
        let timeout_secs: u64 = get("VOUCH_STORE_TIMEOUT_SECS")
            .unwrap_or_else(|| "10".into())
            .parse()
            .context("VOUCH_STORE_TIMEOUT_SECS must be a whole number of seconds")?;
        if timeout_secs == 0 {
            anyhow::bail!("VOUCH_STORE_TIMEOUT_SECS must be at least 1");
        }

        Ok(Self {
            host,
            port,
            db_path,
            upload_dir,
            store_timeout: Duration::from_secs(timeout_secs),
            max_upload_bytes: MAX_UPLOAD_BYTES,
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}
