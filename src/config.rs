use crate::errors::AppResult;
use crate::settings::{ResolvedSettings, REDIS_CONNECT_TIMEOUT};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_ENV_FILE: &str = ".env";
const APP_DIR_NAME: &str = "shop-crm-dashboard";

/// Everything one invocation needs to know before touching storage.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env_file: PathBuf,
    pub data_dir: PathBuf,
    pub settings: ResolvedSettings,
    pub redis_timeout: Duration,
}

impl AppConfig {
    pub fn load(env_file: Option<&Path>, data_dir: Option<&Path>) -> AppResult<Self> {
        let env_file = env_file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_FILE));
        let data_dir = data_dir.map(Path::to_path_buf).unwrap_or_else(default_data_dir);
        let settings = ResolvedSettings::load(&env_file)?;
        Ok(Self {
            env_file,
            data_dir,
            settings,
            redis_timeout: REDIS_CONNECT_TIMEOUT,
        })
    }

    /// Re-reads the env file after a save.
    pub fn reload_settings(&mut self) -> AppResult<()> {
        self.settings = ResolvedSettings::load(&self.env_file)?;
        Ok(())
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(".dashboard"))
}
