use std::{path::Path, time::Duration};

use color_eyre::{eyre::Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

const DEFAULT_BASE_URL: &str = "http://200.46.245.230:8080/PortalCAE-WAR-MODULE";
// The portal only serves its full pages to desktop browsers.
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 6.1; WOW64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/33.0.1750.117 Safari/537.36";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PortalConfig {
    pub base_url: Url,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        PortalConfig {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base URL"),
            timeout_secs: 15,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

impl PortalConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[instrument(skip_all, fields(?path))]
    pub async fn load(path: &Path) -> Result<PortalConfig> {
        let buf = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Read config: {}", path.display()))?;
        let config = toml::from_str::<PortalConfig>(&buf).context("Parse config")?;
        debug!(base_url = %config.base_url, timeout_secs = config.timeout_secs, "Loaded config");
        Ok(config)
    }
}
