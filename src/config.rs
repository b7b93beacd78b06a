use anyhow::bail;
use clap::Parser;
use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Command-line flags. Anything left unset falls through to files and env.
#[derive(Debug, Default, Parser, Serialize)]
#[command(name = "confd", version, about = "Render proxy config from a discovery endpoint")]
pub struct Args {
    /// Template to render; an empty value runs the notification script instead
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    /// Where the rendered configuration is written
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out: Option<String>,

    /// Notification script fed the raw payload on stdin
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,

    /// Seconds between discovery polls
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub discover_url: String,
    pub template: PathBuf,
    pub out: PathBuf,
    pub shell: PathBuf,
    /// Seconds between polls.
    pub interval: u64,
    /// Seconds before a discovery request is abandoned.
    pub fetch_timeout: u64,
    pub reload_command: Vec<String>,
    pub script_fail_fast: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discover_url: String::new(),
            template: "nginx.conf.template".into(),
            out: "nginx.conf".into(),
            shell: "callback.sh".into(),
            interval: 10,
            fetch_timeout: 30,
            reload_command: vec!["nginx".into(), "-s".into(), "reload".into()],
            script_fail_fast: false,
        }
    }
}

impl Config {
    /// Defaults, then `confd.toml`, `confd.json`, `CONFD_*`, `DISCOVER_URL`
    /// and finally the command line.
    pub fn figment(args: &Args) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("confd.toml"))
            .merge(Json::file("confd.json"))
            .merge(Env::prefixed("CONFD_"))
            .merge(Env::raw().only(&["DISCOVER_URL"]))
            .merge(Serialized::defaults(args))
    }

    pub fn load(args: &Args) -> anyhow::Result<Self> {
        let config: Config = Self::figment(args)
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        if config.discover_url.trim().is_empty() {
            bail!("Discover url is empty, set DISCOVER_URL");
        }
        if config.interval == 0 {
            bail!("Poll interval must be at least one second");
        }
        if config.fetch_timeout == 0 {
            bail!("Fetch timeout must be at least one second");
        }

        Ok(config)
    }

    /// Render mode is selected by a non-empty template path.
    pub fn renders_template(&self) -> bool {
        !self.template.as_os_str().is_empty()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout)
    }
}
