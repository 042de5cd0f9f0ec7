//! Command-line arguments

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use crate::config::DaemonConfig;

/// Ordered broadcast chat server
#[derive(Debug, Parser)]
#[command(name = "linechat-daemon", version)]
pub struct Args {
    /// Configuration file (created with defaults if missing)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Interface to listen on
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on (0 = any free port)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Maximum log level
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Args {
    /// Load the configuration file and apply command-line overrides
    pub fn resolve_config(&self) -> Result<DaemonConfig> {
        let mut config = match &self.config {
            Some(path) => DaemonConfig::load_or_create(path)?,
            None => DaemonConfig::load()?,
        };
        self.apply(&mut config);
        Ok(config)
    }

    pub fn apply(&self, config: &mut DaemonConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
    }
}
