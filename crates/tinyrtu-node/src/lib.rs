//! # TinyRTU Node
//!
//! Hosts an [`RtuSlave`] on a serial port: loads the JSON configuration,
//! publishes seed values, and polls the engine once per cycle, reporting
//! the registers the master has written.

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tinyrtu_core::{Operation, RegisterChange, RtuSlave, SlaveConfig};
use tracing::{debug, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default poll period in milliseconds
pub const DEFAULT_CYCLE_MS: u64 = 1;

fn default_cycle_ms() -> u64 {
    DEFAULT_CYCLE_MS
}

/// Node configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Slave settings
    #[serde(flatten)]
    pub slave: SlaveConfig,

    /// Poll period in milliseconds
    #[serde(default = "default_cycle_ms")]
    pub cycle_ms: u64,

    /// Values published before the first poll
    #[serde(default)]
    pub seed: Vec<RegisterChange>,
}

impl NodeConfig {
    /// Parse a configuration from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).context("Invalid node configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("Failed to load {}", path.display()))
    }

    /// Check the settings the slave itself does not
    pub fn validate(&self) -> Result<()> {
        self.slave.validate()?;
        ensure!(self.cycle_ms > 0, "cycle_ms must be non-zero");
        for entry in &self.seed {
            ensure!(
                self.slave.window.contains(entry.address),
                "seed address {} is outside registers {}..={}",
                entry.address,
                self.slave.window.start(),
                self.slave.window.end()
            );
        }
        Ok(())
    }
}

/// Initialize logging; `RUST_LOG` overrides `level`
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // A subscriber may already be installed by an embedding host
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Poll loop body around a slave
pub struct Node {
    slave: RtuSlave,
}

impl Node {
    /// Wrap a slave
    pub fn new(slave: RtuSlave) -> Self {
        Self { slave }
    }

    /// The wrapped slave
    pub fn slave(&self) -> &RtuSlave {
        &self.slave
    }

    /// Publish host values by absolute address
    pub fn seed(&self, values: &[RegisterChange]) -> Result<()> {
        for entry in values {
            self.slave
                .set_register_at(entry.address, entry.value)
                .with_context(|| format!("Failed to seed register {}", entry.address))?;
        }
        debug!("Seeded {} registers", values.len());
        Ok(())
    }

    /// Serve at most one request.
    ///
    /// Returns the registers the master wrote, with their addresses and new
    /// values. Reads and idle polls return nothing. A write whose
    /// acknowledgement fails on the line is still reported, since the store
    /// already holds the new values.
    pub fn cycle(&self) -> Result<Vec<RegisterChange>> {
        let affected = match self.slave.poll() {
            Ok(affected) => affected,
            Err(e) => match e.affected() {
                Some(affected) => {
                    warn!("{}", e);
                    affected
                }
                None => return Err(e).context("Failed to answer request"),
            },
        };
        if affected.operation != Operation::Write {
            return Ok(Vec::new());
        }
        Ok(self.slave.changes(&affected))
    }
}
