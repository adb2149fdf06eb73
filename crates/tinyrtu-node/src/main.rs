use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tinyrtu_core::serial::{list_ports, SerialBus};
use tinyrtu_core::{RtuSlave, StdDelay};
use tinyrtu_node::{init_logging, Node, NodeConfig};
use tracing::{info, warn};

/// MODBUS RTU slave on a serial port
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Node configuration file (JSON)
    #[arg(short, long, required_unless_present = "list_ports")]
    config: Option<PathBuf>,

    /// Serial port, overriding the configuration file
    #[arg(short, long)]
    port: Option<String>,

    /// List available serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    if args.list_ports {
        for port in list_ports() {
            match (port.vid, port.pid) {
                (Some(vid), Some(pid)) => println!(
                    "{} [{:04x}:{:04x}] {}",
                    port.name,
                    vid,
                    pid,
                    port.product.unwrap_or_default()
                ),
                _ => println!("{}", port.name),
            }
        }
        return Ok(());
    }

    let Some(path) = args.config else {
        bail!("--config is required");
    };
    let mut config = NodeConfig::from_file(&path)?;
    if let Some(port) = args.port {
        config.slave.line.port_name = port;
    }

    let timing = config.slave.timing();
    let mut bus = SerialBus::open(&config.slave.line, timing)
        .with_context(|| format!("Failed to open {}", config.slave.line.port_name))?;
    let slave = RtuSlave::from_config(&config.slave, bus.line(), Box::new(StdDelay))?;
    bus.start(slave.events())?;

    let node = Node::new(slave);
    node.seed(&config.seed)?;

    let window = node.slave().window();
    info!(
        "Serving instrument {} registers {}..={}",
        window.instrument_address(),
        window.start(),
        window.end()
    );

    let cycle = Duration::from_millis(config.cycle_ms);
    loop {
        match node.cycle() {
            Ok(changes) => {
                for change in changes {
                    info!("Register {} = {}", change.address, change.value);
                }
            }
            Err(e) => warn!("{:#} ({:?})", e, node.slave().stats()),
        }
        thread::sleep(cycle);
    }
}
