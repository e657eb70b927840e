use clap::{Parser, Subcommand};
use kestrel::capture::{self, AfPacketSocket, Capture};
use kestrel::config;
use kestrel::dataplane::{DeviceId, RouterState, TxQueue};
use kestrel::telemetry::{init_logging, MetricsRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const DEFAULT_CONFIG: &str = "config.toml";

/// Large enough for a standard Ethernet frame plus VLAN tag
const RECV_BUFFER_SIZE: usize = 2048;

const RX_CHANNEL_DEPTH: usize = 1024;

#[derive(Parser)]
#[command(name = "kestrel")]
#[command(about = "A userspace IPv4/IPv6 router with NAPT and NAT64")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the router
    Run {
        /// Path to config.toml
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },
    /// Validate config.toml and print diagnostics
    Validate {
        /// Path to config.toml
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },
    /// List the interfaces the router can use
    Interfaces,
}

fn main() {
    let cli = Cli::parse();

    let command = cli.command.unwrap_or(Commands::Run {
        config: PathBuf::from(DEFAULT_CONFIG),
    });
    let result = match command {
        Commands::Run { config } => cmd_run(&config),
        Commands::Validate { config } => cmd_validate(&config),
        Commands::Interfaces => cmd_interfaces(),
    };

    if let Err(e) = result {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }
}

fn cmd_run(config_path: &Path) -> Result<(), String> {
    let cfg = config::load(config_path)
        .map_err(|e| format!("Failed to load {}: {}", config_path.display(), e))?;
    init_logging(Some(&cfg.logging));

    let validation = config::validate(&cfg);
    for warning in &validation.warnings {
        warn!("{}", warning);
    }
    if validation.has_errors() {
        validation.print_diagnostics();
        return Err("Validation failed".to_string());
    }

    let mut router = RouterState::from_config(&cfg, capture::read_mac)
        .map_err(|e| format!("Failed to build router: {}", e))?;

    let mut sockets = Vec::with_capacity(router.devices().len());
    for device in router.devices() {
        info!(interface = %device.name, mac = %device.mac, "binding");
        let socket = AfPacketSocket::bind(&device.name).map_err(|e| {
            format!(
                "Failed to bind to {}: {}. Run with root privileges.",
                device.name, e
            )
        })?;
        sockets.push(Arc::new(socket));
    }

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to create runtime: {}", e))?;

    rt.block_on(async move {
        let (frames_tx, mut frames_rx) = mpsc::channel(RX_CHANNEL_DEPTH);
        for (index, socket) in sockets.iter().enumerate() {
            tokio::spawn(receive_loop(DeviceId(index), Arc::clone(socket), frames_tx.clone()));
        }
        drop(frames_tx);

        let ttl = router.arp().ttl();
        let mut aging_timer = tokio::time::interval(aging_interval(ttl));
        let mut tx = TxQueue::new();

        info!(devices = sockets.len(), "router started, processing packets");

        loop {
            tokio::select! {
                received = frames_rx.recv() => {
                    let Some((id, frame)) = received else {
                        warn!("all receive tasks stopped");
                        break;
                    };
                    if let Err(e) = router.process_frame(id, &frame, &mut tx) {
                        error!(%id, error = %e, "frame processing failed");
                    }
                    flush(&sockets, &mut tx, router.metrics()).await;
                }
                _ = aging_timer.tick(), if ttl.is_some() => {
                    let evicted = router.evict_expired();
                    if evicted > 0 {
                        debug!(evicted, "expired resolution entries");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("shutting down");
                    break;
                }
            }
        }

        for (name, value) in router.metrics().export() {
            info!(counter = %name, value, "final count");
        }
        Ok(())
    })
}

/// Check expiry twice per TTL, at most once a second.
fn aging_interval(ttl: Option<Duration>) -> Duration {
    ttl.map_or(Duration::from_secs(60), |ttl| {
        (ttl / 2).max(Duration::from_secs(1))
    })
}

async fn receive_loop<C: Capture + 'static>(
    id: DeviceId,
    socket: Arc<C>,
    sink: mpsc::Sender<(DeviceId, Vec<u8>)>,
) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    loop {
        match socket.recv(&mut buf).await {
            Ok(len) => {
                if sink.send((id, buf[..len].to_vec())).await.is_err() {
                    return;
                }
            }
            Err(e) => error!(%id, error = %e, "receive error"),
        }
    }
}

/// Write queued frames to their sockets in order.
async fn flush<C: Capture>(sockets: &[Arc<C>], tx: &mut TxQueue, metrics: &MetricsRegistry) {
    for (id, frame) in tx.drain() {
        let Some(socket) = sockets.get(id.0) else {
            error!(%id, "frame queued for unknown device");
            continue;
        };
        if let Err(e) = socket.send(&frame).await {
            warn!(%id, error = %e, "failed to send frame");
            metrics.record_tx_error(id);
        }
    }
}

fn cmd_validate(config_path: &Path) -> Result<(), String> {
    println!("[INFO] Validating {}...", config_path.display());

    let cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();

    if validation.has_errors() {
        Err("Validation failed".to_string())
    } else {
        println!("[INFO] Configuration is valid");
        Ok(())
    }
}

fn cmd_interfaces() -> Result<(), String> {
    let names = capture::list_interfaces().map_err(|e| format!("Failed to list interfaces: {}", e))?;
    for name in names {
        match capture::read_mac(&name) {
            Ok(mac) => println!("{:<16} {}", name, mac),
            Err(_) => println!("{:<16} -", name),
        }
    }
    Ok(())
}
