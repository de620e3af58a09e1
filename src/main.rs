use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, instrument};

use wakedeck::config::{Config, DEFAULT_CONFIG_PATH};
use wakedeck::probe;
use wakedeck::server;
use wakedeck::web::AppState;
use wakedeck::wol::{self, PacketKind, UdpBroadcaster};

/// Remote power dashboard for a single Wake-on-LAN device.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Path to the INI configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the web dashboard
    Serve(ServeArgs),
    /// Send a wake (magic) packet to the configured device
    Wake(PacketArgs),
    /// Send the vendor sleep packet to the configured device
    Sleep(PacketArgs),
    /// Probe the configured device once
    Status(StatusArgs),
}

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Port to listen on (overrides server.listen_port)
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Parser, Debug)]
struct PacketArgs {
    /// Broadcast address (overrides network.broadcast_ip)
    #[arg(short, long)]
    broadcast: Option<String>,

    /// UDP port (overrides network.wol_port)
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Parser, Debug)]
struct StatusArgs {
    /// TCP connect timeout (defaults to server.status_probe_timeout_ms)
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[tokio::main]
#[instrument(name = "wakedeck_main", skip_all)]
async fn main() -> Result<()> {
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    tracing_subscriber::fmt()
        .with_writer(std::io::stdout)
        .with_env_filter(env_filter)
        .init();

    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    info!(
        "Using configuration: device={}, broadcast={}:{}, probe={}:{}",
        config.network.device_name,
        config.network.broadcast_ip,
        config.network.wol_port,
        config.network.tcping_address,
        config.network.tcping_port
    );

    match cli.command {
        Commands::Serve(args) => {
            let port = args.port.unwrap_or(config.server.listen_port);
            let state = AppState::from_config(&config)?;
            server::start(state, port)
                .await
                .context("Dashboard server failed")?;
        }
        Commands::Wake(args) => handle_packet_command(PacketKind::Wake, args, &config)?,
        Commands::Sleep(args) => handle_packet_command(PacketKind::Sleep, args, &config)?,
        Commands::Status(args) => {
            let timeout = args
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.server.status_probe_timeout());
            let net = &config.network;
            let online = probe::probe(&net.tcping_address, net.tcping_port, timeout).await;
            println!("{}", if online { "online" } else { "offline" });
        }
    }

    Ok(())
}

#[instrument(name = "handle_packet_command", skip(args, config))]
fn handle_packet_command(kind: PacketKind, args: PacketArgs, config: &Config) -> Result<()> {
    let bcast = args
        .broadcast
        .unwrap_or_else(|| config.network.broadcast_ip.clone());
    let port = args.port.unwrap_or(config.network.wol_port);
    let sender = UdpBroadcaster::new(config.server.send_timeout());

    let mac = wol::send_packet(&sender, kind, &config.network.mac_address, &bcast, port)
        .with_context(|| format!("Failed to send {kind} packet"))?;

    info!("Sent {} packet for {} via {}:{}", kind, mac, bcast, port);
    Ok(())
}
