//! `fabric_demo` — a CLI wiring the five forwarding entrypoints and the
//! minimal HTTP/WS control surface from `fabric_core` into runnable
//! subcommands. This binary is the demo harness, not the library: it has no
//! logic of its own beyond argument parsing, config loading, and graceful
//! shutdown wiring.

mod http_helpers;
mod http_server;

use clap::{Parser, Subcommand};
use fabric_core::{stop_channel, FabricConfig, UartOptions};

#[derive(Parser)]
#[command(name = "fabric_demo", about = "Runs one of the fabric's forwarding entrypoints, or its demo HTTP/WS surface.")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// TCP listener forwarding to a TCP remote.
    TcpForward {
        local: String,
        remote: String,
    },
    /// UDP listener pooling peers and forwarding to a UDP remote.
    UdpForward {
        local: String,
        remote: String,
    },
    /// TCP listener forwarding each accepted connection to a UDP remote.
    Udp2Tcp {
        local: String,
        remote: String,
    },
    /// UDP listener pooling peers and forwarding to a single TCP remote.
    Tcp2Udp {
        local: String,
        remote: String,
    },
    /// UDP listener pooling peers and forwarding to a serial port.
    Uart2Udp {
        local: String,
        port: String,
        #[arg(long, default_value_t = 115_200)]
        baud: u32,
    },
    /// The demo HTTP surface: WS upgrade at `/ws`, start/stop control plane
    /// at `/svc`, static files everywhere else. `/svc` starts a TCP→TCP
    /// forward between `demo_local` and `demo_remote`.
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        addr: String,
        #[arg(long, default_value = "127.0.0.1:19100")]
        demo_local: String,
        #[arg(long, default_value = "127.0.0.1:19101")]
        demo_remote: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let config = FabricConfig::from_env();

    let (stop_tx, stop_rx) = stop_channel();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = stop_tx.send(true);
    });

    match cli.command {
        Command::TcpForward { local, remote } => {
            fabric_core::tcp_forward(&local, &remote, stop_rx, "tcpForward", config.endpoint).await?;
        }
        Command::UdpForward { local, remote } => {
            fabric_core::udp_forward(&local, &remote, stop_rx, "udpForward", config.endpoint).await?;
        }
        Command::Udp2Tcp { local, remote } => {
            fabric_core::udp2tcp_forward(&local, &remote, stop_rx, "udp2tcpForward", config.endpoint).await?;
        }
        Command::Tcp2Udp { local, remote } => {
            fabric_core::tcp2udp_forward(&local, &remote, stop_rx, "tcp2udpForward", config.endpoint).await?;
        }
        Command::Uart2Udp { local, port, baud } => {
            fabric_core::uart2udp_forward(&local, UartOptions::new(port, baud), stop_rx, "uart2udpForward", config.endpoint).await?;
        }
        Command::Serve { addr, demo_local, demo_remote } => {
            http_server::serve(&addr, config, demo_local, demo_remote).await?;
        }
    }
    Ok(())
}
