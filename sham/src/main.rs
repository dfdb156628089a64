//! Entry point for `sham`.
//!
//! Parses CLI arguments and dispatches into either **server** or **client**
//! mode, each doing file transfer or chat.  All protocol work is delegated to
//! library modules; `main.rs` owns only process setup (logging, argument
//! parsing, output).

use std::fs::File;
use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use sham::chat;
use sham::config::ShamConfig;
use sham::connection::{Connection, SessionStats};
use sham::socket::Socket;

/// Reliable byte stream over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Wait for one client and receive a file (or chat).
    Server {
        /// UDP port to listen on.
        port: u16,
        /// Interactive chat instead of file transfer.
        #[arg(long)]
        chat: bool,
        #[command(flatten)]
        loss: LossArgs,
    },
    /// Connect to a server and send a file (or chat).
    Client {
        /// Server IP address.
        server_ip: IpAddr,
        /// Server UDP port.
        server_port: u16,
        /// File to send.
        #[arg(required_unless_present = "chat", conflicts_with = "chat")]
        input: Option<PathBuf>,
        /// Name the server stores the file under.
        #[arg(required_unless_present = "chat", conflicts_with = "chat")]
        output: Option<String>,
        /// Interactive chat instead of file transfer.
        #[arg(long)]
        chat: bool,
        #[command(flatten)]
        loss: LossArgs,
    },
}

#[derive(Args)]
struct LossArgs {
    /// Probability of dropping an inbound data packet, in [0, 1).
    #[arg(long, default_value_t = 0.0)]
    loss: f64,
    /// Seed for the loss generator (random when omitted).
    #[arg(long)]
    seed: Option<u64>,
}

impl LossArgs {
    fn config(&self) -> Result<ShamConfig> {
        let config = ShamConfig::default().with_loss(self.loss, self.seed);
        config.validate().context("invalid --loss")?;
        Ok(config)
    }
}

/// `RUDP_LOG=1` sends every protocol event (`SND DATA SEQ=…`, `RCV ACK=…`,
/// `RETX DATA …`) to `<role>_log.txt`; otherwise `RUST_LOG` controls what
/// reaches stderr.
fn init_logging(role: &str) -> Result<()> {
    if std::env::var("RUDP_LOG").as_deref() != Ok("1") {
        env_logger::init();
        return Ok(());
    }
    let path = format!("{role}_log.txt");
    let file = File::create(&path).with_context(|| format!("creating {path}"))?;
    env_logger::Builder::new()
        .filter_module("sham", log::LevelFilter::Debug)
        .target(env_logger::Target::Pipe(Box::new(file)))
        .format(|buf, record| {
            writeln!(buf, "[{}] [LOG] {}", buf.timestamp_micros(), record.args())
        })
        .init();
    Ok(())
}

fn report(stats: &SessionStats) {
    log::info!(
        "session: sent={}B/{}pkt delivered={}B retx={} dropped={} discarded={}",
        stats.bytes_sent,
        stats.packets_sent,
        stats.bytes_delivered,
        stats.retransmissions,
        stats.dropped,
        stats.discarded
    );
    if stats.teardown_timed_out {
        log::warn!("teardown timed out; connection closed anyway");
    }
}

async fn run_chat(conn: &mut Connection) -> Result<()> {
    println!("{}", chat::banner(conn.role));
    let stats = chat::session(conn, chat::spawn_stdin_reader(), std::io::stdout()).await?;
    report(&stats);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.mode {
        Mode::Server { port, chat, loss } => {
            init_logging("server")?;
            let config = loss.config()?;
            if chat {
                let socket = Socket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
                    .await
                    .with_context(|| format!("binding port {port}"))?;
                println!("Server listening on port {port}...");
                let mut conn = Connection::accept(socket, config).await?;
                run_chat(&mut conn).await?;
            } else {
                println!("Server listening on port {port}...");
                let received = sham::server::run(port, config).await?;
                report(&received.stats);
                log::info!(
                    "stored {} ({} bytes)",
                    received.path.display(),
                    received.bytes
                );
                println!("MD5: {}", received.md5);
            }
        }
        Mode::Client {
            server_ip,
            server_port,
            input,
            output,
            chat,
            loss,
        } => {
            init_logging("client")?;
            let config = loss.config()?;
            let server = SocketAddr::new(server_ip, server_port);
            if chat {
                let socket = Socket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))).await?;
                let mut conn = Connection::connect(socket, server, config)
                    .await
                    .with_context(|| format!("connecting to {server}"))?;
                run_chat(&mut conn).await?;
            } else {
                let (Some(input), Some(output)) = (input, output) else {
                    anyhow::bail!("file mode needs <INPUT> and <OUTPUT>");
                };
                let stats = sham::client::run(server, &input, &output, config)
                    .await
                    .with_context(|| format!("sending {}", input.display()))?;
                report(&stats);
            }
        }
    }
    println!("Connection closed.");
    Ok(())
}
