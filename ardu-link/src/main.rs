#[cfg(not(target_arch = "wasm32"))]
use anyhow::bail;
#[cfg(not(target_arch = "wasm32"))]
use ardu_link::{
    ConnectionState, SerialManager, Settings, backend::NativeSerial, settings::DEFAULT_BAUD_RATE,
    settings::DEFAULT_MESSAGE_LIMIT,
};
#[cfg(not(target_arch = "wasm32"))]
use ardu_mavlink::{ChecksumPolicy, FrameHeader, Heartbeat, Message, encode_frame};
#[cfg(not(target_arch = "wasm32"))]
use clap::Parser;
#[cfg(not(target_arch = "wasm32"))]
use log::{debug, error, info, warn};
#[cfg(not(target_arch = "wasm32"))]
use std::time::Duration;
#[cfg(not(target_arch = "wasm32"))]
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    task::LocalSet,
};

/// Print MAVLink telemetry read from a serial port.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Serial port to open. Defaults to the first port found. Implies --auto-connect.
    #[arg(short, long)]
    port: Option<String>,

    /// Connect right away instead of waiting for Enter after the port is selected.
    #[arg(short, long)]
    auto_connect: bool,

    #[arg(short, long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Only print these messages (HEARTBEAT, GPS_RAW_INT, ATTITUDE, UNKNOWN). Repeatable.
    #[arg(short, long)]
    filter: Vec<String>,

    /// How many messages to keep around.
    #[arg(long, default_value_t = DEFAULT_MESSAGE_LIMIT)]
    limit: usize,

    /// Verify frame CRCs instead of only checking that a checksum is present.
    #[arg(long)]
    crc: bool,

    /// Also print the raw payload bytes.
    #[arg(long)]
    raw: bool,

    /// Send a ground station heartbeat every second.
    #[arg(long)]
    heartbeat: bool,

    /// List serial ports and exit.
    #[arg(long)]
    list: bool,
}

#[cfg(not(target_arch = "wasm32"))]
impl Args {
    fn settings(&self) -> Settings {
        let defaults = Settings::default();
        Settings {
            baud_rate: self.baud,
            port_name: self.port.clone(),
            message_limit: self.limit,
            message_filter: if self.filter.is_empty() {
                defaults.message_filter
            } else {
                self.filter.clone()
            },
            checksum: if self.crc {
                ChecksumPolicy::Crc
            } else {
                ChecksumPolicy::LengthOnly
            },
            show_raw_data: self.raw,
            auto_connect: self.auto_connect || self.port.is_some(),
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let local = LocalSet::new();
    local.block_on(&rt, run(args))
}

// the monitor only makes sense natively; in the browser the library is driven by a web UI
#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
async fn run(args: Args) -> anyhow::Result<()> {
    if args.list {
        for port in NativeSerial::list_ports()? {
            println!("{port}");
        }
        return Ok(());
    }

    let settings = args.settings();
    let mut manager =
        SerialManager::with_decoder(NativeSerial::new(settings.port_name.clone()), settings.decoder());
    if !manager.is_supported() {
        bail!("serial ports are not available on this system");
    }
    let mut messages = manager.subscribe_messages();
    let mut states = manager.subscribe_state();
    let mut history = settings.history();

    let port = manager.request_port().await?;
    if !settings.auto_connect {
        println!("selected {port}, press Enter to connect");
        let mut line = String::new();
        let mut stdin = BufReader::new(tokio::io::stdin());
        tokio::select! {
            read = stdin.read_line(&mut line) => {
                if read? == 0 {
                    return Ok(());
                }
            }
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
    manager.connect(settings.baud_rate).await?;

    let mut stats_interval = tokio::time::interval(Duration::from_secs(1));
    let mut heartbeat_interval = tokio::time::interval(Duration::from_secs(1));
    let mut heartbeat_seq = 0u8;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut failure = None;

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                debug!("interrupted");
                break;
            }

            Some(msg) = messages.recv() => {
                if history.push(msg)
                    && let Some(msg) = history.latest()
                {
                    print_message(msg, settings.show_raw_data);
                }
            }

            Some(state) = states.recv() => {
                if let ConnectionState::Error(err) = state {
                    error!("{err}");
                    failure = Some(err);
                    break;
                }
                info!("{state}");
            }

            _ = stats_interval.tick() => {
                let stats = manager.parser_stats();
                debug!(
                    "processed {} messages, {} bytes buffered",
                    stats.processed_messages, stats.buffer_len
                );
            }

            _ = heartbeat_interval.tick(), if args.heartbeat => {
                let frame = gcs_heartbeat(heartbeat_seq)?;
                heartbeat_seq = heartbeat_seq.wrapping_add(1);
                if let Err(e) = manager.write_data(&frame).await {
                    warn!("couldn't send heartbeat: {e}");
                }
            }
        }
    }

    manager.disconnect().await;
    info!(
        "{} messages processed, {} kept",
        manager.parser_stats().processed_messages,
        history.len()
    );
    match failure {
        Some(err) => bail!(err),
        None => Ok(()),
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn print_message(msg: &Message, show_raw_data: bool) {
    let env = &msg.envelope;
    println!(
        "{} {} sys={} comp={} seq={} {:?}",
        env.timestamp,
        msg.name(),
        env.system_id,
        env.component_id,
        env.sequence,
        msg.payload
    );
    if show_raw_data {
        println!("    {:02x?}", env.raw_payload);
    }
}

/// Heartbeat of a ground control station (MAV_TYPE_GCS, MAV_AUTOPILOT_INVALID).
#[cfg(not(target_arch = "wasm32"))]
fn gcs_heartbeat(seq: u8) -> anyhow::Result<Vec<u8>> {
    let header = FrameHeader {
        sequence: seq,
        system_id: 255,
        component_id: 190,
        message_id: 0,
        ..Default::default()
    };
    let heartbeat = Heartbeat {
        system_type: 6,
        autopilot: 8,
        system_status: 4,
        mavlink_version: 3,
        ..Default::default()
    };
    Ok(encode_frame(&header, &heartbeat.to_payload())?)
}
