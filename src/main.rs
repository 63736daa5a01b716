mod modem;
mod power;
mod transport;

use anyhow::{bail, Context, Result};
use bytes::{Bytes, BytesMut};
use clap::Parser;
use modem::{Modem, ModemConfig, PollPolicy, RadioMode, Role, Timing};
use ntrip_shared::codec::MAX_SEND_LEN;
use ntrip_shared::{timing, SessionState};
use power::{NoPowerControl, PowerControl, SysfsGpio};
use std::process::ExitCode;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::{interval, Instant};
use transport::{
    BridgeConnector, SerialConfig, SerialConnector, TransportConnector, TransportStream,
    DEFAULT_BAUD_RATE,
};

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit status when the bring-up ends in FatalHalt
const EXIT_FATAL_HALT: u8 = 3;

/// Exit status when the caster handshake fails
const EXIT_HANDSHAKE_FAILED: u8 = 4;

/// How often the socket status is checked
const STATUS_INTERVAL: Duration = Duration::from_secs(10);

/// Largest read handed to stdout at once
const READ_CHUNK: usize = 1024;

#[derive(Parser, Debug)]
#[command(name = "ntrip-modem")]
#[command(about = "NTRIP client or source over a SIM7000 cellular modem")]
struct Args {
    /// Serial device the modem is wired to
    #[arg(long, default_value = "/dev/ttyUSB0")]
    device: String,

    /// Reach the modem through a serial-over-TCP bridge (host:port) instead
    #[arg(long)]
    bridge: Option<String>,

    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// GPIO driving the modem reset line
    #[arg(long)]
    reset_gpio: Option<u32>,

    /// GPIO driving the modem power key
    #[arg(long)]
    power_key_gpio: Option<u32>,

    #[arg(long, default_value = "internet")]
    apn: String,

    /// Caster host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 2101)]
    port: u16,

    #[arg(long, default_value = "RTCM3")]
    mountpoint: String,

    #[arg(long)]
    username: Option<String>,

    /// Caster password; falls back to NTRIP_PASSWORD
    #[arg(long)]
    password: Option<String>,

    #[arg(long, value_enum, default_value_t = Role::PullClient)]
    role: Role,

    #[arg(long, value_enum, default_value_t = RadioMode::NbIot)]
    radio_mode: RadioMode,

    /// Source description sent with the SOURCE request
    #[arg(long, default_value = "")]
    info: String,

    /// Send the SOURCE request once instead of twice
    #[arg(long, default_value_t = false)]
    single_source_request: bool,

    /// Give up after this many boot probes (default: wait forever)
    #[arg(long)]
    handshake_attempts: Option<u32>,

    /// Give up after this many weak signal samples (default: wait forever)
    #[arg(long)]
    signal_attempts: Option<u32>,

    /// Switch the modem's serial rate to this value and exit
    #[arg(long)]
    set_modem_baud: Option<u32>,
}

impl Args {
    fn modem_config(&self) -> ModemConfig {
        let mut schedule = Timing {
            duplicate_source_request: !self.single_source_request,
            ..Default::default()
        };
        if let Some(max) = self.handshake_attempts {
            schedule.handshake = PollPolicy::bounded(timing::HANDSHAKE_INTERVAL_MS, max);
        }
        if let Some(max) = self.signal_attempts {
            schedule.signal = PollPolicy::bounded(timing::SIGNAL_POLL_INTERVAL_MS, max);
        }

        ModemConfig {
            apn: self.apn.clone(),
            host: self.host.clone(),
            port: self.port,
            mountpoint: self.mountpoint.clone(),
            username: self.username.clone(),
            password: self
                .password
                .clone()
                .or_else(|| std::env::var("NTRIP_PASSWORD").ok()),
            info: self.info.clone(),
            role: self.role,
            radio_mode: self.radio_mode,
            timing: schedule,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = args.modem_config();

    info!("[MAIN] ntrip-modem starting as {:?}", config.role);
    info!("[MAIN]   Caster: {}:{}/{}", config.host, config.port, config.mountpoint);
    info!("[MAIN]   APN: {}", config.apn);

    let mut power: Box<dyn PowerControl> = match (args.reset_gpio, args.power_key_gpio) {
        (Some(reset), Some(power_key)) => Box::new(SysfsGpio::open(reset, power_key).await?),
        (None, None) => Box::new(NoPowerControl),
        _ => bail!("--reset-gpio and --power-key-gpio must be given together"),
    };

    match &args.bridge {
        Some(address) => {
            let connector = BridgeConnector::new(address.clone());
            run(connector, config, power.as_mut(), args.set_modem_baud).await
        }
        None => {
            let connector = SerialConnector::new(SerialConfig {
                path: args.device.clone(),
                baud_rate: args.baud,
            });
            run(connector, config, power.as_mut(), args.set_modem_baud).await
        }
    }
}

async fn run<C: TransportConnector>(
    connector: C,
    config: ModemConfig,
    power: &mut dyn PowerControl,
    set_modem_baud: Option<u32>,
) -> Result<ExitCode> {
    info!("[MAIN] Opening modem link ({})", connector.endpoint());
    let stream = connector.connect().await?;
    let mut modem = Modem::new(stream, config);

    if let Some(rate) = set_modem_baud {
        return switch_baud_rate(&mut modem, rate, connector.line_rate()).await;
    }

    let report = modem.bring_up(power).await?;
    if let Some(reason) = &report.fatal {
        error!("[MAIN] Bring-up halted in {}: {}", report.state, reason);
        error!("[MAIN] Modem needs an external reset");
        return Ok(ExitCode::from(EXIT_FATAL_HALT));
    }
    if let Some(signal) = &report.signal {
        info!("[MAIN] Attached with signal {}", signal);
    }

    if modem.establish_session().await? != SessionState::SessionEstablished {
        error!("[MAIN] Caster handshake failed");
        return Ok(ExitCode::from(EXIT_HANDSHAKE_FAILED));
    }

    let code = match modem.config().role {
        Role::PullClient => relay_corrections(&mut modem).await?,
        Role::PushSource => publish_corrections(&mut modem).await?,
    };
    modem.shutdown().await?;
    Ok(code)
}

/// Probe the modem, then switch its line speed
async fn switch_baud_rate<S: TransportStream>(
    modem: &mut Modem<S>,
    rate: u32,
    current: Option<u32>,
) -> Result<ExitCode> {
    let mut network = modem.network();
    if !network.handshake().await? {
        bail!("Modem did not answer AT");
    }
    if network.set_baud_rate(rate).await? {
        match current {
            Some(current) => info!(
                "[MAIN] Modem moved from {} to {} baud; reconnect with --baud {}",
                current, rate, rate
            ),
            None => warn!(
                "[MAIN] Modem now at {} baud; reconfigure the bridge's serial port to match",
                rate
            ),
        }
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Reset the socket and run the handshake again
async fn reestablish<S: TransportStream>(modem: &mut Modem<S>) -> Result<bool> {
    warn!("[MAIN] Connection lost, re-establishing session");
    modem.reset_session().await?;
    Ok(modem.establish_session().await? == SessionState::SessionEstablished)
}

/// Pull client: copy correction data from the caster to stdout
async fn relay_corrections<S: TransportStream>(modem: &mut Modem<S>) -> Result<ExitCode> {
    let mut stdout = tokio::io::stdout();
    let mut last_check = Instant::now();

    loop {
        let data = modem.data_channel()?.read_available(READ_CHUNK).await?;
        if !data.is_empty() {
            stdout.write_all(&data).await.context("writing to stdout")?;
            stdout.flush().await.context("flushing stdout")?;
            continue;
        }

        // Only query the status while the stream is quiet
        if last_check.elapsed() < STATUS_INTERVAL {
            continue;
        }
        last_check = Instant::now();
        let connected = modem.data_channel()?.check_connected().await?;
        if !connected && !reestablish(modem).await? {
            error!("[MAIN] Could not re-establish the session");
            return Ok(ExitCode::from(EXIT_HANDSHAKE_FAILED));
        }
    }
}

/// Push source: forward stdin to the caster
async fn publish_corrections<S: TransportStream>(modem: &mut Modem<S>) -> Result<ExitCode> {
    let (tx, mut rx) = mpsc::channel::<Bytes>(16);
    tokio::spawn(read_stdin(tx));

    let mut status = interval(STATUS_INTERVAL);
    status.tick().await;

    loop {
        tokio::select! {
            chunk = rx.recv() => {
                let Some(chunk) = chunk else {
                    info!("[MAIN] Input closed");
                    return Ok(ExitCode::SUCCESS);
                };
                if !modem.data_channel()?.send(&chunk).await? {
                    warn!("[MAIN] Dropped {} bytes", chunk.len());
                }
            }
            _ = status.tick() => {
                let connected = modem.data_channel()?.check_connected().await?;
                if !connected && !reestablish(modem).await? {
                    error!("[MAIN] Could not re-establish the session");
                    return Ok(ExitCode::from(EXIT_HANDSHAKE_FAILED));
                }
            }
        }
    }
}

async fn read_stdin(tx: mpsc::Sender<Bytes>) {
    let mut stdin = tokio::io::stdin();
    let mut buf = BytesMut::with_capacity(MAX_SEND_LEN);

    loop {
        buf.reserve(MAX_SEND_LEN);
        match stdin.read_buf(&mut buf).await {
            Ok(0) => return,
            Ok(_) => {
                if tx.send(buf.split().freeze()).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                error!("[MAIN] Failed to read stdin: {}", e);
                return;
            }
        }
    }
}
