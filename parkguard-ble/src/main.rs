//! parkguard - verifying gateway for BLE parking sensors

use std::time::Duration;

use btleplug::api::Central;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use parkguard_gateway::{
    EventSink, Gateway, GatewayConfig, JsonLinesSink, TracingSink, create_master_key,
    load_master_key, parkguard_home,
};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "parkguard")]
#[command(about = "Verifying gateway for BLE parking sensors")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify manufacturer-data broadcasts
    Listen {
        #[command(flatten)]
        output: Output,
    },
    /// Connect to a sensor and verify its notifications
    Connect {
        /// Device name or address, defaults to the configured device name
        #[arg(short, long)]
        target: Option<String>,
        #[command(flatten)]
        output: Output,
    },
    /// Print raw advertisements without verifying them
    Dump {
        /// Only show this hardware address
        #[arg(short, long)]
        target: Option<String>,
        /// Scan duration in seconds
        #[arg(short, long, default_value = "10")]
        duration: u64,
    },
    /// Generate a new master key in PARKGUARD_HOME
    CreateKey,
}

#[derive(clap::Args)]
struct Output {
    /// Print accepted events as JSON lines on stdout
    #[arg(long)]
    json: bool,
    /// With --json, also print rejections
    #[arg(long, requires = "json")]
    rejections: bool,
}

impl Output {
    fn sink(&self) -> Box<dyn EventSink> {
        if self.json {
            Box::new(JsonLinesSink::new(std::io::stdout()).with_rejections(self.rejections))
        } else {
            Box::new(TracingSink)
        }
    }
}

fn setup_logging(verbosity: &Verbosity<InfoLevel>) {
    let filter = EnvFilter::builder()
        .with_default_directive(verbosity.tracing_level_filter().into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    setup_logging(&cli.verbose);

    let home = parkguard_home()?;

    match cli.command {
        Commands::CreateKey => {
            let path = create_master_key(&home)?;
            println!("Created master key at {}", path.display());
            println!("Provision the same key on every sensor.");
        }
        Commands::Dump { target, duration } => {
            let adapter = parkguard_ble::get_adapter().await?;
            parkguard_ble::dump::dump(&adapter, target.as_deref(), Duration::from_secs(duration))
                .await?;
        }
        Commands::Listen { output } => run(&home, Mode::Broadcast, output).await?,
        Commands::Connect { target, output } => run(&home, Mode::Connect(target), output).await?,
    }

    Ok(())
}

enum Mode {
    Broadcast,
    /// Optional target overriding the configured device name
    Connect(Option<String>),
}

/// Start the pipeline and one receiver, until ctrl-c or the receiver fails
async fn run(
    home: &std::path::Path,
    mode: Mode,
    output: Output,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = GatewayConfig::load_or_create(home)?;
    let master_key = load_master_key(home)?;
    let adapter = parkguard_ble::get_adapter().await?;

    let gateway = Gateway::new(master_key, config.codec());
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let consumer = tokio::spawn(parkguard_ble::drain(
        gateway,
        rx,
        output.sink(),
        config.idle_retention(),
    ));

    let receiver = async {
        match &mode {
            Mode::Connect(target) => {
                let target = target.as_deref().unwrap_or(&config.device_name);
                parkguard_ble::listen_notifications(&adapter, &config, target, tx).await
            }
            Mode::Broadcast => parkguard_ble::listen_broadcasts(&adapter, &config, tx).await,
        }
    };

    let result = tokio::select! {
        result = receiver => result,
        _ = tokio::signal::ctrl_c() => {
            info!("stopping");
            Ok(())
        }
    };

    let _ = adapter.stop_scan().await;
    consumer.abort();
    result?;
    Ok(())
}
