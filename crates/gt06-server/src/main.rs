//! GT06 device gateway binary.
//!
//! # Usage
//!
//! ```bash
//! gt06-server --bind 0.0.0.0:5023
//! ```

use clap::Parser;
use gt06_server::{
    GatewayConfig, GatewayRuntime, MemorySessionStore, SystemEnv, TracingTelemetryEmitter,
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// GT06 vehicle-tracker TCP device gateway
#[derive(Parser, Debug)]
#[command(name = "gt06-server")]
#[command(about = "GT06 vehicle-tracker TCP device gateway")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(long, default_value = "0.0.0.0:5023")]
    bind: String,

    /// Session TTL and connection idle threshold, seconds
    #[arg(long, default_value_t = 600)]
    idle_timeout_seconds: u64,

    /// TTL sweeper period, seconds
    #[arg(long, default_value_t = 60)]
    cleanup_interval_seconds: u64,

    /// Hard cap on a single frame's total wire size
    #[arg(long, default_value_t = 1024)]
    max_frame_length: usize,

    /// Reject frames whose CRC mismatches
    #[arg(long, default_value_t = false)]
    strict_crc: bool,

    /// Reject frames whose stop bits fall outside the accepted set
    #[arg(long, default_value_t = false)]
    strict_stop_bits: bool,

    /// Soft cap on concurrently accepted connections
    #[arg(long, default_value_t = 10_000)]
    max_connections: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("gt06 device gateway starting");

    let config = GatewayConfig {
        bind_address: args.bind,
        idle_timeout_seconds: args.idle_timeout_seconds,
        cleanup_interval_seconds: args.cleanup_interval_seconds,
        max_frame_length: args.max_frame_length,
        strict_crc: args.strict_crc,
        strict_stop_bits: args.strict_stop_bits,
        max_connections: args.max_connections,
    };

    let env = SystemEnv::new();
    let wall_clock_env = env.clone();
    let runtime = GatewayRuntime::new(
        config,
        MemorySessionStore::new(args.idle_timeout_seconds),
        env,
        TracingTelemetryEmitter,
        move || wall_clock_env.wall_clock_secs(),
    );

    runtime.run().await?;

    Ok(())
}
