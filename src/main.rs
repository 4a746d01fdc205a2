//! Haptic Bridge Daemon
//!
//! Drives the legacy per-frame haptic API against an event-driven device
//! transport. Transport notifications are handled on their own task; host
//! registrations and submissions run on the frame loop.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tracing::{info, warn, error, Level};
use tracing_subscriber::FmtSubscriber;

use hapticbridged::{
    lifecycle::DeviceLifecycle,
    position::{to_modern, LegacyPosition},
    sim::{SimulatedHost, SimulatedTransport},
    Config, DevicePosition, DotPoint, HapticBridge, HapticPoint, HapticValues, Ownership,
    SystemClock, TransportEvent,
};

/// Host frame interval (~60Hz)
const FRAME_INTERVAL_MS: u64 = 16;

/// Motors driven per demo frame
const DEMO_MOTORS: u16 = 20;

/// Networked point id used by the demo
const DEMO_POINT_ID: u64 = 1;

/// Haptic Bridge Daemon - legacy haptic API over an event-driven transport
#[derive(Parser, Debug)]
#[command(name = "hapticbridged")]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (defaults to the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// List legacy position codes and exit
    #[arg(long)]
    list_positions: bool,

    /// Stop after this many seconds (0 runs until Ctrl-C)
    #[arg(long, default_value_t = 0)]
    demo_seconds: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Haptic Bridge Daemon starting...");

    if args.list_positions {
        list_positions();
        return Ok(());
    }

    let loaded = match &args.config {
        Some(path) => Config::load(path),
        None => Config::load_default(),
    };
    let config = match loaded {
        Ok(config) => {
            info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            warn!("Failed to load config, using defaults: {}", e);
            Config::default()
        }
    };

    let (transport, events) = SimulatedTransport::with_events();
    let transport = Arc::new(transport);
    let mut bridge = HapticBridge::new(config, transport.clone(), Arc::new(SystemClock::new()));

    if bridge.start() {
        info!("Haptic bridge connected");
    } else {
        warn!("Haptic bridge running without a transport");
    }

    // Notifications arrive off the frame loop
    let lifecycle = bridge.lifecycle();
    let notification_handle = tokio::spawn(async move {
        run_notification_loop(events, lifecycle).await
    });

    let plug_transport = transport.clone();
    let hot_plug_handle = tokio::spawn(async move {
        run_hot_plug_demo(plug_transport).await
    });

    info!("Haptic Bridge Daemon ready");

    let deadline = async {
        if args.demo_seconds > 0 {
            sleep(Duration::from_secs(args.demo_seconds)).await;
        } else {
            std::future::pending::<()>().await
        }
    };

    let mut host = SimulatedHost::new();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, exiting...");
        }
        _ = deadline => {
            info!(seconds = args.demo_seconds, "Demo finished");
        }
        _ = run_frame_loop(&mut bridge, &mut host) => {}
        result = notification_handle => {
            if let Err(e) = result {
                error!("Notification task panicked: {:?}", e);
            }
        }
    }

    hot_plug_handle.abort();
    bridge.shutdown();

    let lifecycle = bridge.lifecycle();
    for position in DevicePosition::ALL {
        if let Some(status) = lifecycle.device_status(position) {
            info!(
                position = %position,
                connected = status.connected,
                last_changed_at_ms = status.last_changed_at_ms,
                registered = lifecycle.is_registered(position),
                "Final device status"
            );
        }
    }

    let stats = bridge.stats();
    info!(
        forwarded = stats.forwarded,
        rate_limited = stats.rate_limited,
        idle_suppressed = stats.idle_suppressed,
        device_inactive = stats.device_inactive,
        registered = host.init_calls().len(),
        "Haptic bridge stopped"
    );

    Ok(())
}

/// Print every legacy position code and where it lands
fn list_positions() {
    println!("Legacy position codes:\n");

    let legacy = [
        LegacyPosition::All,
        LegacyPosition::Left,
        LegacyPosition::Right,
        LegacyPosition::Vest,
        LegacyPosition::Head,
        LegacyPosition::Racket,
        LegacyPosition::HandL,
        LegacyPosition::HandR,
        LegacyPosition::FootL,
        LegacyPosition::FootR,
        LegacyPosition::ForearmL,
        LegacyPosition::ForearmR,
        LegacyPosition::VestFront,
        LegacyPosition::VestBack,
        LegacyPosition::GloveLeft,
        LegacyPosition::GloveRight,
    ];

    for position in legacy {
        println!("{:>4}  {:<11} -> {}", position.to_raw(), format!("{:?}", position), to_modern(position));
    }

    println!("\nUnknown codes map to {}.", to_modern(LegacyPosition::FALLBACK));
}

/// Apply transport notifications until the transport closes its channel
async fn run_notification_loop(
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    lifecycle: Arc<DeviceLifecycle>,
) {
    while let Some(event) = events.recv().await {
        lifecycle.handle_event(event);
    }
    info!("Transport notification stream ended");
}

/// Plug and unplug simulated devices so the lifecycle has work to do
async fn run_hot_plug_demo(transport: Arc<SimulatedTransport>) {
    transport.plug(DevicePosition::Vest);
    sleep(Duration::from_secs(1)).await;

    loop {
        transport.plug(DevicePosition::Head);
        sleep(Duration::from_secs(3)).await;
        transport.unplug(DevicePosition::Head);
        sleep(Duration::from_secs(2)).await;
    }
}

/// Host main loop: pump queued work, route points, submit frames
async fn run_frame_loop(bridge: &mut HapticBridge, host: &mut SimulatedHost) {
    let mut ticker = interval(Duration::from_millis(FRAME_INTERVAL_MS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut point = HapticPoint::new(
        DEMO_POINT_ID,
        DevicePosition::Vest,
        Ownership::RemoteUser("demo-peer".to_string()),
    );
    let mut frame: u64 = 0;

    loop {
        ticker.tick().await;
        frame += 1;

        bridge.pump(host);

        // A remote peer pulses the vest point twice a second
        let pulse = if (frame / 15) % 2 == 0 { 0.6 } else { 0.0 };
        point.replica = HapticValues::new(pulse, 0.0, 0.0, pulse / 2.0);
        bridge.route_point(&mut point, false);

        let values = bridge.sample_point(DEMO_POINT_ID, HapticValues::ZERO);
        let dots = frame_dots(values);

        bridge.submit("demo-vest", LegacyPosition::VestFront, &dots, FRAME_INTERVAL_MS as u32);
        if bridge.is_active(LegacyPosition::Head) {
            bridge.submit("demo-head", LegacyPosition::Head, &dots, FRAME_INTERVAL_MS as u32);
        }
    }
}

/// One frame of motor intensities from a sampled point
fn frame_dots(values: HapticValues) -> Vec<DotPoint> {
    let activation = values.activation();
    (0..DEMO_MOTORS)
        .map(|index| DotPoint::from_activation(index, activation))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_default() {
        let args = Args::parse_from(["hapticbridged"]);
        assert!(args.config.is_none());
        assert!(!args.verbose);
        assert!(!args.list_positions);
        assert_eq!(args.demo_seconds, 0);
    }

    #[test]
    fn test_args_verbose() {
        let args = Args::parse_from(["hapticbridged", "--verbose"]);
        assert!(args.verbose);
    }

    #[test]
    fn test_args_config_and_demo() {
        let args = Args::parse_from([
            "hapticbridged",
            "--config",
            "/tmp/bridge.json",
            "--demo-seconds",
            "5",
        ]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/bridge.json")));
        assert_eq!(args.demo_seconds, 5);
    }

    #[test]
    fn test_args_list_positions() {
        let args = Args::parse_from(["hapticbridged", "--list-positions"]);
        assert!(args.list_positions);
    }

    #[test]
    fn test_frame_dots() {
        let on = frame_dots(HapticValues::new(0.5, 0.0, 0.0, 0.0));
        assert_eq!(on.len(), DEMO_MOTORS as usize);
        assert!(on.iter().all(DotPoint::is_active));

        let off = frame_dots(HapticValues::ZERO);
        assert!(!off.iter().any(DotPoint::is_active));
    }

    #[tokio::test]
    async fn test_notification_loop_ends_with_stream() {
        let (transport, events) = SimulatedTransport::with_events();
        let transport = Arc::new(transport);
        let mut bridge = HapticBridge::new(
            Config::default(),
            transport.clone(),
            Arc::new(SystemClock::new()),
        );
        assert!(bridge.start());

        let handle = tokio::spawn(run_notification_loop(events, bridge.lifecycle()));
        transport.plug(DevicePosition::Vest);
        transport.close_events();
        handle.await.unwrap();

        let mut host = SimulatedHost::new();
        assert_eq!(bridge.pump(&mut host), 1);
        assert!(bridge.lifecycle().is_registered(DevicePosition::Vest));
    }
}
