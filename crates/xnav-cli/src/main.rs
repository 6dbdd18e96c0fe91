//! `xnav-monitor` – bench monitor for the XNav client.
//!
//! Runs a simulated vision device and a robot-side [`XNav`] client on one
//! in-process bus, then drives a fixed-period control loop the way robot code
//! would:
//!
//! 1. Loads `~/.xnav/config.toml`, writing defaults on first run.
//! 2. Publishes a frame from the simulated scene every cycle.
//! 3. Reads the mirrored state, aims the turret at the primary tag, and
//!    prints a report every `report_every` cycles.
//! 4. Intercepts **Ctrl-C** to stop the loop and tear the client down.

mod config;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use xnav_client::{XNav, init_tracing};
use xnav_middleware::LocalTableBus;
use xnav_sim::{DeviceInputs, SimDevice, SimScene};

fn main() {
    let _telemetry = init_tracing("xnav-monitor");

    print_banner();

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping monitor …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the monitor must be killed to stop");
    }

    // ── Configuration vault ───────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => write_default_config(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };

    if let Err(e) = run(&cfg, &shutdown) {
        println!("{}: {}", "Monitor error".red(), e);
        std::process::exit(1);
    }
    println!("{}", "  ✓ Monitor stopped.".green());
}

// ─────────────────────────────────────────────────────────────────────────────
// Control loop
// ─────────────────────────────────────────────────────────────────────────────

fn run(cfg: &config::Config, shutdown: &AtomicBool) -> Result<(), String> {
    let bus = Arc::new(LocalTableBus::default());
    let mut device = SimDevice::attach(bus.clone(), &cfg.client.table_name);
    let scene = build_scene(cfg);
    device.publish_status("starting").map_err(|e| e.to_string())?;

    let mut vision = XNav::with_config(bus, cfg.client.clone());
    let callback_hits = Arc::new(AtomicU64::new(0));
    let hits = callback_hits.clone();
    vision.on_new_targets(move |_| {
        hits.fetch_add(1, Ordering::Relaxed);
    });
    vision.init().map_err(|e| e.to_string())?;
    let mut events = vision.target_events();
    vision.set_turret_enabled(true);

    device.publish_status("running").map_err(|e| e.to_string())?;
    info!(
        table = %cfg.client.table_name,
        period_ms = cfg.loop_period_ms,
        "monitor loop started"
    );

    let period = Duration::from_millis(cfg.loop_period_ms.max(1));
    let report_every = cfg.report_every.max(1);
    let mut batches = 0usize;
    let mut tick = 0u64;

    while !shutdown.load(Ordering::SeqCst) {
        let started = Instant::now();

        device
            .publish_frame(&scene.frame_at(tick))
            .map_err(|e| e.to_string())?;

        batches += events.drain().len();
        if let Some(primary) = vision.primary_target_checked() {
            vision.set_turret_angle(primary.tx);
        }
        let inputs = device.read_inputs();

        if tick % report_every == 0 {
            print_report(
                &vision,
                &inputs,
                batches,
                callback_hits.load(Ordering::Relaxed),
            );
        }

        tick += 1;
        if let Some(rest) = period.checked_sub(started.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    info!(ticks = tick, batches, "monitor loop stopped");
    Ok(())
}

fn build_scene(cfg: &config::Config) -> SimScene {
    let mut scene = SimScene::new()
        .with_rates(1000.0 / cfg.loop_period_ms.max(1) as f64, 18.0)
        .with_field_pose(2.0, 4.0, 180.0);
    for (i, id) in cfg.sim_tags.iter().enumerate() {
        scene = scene.with_tag(*id, 1.5 + i as f64);
    }
    // Let the farthest tag drop out now and then so churn shows up.
    if let Some(last) = cfg.sim_tags.last().filter(|_| cfg.sim_tags.len() > 1) {
        scene = scene.with_flicker(*last, 75);
    }
    if let Some(first) = cfg.sim_tags.first() {
        scene = scene.with_offset_on(*first);
    }
    scene
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_report(vision: &XNav, inputs: &DeviceInputs, batches: usize, callbacks: u64) {
    let status = vision.status();
    let link = if status.nt_connected {
        "connected".green()
    } else {
        "disconnected".red()
    };
    println!(
        "\n  {} {}  {:.0} fps  {:.1} ms  {} target(s)",
        status.status.bold(),
        link,
        status.fps,
        status.latency_ms,
        status.num_targets
    );

    for t in vision.all_targets() {
        println!(
            "    tag {:>3}  tx {:>7.2}°  dist {:>5.2} m  yaw {:>7.2}°",
            t.id, t.tx, t.distance, t.yaw
        );
    }

    let pose = vision.robot_pose();
    if pose.valid {
        println!(
            "    pose  x {:.2}  y {:.2}  yaw {:.1}°",
            pose.x, pose.y, pose.yaw_deg
        );
    } else {
        println!("    pose  {}", "unavailable".dimmed());
    }

    let offset = vision.offset_point();
    if offset.valid {
        println!(
            "    offset  tag {}  {:.2} m  tx {:.2}°",
            offset.tag_id, offset.direct_distance, offset.tx
        );
    }

    println!(
        "    turret {:.2}° ({})  batches {}  callbacks {}",
        inputs.turret_angle,
        if inputs.turret_enabled { "on" } else { "off" },
        batches,
        callbacks
    );
}

fn write_default_config() -> config::Config {
    let cfg = config::Config::default();
    match config::save(&cfg) {
        Ok(()) => println!(
            "  {} Default config written to {}",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    let mut cfg = cfg;
    config::apply_env_overrides(&mut cfg);
    cfg
}

fn print_banner() {
    println!();
    println!(
        "  {} {}",
        "XNav Monitor".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Simulated vision device and robot client on a local bus");
    println!();
}
