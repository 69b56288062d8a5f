use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use env_logger::Builder;
use log::{LevelFilter, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;

use mnwifi_channel_sim::association::{AssociationController, DISCONNECTED_SNR, LinkShaper, LinkSideEffect, LogShaper, NetemShaper};
use mnwifi_channel_sim::common::load_scene;
use mnwifi_channel_sim::control::RuntimeConfig;
use mnwifi_channel_sim::simulation::types::SimulationEvent;
use mnwifi_channel_sim::simulation::{LoopSettings, SimulationLoop, spawn_simulation};
use mnwifi_channel_sim::time_driver;
use mnwifi_channel_sim::wmediumd::{self, ChannelBridge, DaemonConfig, DaemonProcess};

fn init_logging(filter: Option<&str>) {
    let mut builder = Builder::new();
    builder
        .filter_level(LevelFilter::Info)
        .filter(Some("mnwifi_channel_sim"), LevelFilter::Debug);
    if let Some(filter) = filter {
        builder.parse_filters(filter);
    }
    builder.init();
}

/// Channel daemon kept alive for the run.
struct Daemon {
    bridge: Arc<ChannelBridge>,
    process: Option<DaemonProcess>,
}

impl Daemon {
    fn close(self) {
        if self.process.is_some() {
            if let Err(e) = self.bridge.shutdown() {
                warn!("Channel daemon did not acknowledge shutdown: {}", e);
            }
        } else {
            for mac in self.bridge.registered() {
                if let Err(e) = self.bridge.unregister(mac) {
                    warn!("Failed to unregister {}: {}", mac, e);
                }
            }
        }
        // Dropping the process handle kills a daemon that is still running.
    }
}

fn run(scene_path: &str) -> anyhow::Result<()> {
    let config_path = RuntimeConfig::config_path_from_scene(scene_path);
    let config = RuntimeConfig::load_or_default(&config_path).map_err(anyhow::Error::msg)?;
    init_logging(config.log_filter.as_deref());

    info!("Starting up");
    time_driver::set_speed_percent(config.speed_percent);

    let scene = load_scene(scene_path)?;
    let mut world = scene.build_world()?;
    let propagation = scene.propagation_model()?;
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    // Ranges and tx powers are settled before the daemon sees the world.
    let mut setup = AssociationController::new(propagation.clone(), scene.association, LinkSideEffect::None);
    scene.apply_ranges(&mut world, &mut setup)?;

    let mut daemon = None;
    let side_effect = if config.daemon.enabled {
        let options = config.daemon.launch_options();
        let (bridge, process) = if config.daemon.attach {
            let bridge = Arc::new(ChannelBridge::connect_with_retry(
                &options.socket_path,
                options.request_timeout,
                options.connect_deadline,
                options.retry_interval,
            )?);
            wmediumd::register_world(&mut world, &bridge)?;
            (bridge, None)
        } else {
            let daemon_config = DaemonConfig::from_world(&world, scene.daemon_mode, &scene.propagation, DISCONNECTED_SNR);
            let (process, bridge) = wmediumd::launch(&daemon_config, &options).context("Failed to start channel daemon")?;
            wmediumd::adopt_world(&mut world, &bridge, &daemon_config)?;
            (bridge, Some(process))
        };
        info!("Channel daemon in {:?} mode at {:?}", scene.daemon_mode, options.socket_path);
        daemon = Some(Daemon {
            bridge: bridge.clone(),
            process,
        });
        LinkSideEffect::Daemon {
            bridge,
            mode: scene.daemon_mode,
        }
    } else if let Some(shaping) = &scene.shaping {
        let shaper: Box<dyn LinkShaper> = if config.netem { Box::new(NetemShaper::default()) } else { Box::new(LogShaper) };
        LinkSideEffect::Shaping {
            strategy: shaping.into(),
            shaper,
        }
    } else {
        LinkSideEffect::None
    };

    let controller = AssociationController::new(propagation, scene.association, side_effect);
    let mobility = scene.mobility_generator(&world, &mut rng)?;
    let controlled = scene.controlled_mobility(&world)?;
    let run_duration = config.run_duration_s.or_else(|| {
        // Scripted-only runs end with their last waypoint.
        if mobility.is_none() { scene.scripted_end_time() } else { None }
    });
    let sim = SimulationLoop::new(world, controller, mobility, controlled, rng);

    let handle = spawn_simulation(
        sim,
        LoopSettings {
            tick_interval: embassy_time::Duration::from_millis(config.tick_interval_ms),
            tick_seconds: config.tick_seconds,
            run_duration,
        },
    )?;

    loop {
        match handle.events.try_receive() {
            Ok(SimulationEvent::Stopped { tick }) => {
                info!("Simulation finished at tick {}", tick);
                break;
            }
            Ok(SimulationEvent::Alert(message)) => warn!("{}", message),
            Ok(SimulationEvent::Snapshot(snapshot)) => {
                log::debug!("Snapshot {}: {}", snapshot.tick, serde_json::to_string(&snapshot).unwrap_or_default());
            }
            Ok(SimulationEvent::Link(_)) => {}
            Err(_) => thread::sleep(Duration::from_millis(10)),
        }
    }

    if let Some(daemon) = daemon {
        daemon.close();
    }
    Ok(())
}

fn main() {
    let scene_path = std::env::args().nth(1).unwrap_or_else(|| "scene.json".to_string());
    if let Err(e) = run(&scene_path) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
