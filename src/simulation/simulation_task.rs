//! Background task running the simulation loop.
//!
//! The task waits on either a command or the next tick deadline. Commands are
//! applied between ticks; ticks are paced by `embassy_time` on the
//! speed-scaled simulation clock. Stopping is cooperative: the stop flag is
//! polled once per wake-up, and a `Stop` command ends the loop as well.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use embassy_executor::{Executor, Spawner};
use embassy_futures::select::{Either, select};
use embassy_time::{Duration, Instant, Timer};

use crate::error::Result;

use super::simulation_loop::{CommandEffect, SimulationLoop, TickReport};
use super::types::{
    SimulationCommand, SimulationCommandQueue, SimulationCommandReceiver, SimulationCommandSender, SimulationEvent, SimulationEventQueue,
    SimulationEventReceiver, SimulationEventSender,
};

/// Pacing of the loop.
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    /// Simulation-clock time between ticks.
    pub tick_interval: Duration,
    /// Simulated seconds each tick advances the world.
    pub tick_seconds: f64,
    /// Stop once this many simulated seconds have elapsed.
    pub run_duration: Option<f64>,
}

fn publish(event_tx: &SimulationEventSender, event: SimulationEvent) {
    if event_tx.try_send(event).is_err() {
        log::warn!("Simulation event queue full, dropping event");
    }
}

fn publish_tick(event_tx: &SimulationEventSender, sim: &SimulationLoop, report: TickReport) {
    for event in report.events {
        publish(event_tx, SimulationEvent::Link(event));
    }
    for failure in report.failures {
        publish(event_tx, SimulationEvent::Alert(failure.to_string()));
    }
    publish(event_tx, SimulationEvent::Snapshot(sim.snapshot()));
}

/// Simulation task: owns the loop for the life of the run.
#[embassy_executor::task]
pub async fn simulation_task(
    mut sim: SimulationLoop,
    settings: LoopSettings,
    command_rx: SimulationCommandReceiver,
    event_tx: SimulationEventSender,
    stop: &'static AtomicBool,
) {
    log::info!(
        "Simulation started: tick every {} ms, {} s per tick, mobility {}",
        settings.tick_interval.as_millis(),
        settings.tick_seconds,
        if sim.has_mobility() { "on" } else { "off" }
    );

    match sim.start() {
        Ok(report) => publish_tick(&event_tx, &sim, report),
        Err(e) => {
            log::error!("Initial association pass failed: {}", e);
            publish(&event_tx, SimulationEvent::Alert(format!("Initial association pass failed: {}", e)));
            stop.store(true, Ordering::SeqCst);
        }
    }

    let mut next_tick = Instant::now() + settings.tick_interval;
    while !stop.load(Ordering::SeqCst) {
        match select(command_rx.receive(), Timer::at(next_tick)).await {
            Either::First(command) => match sim.handle_command(command) {
                Ok(CommandEffect::Stop) => break,
                Ok(CommandEffect::Snapshot(snapshot)) => publish(&event_tx, SimulationEvent::Snapshot(snapshot)),
                Ok(CommandEffect::None) => {}
                Err(e) => {
                    log::warn!("Command rejected: {}", e);
                    publish(&event_tx, SimulationEvent::Alert(format!("Command rejected: {}", e)));
                }
            },
            Either::Second(()) => {
                next_tick += settings.tick_interval;
                match sim.tick(settings.tick_seconds) {
                    Ok(report) => publish_tick(&event_tx, &sim, report),
                    Err(e) => {
                        log::error!("Tick {} failed: {}", sim.tick_count(), e);
                        publish(&event_tx, SimulationEvent::Alert(format!("Tick {} failed: {}", sim.tick_count(), e)));
                        break;
                    }
                }
                if settings.run_duration.is_some_and(|d| sim.elapsed() >= d) {
                    log::info!("Run duration of {:.1} s reached", sim.elapsed());
                    break;
                }
            }
        }
    }

    stop.store(true, Ordering::SeqCst);
    log::info!("Simulation stopped after {} ticks", sim.tick_count());
    // The final event must not be lost to a full queue.
    event_tx.send(SimulationEvent::Stopped { tick: sim.tick_count() }).await;
}

fn embassy_init(spawner: Spawner, sim: SimulationLoop, settings: LoopSettings, command_rx: SimulationCommandReceiver, event_tx: SimulationEventSender, stop: &'static AtomicBool) {
    let _ = spawner.spawn(simulation_task(sim, settings, command_rx, event_tx, stop));
}

/// Caller side of a running simulation.
pub struct SimulationHandle {
    pub commands: SimulationCommandSender,
    pub events: SimulationEventReceiver,
    stop: &'static AtomicBool,
}

impl SimulationHandle {
    /// Ask the loop to stop at its next wake-up.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        let _ = self.commands.try_send(SimulationCommand::Stop);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Run `sim` on a dedicated executor thread and return the channels to talk
/// to it.
pub fn spawn_simulation(sim: SimulationLoop, settings: LoopSettings) -> Result<SimulationHandle> {
    // The channels and the executor must be 'static for the task.
    let command_queue: &'static SimulationCommandQueue = Box::leak(Box::new(SimulationCommandQueue::new()));
    let event_queue: &'static SimulationEventQueue = Box::leak(Box::new(SimulationEventQueue::new()));
    let stop: &'static AtomicBool = Box::leak(Box::new(AtomicBool::new(false)));

    let command_rx = command_queue.receiver();
    let event_tx = event_queue.sender();

    thread::Builder::new().name("simulation-executor".to_string()).spawn(move || {
        let executor: &'static mut Executor = Box::leak(Box::new(Executor::new()));
        executor.run(|spawner| embassy_init(spawner, sim, settings, command_rx, event_tx, stop));
    })?;

    Ok(SimulationHandle {
        commands: command_queue.sender(),
        events: event_queue.receiver(),
        stop,
    })
}
