//! Speed-scaled time driver for `embassy_time`.
//!
//! Simulation time advances at `speed` percent of wall time, so tick pacing
//! (`Timer::after(tick_interval)`) can run a scenario faster or slower than
//! real time. Timers wait in a deadline queue served by one background thread.

use core::task::Waker;
use embassy_time_driver::{Driver, TICK_HZ, time_driver_impl};
use std::collections::BTreeMap;
use std::sync::{Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::{Duration, Instant};

/// Q32.32 fixed point: `1 << 32` is a speed of 100 %.
const SCALE_ONE: u64 = 1 << 32;
pub const MIN_SPEED_PERCENT: u32 = 1;
pub const MAX_SPEED_PERCENT: u32 = 10_000;
/// Upper bound on one scheduler wait, so speed changes apply promptly.
const WAIT_SLICE: Duration = Duration::from_millis(20);

/// Linear map between wall time and simulation ticks.
#[derive(Debug, Clone, Copy)]
struct Mapping {
    real_origin: Instant,
    sim_origin: u64,
    scale: u64,
    percent: u32,
}

impl Mapping {
    fn new(real_origin: Instant) -> Self {
        Self {
            real_origin,
            sim_origin: 0,
            scale: SCALE_ONE,
            percent: 100,
        }
    }

    fn to_sim(&self, real: Instant) -> u64 {
        let real_ticks = real.saturating_duration_since(self.real_origin).as_nanos() * TICK_HZ as u128 / 1_000_000_000;
        let sim_ticks = real_ticks * self.scale as u128 / SCALE_ONE as u128;
        self.sim_origin.saturating_add(sim_ticks.min(u64::MAX as u128) as u64)
    }

    /// Wall instant at which `sim` is reached. Ticks before the origin are
    /// already due.
    fn to_real(&self, sim: u64) -> Instant {
        let Some(sim_ticks) = sim.checked_sub(self.sim_origin) else {
            return self.real_origin;
        };
        let real_ticks = sim_ticks as u128 * SCALE_ONE as u128 / self.scale as u128;
        let nanos = real_ticks * 1_000_000_000 / TICK_HZ as u128;
        self.real_origin + Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
    }

    /// Change speed without a jump: the current instant maps to the same
    /// simulation tick before and after.
    fn rebase(&mut self, now: Instant, percent: u32) {
        self.sim_origin = self.to_sim(now);
        self.real_origin = now;
        self.scale = (percent as u128 * SCALE_ONE as u128 / 100) as u64;
        self.percent = percent;
    }
}

struct SimClock {
    mapping: Mutex<Mapping>,
    timers: Mutex<BTreeMap<u64, Vec<Waker>>>,
    wakeup: Condvar,
    scheduler: OnceLock<()>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn clock() -> &'static SimClock {
    static CLOCK: OnceLock<SimClock> = OnceLock::new();
    CLOCK.get_or_init(|| SimClock {
        mapping: Mutex::new(Mapping::new(Instant::now())),
        timers: Mutex::new(BTreeMap::new()),
        wakeup: Condvar::new(),
        scheduler: OnceLock::new(),
    })
}

impl SimClock {
    fn now(&self) -> u64 {
        lock(&self.mapping).to_sim(Instant::now())
    }

    fn ensure_scheduler(&'static self) {
        self.scheduler.get_or_init(|| {
            if let Err(e) = std::thread::Builder::new().name("sim-time-scheduler".into()).spawn(move || self.serve()) {
                log::error!("Failed to start time scheduler thread: {}", e);
            }
        });
    }

    fn serve(&self) {
        loop {
            // Never hold the timer queue while taking the mapping lock.
            let next = {
                let mut timers = lock(&self.timers);
                while timers.is_empty() {
                    timers = self.wakeup.wait(timers).unwrap_or_else(PoisonError::into_inner);
                }
                match timers.keys().next() {
                    Some(&at) => at,
                    None => continue,
                }
            };

            let due_at = lock(&self.mapping).to_real(next);
            let now = Instant::now();
            if due_at > now {
                let timers = lock(&self.timers);
                let _ = self.wakeup.wait_timeout(timers, (due_at - now).min(WAIT_SLICE));
                continue;
            }

            let horizon = self.now().max(next).saturating_add(1);
            let ready: Vec<Waker> = {
                let mut timers = lock(&self.timers);
                let later = timers.split_off(&horizon);
                std::mem::replace(&mut *timers, later).into_values().flatten().collect()
            };
            for waker in ready {
                waker.wake();
            }
        }
    }
}

struct SimTimeDriver;

impl Driver for SimTimeDriver {
    fn now(&self) -> u64 {
        clock().now()
    }

    fn schedule_wake(&self, at: u64, waker: &Waker) {
        let c = clock();
        c.ensure_scheduler();
        lock(&c.timers).entry(at).or_default().push(waker.clone());
        c.wakeup.notify_all();
    }
}

time_driver_impl!(static DRIVER: SimTimeDriver = SimTimeDriver);

/// Set the simulation speed in percent of wall time, clamped to
/// `MIN_SPEED_PERCENT..=MAX_SPEED_PERCENT`.
pub fn set_speed_percent(percent: u32) {
    let percent = percent.clamp(MIN_SPEED_PERCENT, MAX_SPEED_PERCENT);
    let c = clock();
    {
        let mut mapping = lock(&c.mapping);
        if mapping.percent == percent {
            return;
        }
        mapping.rebase(Instant::now(), percent);
    }
    log::info!("Simulation speed set to {}%", percent);
    c.wakeup.notify_all();
}

pub fn speed_percent() -> u32 {
    lock(&clock().mapping).percent
}
