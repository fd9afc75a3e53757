use crate::animation;
use crate::clock::{Clock, MonotonicClock};
use crate::config::{ConfigError, SimulatorConfig};
use crate::scheduler::{Process, SchedulerStats, TickScheduler};
use crate::state::{Gear, VehicleState, WarningKind};
use crate::subscribers::{DeliveryStats, Subscriber, SubscriberError, SubscriberRegistry, SubscriptionId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SimulatorStats {
    pub start_count: u32,
    pub ticks_fired: u64,
    pub snapshots_published: u64,
    pub warning_pulses: u64,
}

/// Self-contained vehicle telemetry source.
///
/// Owns the vehicle state and seven animation processes (speed/gear, RPM,
/// warning pulse, engine temperature, odometer, tanks, battery), each on its
/// own cadence. Nothing runs in the background: the host drives time by
/// calling [`update`](Self::update) or [`advance_to`](Self::advance_to), and
/// every tick that comes due mutates the state and publishes a snapshot to
/// all subscribers before the next tick runs.
pub struct VehicleSimulator {
    config: SimulatorConfig,
    state: VehicleState,
    active: bool,

    clock: Box<dyn Clock>,
    scheduler: TickScheduler,
    subscribers: SubscriberRegistry,
    rng: StdRng,

    // Clock reading the speed cycle is anchored to
    speed_epoch_ms: u64,
    stats: SimulatorStats,
}

impl VehicleSimulator {
    pub fn new(config: SimulatorConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, MonotonicClock::new())
    }

    pub fn with_clock(config: SimulatorConfig, clock: impl Clock + 'static) -> Result<Self, ConfigError> {
        config.validate()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            config,
            state: VehicleState::new(),
            active: false,
            clock: Box::new(clock),
            scheduler: TickScheduler::new(),
            subscribers: SubscriberRegistry::new(),
            rng,
            speed_epoch_ms: 0,
            stats: SimulatorStats::default(),
        })
    }

    /// Turns the engine on and launches every animation process. Each
    /// process runs its first tick immediately. No-op while already running.
    pub fn start(&mut self) {
        if self.active {
            return;
        }

        let now = self.clock.now_ms();
        info!("Starting vehicle simulation at t={}ms", now);

        self.active = true;
        self.state.engine_running = true;
        self.speed_epoch_ms = now;
        self.stats.start_count += 1;

        for process in Process::LOOPS {
            self.schedule(process, now, now);
        }
        self.advance_to(now);

        self.publish();
    }

    /// Cancels every pending tick and puts the vehicle back at rest. Tanks,
    /// odometer and the service battery keep their values. No-op while
    /// stopped.
    pub fn stop(&mut self) {
        if !self.active {
            return;
        }

        info!("Stopping vehicle simulation");

        self.active = false;
        self.state.engine_running = false;
        self.scheduler.clear_all();

        self.reset_to_idle();
        self.state.engine_temp = animation::cool_down(self.state.engine_temp, &self.config.temperature);

        self.publish();
    }

    pub fn toggle_engine(&mut self) {
        if self.active {
            self.stop();
        } else {
            self.start();
        }
    }

    pub fn is_running(&self) -> bool {
        self.active
    }

    /// Owned copy of the current state.
    pub fn get_state(&self) -> VehicleState {
        self.state.clone()
    }

    /// Registers a closure called with a snapshot after every mutation.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&VehicleState) -> Result<(), SubscriberError> + Send + 'static,
    {
        self.subscribers.subscribe(Box::new(callback))
    }

    pub fn add_subscriber(&mut self, subscriber: impl Subscriber + 'static) -> SubscriptionId {
        self.subscribers.subscribe(Box::new(subscriber))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    /// Flips a light. Unknown ids leave the state untouched and notify
    /// nobody. Returns whether the light was toggled.
    pub fn toggle_light(&mut self, light_id: &str) -> bool {
        if !self.state.lights.toggle(light_id) {
            debug!("Ignoring toggle for unknown light '{}'", light_id);
            return false;
        }
        self.publish();
        true
    }

    /// Door counterpart of [`toggle_light`](Self::toggle_light).
    pub fn toggle_door(&mut self, door_id: &str) -> bool {
        if !self.state.doors.toggle(door_id) {
            debug!("Ignoring toggle for unknown door '{}'", door_id);
            return false;
        }
        self.publish();
        true
    }

    /// Fires every tick due at the current clock reading.
    pub fn update(&mut self) -> usize {
        let now = self.clock.now_ms();
        self.advance_to(now)
    }

    /// Fires, in time order, every tick due at or before `now_ms`. Each tick
    /// sees its own scheduled time as the clock reading. Returns the number
    /// of ticks fired.
    pub fn advance_to(&mut self, now_ms: u64) -> usize {
        let mut fired = 0;
        while let Some(tick) = self.scheduler.pop_due(now_ms) {
            self.run_tick(tick.process, tick.execution_time);
            fired += 1;
        }
        self.stats.ticks_fired += fired as u64;
        fired
    }

    pub fn next_tick_due(&self) -> Option<u64> {
        self.scheduler.next_due()
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn get_stats(&self) -> &SimulatorStats {
        &self.stats
    }

    pub fn get_scheduler_stats(&self) -> &SchedulerStats {
        self.scheduler.get_stats()
    }

    pub fn get_delivery_stats(&self) -> &DeliveryStats {
        self.subscribers.get_stats()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn run_tick(&mut self, process: Process, at: u64) {
        match process {
            Process::Speed => {
                self.tick_speed(at);
                self.schedule(Process::Speed, at.saturating_add(self.config.frame_period_ms), at);
            }
            Process::Rpm => {
                self.tick_rpm();
                self.schedule(Process::Rpm, at.saturating_add(self.config.rpm.period_ms), at);
            }
            Process::WarningPulse => {
                self.tick_warning_pulse(at);
                self.schedule(Process::WarningPulse, at.saturating_add(self.config.warning.period_ms), at);
            }
            Process::WarningClear(kind) => {
                self.state.warnings.set(kind, false);
            }
            Process::Temperature => {
                self.tick_temperature();
                self.schedule(Process::Temperature, at.saturating_add(self.config.frame_period_ms), at);
            }
            Process::Odometer => {
                self.tick_odometer();
                self.schedule(Process::Odometer, at.saturating_add(self.config.odometer.period_ms), at);
            }
            Process::Tanks => {
                self.tick_tanks();
                self.schedule(Process::Tanks, at.saturating_add(self.config.tanks.period_ms), at);
            }
            Process::Battery => {
                self.tick_battery();
                self.schedule(Process::Battery, at.saturating_add(self.config.battery.period_ms), at);
            }
        }

        self.publish();
    }

    fn tick_speed(&mut self, at: u64) {
        let elapsed = at.saturating_sub(self.speed_epoch_ms);
        let speed = animation::speed_at(elapsed, &self.config.speed);

        self.state.speed = speed;
        self.state.gear = Gear::from_speed(speed);

        if speed > 0.0 {
            self.state.fuel_level = (self.state.fuel_level - self.config.fuel.consumption_per_tick).max(0.0);
        }
    }

    fn tick_rpm(&mut self) {
        let jitter = if self.state.speed == 0.0 {
            0.0
        } else {
            let half_width = self.config.rpm.jitter;
            self.rng.gen_range(-half_width..=half_width)
        };

        self.state.rpm = animation::rpm_for_speed(
            self.state.speed,
            jitter,
            self.config.speed.max_speed,
            &self.config.rpm,
        );
    }

    fn tick_warning_pulse(&mut self, at: u64) {
        let kind = WarningKind::ALL[self.rng.gen_range(0..WarningKind::ALL.len())];
        debug!("Pulsing warning light {}", kind.as_str());

        self.state.warnings.set(kind, true);
        self.stats.warning_pulses += 1;
        self.schedule(Process::WarningClear(kind), at.saturating_add(self.config.warning.active_ms), at);
    }

    fn tick_temperature(&mut self) {
        let config = &self.config.temperature;
        let target = animation::engine_temp_target(self.state.speed, self.config.speed.max_speed, config);

        self.state.engine_temp = animation::approach(self.state.engine_temp, target, config.smoothing);
        self.state.warnings.engine_temp = self.state.engine_temp > config.warning_threshold;
    }

    fn tick_odometer(&mut self) {
        if self.state.speed > 0.0 {
            self.state.total_km += self.config.odometer.increment_km;
            self.state.trip_km += self.config.odometer.increment_km;
        }
    }

    fn tick_tanks(&mut self) {
        let tanks = &self.config.tanks;
        self.state.water_tank = (self.state.water_tank - tanks.water_consumption).max(0.0);
        self.state.grey_water = (self.state.grey_water + tanks.grey_water_fill).min(100.0);
        self.state.black_water = (self.state.black_water + tanks.black_water_fill).min(100.0);
    }

    // Also where the fuel warning is recomputed, though fuel burns in the
    // speed tick.
    fn tick_battery(&mut self) {
        let battery = &self.config.battery;

        self.state.battery_main = animation::battery_step(self.state.battery_main, self.state.engine_running, battery);
        self.state.battery_service = self.rng.gen_range(battery.service_min..=battery.service_max);

        self.state.warnings.battery_low = self.state.battery_main < battery.low_threshold;
        self.state.warnings.fuel_low = self.state.fuel_level < self.config.fuel.low_threshold;
    }

    fn reset_to_idle(&mut self) {
        self.state.speed = 0.0;
        self.state.rpm = 0.0;
        self.state.gear = Gear::Neutral;
        self.state.battery_main = self.config.battery.off_voltage;
        self.state.warnings.clear_all();
    }

    fn schedule(&mut self, process: Process, execution_time: u64, current_time: u64) {
        if let Err(e) = self.scheduler.schedule(process, execution_time, current_time) {
            warn!("{}", e);
        }
    }

    fn publish(&mut self) {
        self.stats.snapshots_published += 1;
        self.subscribers.publish(&self.state);
    }
}

impl core::fmt::Debug for VehicleSimulator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VehicleSimulator")
            .field("active", &self.active)
            .field("state", &self.state)
            .field("scheduler", &self.scheduler)
            .field("subscribers", &self.subscribers)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn simulator() -> (VehicleSimulator, ManualClock) {
        let clock = ManualClock::new(0);
        let sim = VehicleSimulator::with_clock(SimulatorConfig::new().with_seed(42), clock.clone()).unwrap();
        (sim, clock)
    }

    #[test]
    fn test_initial_state() {
        let (sim, _) = simulator();
        let state = sim.get_state();

        assert!(!sim.is_running());
        assert!(!state.engine_running);
        assert_eq!(state.gear, Gear::Neutral);
        assert_eq!(state.engine_temp, 22.0);
        assert_eq!(sim.next_tick_due(), None);
    }

    #[test]
    fn test_start_runs_first_tick_of_each_process() {
        let (mut sim, _) = simulator();
        sim.start();

        let state = sim.get_state();
        assert!(state.engine_running);
        assert_eq!(state.speed, 0.0);
        assert_eq!(state.rpm, 800.0);
        assert_eq!(sim.get_stats().warning_pulses, 1);
        assert_eq!(sim.get_stats().ticks_fired, 7);
        assert!((13.0..=13.4).contains(&state.battery_service));
        assert_eq!(sim.next_tick_due(), Some(16));
    }

    #[test]
    fn test_stop_cancels_pending_ticks() {
        let (mut sim, _) = simulator();
        sim.start();
        sim.advance_to(5000);
        sim.stop();

        assert_eq!(sim.next_tick_due(), None);
        let before = sim.get_state();
        assert_eq!(sim.advance_to(60_000), 0);
        assert_eq!(sim.get_state(), before);
    }

    #[test]
    fn test_stop_cools_engine_one_step() {
        let (mut sim, _) = simulator();
        sim.start();
        sim.advance_to(10_000);
        let hot = sim.get_state().engine_temp;
        assert!(hot > 22.5);

        sim.stop();
        assert!((sim.get_state().engine_temp - (hot - 0.5)).abs() < 1e-9);
    }

    #[test]
    fn test_engine_temp_warning_derived_from_temperature() {
        let mut config = SimulatorConfig::new().with_seed(1);
        config.temperature.warning_threshold = 30.0;
        let mut sim = VehicleSimulator::with_clock(config, ManualClock::new(0)).unwrap();

        sim.start();
        sim.advance_to(3000);
        let state = sim.get_state();
        assert!(state.engine_temp > 30.0);
        assert!(state.warnings.engine_temp);
    }

    #[test]
    fn test_fuel_low_recomputed_on_battery_tick() {
        let mut config = SimulatorConfig::new().with_seed(3);
        config.fuel.low_threshold = 74.99;
        let mut sim = VehicleSimulator::with_clock(config, ManualClock::new(0)).unwrap();
        sim.start();

        // Fuel drops below the threshold during the first second of driving
        // but the flag only follows on the next battery tick.
        sim.advance_to(499);
        let state = sim.get_state();
        assert!(state.fuel_level < 74.99);
        assert!(!state.warnings.fuel_low);

        sim.advance_to(500);
        assert!(sim.get_state().warnings.fuel_low);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = SimulatorConfig::new();
        config.frame_period_ms = 0;
        assert!(VehicleSimulator::new(config).is_err());

        let mut config = SimulatorConfig::new();
        config.odometer.period_ms = u64::MAX;
        assert!(VehicleSimulator::new(config).is_err());

        let mut config = SimulatorConfig::new();
        config.warning.period_ms = 100;
        assert!(VehicleSimulator::new(config).is_err());
    }

    #[test]
    fn test_fast_warning_pulse_keeps_every_loop_scheduled() {
        let mut config = SimulatorConfig::new().with_seed(5);
        config.warning.period_ms = 300;
        config.warning.active_ms = 200;
        let mut sim = VehicleSimulator::with_clock(config, ManualClock::new(0)).unwrap();

        sim.start();
        sim.advance_to(9000);

        // Seven loops plus at most one pending warning clear
        let pending = sim.get_scheduler_stats().currently_scheduled;
        assert!((7..=8).contains(&pending), "pending {}", pending);
        assert_eq!(sim.get_stats().warning_pulses, 31);
    }

    #[test]
    fn test_late_clock_reading_does_not_overflow() {
        let start = u64::MAX - 10;
        let mut sim = VehicleSimulator::with_clock(SimulatorConfig::new().with_seed(8), ManualClock::new(start)).unwrap();

        sim.start();
        assert_eq!(sim.next_tick_due(), Some(u64::MAX));
        assert_eq!(sim.get_stats().ticks_fired, 7);
    }
}
