//! # Simulated actuator
//!
//! `SimActuator` models a single actuator with a bounded staging buffer, a
//! bounded execution buffer and a simple kinematic model. Its clock only
//! moves when `advance_buffer` is called, each call moving one point from
//! staging into execution and then advancing execution by `step_ms`. Driven
//! by a stream engine the simulated time therefore tracks wall time, and
//! driven by a test it is fully deterministic.
//!
//! While disabled the actuator follows an open-loop velocity demand set via
//! its `SimHandle`, which is how a recording session "drives" it.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use log::trace;
use serde::Deserialize;

use super::{
    BufferStatus, DeviceError, DeviceMode, PointPeriodMode, Sample, SensorSource, TrajDevice,
    TrajPoint,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Volts applied per unit of velocity demand, used to fake a voltage reading.
const VOLTS_PER_VELOCITY: f64 = 0.01;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters of a simulated actuator.
#[derive(Debug, Clone, Deserialize)]
pub struct SimParams {
    /// Capacity of the staging buffer
    pub staging_capacity: usize,

    /// Capacity of the execution buffer
    pub execution_capacity: usize,

    /// Simulated time that passes on each `advance_buffer` call.
    ///
    /// Units: milliseconds
    pub step_ms: f64,
}

/// A simulated actuator.
///
/// Cloning gives another handle to the same actuator, so one clone can be
/// bound to a stream engine while another is sampled by a recorder.
#[derive(Clone)]
pub struct SimActuator {
    name: String,
    staging_capacity: usize,
    state: Arc<Mutex<SimState>>,
}

/// Inspection and control handle onto a `SimActuator`.
#[derive(Clone)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

/// Internal state of the simulated actuator.
#[derive(Debug)]
pub struct SimState {
    staging: VecDeque<TrajPoint>,
    staging_capacity: usize,

    execution: VecDeque<TrajPoint>,
    execution_capacity: usize,

    step_ms: f64,

    /// The current output mode
    pub mode: DeviceMode,

    /// Every mode the actuator has been set to, in order
    pub mode_history: Vec<DeviceMode>,

    /// The point timing mode, `None` until configured
    pub period_mode: Option<PointPeriodMode>,

    active: Option<TrajPoint>,
    active_elapsed_ms: f64,

    /// Simulated sensor values
    pub sample: Sample,

    /// Open-loop velocity followed while disabled
    pub demand_velocity: f64,

    /// Number of times the buffers have been cleared
    pub clear_count: usize,

    /// Total number of points accepted into the staging buffer
    pub pushed_count: usize,

    /// Largest staging occupancy ever reached
    pub max_staging_count: usize,

    /// Number of points executed with the zero position flag set
    pub zero_pos_count: usize,

    /// Number of times the execution buffer ran dry while enabled
    pub underrun_count: usize,

    /// Every point that has been made active, in order
    pub executed: Vec<TrajPoint>,

    /// Fail the next N device calls with a comms error
    pub inject_faults: usize,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimActuator {
    pub fn new(name: &str, params: &SimParams) -> Self {
        let state = SimState {
            staging: VecDeque::with_capacity(params.staging_capacity),
            staging_capacity: params.staging_capacity,
            execution: VecDeque::with_capacity(params.execution_capacity),
            execution_capacity: params.execution_capacity,
            step_ms: params.step_ms,
            mode: DeviceMode::Disabled,
            mode_history: Vec::new(),
            period_mode: None,
            active: None,
            active_elapsed_ms: 0.0,
            sample: Sample::default(),
            demand_velocity: 0.0,
            clear_count: 0,
            pushed_count: 0,
            max_staging_count: 0,
            zero_pos_count: 0,
            underrun_count: 0,
            executed: Vec::new(),
            inject_faults: 0,
        };

        Self {
            name: name.to_string(),
            staging_capacity: params.staging_capacity,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Get an inspection handle onto this actuator.
    pub fn handle(&self) -> SimHandle {
        SimHandle {
            state: self.state.clone(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<SimState>, DeviceError> {
        let mut state = self.state.lock().map_err(|_| DeviceError::LockPoisoned)?;

        if state.inject_faults > 0 {
            state.inject_faults -= 1;
            return Err(DeviceError::CommsError(
                self.name.clone(),
                "injected fault".into(),
            ));
        }

        Ok(state)
    }
}

impl TrajDevice for SimActuator {
    fn name(&self) -> &str {
        &self.name
    }

    fn staging_capacity(&self) -> usize {
        self.staging_capacity
    }

    fn push_point(&mut self, point: &TrajPoint) -> Result<BufferStatus, DeviceError> {
        let mut state = self.lock()?;

        if state.staging.len() >= state.staging_capacity {
            return Err(DeviceError::BufferFull(
                self.name.clone(),
                state.staging_capacity,
            ));
        }

        state.staging.push_back(*point);
        state.pushed_count += 1;
        state.max_staging_count = state.max_staging_count.max(state.staging.len());

        Ok(state.status())
    }

    fn get_status(&mut self) -> Result<BufferStatus, DeviceError> {
        Ok(self.lock()?.status())
    }

    fn set_mode(&mut self, mode: DeviceMode) -> Result<(), DeviceError> {
        let mut state = self.lock()?;
        trace!("{} mode {:?} -> {:?}", self.name, state.mode, mode);
        state.mode = mode;
        state.mode_history.push(mode);
        Ok(())
    }

    fn clear_buffer(&mut self) -> Result<(), DeviceError> {
        let mut state = self.lock()?;
        state.staging.clear();
        state.execution.clear();
        state.active = None;
        state.active_elapsed_ms = 0.0;
        state.clear_count += 1;
        Ok(())
    }

    fn advance_buffer(&mut self) -> Result<(), DeviceError> {
        let mut state = self.lock()?;

        if state.execution.len() < state.execution_capacity {
            if let Some(p) = state.staging.pop_front() {
                state.execution.push_back(p);
            }
        }

        let step_ms = state.step_ms;
        state.step(step_ms);

        Ok(())
    }

    fn configure_point_period(&mut self, mode: PointPeriodMode) -> Result<(), DeviceError> {
        self.lock()?.period_mode = Some(mode);
        Ok(())
    }
}

impl SensorSource for SimActuator {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_sample(&mut self) -> Result<Sample, DeviceError> {
        Ok(self.lock()?.sample)
    }
}

impl SimHandle {
    /// Lock the actuator state for inspection.
    ///
    /// # Panics
    /// - If the state lock is poisoned.
    pub fn state(&self) -> MutexGuard<SimState> {
        match self.state.lock() {
            Ok(s) => s,
            Err(_) => panic!("Simulated actuator state is poisoned"),
        }
    }

    /// Set the open-loop velocity the actuator follows while disabled.
    pub fn set_demand_velocity(&self, velocity: f64) {
        self.state().demand_velocity = velocity;
    }

    /// Advance the simulated clock without moving any buffered points.
    pub fn step(&self, ms: f64) {
        self.state().step(ms);
    }

    /// Overwrite the sensor values.
    pub fn set_sample(&self, sample: Sample) {
        self.state().sample = sample;
    }
}

impl SimState {
    fn status(&self) -> BufferStatus {
        BufferStatus {
            staging_count: self.staging.len(),
            execution_count: self.execution.len(),
            active_point_valid: self.active.is_some(),
            active_is_last: self.active.map(|p| p.is_last).unwrap_or(false),
        }
    }

    pub fn status_snapshot(&self) -> BufferStatus {
        self.status()
    }

    /// Duration the active point should be held for under the current
    /// period mode.
    fn active_duration_ms(&self, point: &TrajPoint) -> f64 {
        match self.period_mode {
            Some(PointPeriodMode::Global(d)) => d.as_ms() as f64,
            Some(PointPeriodMode::PerPoint) | None => point.duration_ms as f64,
        }
    }

    fn step(&mut self, ms: f64) {
        match self.mode {
            DeviceMode::Disabled => {
                let v = self.demand_velocity;
                // Velocity is per 100 ms
                self.sample.position += v * ms / 100.0;
                self.sample.velocity = v;
                self.sample.voltage = v * VOLTS_PER_VELOCITY;
            }
            DeviceMode::Hold => (),
            DeviceMode::Enabled => {
                let expired = match self.active {
                    Some(ref p) => {
                        !p.is_last && self.active_elapsed_ms >= self.active_duration_ms(p)
                    }
                    None => true,
                };

                if expired {
                    match self.execution.pop_front() {
                        Some(p) => {
                            if p.is_first {
                                self.zero_pos_count += 1;
                                self.sample.position = 0.0;
                            }
                            self.active = Some(p);
                            self.active_elapsed_ms = 0.0;
                            self.executed.push(p);
                        }
                        None => self.underrun_count += 1,
                    }
                }

                self.active_elapsed_ms += ms;

                if let Some(p) = self.active {
                    self.sample.position = p.position;
                    self.sample.velocity = p.feed_forward;
                    self.sample.voltage = p.feed_forward * VOLTS_PER_VELOCITY;
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::eqpt::PointDuration;

    fn params() -> SimParams {
        SimParams {
            staging_capacity: 4,
            execution_capacity: 8,
            step_ms: 5.0,
        }
    }

    fn point(position: f64, is_first: bool, is_last: bool) -> TrajPoint {
        TrajPoint {
            position,
            feed_forward: 1.0,
            duration_ms: 10,
            gain_slot: 0,
            is_first,
            is_last,
        }
    }

    #[test]
    fn test_staging_capacity_enforced() {
        let mut act = SimActuator::new("act", &params());

        for i in 0..4 {
            let s = act.push_point(&point(i as f64, i == 0, false)).unwrap();
            assert_eq!(s.staging_count, i + 1);
        }

        match act.push_point(&point(4.0, false, false)) {
            Err(DeviceError::BufferFull(_, 4)) => (),
            r => panic!("Expected BufferFull, got {:?}", r),
        }
        assert_eq!(act.handle().state().max_staging_count, 4);
    }

    #[test]
    fn test_executes_to_last_point() {
        let mut act = SimActuator::new("act", &params());
        act.configure_point_period(PointPeriodMode::PerPoint).unwrap();

        act.push_point(&point(1.0, true, false)).unwrap();
        act.push_point(&point(2.0, false, false)).unwrap();
        act.push_point(&point(3.0, false, true)).unwrap();

        // Disabled: points move into execution but nothing runs
        for _ in 0..3 {
            act.advance_buffer().unwrap();
        }
        let s = act.get_status().unwrap();
        assert_eq!(s.staging_count, 0);
        assert_eq!(s.execution_count, 3);
        assert!(!s.active_point_valid);

        act.set_mode(DeviceMode::Enabled).unwrap();
        for _ in 0..20 {
            act.advance_buffer().unwrap();
        }

        let s = act.get_status().unwrap();
        assert!(s.active_point_valid);
        assert!(s.active_is_last);

        let h = act.handle();
        let state = h.state();
        assert_eq!(state.zero_pos_count, 1);
        assert_eq!(state.sample.position, 3.0);
        let positions: Vec<f64> = state.executed.iter().map(|p| p.position).collect();
        assert_eq!(positions, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_global_period_mode() {
        let mut act = SimActuator::new("act", &params());
        act.configure_point_period(PointPeriodMode::Global(PointDuration::Ms20))
            .unwrap();
        act.push_point(&point(1.0, true, false)).unwrap();
        act.push_point(&point(2.0, false, true)).unwrap();
        act.advance_buffer().unwrap();
        act.advance_buffer().unwrap();

        act.set_mode(DeviceMode::Enabled).unwrap();

        // 10 ms per-point duration is ignored, the global 20 ms applies
        let h = act.handle();
        h.step(5.0);
        h.step(5.0);
        h.step(5.0);
        assert_eq!(h.state().sample.position, 1.0);
        h.step(5.0);
        h.step(5.0);
        assert_eq!(h.state().sample.position, 2.0);
    }

    #[test]
    fn test_open_loop_drive() {
        let act = SimActuator::new("act", &params());
        let h = act.handle();

        h.set_demand_velocity(10.0);
        h.step(100.0);

        let s = h.state().sample;
        assert_eq!(s.position, 10.0);
        assert_eq!(s.velocity, 10.0);
    }

    #[test]
    fn test_injected_fault() {
        let mut act = SimActuator::new("act", &params());
        act.handle().state().inject_faults = 1;

        assert!(act.get_status().is_err());
        assert!(act.get_status().is_ok());
    }
}
