use intmap::IntMap;
use num_format::{Locale, ToFormattedString};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::config::{width_mask, SimConfig};
use crate::executor::{self, JoinHandle, ReadyQueue};
use crate::shared::lock;
use crate::signal::{ObjectKind, SimObject};
use crate::sim_if::SimIf;
use crate::trigger::{wake_all, EdgeKind, TriggerTable};
use crate::{WbError, WbResult};

/// Scheduling region the kernel is currently executing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Between time steps. Writes are staged for the next step.
    Idle,
    /// Tasks woken by timers and edges run. Writes commit at the end of the region.
    Active,
    /// Tasks see everything settled in this step and may still drive signals.
    ReadWrite,
    /// Final values of the step. Writes are rejected.
    ReadOnly,
}

struct ObjectEntry {
    name: String,
    kind: ObjectKind,
    value: u64,
}

struct Change {
    handle: usize,
    old: u64,
    new: u64,
}

impl Change {
    fn edge(&self) -> EdgeKind {
        match (self.old & 1, self.new & 1) {
            (0, 1) => EdgeKind::Rising,
            (1, 0) => EdgeKind::Falling,
            _ => EdgeKind::Any,
        }
    }
}

struct KernelState {
    time: u64,
    phase: Phase,
    objects: IntMap<ObjectEntry>,
    names: HashMap<String, usize>,
    next_handle: usize,
    staged: Vec<(usize, u64)>,
    steps: u64,
    deltas: u64,
}

impl KernelState {
    fn insert(&mut self, name: &str, kind: ObjectKind) -> usize {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.objects.insert(
            handle as u64,
            ObjectEntry {
                name: name.to_string(),
                kind,
                value: 0,
            },
        );
        self.names.insert(name.to_string(), handle);
        handle
    }

    fn entry(&self, handle: usize) -> WbResult<&ObjectEntry> {
        self.objects
            .get(handle as u64)
            .ok_or_else(|| WbError::UnknownObject(format!("<handle {}>", handle)))
    }
}

/// In-process event-driven signal kernel: a table of named signals, staged writes
/// committed in delta cycles, and a time wheel of pending timers.
pub struct Kernel {
    config: SimConfig,
    state: Mutex<KernelState>,
    triggers: Mutex<TriggerTable>,
    ready: ReadyQueue,
    started: OnceCell<Instant>,
}

impl Kernel {
    fn new(config: SimConfig) -> Self {
        let mut state = KernelState {
            time: 0,
            phase: Phase::Idle,
            objects: IntMap::new(),
            names: HashMap::new(),
            next_handle: 0,
            staged: Vec::new(),
            steps: 0,
            deltas: 0,
        };
        state.insert(&config.root, ObjectKind::Scope);
        Kernel {
            config,
            state: Mutex::new(state),
            triggers: Mutex::new(TriggerTable::new()),
            ready: executor::new_ready_queue(),
            started: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        lock(&self.state).phase
    }

    pub(crate) fn ready_queue(&self) -> &ReadyQueue {
        &self.ready
    }

    pub(crate) fn triggers(&self) -> &Mutex<TriggerTable> {
        &self.triggers
    }

    /// Registers `full_name`, creating any missing parent scopes. Declaring an existing
    /// scope again returns it; declaring an existing signal again is an error.
    pub(crate) fn declare(&self, full_name: &str, kind: ObjectKind) -> WbResult<usize> {
        if let ObjectKind::Signal(width) = kind {
            if !(1..=64).contains(&width) {
                return Err(WbError::InvalidWidth {
                    what: "signal",
                    width,
                });
            }
        }
        let mut state = lock(&self.state);
        if let Some(&handle) = state.names.get(full_name) {
            return match (state.entry(handle)?.kind, kind) {
                (ObjectKind::Scope, ObjectKind::Scope) => Ok(handle),
                _ => Err(WbError::DuplicateSignal(full_name.to_string())),
            };
        }
        let mut prefix = String::new();
        let mut parts = full_name.split('.').peekable();
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                break;
            }
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(part);
            match state.names.get(prefix.as_str()).copied() {
                Some(handle) => {
                    if state.entry(handle)?.kind != ObjectKind::Scope {
                        return Err(WbError::NotASignal(prefix));
                    }
                }
                None => {
                    state.insert(&prefix, ObjectKind::Scope);
                }
            }
        }
        Ok(state.insert(full_name, kind))
    }

    fn has_pending_work(&self) -> bool {
        executor::has_ready_tasks(&self.ready)
            || !lock(&self.state).staged.is_empty()
            || lock(&self.triggers).has_read_write()
    }

    fn next_time(&self) -> Option<u64> {
        lock(&self.triggers).next_time()
    }

    fn set_phase(&self, phase: Phase) {
        lock(&self.state).phase = phase;
    }

    fn count_delta(&self, deltas: &mut u32) -> WbResult<()> {
        *deltas += 1;
        let mut state = lock(&self.state);
        state.deltas += 1;
        if *deltas > self.config.max_deltas {
            return Err(WbError::DeltaLimit { time: state.time });
        }
        Ok(())
    }

    /// Applies the staged writes; the last write to a signal wins. Returns the signals
    /// whose value actually changed.
    fn commit(&self) -> Vec<Change> {
        let mut state = lock(&self.state);
        let staged = std::mem::take(&mut state.staged);
        let mut changes: Vec<Change> = Vec::new();
        for (handle, value) in staged {
            let Some(entry) = state.objects.get_mut(handle as u64) else {
                continue;
            };
            if entry.value == value {
                continue;
            }
            if !changes.iter().any(|c| c.handle == handle) {
                changes.push(Change {
                    handle,
                    old: entry.value,
                    new: value,
                });
            }
            entry.value = value;
        }
        for change in changes.iter_mut() {
            if let Some(entry) = state.objects.get(change.handle as u64) {
                change.new = entry.value;
            }
        }
        changes.retain(|c| c.old != c.new);
        changes
    }

    fn react_edges(&self, changes: &[Change]) {
        for change in changes {
            let woken = lock(&self.triggers).take_edge(change.handle, change.edge());
            wake_all(woken);
        }
    }

    /// Runs the current time step to completion: active region and delta cycles,
    /// ReadWrite region, then the ReadOnly region.
    fn settle(&self) -> WbResult<()> {
        let mut deltas = 0;
        loop {
            self.set_phase(Phase::Active);
            executor::run_once(&self.ready);
            let changes = self.commit();
            if !changes.is_empty() {
                self.count_delta(&mut deltas)?;
                self.react_edges(&changes);
                continue;
            }
            let read_write = lock(&self.triggers).take_read_write();
            if read_write.is_empty() {
                break;
            }
            self.count_delta(&mut deltas)?;
            self.set_phase(Phase::ReadWrite);
            wake_all(read_write);
            executor::run_once(&self.ready);
        }
        self.set_phase(Phase::ReadOnly);
        let read_only = lock(&self.triggers).take_read_only();
        wake_all(read_only);
        executor::run_once(&self.ready);
        self.set_phase(Phase::Idle);
        Ok(())
    }

    /// Executes one time step: pending work at the current time if there is any,
    /// otherwise the next timer slot. Returns `false` once nothing is left to do.
    pub fn step(&self) -> WbResult<bool> {
        self.started.get_or_init(Instant::now);
        if !self.has_pending_work() {
            let next = lock(&self.triggers).pop_timers();
            let Some((time, due)) = next else {
                return Ok(false);
            };
            lock(&self.state).time = time;
            wake_all(due);
        }
        lock(&self.state).steps += 1;
        tracing::trace!(time = self.get_sim_time_steps(), "time step");
        self.settle()?;
        Ok(true)
    }

    fn run_to<T>(&self, handle: &mut JoinHandle<T>, deadline: Option<u64>) -> WbResult<T> {
        loop {
            if let Some(output) = handle.try_take()? {
                return Ok(output);
            }
            if !self.has_pending_work() {
                match (self.next_time(), deadline) {
                    (None, _) => return Err(WbError::SimIdle(handle.name().to_string())),
                    (Some(next), Some(deadline)) if next > deadline => {
                        lock(&self.state).time = deadline;
                        return Err(WbError::WatchdogExpired {
                            task: handle.name().to_string(),
                            time: deadline,
                        });
                    }
                    _ => {}
                }
            }
            self.step()?;
        }
    }

    /// Runs until the task behind `handle` finishes and returns its output.
    pub fn run_until<T>(&self, handle: &mut JoinHandle<T>) -> WbResult<T> {
        self.run_to(handle, None)
    }

    /// Like [`run_until`](Self::run_until), but gives up once simulated time would pass
    /// `time` from now.
    pub fn run_until_timeout<T>(
        &self,
        handle: &mut JoinHandle<T>,
        time: u64,
        unit: &str,
    ) -> WbResult<T> {
        let deadline = self.get_sim_time_steps() + self.get_sim_steps(time as f64, unit)?;
        self.run_to(handle, Some(deadline))
    }

    /// Advances simulated time by `time`, running everything scheduled up to then.
    pub fn run_for(&self, time: u64, unit: &str) -> WbResult<()> {
        let deadline = self.get_sim_time_steps() + self.get_sim_steps(time as f64, unit)?;
        loop {
            if !self.has_pending_work() {
                match self.next_time() {
                    Some(next) if next <= deadline => {}
                    _ => {
                        lock(&self.state).time = deadline;
                        return Ok(());
                    }
                }
            }
            self.step()?;
        }
    }

    /// Ends the simulation: cancels every task still waiting on it, then logs and
    /// returns statistics for the run.
    pub fn finish(&self) -> SimSummary {
        // parked futures hold `Sim` clones, the kernel is only freed once they are gone
        let parked = lock(&self.triggers).clear();
        for waker in parked {
            waker.wake();
        }
        executor::cancel_all(&self.ready);

        let real_secs = self
            .started
            .get()
            .map_or(0.0, |start| start.elapsed().as_secs_f64());
        let (steps, deltas) = {
            let state = lock(&self.state);
            (state.steps, state.deltas)
        };
        let summary = SimSummary {
            sim_time_ns: self.get_sim_time("ns").unwrap_or(0.0),
            real_secs,
            steps,
            deltas,
        };
        self.log("TOTAL SIMULATION");
        self.log(&format!("Simulation time: {} ns", summary.sim_time_ns));
        self.log(&format!("Real time: {:.3} s", summary.real_secs));
        self.log(&format!("Simulation speed: {:.3} ns/s", summary.speed()));
        self.log(&format!(
            "Time steps: {}, delta cycles: {}",
            steps.to_formatted_string(&Locale::en),
            deltas.to_formatted_string(&Locale::en)
        ));
        summary
    }
}

impl SimIf for Kernel {
    fn get_handle_by_name(&self, name: &str) -> WbResult<usize> {
        lock(&self.state)
            .names
            .get(name)
            .copied()
            .ok_or_else(|| WbError::UnknownObject(name.to_string()))
    }
    fn get_full_name(&self, handle: usize) -> WbResult<String> {
        Ok(lock(&self.state).entry(handle)?.name.clone())
    }
    fn get_kind(&self, handle: usize) -> WbResult<ObjectKind> {
        Ok(lock(&self.state).entry(handle)?.kind)
    }
    fn get_value(&self, handle: usize) -> WbResult<u64> {
        let state = lock(&self.state);
        let entry = state.entry(handle)?;
        match entry.kind {
            ObjectKind::Signal(_) => Ok(entry.value),
            ObjectKind::Scope => Err(WbError::NotASignal(entry.name.clone())),
        }
    }
    fn set_value(&self, handle: usize, value: u64) -> WbResult<()> {
        let mut state = lock(&self.state);
        let entry = state.entry(handle)?;
        let width = match entry.kind {
            ObjectKind::Signal(width) => width,
            ObjectKind::Scope => return Err(WbError::NotASignal(entry.name.clone())),
        };
        if state.phase == Phase::ReadOnly {
            return Err(WbError::WriteInReadOnly(entry.name.clone()));
        }
        // wider values are truncated, like an HDL assignment
        state.staged.push((handle, value & width_mask(width)));
        Ok(())
    }
    fn get_sim_time_steps(&self) -> u64 {
        lock(&self.state).time
    }
    fn get_sim_precision(&self) -> i8 {
        self.config.precision
    }
    fn log(&self, msg: &str) {
        let t = self.get_sim_time("ns").unwrap_or(0.0);
        let int = t.floor() as u64;
        let mut frac_str = format!("{:.3}", t % 1.0);
        frac_str.remove(0);
        tracing::info!(
            target: "wbbfm::sim",
            "{}{}ns {}",
            int.to_formatted_string(&Locale::en),
            frac_str,
            msg
        );
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimSummary {
    pub sim_time_ns: f64,
    pub real_secs: f64,
    pub steps: u64,
    pub deltas: u64,
}

impl SimSummary {
    /// Simulated nanoseconds per wall clock second.
    pub fn speed(&self) -> f64 {
        if self.real_secs > 0.0 {
            self.sim_time_ns / self.real_secs
        } else {
            0.0
        }
    }
}

/// Cheap, cloneable handle to a simulation. Models, signals and triggers all hold one.
#[derive(Clone)]
pub struct Sim(Arc<Kernel>);

impl Sim {
    pub fn new(config: SimConfig) -> Self {
        Sim(Arc::new(Kernel::new(config)))
    }

    pub fn root(&self) -> SimObject {
        SimObject::new(self, 0, ObjectKind::Scope)
    }

    /// Looks up any object by its full hierarchical name.
    pub fn object(&self, full_name: &str) -> WbResult<SimObject> {
        SimObject::from_name(self, full_name)
    }
}

impl Default for Sim {
    fn default() -> Self {
        Sim::new(SimConfig::default())
    }
}

impl Deref for Sim {
    type Target = Kernel;

    fn deref(&self) -> &Kernel {
        &self.0
    }
}

impl std::fmt::Debug for Sim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sim")
            .field("time", &self.get_sim_time_steps())
            .field("phase", &self.phase())
            .finish()
    }
}
