use intmap::IntMap;
use std::collections::{BTreeSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use crate::kernel::Sim;
use crate::shared::lock;
use crate::signal::SimObject;
use crate::sim_if::SimIf;
use crate::WbResult;

// IntMap specializes on u64 keys and doesn't actually need to calculate a hash.
// Edge waiters are keyed by signal handle, timer waiters by absolute time step.
pub(crate) struct TriggerTable {
    edges: IntMap<VecDeque<TrigShared>>,
    timers: IntMap<VecDeque<TrigShared>>,
    times: BTreeSet<u64>,
    read_write: VecDeque<TrigShared>,
    read_only: VecDeque<TrigShared>,
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum EdgeKind {
    Any,
    Rising,
    Falling,
}

#[derive(Debug, Clone)]
pub(crate) struct TrigShared {
    waker: Waker,
    fired: Arc<AtomicBool>,
    // for edges, so a waiter for the other direction can be kept registered
    edge_kind: EdgeKind,
}

impl TrigShared {
    fn fire(self) {
        self.fired.store(true, Ordering::Release);
        self.waker.wake();
    }
}

pub(crate) fn wake_all(list: VecDeque<TrigShared>) {
    for shared in list {
        shared.fire();
    }
}

impl TriggerTable {
    pub(crate) fn new() -> Self {
        TriggerTable {
            edges: IntMap::new(),
            timers: IntMap::new(),
            times: BTreeSet::new(),
            read_write: VecDeque::new(),
            read_only: VecDeque::new(),
        }
    }

    fn register(&mut self, kind: &TrigKind, now: u64, shared: TrigShared) {
        match *kind {
            TrigKind::ReadWrite => self.read_write.push_back(shared),
            TrigKind::ReadOnly => self.read_only.push_back(shared),
            TrigKind::Timer(steps) => {
                // key on absolute time, the time wheel hands back absolute times
                let abs_time = now + steps;
                if let Some(callbacks) = self.timers.get_mut(abs_time) {
                    callbacks.push_back(shared);
                } else {
                    let mut callbacks = VecDeque::new();
                    callbacks.push_back(shared);
                    self.timers.insert(abs_time, callbacks);
                    self.times.insert(abs_time);
                }
            }
            TrigKind::Edge(handle, _) => {
                if let Some(callbacks) = self.edges.get_mut(handle as u64) {
                    callbacks.push_back(shared);
                } else {
                    let mut callbacks = VecDeque::new();
                    callbacks.push_back(shared);
                    self.edges.insert(handle as u64, callbacks);
                }
            }
        }
    }

    pub(crate) fn next_time(&self) -> Option<u64> {
        self.times.iter().next().copied()
    }

    /// Removes the earliest timer slot and returns its time and waiters.
    pub(crate) fn pop_timers(&mut self) -> Option<(u64, VecDeque<TrigShared>)> {
        let time = self.next_time()?;
        self.times.remove(&time);
        let due = self.timers.remove(time).unwrap_or_default();
        Some((time, due))
    }

    /// Takes the waiters an edge of `edge` kind on `handle` releases. Waiters for the
    /// opposite direction stay registered.
    pub(crate) fn take_edge(&mut self, handle: usize, edge: EdgeKind) -> VecDeque<TrigShared> {
        let Some(mut callbacks) = self.edges.remove(handle as u64) else {
            return VecDeque::new();
        };
        let mut wake = VecDeque::new();
        let mut resched = VecDeque::new();
        for trig in callbacks.drain(..) {
            if trig.edge_kind == EdgeKind::Any || trig.edge_kind == edge {
                wake.push_back(trig);
            } else {
                resched.push_back(trig);
            }
        }
        if !resched.is_empty() {
            self.edges.insert(handle as u64, resched);
        }
        wake
    }

    pub(crate) fn take_read_write(&mut self) -> VecDeque<TrigShared> {
        std::mem::take(&mut self.read_write)
    }

    pub(crate) fn take_read_only(&mut self) -> VecDeque<TrigShared> {
        std::mem::take(&mut self.read_only)
    }

    /// Empties every table and hands back the wakers of the tasks that were parked.
    pub(crate) fn clear(&mut self) -> Vec<Waker> {
        let mut parked: Vec<Waker> = Vec::new();
        for (_, list) in self.edges.drain().chain(self.timers.drain()) {
            parked.extend(list.into_iter().map(|trig| trig.waker));
        }
        self.times.clear();
        for list in [self.take_read_write(), self.take_read_only()] {
            parked.extend(list.into_iter().map(|trig| trig.waker));
        }
        parked
    }

    pub(crate) fn has_read_write(&self) -> bool {
        !self.read_write.is_empty()
    }
}

#[derive(Clone, Debug)]
pub enum TrigKind {
    Edge(usize, EdgeKind),
    Timer(u64),
    ReadWrite,
    ReadOnly,
}

/// A one-shot simulation event. Awaiting it suspends the task until the kernel
/// reaches the event.
pub struct Trigger {
    sim: Sim,
    kind: TrigKind,
    fired: Option<Arc<AtomicBool>>,
}

impl Trigger {
    fn new(sim: &Sim, kind: TrigKind) -> Self {
        Trigger {
            sim: sim.clone(),
            kind,
            fired: None,
        }
    }
    pub fn timer(sim: &Sim, time: u64, unit: &str) -> WbResult<Self> {
        let steps = sim.get_sim_steps(time as f64, unit)?;
        Ok(Trigger::timer_steps(sim, steps))
    }
    pub fn timer_steps(sim: &Sim, steps: u64) -> Self {
        Trigger::new(sim, TrigKind::Timer(steps))
    }
    pub fn edge(signal: &SimObject) -> Self {
        Trigger::new(signal.sim(), TrigKind::Edge(signal.handle(), EdgeKind::Any))
    }
    pub fn rising_edge(signal: &SimObject) -> Self {
        Trigger::new(signal.sim(), TrigKind::Edge(signal.handle(), EdgeKind::Rising))
    }
    pub fn falling_edge(signal: &SimObject) -> Self {
        Trigger::new(signal.sim(), TrigKind::Edge(signal.handle(), EdgeKind::Falling))
    }
    /// Fires once the active region of the current time step has settled.
    pub fn read_write(sim: &Sim) -> Self {
        Trigger::new(sim, TrigKind::ReadWrite)
    }
    /// Fires at the end of the current time step; signals may not be written then.
    pub fn read_only(sim: &Sim) -> Self {
        Trigger::new(sim, TrigKind::ReadOnly)
    }
    pub fn kind(&self) -> &TrigKind {
        &self.kind
    }
}

impl Future for Trigger {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A trigger is registered once, on first poll. Later polls only check whether
        // the kernel has fired it.
        if let Some(fired) = &self.fired {
            return if fired.load(Ordering::Acquire) {
                Poll::Ready(())
            } else {
                Poll::Pending
            };
        }
        let fired = Arc::new(AtomicBool::new(false));
        let edge_kind = match self.kind {
            TrigKind::Edge(_, edge_kind) => edge_kind,
            _ => EdgeKind::Any,
        };
        let shared = TrigShared {
            waker: cx.waker().clone(),
            fired: fired.clone(),
            edge_kind,
        };
        let now = self.sim.get_sim_time_steps();
        lock(self.sim.triggers()).register(&self.kind, now, shared);
        self.fired = Some(fired);
        Poll::Pending
    }
}

impl std::fmt::Debug for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trigger").field("kind", &self.kind).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::task::noop_waker;

    fn shared(edge_kind: EdgeKind) -> (TrigShared, Arc<AtomicBool>) {
        let fired = Arc::new(AtomicBool::new(false));
        let trig = TrigShared {
            waker: noop_waker(),
            fired: fired.clone(),
            edge_kind,
        };
        (trig, fired)
    }

    #[test]
    fn rising_edge_keeps_falling_waiters_registered() {
        let mut table = TriggerTable::new();
        let (rise, _) = shared(EdgeKind::Rising);
        let (fall, _) = shared(EdgeKind::Falling);
        let (any, _) = shared(EdgeKind::Any);
        table.register(&TrigKind::Edge(3, EdgeKind::Rising), 0, rise);
        table.register(&TrigKind::Edge(3, EdgeKind::Falling), 0, fall);
        table.register(&TrigKind::Edge(3, EdgeKind::Any), 0, any);

        assert_eq!(table.take_edge(3, EdgeKind::Rising).len(), 2);
        let remaining = table.take_edge(3, EdgeKind::Falling);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].edge_kind, EdgeKind::Falling);
        assert!(table.take_edge(3, EdgeKind::Any).is_empty());
    }

    #[test]
    fn timers_pop_in_time_order() {
        let mut table = TriggerTable::new();
        let (late, _) = shared(EdgeKind::Any);
        let (early, _) = shared(EdgeKind::Any);
        let (early_too, _) = shared(EdgeKind::Any);
        table.register(&TrigKind::Timer(50), 100, late);
        table.register(&TrigKind::Timer(5), 100, early);
        table.register(&TrigKind::Timer(5), 100, early_too);

        let (time, due) = table.pop_timers().unwrap();
        assert_eq!(time, 105);
        assert_eq!(due.len(), 2);
        assert_eq!(table.pop_timers().unwrap().0, 150);
        assert!(table.pop_timers().is_none());
    }

    #[test]
    fn firing_marks_the_trigger() {
        let (trig, fired) = shared(EdgeKind::Any);
        let mut list = VecDeque::new();
        list.push_back(trig);
        wake_all(list);
        assert!(fired.load(Ordering::Acquire));
    }
}
