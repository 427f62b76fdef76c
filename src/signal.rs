use crate::kernel::Sim;
use crate::sim_if::SimIf;
use crate::trigger::Trigger;
use crate::WbResult;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    Scope,
    /// A vector signal of the given width in bits.
    Signal(u32),
}

/// Handle to a named object of a simulation.
#[derive(Clone)]
pub struct SimObject {
    sim: Sim,
    handle: usize,
    kind: ObjectKind,
}

impl SimObject {
    pub(crate) fn new(sim: &Sim, handle: usize, kind: ObjectKind) -> Self {
        SimObject {
            sim: sim.clone(),
            handle,
            kind,
        }
    }

    pub fn from_name(sim: &Sim, full_name: &str) -> WbResult<Self> {
        let handle = sim.get_handle_by_name(full_name)?;
        Ok(SimObject::new(sim, handle, sim.get_kind(handle)?))
    }

    pub fn handle(&self) -> usize {
        self.handle
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn sim(&self) -> &Sim {
        &self.sim
    }

    pub fn name(&self) -> String {
        // handles are never removed, so the lookup cannot miss
        self.sim
            .get_full_name(self.handle)
            .unwrap_or_else(|_| format!("<handle {}>", self.handle))
    }

    pub fn is_signal(&self) -> bool {
        matches!(self.kind, ObjectKind::Signal(_))
    }

    pub fn width(&self) -> WbResult<u32> {
        self.sim.get_size(self.handle)
    }

    fn child_name(&self, name: &str) -> String {
        let mut child_name = self.name();
        child_name.push('.');
        child_name.push_str(name);
        child_name
    }

    pub fn get_child(&self, name: &str) -> WbResult<Self> {
        SimObject::from_name(&self.sim, &self.child_name(name))
    }

    /// Declares a signal below this scope. `name` may contain dots to create
    /// intermediate scopes.
    pub fn add_signal(&self, name: &str, width: u32) -> WbResult<Self> {
        let kind = ObjectKind::Signal(width);
        let handle = self.sim.declare(&self.child_name(name), kind)?;
        Ok(SimObject::new(&self.sim, handle, kind))
    }

    pub fn add_scope(&self, name: &str) -> WbResult<Self> {
        let handle = self.sim.declare(&self.child_name(name), ObjectKind::Scope)?;
        Ok(SimObject::new(&self.sim, handle, ObjectKind::Scope))
    }

    pub fn u64(&self) -> WbResult<u64> {
        self.sim.get_value(self.handle)
    }

    pub fn is_high(&self) -> WbResult<bool> {
        Ok(self.u64()? & 1 == 1)
    }

    /// Stages `val` for the signal. It becomes visible when the current region
    /// commits.
    pub fn set(&self, val: u64) -> WbResult<()> {
        self.sim.set_value(self.handle, val)
    }

    // convenience functions to get edge triggers for this signal
    pub fn rising_edge(&self) -> Trigger {
        Trigger::rising_edge(self)
    }
    pub fn falling_edge(&self) -> Trigger {
        Trigger::falling_edge(self)
    }
    pub fn edge(&self) -> Trigger {
        Trigger::edge(self)
    }
    pub async fn rising_edge_ro(&self) {
        self.rising_edge().await;
        Trigger::read_only(&self.sim).await;
    }
    pub async fn rising_edge_rw(&self) {
        self.rising_edge().await;
        Trigger::read_write(&self.sim).await;
    }
}

impl std::fmt::Debug for SimObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimObject")
            .field("name", &self.name())
            .field("kind", &self.kind)
            .finish()
    }
}

impl PartialEq for SimObject {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}
