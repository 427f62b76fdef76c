pub use crate::binding::{Role, SignalBinding, Wires};
pub use crate::config::{BusConfig, SimConfig};
pub use crate::device::DeviceModel;
pub use crate::executor::{JoinHandle, Task};
pub use crate::host::HostModel;
pub use crate::kernel::Sim;
pub use crate::monitor::{BusMonitor, Transfer};
pub use crate::signal::SimObject;
pub use crate::sim_if::SimIf;
pub use crate::testbench::{generate_reset, Clock, Scoreboard};
pub use crate::trigger::Trigger;
pub use crate::utils;
pub use crate::{Access, ProtocolViolation, PreconditionError, WbError, WbResult};
pub use futures::future::FutureExt;
