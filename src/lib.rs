//! Wishbone B4 pipelined bus functional models.
//!
//! A [`HostModel`] issues single read/write requests and a [`DeviceModel`] services
//! them from an in-memory store, with configurable stall cycles. Both run as
//! cooperative tasks on a [`Sim`], an in-process event-driven signal kernel, and talk
//! to each other (or to any other peer) only through named signals.
//!
//! ```no_run
//! use wbbfm::prelude::*;
//!
//! # fn main() -> WbResult<()> {
//! let sim = Sim::default();
//! let clk = sim.root().add_signal("clk", 1)?;
//! let dut = sim.root().add_scope("dut")?;
//! // ... declare the dut's wb_*_i / wb_*_o signals ...
//! let _clock = Clock::start(&clk, 10, "ns")?;
//! let bus = SignalBinding::bind_default(Role::Host, BusConfig::new(3, 32)?, &dut)?;
//! let mut host = HostModel::new(bus, clk)?;
//! let mut test = Task::fork(&sim, async move {
//!     host.write(0, 0x1111_2222, Some(0xF)).await?;
//!     host.read(0).await
//! });
//! let _data = sim.run_until_timeout(&mut test, 1, "us")??;
//! # Ok(())
//! # }
//! ```

mod binding;
mod config;
mod device;
mod error;
mod executor;
mod host;
mod kernel;
mod monitor;
pub mod prelude;
mod shared;
mod signal;
pub mod sim_if;
mod store;
pub mod testbench;
mod transaction;
mod trigger;
pub mod utils;

pub use binding::{Role, SignalBinding, Wires};
pub use config::{BusConfig, SimConfig};
pub use device::{resolve_stall, DeviceModel};
pub use error::{PreconditionError, ProtocolViolation, WbError, WbResult};
pub use executor::{JoinHandle, Task};
pub use host::HostModel;
pub use kernel::{Kernel, Phase, Sim, SimSummary};
pub use monitor::{BusMonitor, Transfer};
pub use shared::Shared;
pub use signal::{ObjectKind, SimObject};
pub use store::Store;
pub use transaction::{Access, PendingTransaction};
pub use trigger::{EdgeKind, TrigKind, Trigger};
