use crate::config::BusConfig;
use crate::signal::SimObject;
use crate::{WbError, WbResult};

/// Which side of the bus a model plays. Decides the direction of every wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Host,
    Device,
}

/// The bus wires as seen from the host: `dat_w` carries write data towards the
/// device, `dat_r` read data back to the host.
#[derive(Clone, Debug)]
pub struct Wires {
    pub cyc: SimObject,
    pub stb: SimObject,
    pub we: SimObject,
    pub adr: SimObject,
    pub dat_w: SimObject,
    pub dat_r: SimObject,
    pub ack: SimObject,
    pub stall: SimObject,
    pub sel: Option<SimObject>,
}

impl Wires {
    /// Resolves the wires on `peer` by the `wb_<signal>_i` / `wb_<signal>_o` naming
    /// convention. The peer's inputs are the wires this role drives; `sel` may be
    /// absent.
    pub fn from_peer(peer: &SimObject, role: Role) -> WbResult<Self> {
        let host_drives = role == Role::Host;
        let wire = |base: &str, driven_by_host: bool| -> WbResult<SimObject> {
            let suffix = if driven_by_host == host_drives { "i" } else { "o" };
            let name = format!("wb_{}_{}", base, suffix);
            peer.get_child(&name).map_err(|e| match e {
                WbError::UnknownObject(full_name) => WbError::MissingSignal(full_name),
                e => e,
            })
        };
        let sel = match wire("sel", true) {
            Ok(sel) => Some(sel),
            Err(WbError::MissingSignal(_)) => None,
            Err(e) => return Err(e),
        };
        Ok(Wires {
            cyc: wire("cyc", true)?,
            stb: wire("stb", true)?,
            we: wire("we", true)?,
            adr: wire("adr", true)?,
            dat_w: wire("dat", true)?,
            dat_r: wire("dat", false)?,
            ack: wire("ack", false)?,
            stall: wire("stall", false)?,
            sel,
        })
    }

    fn host_driven(&self) -> Vec<&SimObject> {
        let mut wires = vec![&self.cyc, &self.stb, &self.we, &self.adr, &self.dat_w];
        wires.extend(self.sel.as_ref());
        wires
    }

    fn device_driven(&self) -> Vec<&SimObject> {
        vec![&self.dat_r, &self.ack, &self.stall]
    }
}

/// The wires one model owns together with the bus geometry. Not `Clone`: the model
/// that created the binding is the only one driving its outputs.
#[derive(Debug)]
pub struct SignalBinding {
    role: Role,
    config: BusConfig,
    wires: Wires,
    initialized: bool,
}

impl SignalBinding {
    pub fn bind(role: Role, config: BusConfig, wires: Wires) -> WbResult<Self> {
        let data_width = config.data_width();
        let mut expected = vec![
            (&wires.cyc, 1),
            (&wires.stb, 1),
            (&wires.we, 1),
            (&wires.adr, config.address_width()),
            (&wires.dat_w, data_width),
            (&wires.dat_r, data_width),
            (&wires.ack, 1),
            (&wires.stall, 1),
        ];
        match (&wires.sel, config.byte_select_width()) {
            (Some(sel), Some(width)) => expected.push((sel, width)),
            (None, Some(_)) => {
                return Err(WbError::MissingSignal(format!(
                    "sel for the bus of {}",
                    wires.cyc.name()
                )));
            }
            _ => {}
        }
        for (wire, width) in expected {
            check_wire(wire, width)?;
        }
        if let Some(sel) = &wires.sel {
            // an unconfigured sel takes whatever width the peer declares
            sel.width()?;
        }
        tracing::debug!(?role, adr = %wires.adr.name(), "bus bound");
        Ok(SignalBinding {
            role,
            config,
            wires,
            initialized: false,
        })
    }

    pub fn bind_default(role: Role, config: BusConfig, peer: &SimObject) -> WbResult<Self> {
        SignalBinding::bind(role, config, Wires::from_peer(peer, role)?)
    }

    /// Drives every output of this role to 0. Only the first call has an effect.
    pub fn initialize_outputs(&mut self) -> WbResult<()> {
        if self.initialized {
            return Ok(());
        }
        for wire in self.outputs() {
            wire.set(0)?;
        }
        self.initialized = true;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn outputs(&self) -> Vec<&SimObject> {
        match self.role {
            Role::Host => self.wires.host_driven(),
            Role::Device => self.wires.device_driven(),
        }
    }

    pub fn inputs(&self) -> Vec<&SimObject> {
        match self.role {
            Role::Host => self.wires.device_driven(),
            Role::Device => self.wires.host_driven(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub fn wires(&self) -> &Wires {
        &self.wires
    }

    /// Width of the bound sel wire, if there is one.
    pub fn sel_width(&self) -> Option<u32> {
        self.wires.sel.as_ref().and_then(|sel| sel.width().ok())
    }

    pub(crate) fn expect_role(&self, expected: Role) -> WbResult<()> {
        if self.role == expected {
            Ok(())
        } else {
            Err(WbError::RoleMismatch {
                expected,
                actual: self.role,
            })
        }
    }
}

fn check_wire(wire: &SimObject, expected: u32) -> WbResult<()> {
    if !wire.is_signal() {
        return Err(WbError::NotASignal(wire.name()));
    }
    let actual = wire.width()?;
    if actual != expected {
        return Err(WbError::WidthMismatch {
            signal: wire.name(),
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Sim;

    fn peer(sim: &Sim, with_sel: bool) -> SimObject {
        let peer = sim.root().add_scope("dut").unwrap();
        for name in ["cyc", "stb", "we", "ack", "stall"] {
            peer.add_signal(&format!("wb_{}_i", name), 1).unwrap();
            peer.add_signal(&format!("wb_{}_o", name), 1).unwrap();
        }
        peer.add_signal("wb_adr_i", 3).unwrap();
        peer.add_signal("wb_adr_o", 3).unwrap();
        peer.add_signal("wb_dat_i", 32).unwrap();
        peer.add_signal("wb_dat_o", 32).unwrap();
        if with_sel {
            peer.add_signal("wb_sel_i", 4).unwrap();
        }
        peer
    }

    #[test]
    fn host_drives_the_peer_inputs() {
        let sim = Sim::default();
        let dut = peer(&sim, true);
        let config = BusConfig::new(3, 32).unwrap().with_byte_select(4).unwrap();
        let bus = SignalBinding::bind_default(Role::Host, config, &dut).unwrap();
        assert_eq!(bus.wires().cyc.name(), "tb.dut.wb_cyc_i");
        assert_eq!(bus.wires().dat_w.name(), "tb.dut.wb_dat_i");
        assert_eq!(bus.wires().dat_r.name(), "tb.dut.wb_dat_o");
        assert_eq!(bus.wires().ack.name(), "tb.dut.wb_ack_o");
        assert_eq!(bus.outputs().len(), 6);
        assert_eq!(bus.sel_width(), Some(4));
    }

    #[test]
    fn device_mirrors_the_host_and_tolerates_missing_sel() {
        let sim = Sim::default();
        let dut = peer(&sim, true);
        let config = BusConfig::new(3, 32).unwrap();
        let bus = SignalBinding::bind_default(Role::Device, config, &dut).unwrap();
        assert_eq!(bus.wires().stb.name(), "tb.dut.wb_stb_o");
        assert_eq!(bus.wires().dat_w.name(), "tb.dut.wb_dat_o");
        assert_eq!(bus.wires().stall.name(), "tb.dut.wb_stall_i");
        // the device samples wb_sel_o, which this peer does not have
        assert!(bus.wires().sel.is_none());
        assert_eq!(bus.outputs().len(), 3);
        assert_eq!(bus.inputs().len(), 5);
    }

    #[test]
    fn bind_fails_fast() {
        let sim = Sim::default();
        let dut = peer(&sim, false);
        assert_eq!(
            SignalBinding::bind_default(Role::Host, BusConfig::new(4, 32).unwrap(), &dut)
                .unwrap_err(),
            WbError::WidthMismatch {
                signal: "tb.dut.wb_adr_i".to_string(),
                expected: 4,
                actual: 3,
            }
        );
        let empty = sim.root().add_scope("empty").unwrap();
        assert_eq!(
            SignalBinding::bind_default(Role::Host, BusConfig::default(), &empty).unwrap_err(),
            WbError::MissingSignal("tb.empty.wb_cyc_i".to_string())
        );
    }

    #[test]
    fn configured_byte_select_needs_a_sel_wire() {
        let sim = Sim::default();
        let dut = peer(&sim, false);
        let config = BusConfig::new(3, 32).unwrap().with_byte_select(4).unwrap();
        assert_eq!(
            SignalBinding::bind_default(Role::Host, config, &dut).unwrap_err(),
            WbError::MissingSignal("sel for the bus of tb.dut.wb_cyc_i".to_string())
        );
        let mut wires = Wires::from_peer(&dut, Role::Host).unwrap();
        wires.sel = Some(dut.add_signal("wb_sel_i", 2).unwrap());
        assert_eq!(
            SignalBinding::bind(Role::Host, config, wires).unwrap_err(),
            WbError::WidthMismatch {
                signal: "tb.dut.wb_sel_i".to_string(),
                expected: 4,
                actual: 2,
            }
        );
    }

    #[test]
    fn outputs_are_initialized_once() {
        let sim = Sim::default();
        let dut = peer(&sim, false);
        let mut bus =
            SignalBinding::bind_default(Role::Device, BusConfig::new(3, 32).unwrap(), &dut)
                .unwrap();
        let ack = bus.wires().ack.clone();
        ack.set(1).unwrap();
        sim.step().unwrap();
        bus.initialize_outputs().unwrap();
        sim.step().unwrap();
        assert_eq!(ack.u64().unwrap(), 0);

        ack.set(1).unwrap();
        sim.step().unwrap();
        bus.initialize_outputs().unwrap();
        assert!(!sim.step().unwrap());
        assert_eq!(ack.u64().unwrap(), 1);
        assert!(bus.is_initialized());
    }
}
