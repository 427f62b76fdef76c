use std::collections::VecDeque;

use crate::binding::Wires;
use crate::error::ProtocolViolation;
use crate::executor::{JoinHandle, Task};
use crate::shared::Shared;
use crate::signal::SimObject;
use crate::sim_if::SimIf;
use crate::testbench::Scoreboard;
use crate::transaction::Access;
use crate::WbResult;

/// A completed bus transfer as seen on the wires.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transfer {
    pub kind: Access,
    pub address: u64,
    pub data: u64,
    pub byte_enable: Option<u64>,
    pub stall_cycles: u64,
}

#[derive(Clone, Copy, PartialEq, Eq)]
struct Sample {
    cyc: bool,
    stb: bool,
    we: u64,
    adr: u64,
    dat_w: u64,
    dat_r: u64,
    sel: Option<u64>,
    ack: bool,
    stall: bool,
}

impl Sample {
    fn take(w: &Wires) -> WbResult<Self> {
        Ok(Sample {
            cyc: w.cyc.is_high()?,
            stb: w.stb.is_high()?,
            we: w.we.u64()?,
            adr: w.adr.u64()?,
            dat_w: w.dat_w.u64()?,
            dat_r: w.dat_r.u64()?,
            sel: w.sel.as_ref().map(|sel| sel.u64()).transpose()?,
            ack: w.ack.is_high()?,
            stall: w.stall.is_high()?,
        })
    }

    /// First request wire that differs from `held`.
    fn changed_from(&self, held: &Sample) -> Option<&'static str> {
        if self.we != held.we {
            Some("we")
        } else if self.adr != held.adr {
            Some("adr")
        } else if self.dat_w != held.dat_w {
            Some("dat")
        } else if self.sel != held.sel {
            Some("sel")
        } else {
            None
        }
    }
}

struct MonitorState {
    outstanding: VecDeque<Transfer>,
    transfers: Vec<Transfer>,
    violations: Vec<(u64, ProtocolViolation)>,
    held: Option<Sample>,
    stalled: u64,
    idle: u32,
    idle_limit: u32,
    ack_cycles: u64,
    scoreboard: Option<(Scoreboard<Transfer>, bool)>,
}

impl MonitorState {
    fn new() -> Self {
        MonitorState {
            outstanding: VecDeque::new(),
            transfers: Vec::new(),
            violations: Vec::new(),
            held: None,
            stalled: 0,
            idle: 0,
            idle_limit: 1,
            ack_cycles: 0,
            scoreboard: None,
        }
    }

    fn violation(&mut self, time: u64, violation: ProtocolViolation) {
        tracing::warn!(time, %violation, "bus protocol violation");
        self.violations.push((time, violation));
    }

    fn complete(&mut self, transfer: Transfer) {
        if let Some((sb, exp_not_recv)) = &self.scoreboard {
            match *exp_not_recv {
                true => sb.add_exp(transfer.clone()),
                false => sb.add_recv(transfer.clone()),
            }
        }
        self.transfers.push(transfer);
    }

    fn observe(&mut self, time: u64, s: Sample) {
        let busy = !self.outstanding.is_empty();

        if s.ack {
            self.ack_cycles += 1;
            match self.outstanding.pop_front() {
                Some(mut transfer) => {
                    if transfer.kind == Access::Read {
                        transfer.data = s.dat_r;
                    }
                    self.complete(transfer);
                }
                None => self.violation(time, ProtocolViolation::UnexpectedAck),
            }
        }

        if s.stb && !s.cyc {
            self.violation(time, ProtocolViolation::StbWithoutCyc);
        }

        if !s.cyc && !self.outstanding.is_empty() {
            let outstanding = self.outstanding.len() as u32;
            self.outstanding.clear();
            self.violation(time, ProtocolViolation::CycDropped { outstanding });
        }

        if s.cyc && !s.stb && !busy {
            self.idle += 1;
            if self.idle == self.idle_limit + 1 {
                let cycles = self.idle;
                self.violation(time, ProtocolViolation::CycIdle { cycles });
            }
        } else {
            self.idle = 0;
        }

        if let Some(held) = self.held {
            if !(s.cyc && s.stb) {
                let signal = if s.cyc { "stb" } else { "cyc" };
                self.held = None;
                self.stalled = 0;
                self.violation(time, ProtocolViolation::RequestChanged { signal });
                return;
            }
            if let Some(signal) = s.changed_from(&held) {
                self.violation(time, ProtocolViolation::RequestChanged { signal });
            }
        }

        if s.cyc && s.stb {
            if s.stall {
                self.held.get_or_insert(s);
                self.stalled += 1;
            } else {
                let kind = if s.we == 1 { Access::Write } else { Access::Read };
                self.outstanding.push_back(Transfer {
                    kind,
                    address: s.adr,
                    data: if kind.is_write() { s.dat_w } else { 0 },
                    byte_enable: s.sel,
                    stall_cycles: self.stalled,
                });
                self.held = None;
                self.stalled = 0;
            }
        }
    }
}

/// Passive observer of a bus. Records every completed transfer and every protocol
/// violation it sees, sampling once per rising edge after the edge has settled.
pub struct BusMonitor {
    state: Shared<MonitorState>,
    task: JoinHandle<WbResult<()>>,
}

impl BusMonitor {
    pub fn start(wires: Wires, clk: &SimObject) -> Self {
        let state = Shared::new(MonitorState::new());
        let task = Task::spawn_named(
            clk.sim(),
            &format!("monitor {}", wires.cyc.name()),
            run(wires, clk.clone(), state.clone()),
        );
        BusMonitor { state, task }
    }

    /// Cycles `cyc` may stay high with nothing requested or outstanding.
    pub fn set_idle_limit(&self, cycles: u32) {
        self.state.with_mut(|s| s.idle_limit = cycles);
    }

    /// Forwards every completed transfer to `sb`, as expected or received items.
    pub fn set_scoreboard(&self, sb: Scoreboard<Transfer>, exp_not_recv: bool) {
        self.state.with_mut(|s| s.scoreboard = Some((sb, exp_not_recv)));
    }

    pub fn transfers(&self) -> Vec<Transfer> {
        self.state.with(|s| s.transfers.clone())
    }

    pub fn violations(&self) -> Vec<ProtocolViolation> {
        self.state
            .with(|s| s.violations.iter().map(|(_, v)| v.clone()).collect())
    }

    /// Cycles on which `ack` was seen high.
    pub fn ack_cycles(&self) -> u64 {
        self.state.with(|s| s.ack_cycles)
    }

    /// Fails with the first recorded violation.
    pub fn check(&self) -> WbResult<()> {
        self.state.with(|s| match s.violations.first() {
            Some((_, v)) => Err(v.clone().into()),
            None => Ok(()),
        })
    }

    pub fn stop(&self) {
        self.task.cancel();
    }
}

async fn run(wires: Wires, clk: SimObject, state: Shared<MonitorState>) -> WbResult<()> {
    loop {
        clk.rising_edge_ro().await;
        let sample = Sample::take(&wires)?;
        let time = clk.sim().get_sim_time_steps();
        state.with_mut(|s| s.observe(time, sample));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> MonitorState {
        MonitorState::new()
    }

    fn idle() -> Sample {
        Sample {
            cyc: false,
            stb: false,
            we: 0,
            adr: 0,
            dat_w: 0,
            dat_r: 0,
            sel: None,
            ack: false,
            stall: false,
        }
    }

    fn request(we: u64, adr: u64, dat_w: u64) -> Sample {
        Sample {
            cyc: true,
            stb: true,
            we,
            adr,
            dat_w,
            ..idle()
        }
    }

    #[test]
    fn stalled_write_is_recorded_with_its_stall_count() {
        let mut m = state();
        m.observe(0, Sample { stall: true, ..request(1, 4, 7) });
        m.observe(1, Sample { stall: true, ..request(1, 4, 7) });
        m.observe(2, request(1, 4, 7));
        m.observe(3, Sample { cyc: true, ack: true, ..idle() });
        m.observe(4, idle());
        assert!(m.violations.is_empty());
        assert_eq!(
            m.transfers,
            vec![Transfer {
                kind: Access::Write,
                address: 4,
                data: 7,
                byte_enable: None,
                stall_cycles: 2,
            }]
        );
    }

    #[test]
    fn read_data_is_taken_on_the_ack_cycle() {
        let mut m = state();
        m.observe(0, request(0, 0, 0));
        m.observe(1, Sample { cyc: true, ack: true, dat_r: 0xbeef, ..idle() });
        assert_eq!(m.transfers[0].data, 0xbeef);
        assert_eq!(m.ack_cycles, 1);
    }

    #[test]
    fn framing_faults_are_reported() {
        let mut m = state();
        m.observe(0, Sample { cyc: false, ..request(1, 0, 0) });
        assert_eq!(m.violations[0].1, ProtocolViolation::StbWithoutCyc);

        let mut m = state();
        m.observe(0, request(1, 0, 0));
        m.observe(1, idle());
        assert_eq!(
            m.violations[0].1,
            ProtocolViolation::CycDropped { outstanding: 1 }
        );

        let mut m = state();
        for t in 0..3 {
            m.observe(t, Sample { cyc: true, ..idle() });
        }
        assert_eq!(m.violations.len(), 1);
        assert_eq!(m.violations[0].1, ProtocolViolation::CycIdle { cycles: 2 });

        let mut m = state();
        m.observe(0, Sample { stall: true, ..request(1, 0, 0) });
        m.observe(1, Sample { stall: true, ..request(1, 1, 0) });
        assert_eq!(
            m.violations[0].1,
            ProtocolViolation::RequestChanged { signal: "adr" }
        );
    }
}
