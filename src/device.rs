use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::binding::{Role, SignalBinding};
use crate::error::ProtocolViolation;
use crate::signal::SimObject;
use crate::store::Store;
use crate::transaction::{Access, PendingTransaction};
use crate::trigger::Trigger;
use crate::{WbError, WbResult};

/// Turns a stall directive into a number of stall cycles: 0 is none, a positive
/// value is exact, a negative value `-n` picks uniformly from `0..=n`.
pub fn resolve_stall<R: Rng + ?Sized>(directive: i64, rng: &mut R) -> u64 {
    match directive {
        0 => 0,
        n if n > 0 => n as u64,
        n => rng.gen_range(0..=n.unsigned_abs()),
    }
}

/// Request wires as seen on the edge the device first noticed `stb`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Request {
    we: u64,
    adr: u64,
    dat: u64,
    sel: Option<u64>,
}

/// Services host requests against an in-memory [`Store`].
///
/// Each `serve_*` call handles exactly one request. The device observes the bus in the
/// ReadWrite region after a rising edge and answers in the same region, so a stall it
/// raises is seen by the host on that very cycle.
#[derive(Debug)]
pub struct DeviceModel {
    bus: SignalBinding,
    clk: SimObject,
    store: Store,
    rng: StdRng,
    timeout: Option<u64>,
    last_stall: u64,
    served: u64,
}

impl DeviceModel {
    pub fn new(mut bus: SignalBinding, clk: SimObject) -> WbResult<Self> {
        bus.expect_role(Role::Device)?;
        bus.initialize_outputs()?;
        Ok(DeviceModel {
            bus,
            clk,
            store: Store::new(),
            rng: StdRng::from_entropy(),
            timeout: None,
            last_stall: 0,
            served: 0,
        })
    }

    /// Makes random stall directives reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Fails with [`WbError::Timeout`] when no request shows up within `cycles` cycles.
    pub fn with_timeout(mut self, cycles: u64) -> Self {
        self.timeout = Some(cycles);
        self
    }

    pub fn preload(&mut self, words: impl IntoIterator<Item = (u64, u64)>) {
        self.store.preload(words);
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn binding(&self) -> &SignalBinding {
        &self.bus
    }

    /// Stall cycles inserted by the last served request.
    pub fn last_stall(&self) -> u64 {
        self.last_stall
    }

    /// Requests served so far.
    pub fn served(&self) -> u64 {
        self.served
    }

    /// Waits for a write request, stores its data and returns it.
    pub async fn serve_write(&mut self, stall_cycles: i64) -> WbResult<u64> {
        self.serve(Access::Write, stall_cycles).await
    }

    /// Waits for a read request and answers it from the store.
    pub async fn serve_read(&mut self, stall_cycles: i64) -> WbResult<u64> {
        self.serve(Access::Read, stall_cycles).await
    }

    async fn serve(&mut self, kind: Access, stall_cycles: i64) -> WbResult<u64> {
        self.wait_for_strobe().await?;
        let w = self.bus.wires();

        if !w.cyc.is_high()? {
            return Err(ProtocolViolation::StbWithoutCyc.into());
        }
        if w.we.u64()? != kind.we() {
            return Err(ProtocolViolation::WeMismatch { expected: kind }.into());
        }

        let stall = resolve_stall(stall_cycles, &mut self.rng);
        if stall > 0 {
            let held = self.sample()?;
            w.stall.set(1)?;
            let stalled = self.hold(held, stall).await;
            // released on error too
            w.stall.set(0)?;
            stalled?;
        }

        let request = self.sample()?;
        let txn = match kind {
            Access::Write => PendingTransaction::write(request.adr, request.dat, request.sel),
            Access::Read => PendingTransaction::read(request.adr),
        }
        .with_stall_budget(Some(stall));
        let data = match txn.kind {
            Access::Write => {
                self.store.write(txn.address, request.dat);
                request.dat
            }
            Access::Read => self.store.read(txn.address)?,
        };

        let w = self.bus.wires();
        self.clk.rising_edge_rw().await;
        w.ack.set(1)?;
        if kind == Access::Read {
            w.dat_r.set(data)?;
        }
        self.clk.rising_edge_rw().await;
        w.ack.set(0)?;
        if kind == Access::Read {
            w.dat_r.set(0)?;
        }

        self.last_stall = stall;
        self.served += 1;
        tracing::debug!(
            kind = %kind,
            address = %format!("{:#x}", txn.address),
            data = %format!("{:#x}", data),
            stall,
            "device served request"
        );
        Ok(data)
    }

    async fn wait_for_strobe(&self) -> WbResult<()> {
        let stb = &self.bus.wires().stb;
        let mut waited = 0;
        loop {
            Trigger::read_write(self.clk.sim()).await;
            if stb.is_high()? {
                return Ok(());
            }
            if let Some(limit) = self.timeout {
                if waited >= limit {
                    return Err(WbError::Timeout {
                        waiting_for: "stb",
                        cycles: waited,
                    });
                }
            }
            self.clk.rising_edge().await;
            waited += 1;
        }
    }

    /// Keeps the request stalled for `stall` cycles, checking it stays put.
    async fn hold(&self, held: Request, stall: u64) -> WbResult<()> {
        for cycle in 1..=stall {
            self.clk.rising_edge_rw().await;
            tracing::trace!(cycle, stall, "stalling request");
            self.check_held(held)?;
        }
        Ok(())
    }

    fn sample(&self) -> WbResult<Request> {
        let w = self.bus.wires();
        Ok(Request {
            we: w.we.u64()?,
            adr: w.adr.u64()?,
            dat: w.dat_w.u64()?,
            sel: w.sel.as_ref().map(|sel| sel.u64()).transpose()?,
        })
    }

    fn check_held(&self, held: Request) -> WbResult<()> {
        let w = self.bus.wires();
        let changed = if !w.cyc.is_high()? {
            Some("cyc")
        } else if !w.stb.is_high()? {
            Some("stb")
        } else {
            let now = self.sample()?;
            if now.we != held.we {
                Some("we")
            } else if now.adr != held.adr {
                Some("adr")
            } else if now.dat != held.dat {
                Some("dat")
            } else if now.sel != held.sel {
                Some("sel")
            } else {
                None
            }
        };
        match changed {
            Some(signal) => Err(ProtocolViolation::RequestChanged { signal }.into()),
            None => Ok(()),
        }
    }
}
