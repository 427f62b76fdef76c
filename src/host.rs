use crate::binding::{Role, SignalBinding};
use crate::config::fits;
use crate::error::{PreconditionError, ProtocolViolation};
use crate::signal::SimObject;
use crate::transaction::PendingTransaction;
use crate::trigger::Trigger;
use crate::{WbError, WbResult};

/// Issues single pipelined requests on a bus, one at a time.
///
/// Requests are driven right after a rising edge of `clk` and the device's answer
/// (`stall`, `ack`, read data) is sampled once the edge has fully settled, so the model
/// works against both combinational and registered devices.
#[derive(Debug)]
pub struct HostModel {
    bus: SignalBinding,
    clk: SimObject,
    timeout: Option<u64>,
    last_cycles: u64,
}

impl HostModel {
    /// Takes ownership of a host binding and drives its outputs low.
    pub fn new(mut bus: SignalBinding, clk: SimObject) -> WbResult<Self> {
        bus.expect_role(Role::Host)?;
        bus.initialize_outputs()?;
        Ok(HostModel {
            bus,
            clk,
            timeout: None,
            last_cycles: 0,
        })
    }

    /// Gives up with [`WbError::Timeout`] once a request has been stalled for more
    /// than `cycles` cycles.
    pub fn with_timeout(mut self, cycles: u64) -> Self {
        self.timeout = Some(cycles);
        self
    }

    pub fn binding(&self) -> &SignalBinding {
        &self.bus
    }

    /// Rising edges the last transaction took, from the edge it was presented on to
    /// the edge `cyc` was released on.
    pub fn last_cycles(&self) -> u64 {
        self.last_cycles
    }

    pub async fn write(
        &mut self,
        address: u64,
        data: u64,
        byte_enable: Option<u64>,
    ) -> WbResult<()> {
        let txn = PendingTransaction::write(address, data, byte_enable)
            .with_stall_budget(self.timeout);
        self.check(&txn)?;
        // dat_r carries nothing for a write
        self.transfer(txn).await?;
        Ok(())
    }

    pub async fn read(&mut self, address: u64) -> WbResult<u64> {
        let txn = PendingTransaction::read(address).with_stall_budget(self.timeout);
        self.check(&txn)?;
        self.transfer(txn).await
    }

    fn check(&self, txn: &PendingTransaction) -> WbResult<()> {
        let config = self.bus.config();
        if !config.fits_address(txn.address) {
            return Err(PreconditionError::AddressOutOfRange {
                address: txn.address,
                width: config.address_width(),
            }
            .into());
        }
        if let Some(data) = txn.data {
            if !config.fits_data(data) {
                return Err(PreconditionError::DataOutOfRange {
                    data,
                    width: config.data_width(),
                }
                .into());
            }
        }
        if let Some(mask) = txn.byte_enable {
            let width = self.bus.sel_width().ok_or(PreconditionError::NoByteSelect)?;
            if !fits(mask, width) {
                return Err(PreconditionError::ByteEnableOutOfRange { mask, width }.into());
            }
        }
        Ok(())
    }

    /// Runs one request on the bus and returns `dat_r` as sampled on the ack edge.
    async fn transfer(&mut self, txn: PendingTransaction) -> WbResult<u64> {
        let w = self.bus.wires();
        let sim = self.clk.sim();
        let mut edges = 1;

        // present the request
        self.clk.rising_edge().await;
        w.cyc.set(1)?;
        w.stb.set(1)?;
        w.we.set(txn.kind.we())?;
        w.adr.set(txn.address)?;
        if let Some(data) = txn.data {
            w.dat_w.set(data)?;
        }
        if let (Some(sel), Some(mask)) = (&w.sel, txn.byte_enable) {
            sel.set(mask)?;
        }

        // hold it until the device stops stalling
        let mut stalled = 0;
        loop {
            Trigger::read_only(sim).await;
            if !w.stall.is_high()? {
                break;
            }
            stalled += 1;
            tracing::trace!(address = txn.address, stalled, "request stalled");
            if let Some(budget) = txn.stall_budget {
                if stalled > budget {
                    self.clk.rising_edge().await;
                    self.release_request(&txn)?;
                    w.cyc.set(0)?;
                    return Err(WbError::Timeout {
                        waiting_for: "stall release",
                        cycles: stalled,
                    });
                }
            }
            self.clk.rising_edge().await;
            edges += 1;
        }

        // accepted: release the request, ack is due on this edge
        self.clk.rising_edge().await;
        edges += 1;
        self.release_request(&txn)?;
        Trigger::read_only(sim).await;
        let acked = w.ack.is_high()?;
        let dat_r = w.dat_r.u64()?;

        self.clk.rising_edge().await;
        edges += 1;
        w.cyc.set(0)?;
        if !acked {
            return Err(ProtocolViolation::MissingAck {
                address: txn.address,
            }
            .into());
        }

        self.last_cycles = edges;
        tracing::debug!(
            kind = %txn.kind,
            address = %format!("{:#x}", txn.address),
            written = ?txn.data,
            dat_r = %format!("{:#x}", dat_r),
            stalled,
            "host transfer done"
        );
        Ok(dat_r)
    }

    /// Returns everything but `cyc` to idle.
    fn release_request(&self, txn: &PendingTransaction) -> WbResult<()> {
        let w = self.bus.wires();
        w.stb.set(0)?;
        w.we.set(0)?;
        w.adr.set(0)?;
        w.dat_w.set(0)?;
        if let (Some(sel), Some(_)) = (&w.sel, txn.byte_enable) {
            sel.set(0)?;
        }
        Ok(())
    }
}
