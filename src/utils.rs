use crate::signal::SimObject;
use crate::WbResult;

pub async fn clock_cycles(clk: &SimObject, n_cycles: u64) {
    for _ in 0..n_cycles {
        clk.rising_edge().await;
    }
}

/// Continuous assignment `dst = src`: copies `src` now and on every change.
/// Meant to be forked; it only returns on error.
pub async fn assign(dst: SimObject, src: SimObject) -> WbResult<()> {
    loop {
        dst.set(src.u64()?)?;
        src.edge().await;
    }
}
