use crate::signal::ObjectKind;
use crate::{WbError, WbResult};

/// What the bus models need from a simulator: named signal handles, value access and
/// simulation time. The in-process [`Kernel`](crate::kernel::Kernel) implements it; a
/// VPI/VHPI backend would sit behind the same seam.
pub trait SimIf {
    fn get_handle_by_name(&self, name: &str) -> WbResult<usize>;
    fn get_full_name(&self, handle: usize) -> WbResult<String>;
    fn get_kind(&self, handle: usize) -> WbResult<ObjectKind>;
    fn get_value(&self, handle: usize) -> WbResult<u64>;
    fn set_value(&self, handle: usize, value: u64) -> WbResult<()>;
    fn get_sim_time_steps(&self) -> u64;
    fn get_sim_precision(&self) -> i8;
    fn log(&self, msg: &str);

    fn get_size(&self, handle: usize) -> WbResult<u32> {
        match self.get_kind(handle)? {
            ObjectKind::Signal(width) => Ok(width),
            ObjectKind::Scope => Err(WbError::NotASignal(self.get_full_name(handle)?)),
        }
    }
    fn get_sim_time(&self, unit: &str) -> WbResult<f64> {
        // this function does not preserve precision, so don't use carelessly
        let t = self.get_sim_time_steps() as f64;
        let precision = self.get_sim_precision();
        Ok(ldexp10(t, precision - time_scale(unit)?))
    }
    fn get_sim_steps(&self, time: f64, unit: &str) -> WbResult<u64> {
        let precision = self.get_sim_precision();
        let steps = ldexp10(time, time_scale(unit)? - precision);
        if steps % 1.0 == 0.0 && steps >= 0.0 {
            Ok(steps as u64)
        } else {
            Err(WbError::TimeNotRepresentable {
                time,
                unit: unit.to_string(),
            })
        }
    }
}

pub(crate) fn time_scale(unit: &str) -> WbResult<i8> {
    match unit {
        "fs" => Ok(-15),
        "ps" => Ok(-12),
        "ns" => Ok(-9),
        "us" => Ok(-6),
        "ms" => Ok(-3),
        "sec" => Ok(0),
        _ => Err(WbError::InvalidTimeUnit(unit.to_string())),
    }
}

fn ldexp10(frac: f64, exp: i8) -> f64 {
    // Like math.ldexp, but base 10
    if exp >= 0 {
        frac * 10_u64.pow(exp as u32) as f64
    } else {
        let div = 10_u64.pow(-exp as u32) as f64;
        frac / div
    }
}
