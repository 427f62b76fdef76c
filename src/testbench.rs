use std::collections::VecDeque;

use crate::executor::{JoinHandle, Task};
use crate::shared::Shared;
use crate::signal::SimObject;
use crate::sim_if::SimIf;
use crate::trigger::Trigger;
use crate::{WbError, WbResult};

/*
 * SCOREBOARD
 */
pub struct Scoreboard<T>(Shared<ScoreboardInner<T>>);

impl<T: PartialEq> Scoreboard<T> {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Shared::new(ScoreboardInner {
            exp_q: VecDeque::new(),
            recv_q: VecDeque::new(),
            errors: 0,
            expected: 0,
            received: 0,
            matched: 0,
        }))
    }
    pub fn add_exp(&self, data: T) {
        self.0.with_mut(|s| {
            s.exp_q.push_back(data);
            s.expected += 1;
            s.compare();
        });
    }
    pub fn add_recv(&self, data: T) {
        self.0.with_mut(|s| {
            s.recv_q.push_back(data);
            s.received += 1;
            s.compare();
        });
    }
    pub fn result(&self) -> Result<String, String> {
        match self.passed() {
            true => Ok(self.result_str()),
            false => Err(self.result_str()),
        }
    }
    pub fn passed(&self) -> bool {
        self.0.with(|inner| {
            inner.expected > 0
                && inner.received == inner.expected
                && inner.matched == inner.received
                && inner.errors == 0
                && inner.exp_q.is_empty()
                && inner.recv_q.is_empty()
        })
    }
    pub fn result_str(&self) -> String {
        self.0.with(|inner| {
            format!(
                "expected={}, received={}, matched={}, errors={}, expQ: {}, recvQ: {}",
                inner.expected,
                inner.received,
                inner.matched,
                inner.errors,
                inner.exp_q.len(),
                inner.recv_q.len()
            )
        })
    }
}

impl<T> Clone for Scoreboard<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

struct ScoreboardInner<T> {
    exp_q: VecDeque<T>,
    recv_q: VecDeque<T>,
    errors: u32,
    expected: u32,
    received: u32,
    matched: u32,
}

impl<T: PartialEq> ScoreboardInner<T> {
    fn compare(&mut self) {
        while let (Some(exp), Some(recv)) = (self.exp_q.front(), self.recv_q.front()) {
            match exp == recv {
                true => self.matched += 1,
                false => self.errors += 1,
            }
            self.exp_q.pop_front();
            self.recv_q.pop_front();
        }
    }
}

/*
 * CLOCK
 */
/// A free-running clock driven by a background task.
pub struct Clock {
    clk: SimObject,
    period_steps: u64,
    cycles: Shared<u64>,
    task: JoinHandle<WbResult<()>>,
}

impl Clock {
    /// Starts toggling `clk`, low for the first half period. An odd period gets the
    /// extra step in the low phase.
    pub fn start(clk: &SimObject, period: u64, unit: &str) -> WbResult<Self> {
        let sim = clk.sim();
        let period_steps = sim.get_sim_steps(period as f64, unit)?;
        if period_steps < 2 {
            return Err(WbError::InvalidClockPeriod(period_steps));
        }
        let high_t = period_steps / 2;
        let low_t = period_steps - high_t;
        if period_steps % 2 != 0 {
            tracing::warn!(
                "Clock period {} steps not dividable by 2. High time will be {}; low time will be {}.",
                period_steps,
                high_t,
                low_t
            );
        }
        let cycles = Shared::new(0);
        let task = Task::spawn_named(
            sim,
            &format!("clock {}", clk.name()),
            toggle(clk.clone(), low_t, high_t, cycles.clone()),
        );
        Ok(Clock {
            clk: clk.clone(),
            period_steps,
            cycles,
            task,
        })
    }

    pub fn signal(&self) -> &SimObject {
        &self.clk
    }

    pub fn period_steps(&self) -> u64 {
        self.period_steps
    }

    /// Rising edges produced so far.
    pub fn cycles(&self) -> u64 {
        self.cycles.with(|c| *c)
    }

    /// Stops the clock; the signal keeps its last value.
    pub fn stop(&self) {
        self.task.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

async fn toggle(clk: SimObject, low_t: u64, high_t: u64, cycles: Shared<u64>) -> WbResult<()> {
    let sim = clk.sim().clone();
    loop {
        clk.set(0)?;
        Trigger::timer_steps(&sim, low_t).await;
        clk.set(1)?;
        cycles.with_mut(|c| *c += 1);
        Trigger::timer_steps(&sim, high_t).await;
    }
}

/*
 * RESET
 */
/// Holds the active-low `rst_n` asserted for `time`, releases it and returns after
/// the next rising edge of `clk`.
pub async fn generate_reset(
    rst_n: &SimObject,
    clk: &SimObject,
    time: u64,
    unit: &str,
) -> WbResult<()> {
    rst_n.set(0)?;
    Trigger::timer(clk.sim(), time, unit)?.await;
    rst_n.set(1)?;
    clk.rising_edge().await;
    clk.sim().log("reset released");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Sim;

    #[test]
    fn scoreboard_matches_in_order() {
        let sb = Scoreboard::new();
        sb.add_exp(1);
        sb.add_recv(1);
        sb.add_exp(2);
        assert!(!sb.passed());
        sb.add_recv(2);
        assert_eq!(
            sb.result(),
            Ok("expected=2, received=2, matched=2, errors=0, expQ: 0, recvQ: 0".to_string())
        );
        sb.add_exp(3);
        sb.add_recv(4);
        assert!(sb.result().is_err());
    }

    #[test]
    fn clock_counts_rising_edges_until_stopped() {
        let sim = Sim::default();
        let clk = sim.root().add_signal("clk", 1).unwrap();
        let clock = Clock::start(&clk, 10, "ns").unwrap();
        sim.run_for(100, "ns").unwrap();
        // edges at 5, 15, ... 95
        assert_eq!(clock.cycles(), 10);
        clock.stop();
        sim.run_for(100, "ns").unwrap();
        assert_eq!(clock.cycles(), 10);
        assert!(!clock.is_running());
    }

    #[test]
    fn clock_period_must_allow_two_phases() {
        let sim = Sim::default();
        let clk = sim.root().add_signal("clk", 1).unwrap();
        assert_eq!(
            Clock::start(&clk, 1, "ps").err().map(|e| e.to_string()),
            Some(WbError::InvalidClockPeriod(1).to_string())
        );
    }

    #[test]
    fn reset_is_released_after_the_hold_time() {
        let sim = Sim::default();
        let clk = sim.root().add_signal("clk", 1).unwrap();
        let rst_n = sim.root().add_signal("rst_n", 1).unwrap();
        let _clock = Clock::start(&clk, 10, "ns").unwrap();
        let mut reset = {
            let (clk, rst_n) = (clk.clone(), rst_n.clone());
            Task::fork(&sim, async move { generate_reset(&rst_n, &clk, 20, "ns").await })
        };
        sim.run_until(&mut reset).unwrap().unwrap();
        assert!(rst_n.is_high().unwrap());
        assert_eq!(sim.get_sim_time("ns").unwrap(), 25.0);
    }
}
