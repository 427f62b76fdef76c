#![allow(dead_code)]

use wbbfm::prelude::*;

pub const PERIOD_NS: u64 = 10;
/// Generous bound on simulated time for a handful of transactions.
pub const WATCHDOG_NS: u64 = 10_000;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A simulation with a running clock.
pub struct Bench {
    pub sim: Sim,
    pub clk: SimObject,
    pub clock: Clock,
}

impl Bench {
    pub fn new() -> Self {
        init_tracing();
        let sim = Sim::default();
        let clk = sim.root().add_signal("clk", 1).expect("clk");
        let clock = Clock::start(&clk, PERIOD_NS, "ns").expect("clock");
        Bench { sim, clk, clock }
    }

    /// Declares plain bus wires under `tb.<name>` and returns them. Both models can
    /// be bound to the same set with `SignalBinding::bind`.
    pub fn bus(&self, name: &str, config: &BusConfig) -> Wires {
        let scope = self.sim.root().add_scope(name).expect("bus scope");
        let sig = |n: &str, w: u32| scope.add_signal(n, w).expect("bus signal");
        Wires {
            cyc: sig("cyc", 1),
            stb: sig("stb", 1),
            we: sig("we", 1),
            adr: sig("adr", config.address_width()),
            dat_w: sig("dat_w", config.data_width()),
            dat_r: sig("dat_r", config.data_width()),
            ack: sig("ack", 1),
            stall: sig("stall", 1),
            sel: config.byte_select_width().map(|w| sig("sel", w)),
        }
    }

    /// A host and a device wired back to back over shared signals.
    pub fn pair(&self, config: BusConfig) -> (HostModel, DeviceModel, Wires) {
        let wires = self.bus("bus", &config);
        let host = SignalBinding::bind(Role::Host, config, wires.clone()).expect("host bind");
        let device =
            SignalBinding::bind(Role::Device, config, wires.clone()).expect("device bind");
        (
            HostModel::new(host, self.clk.clone()).expect("host"),
            DeviceModel::new(device, self.clk.clone()).expect("device"),
            wires,
        )
    }

    pub fn run<T>(&self, handle: &mut JoinHandle<T>) -> WbResult<T> {
        self.sim.run_until_timeout(handle, WATCHDOG_NS, "ns")
    }
}

/// Pass-through interconnect: `tb.bridge.s` faces a host, `tb.bridge.m` faces a
/// device, both with the usual `wb_*_i` / `wb_*_o` names.
pub fn bridge(bench: &Bench, config: &BusConfig) -> (SimObject, SimObject) {
    let s = bench.sim.root().add_scope("bridge.s").expect("s");
    let m = bench.sim.root().add_scope("bridge.m").expect("m");
    let aw = config.address_width();
    let dw = config.data_width();
    let mut forward = vec![
        ("cyc", 1),
        ("stb", 1),
        ("we", 1),
        ("adr", aw),
        ("dat", dw),
    ];
    if let Some(w) = config.byte_select_width() {
        forward.push(("sel", w));
    }
    for (name, width) in forward {
        let src = s.add_signal(&format!("wb_{}_i", name), width).expect("src");
        let dst = m.add_signal(&format!("wb_{}_o", name), width).expect("dst");
        Task::fork(&bench.sim, utils::assign(dst, src));
    }
    for (name, width) in [("dat", dw), ("ack", 1), ("stall", 1)] {
        let src = m.add_signal(&format!("wb_{}_i", name), width).expect("src");
        let dst = s.add_signal(&format!("wb_{}_o", name), width).expect("dst");
        Task::fork(&bench.sim, utils::assign(dst, src));
    }
    (s, m)
}

/// Register-based GPIO block, behaving like synthesizable RTL: everything happens on
/// the rising edge from the values before the edge. Two 32-bit words at offsets 0
/// and 4. `cfg` bit n makes word n an output driven from the written register;
/// otherwise the word reads the `gpio_i` input.
pub struct Gpio {
    pub scope: SimObject,
    pub rst_n: SimObject,
    pub cfg: SimObject,
    pub gpio_i: SimObject,
    pub gpio_o: SimObject,
}

impl Gpio {
    pub fn new(bench: &Bench) -> Self {
        let scope = bench.sim.root().add_scope("gpio").expect("gpio");
        let sig = |n: &str, w: u32| scope.add_signal(n, w).expect("gpio signal");
        for n in ["wb_cyc_i", "wb_stb_i", "wb_we_i", "wb_ack_o", "wb_stall_o"] {
            sig(n, 1);
        }
        sig("wb_adr_i", 3);
        sig("wb_dat_i", 32);
        sig("wb_dat_o", 32);
        sig("wb_sel_i", 4);
        let gpio = Gpio {
            rst_n: sig("rst_n", 1),
            cfg: sig("cfg", 2),
            gpio_i: sig("gpio_i", 64),
            gpio_o: sig("gpio_o", 64),
            scope: scope.clone(),
        };
        Task::spawn_named(
            &bench.sim,
            "gpio",
            gpio_logic(scope, bench.clk.clone()),
        );
        gpio
    }
}

fn byte_mask(sel: u64) -> u64 {
    (0..4_u32)
        .filter(|i| sel >> i & 1 == 1)
        .fold(0_u64, |mask, i| mask | 0xFF_u64 << (8 * i))
}

async fn gpio_logic(scope: SimObject, clk: SimObject) -> WbResult<()> {
    let c = |n: &str| scope.get_child(n);
    let (cyc, stb, we, adr) = (c("wb_cyc_i")?, c("wb_stb_i")?, c("wb_we_i")?, c("wb_adr_i")?);
    let (dat_i, sel, dat_o, ack) = (c("wb_dat_i")?, c("wb_sel_i")?, c("wb_dat_o")?, c("wb_ack_o")?);
    let (rst_n, cfg, gpio_i, gpio_o) = (c("rst_n")?, c("cfg")?, c("gpio_i")?, c("gpio_o")?);
    let mut regs = [0_u64; 2];
    loop {
        clk.rising_edge().await;
        if !rst_n.is_high()? {
            regs = [0; 2];
            ack.set(0)?;
            dat_o.set(0)?;
            gpio_o.set(0)?;
            continue;
        }
        let request = cyc.is_high()? && stb.is_high()?;
        let word = (adr.u64()? >> 2) as usize & 1;
        if request && we.is_high()? {
            let mask = byte_mask(sel.u64()?);
            regs[word] = regs[word] & !mask | dat_i.u64()? & mask;
        }
        if request && !we.is_high()? {
            let output = cfg.u64()? >> word & 1 == 1;
            let value = if output {
                regs[word]
            } else {
                gpio_i.u64()? >> (32 * word) & 0xFFFF_FFFF
            };
            dat_o.set(value)?;
        }
        ack.set(u64::from(request))?;
        let cfg_bits = cfg.u64()?;
        let mut out = 0;
        for (n, reg) in regs.iter().enumerate() {
            if cfg_bits >> n & 1 == 1 {
                out |= reg << (32 * n);
            }
        }
        gpio_o.set(out)?;
    }
}
