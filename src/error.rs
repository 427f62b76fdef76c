use thiserror::Error;

use crate::transaction::Access;

pub type WbResult<T> = Result<T, WbError>;

/// Bus behaviour that breaks the Wishbone B4 pipelined handshake.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("cyc must accompany stb")]
    StbWithoutCyc,
    #[error("we mismatch for {expected}")]
    WeMismatch { expected: Access },
    #[error("ack not observed one cycle after request to {address:#x} was accepted")]
    MissingAck { address: u64 },
    #[error("request signal {signal} changed while stalled")]
    RequestChanged { signal: &'static str },
    #[error("ack asserted without an outstanding request")]
    UnexpectedAck,
    #[error("cyc dropped with {outstanding} request(s) outstanding")]
    CycDropped { outstanding: u32 },
    #[error("cyc held without stb for {cycles} idle cycles")]
    CycIdle { cycles: u32 },
}

/// Caller misuse of a model, not a fault of the peer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("read of address {address:#x} which was never written")]
    UnwrittenAddress { address: u64 },
    #[error("address {address:#x} does not fit in {width} bits")]
    AddressOutOfRange { address: u64, width: u32 },
    #[error("data {data:#x} does not fit in {width} bits")]
    DataOutOfRange { data: u64, width: u32 },
    #[error("byte enable {mask:#x} does not fit in {width} bits")]
    ByteEnableOutOfRange { mask: u64, width: u32 },
    #[error("byte enable given but no sel signal is bound")]
    NoByteSelect,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WbError {
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),
    #[error("precondition failed: {0}")]
    Precondition(#[from] PreconditionError),
    #[error("required signal {0} not found")]
    MissingSignal(String),
    #[error("no object named {0}")]
    UnknownObject(String),
    #[error("{0} is a scope, not a signal")]
    NotASignal(String),
    #[error("signal {0} already declared")]
    DuplicateSignal(String),
    #[error("signal {signal} is {actual} bits wide, expected {expected}")]
    WidthMismatch {
        signal: String,
        expected: u32,
        actual: u32,
    },
    #[error("invalid {what} width {width}, must be within 1..=64")]
    InvalidWidth { what: &'static str, width: u32 },
    #[error("binding was made for the {actual:?} role, expected {expected:?}")]
    RoleMismatch {
        expected: crate::binding::Role,
        actual: crate::binding::Role,
    },
    #[error("write to {0} during the read-only region")]
    WriteInReadOnly(String),
    #[error("delta cycle limit exceeded at time step {time}")]
    DeltaLimit { time: u64 },
    #[error("gave up waiting for {waiting_for} after {cycles} cycles")]
    Timeout {
        waiting_for: &'static str,
        cycles: u64,
    },
    #[error("watchdog expired at time step {time} before task {task} finished")]
    WatchdogExpired { task: String, time: u64 },
    #[error("simulation ran out of events before task {0} finished")]
    SimIdle(String),
    #[error("task {0} was cancelled")]
    Cancelled(String),
    #[error("invalid time unit {0}")]
    InvalidTimeUnit(String),
    #[error("time {time} {unit} is not a whole number of simulation steps")]
    TimeNotRepresentable { time: f64, unit: String },
    #[error("clock period of {0} steps is too short")]
    InvalidClockPeriod(u64),
}
