use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Access {
    Read,
    Write,
}

impl Access {
    pub fn is_write(self) -> bool {
        matches!(self, Access::Write)
    }

    /// Level of the `we` wire for this kind of access.
    pub fn we(self) -> u64 {
        u64::from(self.is_write())
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Read => f.write_str("read"),
            Access::Write => f.write_str("write"),
        }
    }
}

/// The one request a model has in flight. Lives for a single `read`/`write` or
/// `serve_*` call.
///
/// `stall_budget` is, on the host, the number of stall cycles tolerated before giving
/// up (`None` waits forever) and, on the device, the resolved number of stall cycles
/// inserted before accepting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingTransaction {
    pub kind: Access,
    pub address: u64,
    pub data: Option<u64>,
    pub byte_enable: Option<u64>,
    pub stall_budget: Option<u64>,
}

impl PendingTransaction {
    pub fn read(address: u64) -> Self {
        PendingTransaction {
            kind: Access::Read,
            address,
            data: None,
            byte_enable: None,
            stall_budget: None,
        }
    }

    pub fn write(address: u64, data: u64, byte_enable: Option<u64>) -> Self {
        PendingTransaction {
            kind: Access::Write,
            address,
            data: Some(data),
            byte_enable,
            stall_budget: None,
        }
    }

    pub fn with_stall_budget(mut self, budget: Option<u64>) -> Self {
        self.stall_budget = budget;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn we_level_follows_access_kind() {
        assert_eq!(Access::Write.we(), 1);
        assert_eq!(Access::Read.we(), 0);
        assert_eq!(Access::Write.to_string(), "write");
    }
}
