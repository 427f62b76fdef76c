use crate::{WbError, WbResult};

#[inline]
pub(crate) fn width_mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1_u64 << width) - 1
    }
}

#[inline]
pub(crate) fn fits(value: u64, width: u32) -> bool {
    value & !width_mask(width) == 0
}

fn check_width(what: &'static str, width: u32) -> WbResult<u32> {
    if (1..=64).contains(&width) {
        Ok(width)
    } else {
        Err(WbError::InvalidWidth { what, width })
    }
}

/// Address/data geometry of one bus. Fixed once a model is bound to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BusConfig {
    address_width: u32,
    data_width: u32,
    byte_select_width: Option<u32>,
}

impl BusConfig {
    pub fn new(address_width: u32, data_width: u32) -> WbResult<Self> {
        Ok(BusConfig {
            address_width: check_width("address", address_width)?,
            data_width: check_width("data", data_width)?,
            byte_select_width: None,
        })
    }

    /// Adds a sel wire with one bit per byte lane of the data bus.
    pub fn with_byte_select(mut self, width: u32) -> WbResult<Self> {
        if width != self.data_width.div_ceil(8) {
            return Err(WbError::InvalidWidth {
                what: "byte select",
                width,
            });
        }
        self.byte_select_width = Some(width);
        Ok(self)
    }

    pub fn address_width(&self) -> u32 {
        self.address_width
    }

    pub fn data_width(&self) -> u32 {
        self.data_width
    }

    pub fn byte_select_width(&self) -> Option<u32> {
        self.byte_select_width
    }

    pub fn fits_address(&self, address: u64) -> bool {
        fits(address, self.address_width)
    }

    pub fn fits_data(&self, data: u64) -> bool {
        fits(data, self.data_width)
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        BusConfig {
            address_width: 32,
            data_width: 32,
            byte_select_width: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimConfig {
    /// Name of the top level scope every signal lives under.
    pub root: String,
    /// Simulation time step as a power of ten of a second, -12 being 1ps.
    pub precision: i8,
    /// Delta cycles allowed within one time step before assuming a combinational loop.
    pub max_deltas: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            root: "tb".to_string(),
            precision: -12,
            max_deltas: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_outside_a_word_are_rejected() {
        assert_eq!(
            BusConfig::new(0, 32).unwrap_err(),
            WbError::InvalidWidth { what: "address", width: 0 }
        );
        assert_eq!(
            BusConfig::new(32, 65).unwrap_err(),
            WbError::InvalidWidth { what: "data", width: 65 }
        );
        assert!(BusConfig::new(64, 64).is_ok());
    }

    #[test]
    fn three_bit_bus_accepts_word_offsets_only_up_to_seven() {
        let config = BusConfig::new(3, 32).unwrap();
        assert!(config.fits_address(4));
        assert!(config.fits_address(7));
        assert!(!config.fits_address(8));
        assert!(config.fits_data(0xFFFF_FFFF));
        assert!(!config.fits_data(0x1_0000_0000));
    }

    #[test]
    fn byte_select_has_one_bit_per_lane() {
        let config = BusConfig::new(3, 32).unwrap();
        assert_eq!(config.with_byte_select(4).unwrap().byte_select_width(), Some(4));
        assert_eq!(
            config.with_byte_select(2).unwrap_err(),
            WbError::InvalidWidth { what: "byte select", width: 2 }
        );
        let narrow = BusConfig::new(8, 12).unwrap();
        assert!(narrow.with_byte_select(2).is_ok());
    }

    #[test]
    fn full_width_mask_does_not_overflow() {
        assert_eq!(width_mask(64), u64::MAX);
        assert_eq!(width_mask(1), 1);
        assert!(fits(u64::MAX, 64));
    }
}
