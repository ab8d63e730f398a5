//! Electrical profile a device needs from the bus.

use embedded_hal::spi::{Mode, Phase, Polarity};

/// Clock polarity and phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SpiMode {
    /// CPOL=0, CPHA=0
    Mode0,
    /// CPOL=0, CPHA=1
    Mode1,
    /// CPOL=1, CPHA=0
    Mode2,
    /// CPOL=1, CPHA=1
    Mode3,
}

impl From<SpiMode> for Mode {
    fn from(mode: SpiMode) -> Self {
        let (polarity, phase) = match mode {
            SpiMode::Mode0 => (Polarity::IdleLow, Phase::CaptureOnFirstTransition),
            SpiMode::Mode1 => (Polarity::IdleLow, Phase::CaptureOnSecondTransition),
            SpiMode::Mode2 => (Polarity::IdleHigh, Phase::CaptureOnFirstTransition),
            SpiMode::Mode3 => (Polarity::IdleHigh, Phase::CaptureOnSecondTransition),
        };
        Mode { polarity, phase }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BitOrder {
    MsbFirst,
    LsbFirst,
}

/// Configuration applied to the peripheral every time a device is activated.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpiConfig {
    /// Clock frequency in Hz.
    pub frequency: u32,
    pub mode: SpiMode,
    pub bit_order: BitOrder,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            frequency: 1_000_000,
            mode: SpiMode::Mode0,
            bit_order: BitOrder::MsbFirst,
        }
    }
}

impl SpiConfig {
    pub fn new(frequency: u32, mode: SpiMode) -> Self {
        Self {
            frequency,
            mode,
            ..Self::default()
        }
    }

    pub fn with_bit_order(mut self, bit_order: BitOrder) -> Self {
        self.bit_order = bit_order;
        self
    }

    /// The mode in `embedded-hal` terms.
    pub fn hal_mode(&self) -> Mode {
        self.mode.into()
    }
}
