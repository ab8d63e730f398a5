//! # nucleon-bus
//!
//! Arbitration of one SPI controller between several device drivers.
//!
//! Each driver owns a [`Device`]: a chip-select line and the electrical
//! profile ([`SpiConfig`]) the controller needs to talk to it. A transaction
//! locks the [`Bus`], activates the device (the controller is reconfigured
//! and chip-select asserted), transfers, then deactivates and unlocks.
//! [`Device::acquire`] does all of that in one call:
//!
//! ```no_run
//! # use nucleon_bus::{Bus, SpiConfig, SpiMode, SpiPeripheral};
//! # use embedded_hal::digital::OutputPin;
//! # fn demo<P: SpiPeripheral, CS: OutputPin>(bus: &Bus<P>, cs: CS) -> nucleon_bus::BusResult<()> {
//! let mut display = bus.device(SpiConfig::new(8_000_000, SpiMode::Mode0), cs);
//! display.init();
//! let mut spi = display.acquire();
//! spi.write(&[0x2c, 0x00, 0xff], nucleon::Timeout::millis(10))?;
//! spi.release();
//! # Ok(())
//! # }
//! ```
//!
//! While a device is acquired, the system is kept out of deep sleep through
//! [`nucleon::Insomnia`].

pub mod bus;
pub mod config;
pub mod device;
pub mod error;
pub mod hal;
pub mod peripheral;

pub use bus::{ActiveDevice, Bus, LockedBus};
pub use config::{BitOrder, SpiConfig, SpiMode};
pub use device::{Acquired, Device, DeviceEvent, DeviceId, DEFAULT_TIMEOUT};
pub use error::{BusError, BusResult};
pub use peripheral::SpiPeripheral;
