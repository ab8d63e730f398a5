//! The bus controller a [`Bus`](crate::Bus) arbitrates.

use nucleon::Timeout;

use crate::config::SpiConfig;
use crate::error::BusResult;

/// One SPI controller. Implementations drive the hardware directly; the bus
/// guarantees calls never overlap.
pub trait SpiPeripheral: Send {
    /// Powers the controller up and puts it in a known state.
    fn init(&mut self) -> BusResult<()>;

    fn deinit(&mut self) -> BusResult<()>;

    /// Applies a device's electrical profile.
    fn configure(&mut self, config: &SpiConfig) -> BusResult<()>;

    /// Full-duplex transfer. `tx` and `rx` have the same length.
    fn exchange(&mut self, tx: &[u8], rx: &mut [u8], timeout: Timeout) -> BusResult<()>;

    /// Transmit-only transfer.
    fn write(&mut self, tx: &[u8], timeout: Timeout) -> BusResult<()>;

    /// Receive-only transfer; the controller clocks out filler bytes.
    fn read(&mut self, rx: &mut [u8], timeout: Timeout) -> BusResult<()>;
}

impl<T: SpiPeripheral + ?Sized> SpiPeripheral for Box<T> {
    fn init(&mut self) -> BusResult<()> {
        (**self).init()
    }

    fn deinit(&mut self) -> BusResult<()> {
        (**self).deinit()
    }

    fn configure(&mut self, config: &SpiConfig) -> BusResult<()> {
        (**self).configure(config)
    }

    fn exchange(&mut self, tx: &[u8], rx: &mut [u8], timeout: Timeout) -> BusResult<()> {
        (**self).exchange(tx, rx, timeout)
    }

    fn write(&mut self, tx: &[u8], timeout: Timeout) -> BusResult<()> {
        (**self).write(tx, timeout)
    }

    fn read(&mut self, rx: &mut [u8], timeout: Timeout) -> BusResult<()> {
        (**self).read(rx, timeout)
    }
}
