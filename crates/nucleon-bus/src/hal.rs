//! `embedded-hal` adapter, so ecosystem drivers can run on an arbitrated
//! device. Transfers use the device's configured timeout.

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::{ErrorType, SpiBus};

use crate::bus::{self, ActiveDevice};
use crate::device::Acquired;
use crate::error::{BusError, BusResult};
use crate::peripheral::SpiPeripheral;

macro_rules! impl_spi_bus {
    ($ty:ident < $($lt:lifetime),+ >) => {
        impl<$($lt,)+ P: SpiPeripheral, CS: OutputPin> ErrorType for $ty<$($lt,)+ P, CS> {
            type Error = BusError;
        }

        impl<$($lt,)+ P: SpiPeripheral, CS: OutputPin> SpiBus<u8> for $ty<$($lt,)+ P, CS> {
            fn read(&mut self, words: &mut [u8]) -> BusResult<()> {
                let (peripheral, device) = self.parts();
                bus::read(peripheral, device, words, device.timeout())
            }

            fn write(&mut self, words: &[u8]) -> BusResult<()> {
                let (peripheral, device) = self.parts();
                bus::write(peripheral, device, words, device.timeout())
            }

            fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> BusResult<()> {
                let (peripheral, device) = self.parts();
                if read.len() == write.len() {
                    return bus::exchange(peripheral, device, write, read, device.timeout());
                }
                // Pad the shorter side: filler bytes out, surplus bytes in
                // are discarded.
                let len = read.len().max(write.len());
                let mut tx = write.to_vec();
                tx.resize(len, 0x00);
                let mut rx = vec![0u8; len];
                bus::exchange(peripheral, device, &tx, &mut rx, device.timeout())?;
                let count = read.len();
                read.copy_from_slice(&rx[..count]);
                Ok(())
            }

            fn transfer_in_place(&mut self, words: &mut [u8]) -> BusResult<()> {
                let (peripheral, device) = self.parts();
                let tx = words.to_vec();
                bus::exchange(peripheral, device, &tx, words, device.timeout())
            }

            fn flush(&mut self) -> BusResult<()> {
                Ok(())
            }
        }
    };
}

impl_spi_bus!(ActiveDevice<'a, 'b, 'd>);
impl_spi_bus!(Acquired<'d, 'b>);
