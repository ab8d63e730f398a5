//! Bus transfer errors.

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// The transfer or the bus lock did not complete within the timeout.
    #[error("bus operation timed out")]
    Timeout,
    /// The peripheral reported a fault (overrun, mode fault).
    #[error("bus hardware error")]
    Hardware,
    /// The peripheral rejected a device configuration.
    #[error("bus configuration rejected")]
    Configuration,
    /// The peripheral does not implement the requested operation.
    #[error("operation not supported by the bus")]
    NotSupported,
}

impl embedded_hal::spi::Error for BusError {
    fn kind(&self) -> embedded_hal::spi::ErrorKind {
        match self {
            Self::Hardware => embedded_hal::spi::ErrorKind::Overrun,
            _ => embedded_hal::spi::ErrorKind::Other,
        }
    }
}

pub type BusResult<T> = Result<T, BusError>;
