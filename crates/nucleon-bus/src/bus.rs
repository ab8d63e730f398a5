//! Bus ownership and device activation.
//!
//! A bus moves through `Idle -> Locked -> Activated -> Locked -> Idle`:
//!
//! - [`Bus::lock`] returns a [`LockedBus`]; other lockers block until it is
//!   dropped.
//! - [`LockedBus::activate`] configures the controller for one device and
//!   asserts its chip-select, returning an [`ActiveDevice`] that borrows the
//!   locked bus. Only an active device can transfer.
//! - Dropping the [`ActiveDevice`] (or [`ActiveDevice::deactivate`]) releases
//!   chip-select and hands the locked bus back.
//!
//! The borrow structure makes "transfer without activation" and "two devices
//! active at once" unrepresentable. Locking twice from the same thread is
//! detected and fatal.

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};
use std::thread::{self, ThreadId};

use embedded_hal::digital::OutputPin;
use nucleon::check;
use nucleon::{Insomnia, Timeout};
use parking_lot::{Mutex, MutexGuard};

use crate::config::SpiConfig;
use crate::device::{Device, DeviceEvent, DeviceId};
use crate::error::{BusError, BusResult};
use crate::peripheral::SpiPeripheral;

static NEXT_BUS_ID: AtomicU32 = AtomicU32::new(1);

/// One shared controller and the devices wired to it.
pub struct Bus<P: SpiPeripheral> {
    id: u32,
    peripheral: Mutex<P>,
    /// Thread holding the lock, for re-lock detection.
    owner: Mutex<Option<ThreadId>>,
    /// Raw [`DeviceId`] of the active device, 0 when none.
    current: AtomicU32,
    next_device: AtomicU32,
    insomnia: &'static Insomnia,
}

impl<P: SpiPeripheral> Bus<P> {
    /// Wraps `peripheral`; transactions hold the process-wide insomnia level.
    pub fn new(peripheral: P) -> Self {
        Self::with_insomnia(peripheral, Insomnia::global())
    }

    pub fn with_insomnia(peripheral: P, insomnia: &'static Insomnia) -> Self {
        Self {
            id: NEXT_BUS_ID.fetch_add(1, Ordering::Relaxed),
            peripheral: Mutex::new(peripheral),
            owner: Mutex::new(None),
            current: AtomicU32::new(0),
            next_device: AtomicU32::new(1),
            insomnia,
        }
    }

    /// Powers the controller up.
    pub fn init(&self) -> BusResult<()> {
        let mut locked = self.lock();
        locked.peripheral.init()?;
        log::debug!(target: "bus", "bus {} initialised", self.id);
        Ok(())
    }

    pub fn deinit(&self) -> BusResult<()> {
        let mut locked = self.lock();
        locked.peripheral.deinit()?;
        log::debug!(target: "bus", "bus {} deinitialised", self.id);
        Ok(())
    }

    /// Registers a device on this bus.
    pub fn device<CS: OutputPin>(&self, config: SpiConfig, chip_select: CS) -> Device<'_, P, CS> {
        let id = DeviceId::new(self.next_device.fetch_add(1, Ordering::Relaxed));
        Device::new(self, id, config, chip_select)
    }

    /// Blocks until the bus is free.
    #[track_caller]
    pub fn lock(&self) -> LockedBus<'_, P> {
        self.check_not_owner();
        let peripheral = self.peripheral.lock();
        self.locked(peripheral)
    }

    /// Waits at most `timeout` for the bus.
    #[track_caller]
    pub fn try_lock(&self, timeout: Timeout) -> BusResult<LockedBus<'_, P>> {
        self.check_not_owner();
        let peripheral = match timeout {
            Timeout::Immediate => self.peripheral.try_lock(),
            Timeout::After(limit) => self.peripheral.try_lock_for(limit),
            Timeout::Forever => Some(self.peripheral.lock()),
        };
        match peripheral {
            Some(peripheral) => Ok(self.locked(peripheral)),
            None => {
                log::warn!(target: "bus", "bus {} still busy after {timeout:?}", self.id);
                Err(BusError::Timeout)
            }
        }
    }

    /// The device currently activated, if any.
    pub fn current_device(&self) -> Option<DeviceId> {
        DeviceId::from_raw(self.current.load(Ordering::Acquire))
    }

    pub fn is_locked(&self) -> bool {
        self.peripheral.is_locked()
    }

    pub(crate) fn id(&self) -> u32 {
        self.id
    }

    pub(crate) fn insomnia(&self) -> &'static Insomnia {
        self.insomnia
    }

    #[track_caller]
    fn check_not_owner(&self) {
        let me = thread::current().id();
        check!(
            *self.owner.lock() != Some(me),
            "bus {} locked again by the thread that holds it",
            self.id
        );
    }

    fn locked<'b>(&'b self, peripheral: MutexGuard<'b, P>) -> LockedBus<'b, P> {
        *self.owner.lock() = Some(thread::current().id());
        log::trace!(target: "bus", "bus {} locked", self.id);
        LockedBus {
            bus: self,
            peripheral,
        }
    }
}

impl<P: SpiPeripheral> fmt::Debug for Bus<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("id", &self.id)
            .field("locked", &self.is_locked())
            .field("current", &self.current_device())
            .finish()
    }
}

/// Exclusive ownership of a bus. Dropping it unlocks.
pub struct LockedBus<'b, P: SpiPeripheral> {
    bus: &'b Bus<P>,
    pub(crate) peripheral: MutexGuard<'b, P>,
}

impl<'b, P: SpiPeripheral> LockedBus<'b, P> {
    /// Configures the controller for `device` and asserts its chip-select.
    ///
    /// The device must belong to this bus.
    #[track_caller]
    pub fn activate<'a, 'd, CS: OutputPin>(
        &'a mut self,
        device: &'d mut Device<'b, P, CS>,
    ) -> ActiveDevice<'a, 'b, 'd, P, CS> {
        begin(self.bus, &mut *self.peripheral, device);
        ActiveDevice {
            locked: self,
            device,
        }
    }

    /// Unlocks the bus. Equivalent to dropping it.
    pub fn unlock(self) {}

    pub fn bus(&self) -> &'b Bus<P> {
        self.bus
    }
}

impl<P: SpiPeripheral> Drop for LockedBus<'_, P> {
    fn drop(&mut self) {
        *self.bus.owner.lock() = None;
        log::trace!(target: "bus", "bus {} unlocked", self.bus.id);
    }
}

/// A device with chip-select asserted on a locked bus.
pub struct ActiveDevice<'a, 'b, 'd, P: SpiPeripheral, CS: OutputPin> {
    locked: &'a mut LockedBus<'b, P>,
    device: &'d mut Device<'b, P, CS>,
}

impl<P: SpiPeripheral, CS: OutputPin> ActiveDevice<'_, '_, '_, P, CS> {
    /// Full-duplex transfer of `tx.len()` bytes.
    pub fn exchange(&mut self, tx: &[u8], rx: &mut [u8], timeout: Timeout) -> BusResult<()> {
        exchange(&mut *self.locked.peripheral, self.device, tx, rx, timeout)
    }

    pub fn write(&mut self, tx: &[u8], timeout: Timeout) -> BusResult<()> {
        write(&mut *self.locked.peripheral, self.device, tx, timeout)
    }

    pub fn read(&mut self, rx: &mut [u8], timeout: Timeout) -> BusResult<()> {
        read(&mut *self.locked.peripheral, self.device, rx, timeout)
    }

    /// Re-initialises the controller and reapplies this device's
    /// configuration, typically after a timeout.
    pub fn reset(&mut self) -> BusResult<()> {
        reset(&mut *self.locked.peripheral, self.device)
    }

    pub fn device_id(&self) -> DeviceId {
        self.device.id()
    }

    /// Deasserts chip-select. The locked bus is usable again afterwards.
    pub fn deactivate(self) {}

    pub(crate) fn parts(&mut self) -> (&mut P, &Device<'_, P, CS>) {
        (&mut *self.locked.peripheral, &*self.device)
    }
}

impl<P: SpiPeripheral, CS: OutputPin> Drop for ActiveDevice<'_, '_, '_, P, CS> {
    fn drop(&mut self) {
        end(self.locked.bus, self.device);
    }
}

#[track_caller]
pub(crate) fn begin<P: SpiPeripheral, CS: OutputPin>(
    bus: &Bus<P>,
    peripheral: &mut P,
    device: &mut Device<'_, P, CS>,
) {
    check!(
        device.bus().id() == bus.id(),
        "{:?} belongs to bus {}, not bus {}",
        device.id(),
        device.bus().id(),
        bus.id()
    );
    check!(
        bus.current.load(Ordering::Acquire) == 0,
        "bus {} already has an active device",
        bus.id()
    );

    if let Err(err) = peripheral.configure(device.config()) {
        check::crash(&format!("cannot configure bus {} for {:?}: {err}", bus.id(), device.id()));
    }
    device.select();
    device.notify(DeviceEvent::Activate);
    bus.current.store(device.id().get(), Ordering::Release);
    log::trace!(target: "bus", "bus {} activated {:?}", bus.id(), device.id());
}

pub(crate) fn end<P: SpiPeripheral, CS: OutputPin>(bus: &Bus<P>, device: &mut Device<'_, P, CS>) {
    device.notify(DeviceEvent::Deactivate);
    device.deselect();
    bus.current.store(0, Ordering::Release);
    log::trace!(target: "bus", "bus {} deactivated {:?}", bus.id(), device.id());
}

#[track_caller]
pub(crate) fn exchange<P: SpiPeripheral, CS: OutputPin>(
    peripheral: &mut P,
    device: &Device<'_, P, CS>,
    tx: &[u8],
    rx: &mut [u8],
    timeout: Timeout,
) -> BusResult<()> {
    check!(
        tx.len() == rx.len(),
        "exchange buffers differ in length ({} vs {})",
        tx.len(),
        rx.len()
    );
    report(device, peripheral.exchange(tx, rx, timeout))
}

pub(crate) fn write<P: SpiPeripheral, CS: OutputPin>(
    peripheral: &mut P,
    device: &Device<'_, P, CS>,
    tx: &[u8],
    timeout: Timeout,
) -> BusResult<()> {
    report(device, peripheral.write(tx, timeout))
}

pub(crate) fn read<P: SpiPeripheral, CS: OutputPin>(
    peripheral: &mut P,
    device: &Device<'_, P, CS>,
    rx: &mut [u8],
    timeout: Timeout,
) -> BusResult<()> {
    report(device, peripheral.read(rx, timeout))
}

pub(crate) fn reset<P: SpiPeripheral, CS: OutputPin>(
    peripheral: &mut P,
    device: &Device<'_, P, CS>,
) -> BusResult<()> {
    log::info!(target: "bus", "resetting bus {} for {:?}", device.bus().id(), device.id());
    peripheral.deinit()?;
    peripheral.init()?;
    peripheral.configure(device.config())
}

fn report<P: SpiPeripheral, CS: OutputPin>(
    device: &Device<'_, P, CS>,
    result: BusResult<()>,
) -> BusResult<()> {
    if let Err(err) = result {
        log::warn!(target: "bus", "{:?} transfer failed: {err}", device.id());
    }
    result
}
