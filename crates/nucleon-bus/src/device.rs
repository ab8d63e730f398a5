//! Devices wired to a shared bus.

use core::fmt;
use core::num::NonZeroU32;
use core::time::Duration;

use embedded_hal::digital::OutputPin;
use nucleon::check;
use nucleon::power::InsomniaGuard;
use nucleon::Timeout;

use crate::bus::{self, Bus, LockedBus};
use crate::config::SpiConfig;
use crate::error::BusResult;
use crate::peripheral::SpiPeripheral;

/// Transfer timeout used when a device is driven through `embedded-hal`.
pub const DEFAULT_TIMEOUT: Timeout = Timeout::After(Duration::from_millis(100));

/// Identifies a device within its bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(NonZeroU32);

impl DeviceId {
    #[track_caller]
    pub(crate) fn new(raw: u32) -> Self {
        match NonZeroU32::new(raw) {
            Some(raw) => Self(raw),
            None => check::crash("device id space exhausted"),
        }
    }

    pub(crate) fn from_raw(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

/// Lifecycle notifications delivered to a device's hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    /// The driver brought the device up; chip-select is idle.
    Init,
    Deinit,
    /// Chip-select was just asserted.
    Activate,
    /// Chip-select is about to be released.
    Deactivate,
}

type Hook = Box<dyn FnMut(DeviceEvent) + Send>;

/// A chip-select line plus the configuration the bus must apply before
/// talking to it.
pub struct Device<'b, P: SpiPeripheral, CS: OutputPin> {
    bus: &'b Bus<P>,
    id: DeviceId,
    config: SpiConfig,
    chip_select: CS,
    timeout: Timeout,
    hook: Option<Hook>,
}

impl<'b, P: SpiPeripheral, CS: OutputPin> Device<'b, P, CS> {
    pub(crate) fn new(bus: &'b Bus<P>, id: DeviceId, config: SpiConfig, chip_select: CS) -> Self {
        Self {
            bus,
            id,
            config,
            chip_select,
            timeout: DEFAULT_TIMEOUT,
            hook: None,
        }
    }

    /// Installs a callback for [`DeviceEvent`]s, e.g. to drive a level
    /// shifter or a power switch alongside chip-select.
    pub fn with_hook<F>(mut self, hook: F) -> Self
    where
        F: FnMut(DeviceEvent) + Send + 'static,
    {
        self.hook = Some(Box::new(hook));
        self
    }

    /// Sets the timeout used by the `embedded-hal` adapter.
    pub fn with_timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn bus(&self) -> &'b Bus<P> {
        self.bus
    }

    pub fn config(&self) -> &SpiConfig {
        &self.config
    }

    pub fn timeout(&self) -> Timeout {
        self.timeout
    }

    /// Switches the electrical profile, e.g. from the slow identification
    /// clock of an SD card to its transfer clock. Applied on the next
    /// activation.
    pub fn set_config(&mut self, config: SpiConfig) {
        log::debug!(
            target: "bus",
            "{:?} on bus {} reprofiled to {} Hz",
            self.id,
            self.bus.id(),
            config.frequency
        );
        self.config = config;
    }

    /// Gives the chip-select line back, so another handle can be built on it.
    pub fn into_chip_select(self) -> CS {
        self.chip_select
    }

    /// Parks chip-select high and fires [`DeviceEvent::Init`].
    pub fn init(&mut self) {
        self.deselect();
        self.notify(DeviceEvent::Init);
        log::debug!(target: "bus", "{:?} on bus {} initialised", self.id, self.bus.id());
    }

    pub fn deinit(&mut self) {
        self.notify(DeviceEvent::Deinit);
        log::debug!(target: "bus", "{:?} on bus {} deinitialised", self.id, self.bus.id());
    }

    /// Locks the bus and activates this device in one step. The system stays
    /// out of deep sleep until the returned guard is released.
    #[track_caller]
    pub fn acquire(&mut self) -> Acquired<'_, 'b, P, CS> {
        let awake = self.bus.insomnia().enter();
        let mut locked = self.bus.lock();
        bus::begin(self.bus, &mut *locked.peripheral, self);
        Acquired {
            locked,
            device: self,
            _awake: awake,
        }
    }

    #[track_caller]
    pub(crate) fn select(&mut self) {
        if let Err(err) = self.chip_select.set_low() {
            check::crash(&format!("cannot assert chip-select of {:?}: {err:?}", self.id));
        }
    }

    #[track_caller]
    pub(crate) fn deselect(&mut self) {
        if let Err(err) = self.chip_select.set_high() {
            check::crash(&format!("cannot release chip-select of {:?}: {err:?}", self.id));
        }
    }

    pub(crate) fn notify(&mut self, event: DeviceEvent) {
        if let Some(hook) = self.hook.as_mut() {
            hook(event);
        }
    }
}

impl<P: SpiPeripheral, CS: OutputPin> fmt::Debug for Device<'_, P, CS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("bus", &self.bus.id())
            .field("config", &self.config)
            .finish()
    }
}

/// A locked bus with one device activated, held for a whole transaction.
pub struct Acquired<'d, 'b, P: SpiPeripheral, CS: OutputPin> {
    locked: LockedBus<'b, P>,
    device: &'d mut Device<'b, P, CS>,
    // Dropped last: sleep is allowed again only after the bus is free.
    _awake: InsomniaGuard<'static>,
}

impl<P: SpiPeripheral, CS: OutputPin> Acquired<'_, '_, P, CS> {
    pub fn exchange(&mut self, tx: &[u8], rx: &mut [u8], timeout: Timeout) -> BusResult<()> {
        bus::exchange(&mut *self.locked.peripheral, self.device, tx, rx, timeout)
    }

    pub fn write(&mut self, tx: &[u8], timeout: Timeout) -> BusResult<()> {
        bus::write(&mut *self.locked.peripheral, self.device, tx, timeout)
    }

    pub fn read(&mut self, rx: &mut [u8], timeout: Timeout) -> BusResult<()> {
        bus::read(&mut *self.locked.peripheral, self.device, rx, timeout)
    }

    pub fn reset(&mut self) -> BusResult<()> {
        bus::reset(&mut *self.locked.peripheral, self.device)
    }

    pub fn device_id(&self) -> DeviceId {
        self.device.id()
    }

    /// Deactivates the device and unlocks the bus. Equivalent to dropping.
    pub fn release(self) {}

    pub(crate) fn parts(&mut self) -> (&mut P, &Device<'_, P, CS>) {
        (&mut *self.locked.peripheral, &*self.device)
    }
}

impl<P: SpiPeripheral, CS: OutputPin> Drop for Acquired<'_, '_, P, CS> {
    fn drop(&mut self) {
        bus::end(self.locked.bus(), self.device);
    }
}
