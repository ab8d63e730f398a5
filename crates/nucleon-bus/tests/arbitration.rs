//! Two drivers with different electrical profiles sharing one controller.

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use embedded_hal::digital::{ErrorType, OutputPin};
use embedded_hal::spi::SpiBus;
use nucleon::{Insomnia, Timeout};
use nucleon_bus::{Bus, BusResult, Device, SpiConfig, SpiMode, SpiPeripheral};

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Configure(u32),
    Select(u8),
    Deselect(u8),
    Transfer(Vec<u8>),
}

#[derive(Default)]
struct Wire {
    events: Mutex<Vec<Event>>,
    in_transfer: AtomicBool,
    overlaps: AtomicUsize,
}

impl Wire {
    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

/// Controller that notices when two transfers run at the same time.
struct SharedController {
    wire: Arc<Wire>,
}

impl SharedController {
    fn transfer(&mut self, tx: &[u8]) -> BusResult<()> {
        if self.wire.in_transfer.swap(true, Ordering::AcqRel) {
            self.wire.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.wire.push(Event::Transfer(tx.to_vec()));
        thread::sleep(Duration::from_micros(50));
        self.wire.in_transfer.store(false, Ordering::Release);
        Ok(())
    }
}

impl SpiPeripheral for SharedController {
    fn init(&mut self) -> BusResult<()> {
        Ok(())
    }

    fn deinit(&mut self) -> BusResult<()> {
        Ok(())
    }

    fn configure(&mut self, config: &SpiConfig) -> BusResult<()> {
        self.wire.push(Event::Configure(config.frequency));
        Ok(())
    }

    fn exchange(&mut self, tx: &[u8], rx: &mut [u8], _timeout: Timeout) -> BusResult<()> {
        rx.copy_from_slice(tx);
        self.transfer(tx)
    }

    fn write(&mut self, tx: &[u8], _timeout: Timeout) -> BusResult<()> {
        self.transfer(tx)
    }

    fn read(&mut self, rx: &mut [u8], _timeout: Timeout) -> BusResult<()> {
        rx.fill(0);
        self.transfer(rx)
    }
}

struct ChipSelect {
    tag: u8,
    wire: Arc<Wire>,
}

impl ErrorType for ChipSelect {
    type Error = Infallible;
}

impl OutputPin for ChipSelect {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.wire.push(Event::Select(self.tag));
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.wire.push(Event::Deselect(self.tag));
        Ok(())
    }
}

const DISPLAY: u8 = 1;
const RADIO: u8 = 2;

fn profile(tag: u8) -> SpiConfig {
    match tag {
        DISPLAY => SpiConfig::new(8_000_000, SpiMode::Mode0),
        _ => SpiConfig::new(2_000_000, SpiMode::Mode3),
    }
}

#[test]
fn drivers_never_interleave_and_always_see_their_profile() {
    static INSOMNIA: Insomnia = Insomnia::new();
    let wire = Arc::new(Wire::default());
    let bus = Bus::with_insomnia(
        SharedController {
            wire: Arc::clone(&wire),
        },
        &INSOMNIA,
    );

    thread::scope(|scope| {
        for tag in [DISPLAY, RADIO] {
            let bus = &bus;
            let wire = Arc::clone(&wire);
            scope.spawn(move || {
                let mut device = bus.device(profile(tag), ChipSelect { tag, wire });
                device.init();
                for round in 0..100u8 {
                    let mut spi = device.acquire();
                    spi.write(&[tag, round], Timeout::millis(10))
                        .expect("write should succeed");
                    spi.write(&[tag, round], Timeout::millis(10))
                        .expect("write should succeed");
                    spi.release();
                }
            });
        }
    });

    assert_eq!(wire.overlaps.load(Ordering::SeqCst), 0);
    assert!(INSOMNIA.is_sleep_allowed());

    // Replay the wire: every transfer must come from the selected device,
    // after that device's profile was applied.
    let mut frequency = None;
    let mut selected = None;
    let mut transfers = 0;
    for event in wire.events.lock().unwrap().iter() {
        match event {
            Event::Configure(hz) => {
                assert_eq!(selected, None, "reconfigured with a device selected");
                frequency = Some(*hz);
            }
            Event::Select(tag) => {
                assert_eq!(selected, None, "two devices selected at once");
                assert_eq!(frequency, Some(profile(*tag).frequency));
                selected = Some(*tag);
            }
            Event::Deselect(tag) => {
                if selected == Some(*tag) {
                    selected = None;
                }
            }
            Event::Transfer(bytes) => {
                assert_eq!(selected, Some(bytes[0]));
                transfers += 1;
            }
        }
    }
    assert_eq!(transfers, 400);
}

const FRAME: [u8; 16] = [DISPLAY; 16];
const REPLY: [u8; 4] = [RADIO; 4];

/// The radio only gets the wire after the display's frame, and only after
/// its own profile was applied.
fn assert_handover(wire: &Wire) {
    assert_eq!(wire.overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(
        *wire.events.lock().unwrap(),
        vec![
            Event::Configure(8_000_000),
            Event::Select(DISPLAY),
            Event::Transfer(FRAME.to_vec()),
            Event::Deselect(DISPLAY),
            Event::Configure(2_000_000),
            Event::Select(RADIO),
            Event::Transfer(REPLY.to_vec()),
            Event::Deselect(RADIO),
        ]
    );
}

fn devices<'b>(
    bus: &'b Bus<SharedController>,
    wire: &Arc<Wire>,
) -> [Device<'b, SharedController, ChipSelect>; 2] {
    [DISPLAY, RADIO].map(|tag| {
        bus.device(
            profile(tag),
            ChipSelect {
                tag,
                wire: Arc::clone(wire),
            },
        )
    })
}

#[test]
fn second_locker_blocks_until_the_first_releases() {
    let wire = Arc::new(Wire::default());
    let bus = Bus::new(SharedController {
        wire: Arc::clone(&wire),
    });
    let (locked_tx, locked_rx) = mpsc::channel();
    let hold = Duration::from_millis(50);

    thread::scope(|scope| {
        let [mut display, mut radio] = devices(&bus, &wire);

        scope.spawn(move || {
            let mut spi = display.acquire();
            locked_tx.send(Instant::now()).expect("receiver alive");
            thread::sleep(hold);
            spi.write(&FRAME, Timeout::millis(10))
                .expect("frame write should succeed");
            spi.release();
        });

        let first_locked = locked_rx.recv().expect("first driver locks");
        assert!(bus.is_locked());
        let mut spi = radio.acquire();
        assert!(first_locked.elapsed() >= hold);
        assert_eq!(bus.current_device(), Some(spi.device_id()));
        spi.write(&REPLY, Timeout::millis(10))
            .expect("reply write should succeed");
    });

    assert_handover(&wire);
}

#[test]
fn active_device_keeps_other_lockers_out() {
    let wire = Arc::new(Wire::default());
    let bus = Bus::new(SharedController {
        wire: Arc::clone(&wire),
    });
    let (locked_tx, locked_rx) = mpsc::channel();
    let hold = Duration::from_millis(50);

    thread::scope(|scope| {
        let bus = &bus;
        let [mut display, mut radio] = devices(bus, &wire);

        scope.spawn(move || {
            let mut locked = bus.lock();
            let mut active = locked.activate(&mut display);
            locked_tx.send(Instant::now()).expect("receiver alive");
            thread::sleep(hold);
            active
                .write(&FRAME, Timeout::millis(10))
                .expect("frame write should succeed");
            active.deactivate();
            locked.unlock();
        });

        let first_locked = locked_rx.recv().expect("first driver locks");
        let mut locked = bus.lock();
        assert!(first_locked.elapsed() >= hold);
        assert_eq!(bus.current_device(), None);
        let mut active = locked.activate(&mut radio);
        active
            .write(&REPLY, Timeout::millis(10))
            .expect("reply write should succeed");
    });

    assert_handover(&wire);
}

/// A driver written only against `embedded-hal`.
fn read_jedec_id<SPI: SpiBus>(spi: &mut SPI) -> Result<[u8; 3], SPI::Error> {
    let mut id = [0x9f, 0, 0];
    spi.transfer_in_place(&mut id)?;
    Ok(id)
}

#[test]
fn ecosystem_driver_runs_on_an_acquired_device() {
    let wire = Arc::new(Wire::default());
    let bus = Bus::new(SharedController {
        wire: Arc::clone(&wire),
    });
    let mut flash = bus.device(
        profile(DISPLAY),
        ChipSelect {
            tag: DISPLAY,
            wire: Arc::clone(&wire),
        },
    );

    let mut spi = flash.acquire();
    let id = read_jedec_id(&mut spi).expect("transfer should succeed");
    spi.release();

    assert_eq!(id, [0x9f, 0, 0]);
    assert!(wire
        .events
        .lock()
        .unwrap()
        .contains(&Event::Transfer(vec![0x9f, 0, 0])));
}
