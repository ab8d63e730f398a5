//! Services published through a shared registry and reached from event loops.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use nucleon::port::SimClock;
use nucleon::{
    EventLoop, EventLoopConfig, MessageQueue, PubSub, Registry, RegistryConfig, TimerKind,
};
use once_cell::sync::Lazy;

static REGISTRY: Lazy<Registry> =
    Lazy::new(|| Registry::new(RegistryConfig::builder().capacity(8).build()));

static CONSTRUCTED: AtomicUsize = AtomicUsize::new(0);

/// Stand-in for a notification service: apps publish, the LED driver listens.
struct Notification {
    events: PubSub<&'static str>,
}

impl Notification {
    fn new() -> Self {
        CONSTRUCTED.fetch_add(1, Ordering::SeqCst);
        Self {
            events: PubSub::new(),
        }
    }
}

#[test]
fn apps_on_different_threads_share_one_service() {
    let heard = Arc::new(Mutex::new(Vec::new()));

    let notification = REGISTRY.open("notification", Notification::new);
    let led = {
        let heard = Arc::clone(&heard);
        notification
            .events
            .subscribe(move |event| heard.lock().unwrap().push(*event))
    };

    let apps: Vec<_> = ["clock", "nfc", "subghz"]
        .into_iter()
        .map(|app| {
            thread::spawn(move || {
                let notification = REGISTRY.open("notification", Notification::new);
                notification.events.publish(&app);
            })
        })
        .collect();
    for app in apps {
        app.join().expect("app should finish");
    }

    assert_eq!(CONSTRUCTED.load(Ordering::SeqCst), 1);
    assert_eq!(REGISTRY.holders("notification"), 1);

    let mut heard = heard.lock().unwrap().clone();
    heard.sort_unstable();
    assert_eq!(heard, vec!["clock", "nfc", "subghz"]);

    notification.events.unsubscribe(led);
    drop(notification);
    assert!(!REGISTRY.exists("notification"));
}

#[test]
fn input_queue_drives_a_loop_until_timeout() {
    let clock = SimClock::new();
    let mut event_loop = EventLoop::simulated(&clock, EventLoopConfig::builder().name("app").build());
    let input = Arc::new(MessageQueue::new(8));
    let keys = Rc::new(RefCell::new(Vec::new()));

    {
        let keys = Rc::clone(&keys);
        event_loop
            .subscribe(Arc::clone(&input), move |_: &mut EventLoop, key: char| {
                keys.borrow_mut().push(key)
            })
            .expect("source table has room");
    }
    let idle_exit = event_loop
        .timer_alloc(|event_loop: &mut EventLoop| event_loop.stop(), TimerKind::OneShot)
        .expect("timer table has room");
    event_loop.timer_start(idle_exit, 30_000);

    for key in ['u', 'u', 'o', 'b'] {
        input.put(key).expect("queue has room");
    }
    event_loop.run();

    assert_eq!(*keys.borrow(), vec!['u', 'u', 'o', 'b']);
    assert!(input.is_empty());
    assert_eq!(event_loop.now(), 30_000);
}
