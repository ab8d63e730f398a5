use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::Error;
use crate::event_loop::{EventLoop, EventLoopConfig, LoopState, TimerKind};
use crate::port::{Clock, SimClock};
use crate::queue::{MessageQueue, MessageSource};

fn sim_loop(clock: &SimClock) -> EventLoop {
    EventLoop::simulated(clock, EventLoopConfig::builder().name("test").build())
}

#[test]
fn periodic_timer_keeps_nominal_schedule() {
    let clock = SimClock::new();
    let mut event_loop = sim_loop(&clock);
    let fired = Rc::new(RefCell::new(Vec::new()));

    let timer = {
        let fired = Rc::clone(&fired);
        let clock = clock.clone();
        event_loop
            .timer_alloc(
                move |event_loop: &mut EventLoop| {
                    fired.borrow_mut().push(clock.now());
                    // Work inside the callback must not push later firings back.
                    clock.advance(3);
                    if fired.borrow().len() == 1000 {
                        event_loop.stop();
                    }
                },
                TimerKind::Periodic,
            )
            .expect("timer table has room")
    };
    event_loop.timer_start(timer, 10);
    event_loop.run();

    let fired = fired.borrow();
    assert_eq!(fired.len(), 1000);
    for (k, at) in fired.iter().enumerate() {
        let nominal = 10 * (k as u64 + 1);
        assert!(at.abs_diff(nominal) <= 1, "firing {k} at {at}, expected {nominal}");
    }
}

#[test]
fn timer_and_idle_source_fire_ten_times_in_a_thousand_ticks() {
    let clock = SimClock::new();
    let mut event_loop = sim_loop(&clock);
    let queue = Arc::new(MessageQueue::<u32>::new(4));
    let messages = Rc::new(Cell::new(0));
    let fired = Rc::new(Cell::new(0));

    {
        let messages = Rc::clone(&messages);
        event_loop
            .subscribe(Arc::clone(&queue), move |_: &mut EventLoop, _| {
                messages.set(messages.get() + 1)
            })
            .expect("source table has room");
    }
    let timer = {
        let fired = Rc::clone(&fired);
        event_loop
            .timer_alloc(
                move |event_loop: &mut EventLoop| {
                    fired.set(fired.get() + 1);
                    if fired.get() == 10 {
                        event_loop.stop();
                    }
                },
                TimerKind::Periodic,
            )
            .expect("timer table has room")
    };
    event_loop.timer_start(timer, 100);
    event_loop.run();

    assert_eq!(fired.get(), 10);
    assert_eq!(messages.get(), 0);
    assert!(clock.now() <= 1050);
    assert_eq!(event_loop.state(), LoopState::Stopped);
}

#[test]
fn one_shot_timer_disarms_after_firing() {
    let clock = SimClock::new();
    let mut event_loop = sim_loop(&clock);
    let fired = Rc::new(Cell::new(0));

    let one_shot = {
        let fired = Rc::clone(&fired);
        event_loop
            .timer_alloc(move |_: &mut EventLoop| fired.set(fired.get() + 1), TimerKind::OneShot)
            .expect("timer table has room")
    };
    let stopper = event_loop
        .timer_alloc(|event_loop: &mut EventLoop| event_loop.stop(), TimerKind::OneShot)
        .expect("timer table has room");

    event_loop.timer_start(one_shot, 5);
    event_loop.timer_start(stopper, 50);
    assert_eq!(event_loop.timer_expire_time(one_shot), Some(5));
    event_loop.run();

    assert_eq!(fired.get(), 1);
    assert!(!event_loop.timer_is_running(one_shot));
    assert_eq!(event_loop.timer_period(one_shot), Some(5));
    assert_eq!(clock.now(), 50);
}

#[test]
fn stopped_timer_does_not_fire_and_restart_rearms() {
    let clock = SimClock::new();
    let mut event_loop = sim_loop(&clock);
    let fired = Rc::new(Cell::new(0));

    let timer = {
        let fired = Rc::clone(&fired);
        event_loop
            .timer_alloc(
                move |event_loop: &mut EventLoop| {
                    fired.set(fired.get() + 1);
                    event_loop.stop();
                },
                TimerKind::OneShot,
            )
            .expect("timer table has room")
    };
    event_loop.timer_start(timer, 20);
    event_loop.timer_stop(timer);
    assert!(!event_loop.timer_is_running(timer));

    clock.advance(100);
    event_loop.timer_restart(timer);
    assert_eq!(event_loop.timer_expire_time(timer), Some(120));
    event_loop.run();

    assert_eq!(fired.get(), 1);
    assert_eq!(clock.now(), 120);
}

#[test]
fn timer_may_free_itself_from_its_callback() {
    let clock = SimClock::new();
    let mut event_loop = sim_loop(&clock);
    let own_id = Rc::new(Cell::new(None));

    let timer = {
        let own_id = Rc::clone(&own_id);
        event_loop
            .timer_alloc(
                move |event_loop: &mut EventLoop| {
                    if let Some(id) = own_id.get() {
                        event_loop.timer_free(id);
                    }
                    event_loop.stop();
                },
                TimerKind::Periodic,
            )
            .expect("timer table has room")
    };
    own_id.set(Some(timer));
    event_loop.timer_start(timer, 1);
    event_loop.run();

    assert_eq!(event_loop.timer_count(), 0);
}

#[test]
#[should_panic(expected = "has no timer")]
fn stale_timer_id_is_fatal() {
    let clock = SimClock::new();
    let mut event_loop = sim_loop(&clock);
    let timer = event_loop
        .timer_alloc(|_: &mut EventLoop| {}, TimerKind::OneShot)
        .expect("timer table has room");
    event_loop.timer_free(timer);
    // The freed slot is reused; the old id must still be rejected.
    let _other = event_loop
        .timer_alloc(|_: &mut EventLoop| {}, TimerKind::OneShot)
        .expect("timer table has room");
    event_loop.timer_start(timer, 1);
}

#[test]
fn timer_table_exhaustion_reports_full() {
    let clock = SimClock::new();
    let mut event_loop = EventLoop::simulated(
        &clock,
        EventLoopConfig::builder().max_timers(2).build(),
    );
    for _ in 0..2 {
        event_loop
            .timer_alloc(|_: &mut EventLoop| {}, TimerKind::OneShot)
            .expect("timer table has room");
    }
    assert_eq!(
        event_loop
            .timer_alloc(|_: &mut EventLoop| {}, TimerKind::OneShot)
            .err(),
        Some(Error::Full)
    );
}

#[test]
fn pending_callbacks_run_before_timers() {
    let clock = SimClock::new();
    let mut event_loop = sim_loop(&clock);
    let order = Rc::new(RefCell::new(Vec::new()));

    let timer = {
        let order = Rc::clone(&order);
        event_loop
            .timer_alloc(
                move |event_loop: &mut EventLoop| {
                    order.borrow_mut().push("timer");
                    event_loop.stop();
                },
                TimerKind::OneShot,
            )
            .expect("timer table has room")
    };
    event_loop.timer_start(timer, 0);
    {
        let order = Rc::clone(&order);
        event_loop.pend(move |_| order.borrow_mut().push("pending"));
    }
    event_loop.run();

    assert_eq!(*order.borrow(), vec!["pending", "timer"]);
}

#[test]
fn sources_are_served_round_robin() {
    let clock = SimClock::new();
    let mut event_loop = sim_loop(&clock);
    let first = Arc::new(MessageQueue::<&'static str>::new(8));
    let second = Arc::new(MessageQueue::<&'static str>::new(8));
    let log = Rc::new(RefCell::new(Vec::new()));

    for queue in [&first, &second] {
        let log = Rc::clone(&log);
        event_loop
            .subscribe(Arc::clone(queue), move |event_loop: &mut EventLoop, item| {
                log.borrow_mut().push(item);
                if log.borrow().len() == 4 {
                    event_loop.stop();
                }
            })
            .expect("source table has room");
    }
    first.put("a1").expect("queue has room");
    first.put("a2").expect("queue has room");
    second.put("b1").expect("queue has room");
    second.put("b2").expect("queue has room");
    event_loop.run();

    assert_eq!(*log.borrow(), vec!["a1", "b1", "a2", "b2"]);
}

#[test]
fn dropping_the_loop_detaches_its_sources() {
    let clock = SimClock::new();
    let queue = Arc::new(MessageQueue::<u8>::new(2));
    {
        let mut event_loop = sim_loop(&clock);
        event_loop
            .subscribe(Arc::clone(&queue), |_: &mut EventLoop, _| {})
            .expect("source table has room");
        event_loop
            .timer_alloc(|_: &mut EventLoop| {}, TimerKind::Periodic)
            .expect("timer table has room");
    }
    // A detached queue can be attached to a new loop.
    let mut event_loop = sim_loop(&clock);
    let id = event_loop
        .subscribe(Arc::clone(&queue), |_: &mut EventLoop, _| {})
        .expect("source table has room");
    event_loop.unsubscribe(id);
    assert_eq!(event_loop.source_count(), 0);
}

#[test]
#[should_panic(expected = "already running")]
fn running_from_inside_run_is_fatal() {
    let clock = SimClock::new();
    let mut event_loop = sim_loop(&clock);
    event_loop.pend(|event_loop| event_loop.run());
    event_loop.run();
}

#[test]
#[should_panic(expected = "while not running")]
fn stop_outside_run_is_fatal() {
    let clock = SimClock::new();
    sim_loop(&clock).stop();
}

#[test]
fn host_loop_wakes_on_message_from_another_thread() {
    let mut event_loop = EventLoop::host(EventLoopConfig::builder().name("host").build());
    let queue = Arc::new(MessageQueue::new(4));
    let received = Rc::new(Cell::new(0u32));
    {
        let received = Rc::clone(&received);
        event_loop
            .subscribe(Arc::clone(&queue), move |event_loop: &mut EventLoop, value: u32| {
                received.set(value);
                event_loop.stop();
            })
            .expect("source table has room");
    }

    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            queue.put(77).expect("queue has room");
        })
    };
    event_loop.run();
    producer.join().expect("producer should finish");

    assert_eq!(received.get(), 77);
    assert!(queue.is_empty());
}

#[test]
fn queue_source_hands_out_one_item_per_take() {
    let queue = MessageQueue::new(2);
    queue.put(1).expect("queue has room");
    queue.put(2).expect("queue has room");
    assert_eq!(queue.take(), Some(1));
    assert_eq!(queue.len(), 1);
}
