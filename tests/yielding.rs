use fibra::{Machine, State};

use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn test_two_yielders_alternate() {
    let machine = Machine::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    for name in ["A", "B"] {
        let log = log.clone();
        machine.coroutine().name(name).spawn(move |co| {
            for _ in 0..3 {
                log.borrow_mut().push(name);
                co.yield_now();
            }
        });
    }

    machine.run().unwrap();

    assert_eq!(
        *log.borrow(),
        vec!["A", "B", "A", "B", "A", "B"],
        "yielders should strictly alternate"
    );
    assert!(machine.is_empty(), "both coroutines should have finished");
}

#[test]
fn test_oldest_suspended_runs_first() {
    // With N coroutines yielding K times each, every coroutine must run
    // K+1 times before any runs K+2 times.
    let machine = Machine::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    for id in 0..3usize {
        let log = log.clone();
        machine.spawn(move |co| {
            for _ in 0..4 {
                log.borrow_mut().push(id);
                co.yield_now();
            }
        });
    }

    machine.run().unwrap();

    let log = log.borrow();
    assert_eq!(log.len(), 12);
    for round in log.chunks(3) {
        assert_eq!(round, [0, 1, 2], "each round serves every coroutine once");
    }
}

#[test]
fn test_exactly_one_coroutine_running() {
    let machine = Machine::new();
    let handles = Rc::new(RefCell::new(Vec::new()));

    for _ in 0..3 {
        let handles_for_closure = handles.clone();
        let handle = machine.spawn(move |co| {
            let handles = handles_for_closure;
            for _ in 0..2 {
                let running = handles
                    .borrow()
                    .iter()
                    .filter(|h: &&fibra::CoroutineHandle| h.state() == State::Running)
                    .count();
                assert_eq!(running, 1, "only the current coroutine may be Running");
                assert_eq!(handles.borrow()[co.id()].state(), State::Running);
                co.yield_now();
            }
        });
        handles.borrow_mut().push(handle);
    }

    machine.run().unwrap();
}

#[test]
fn test_live_ids_are_unique() {
    let machine = Machine::new();

    let handles: Vec<_> = (0..8).map(|_| machine.spawn(|_| {})).collect();

    let mut ids: Vec<_> = handles.iter().map(|h| h.id()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), handles.len(), "live ids must not repeat");

    machine.run().unwrap();
}

#[test]
fn test_freed_id_is_reissued() {
    let machine = Machine::new();

    let first = machine.spawn(|_| {});
    machine.run().unwrap();
    assert!(!first.is_alive());

    let second = machine.spawn(|_| {});
    assert_eq!(
        second.id(),
        first.id(),
        "the most recently freed id should be preferred"
    );

    machine.run().unwrap();
}

#[test]
fn test_exit_skips_rest_of_body() {
    let machine = Machine::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    {
        let log = log.clone();
        machine.spawn(move |co| {
            log.borrow_mut().push("before");
            co.exit();
        });
    }

    machine.run().unwrap();

    assert_eq!(*log.borrow(), vec!["before"]);
    assert!(machine.is_empty(), "an exited coroutine must be reaped");
}

#[test]
fn test_autostart_false_waits_for_start() {
    let machine = Machine::new();
    let ran = Rc::new(RefCell::new(false));

    let parked = {
        let ran = ran.clone();
        machine
            .coroutine()
            .name("parked")
            .autostart(false)
            .spawn(move |_| {
                *ran.borrow_mut() = true;
            })
    };
    assert_eq!(parked.state(), State::New);

    {
        let parked = parked.clone();
        machine.spawn(move |_| {
            parked.start();
        });
    }

    machine.run().unwrap();

    assert!(*ran.borrow(), "started coroutine should have run");
    assert_eq!(parked.state(), State::Dead);
}
