//! Tests for schedule replay.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::time::Duration;

use mockall::Sequence;
use rstest::rstest;

use crate::schedule::parse_schedule;
use crate::schedule::runner::{Clock, MockNodeControl, NodeControl, Scheduler};

/// Virtual clock that advances only when slept on.
#[derive(Default)]
struct FakeClock {
    now: Cell<Duration>,
    sleeps: Rc<RefCell<Vec<Duration>>>,
}

impl Clock for FakeClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
        self.sleeps.borrow_mut().push(duration);
    }
}

/// Node that journals each call and can panic while sending.
struct RecordingNode {
    journal: Journal,
    peers: BTreeSet<String>,
    panic_on_send: bool,
}

impl NodeControl for RecordingNode {
    fn start_daemon(&mut self) -> bool {
        self.journal.borrow_mut().push("start");
        true
    }

    fn stop_daemon(&mut self) -> bool {
        self.journal.borrow_mut().push("stop");
        true
    }

    fn register_endpoint(&mut self) -> bool {
        self.journal.borrow_mut().push("register");
        true
    }

    fn unregister_endpoint(&mut self) -> bool {
        self.journal.borrow_mut().push("unregister");
        true
    }

    fn peers(&self) -> BTreeSet<String> {
        self.journal.borrow_mut().push("peers");
        self.peers.clone()
    }

    fn send_message(&self, _peer: &str, _payload: &[u8]) -> bool {
        self.journal.borrow_mut().push("send");
        assert!(!self.panic_on_send, "send failed hard");
        true
    }
}

fn peers(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|name| (*name).to_owned()).collect()
}

type Journal = Rc<RefCell<Vec<&'static str>>>;

fn recording_node(peer_names: &[&str], panic_on_send: bool) -> (RecordingNode, Journal) {
    let journal = Rc::new(RefCell::new(Vec::new()));
    let node = RecordingNode {
        journal: Rc::clone(&journal),
        peers: peers(peer_names),
        panic_on_send,
    };
    (node, journal)
}

#[test]
fn full_schedule_runs_in_order() {
    let mut node = MockNodeControl::new();
    let mut sequence = Sequence::new();
    node.expect_start_daemon()
        .times(1)
        .in_sequence(&mut sequence)
        .return_const(true);
    node.expect_register_endpoint()
        .times(1)
        .in_sequence(&mut sequence)
        .return_const(true);
    node.expect_peers()
        .times(1)
        .in_sequence(&mut sequence)
        .returning(|| peers(&["n2", "n3"]));
    node.expect_send_message()
        .withf(|peer: &str, payload: &[u8]| peer == "n2" && payload == b"Hello from n1 at 5")
        .times(1)
        .in_sequence(&mut sequence)
        .return_const(true);
    node.expect_send_message()
        .withf(|peer: &str, payload: &[u8]| peer == "n3" && payload == b"Hello from n1 at 5")
        .times(1)
        .in_sequence(&mut sequence)
        .return_const(true);
    node.expect_unregister_endpoint()
        .times(1)
        .in_sequence(&mut sequence)
        .return_const(true);
    node.expect_stop_daemon()
        .times(1)
        .in_sequence(&mut sequence)
        .return_const(true);

    let clock = FakeClock::default();
    let sleeps = Rc::clone(&clock.sleeps);
    let schedule = parse_schedule("0 CONNECT\n5 MESSAGE\n10 DISCONNECT\n20 LIFETIME\n");
    let mut scheduler = Scheduler::new(node, clock, "n1");

    scheduler.run(&schedule);

    assert_eq!(
        *sleeps.borrow(),
        [
            Duration::from_secs(5),
            Duration::from_secs(5),
            Duration::from_secs(10)
        ]
    );
}

#[test]
fn repeated_connect_starts_once() {
    let mut node = MockNodeControl::new();
    node.expect_start_daemon().times(1).return_const(true);
    node.expect_register_endpoint().times(1).return_const(true);
    node.expect_unregister_endpoint().times(1).return_const(true);
    node.expect_stop_daemon().times(1).return_const(true);

    let mut scheduler = Scheduler::new(node, FakeClock::default(), "n1");
    scheduler.run(&parse_schedule("0 CONNECT\n1 CONNECT\n"));
}

#[rstest]
#[case("0 MESSAGE\n")]
#[case("0 DISCONNECT\n")]
#[case("0 DISCONNECT\n3 MESSAGE\n5 LIFETIME\n")]
fn commands_without_a_daemon_are_skipped(#[case] script: &str) {
    // No expectations: any call on the node fails the test.
    let node = MockNodeControl::new();
    let mut scheduler = Scheduler::new(node, FakeClock::default(), "n1");
    scheduler.run(&parse_schedule(script));
}

#[test]
fn message_without_peers_sends_nothing() {
    let mut node = MockNodeControl::new();
    node.expect_start_daemon().return_const(true);
    node.expect_register_endpoint().return_const(true);
    node.expect_peers().times(1).returning(BTreeSet::new);
    node.expect_send_message().never();
    node.expect_unregister_endpoint().return_const(true);
    node.expect_stop_daemon().return_const(true);

    let mut scheduler = Scheduler::new(node, FakeClock::default(), "n1");
    scheduler.run(&parse_schedule("0 CONNECT\n2 MESSAGE\n"));
}

#[test]
fn failed_start_skips_registration_and_teardown() {
    let mut node = MockNodeControl::new();
    node.expect_start_daemon().times(1).return_const(false);
    node.expect_register_endpoint().never();
    node.expect_unregister_endpoint().never();
    node.expect_stop_daemon().never();

    let mut scheduler = Scheduler::new(node, FakeClock::default(), "n1");
    scheduler.run(&parse_schedule("0 CONNECT\n"));
}

#[test]
fn failed_registration_still_stops_the_daemon() {
    let mut node = MockNodeControl::new();
    node.expect_start_daemon().times(1).return_const(true);
    node.expect_register_endpoint().times(1).return_const(false);
    node.expect_unregister_endpoint().never();
    node.expect_stop_daemon().times(1).return_const(true);

    let mut scheduler = Scheduler::new(node, FakeClock::default(), "n1");
    scheduler.run(&parse_schedule("0 CONNECT\n"));
}

#[test]
fn teardown_releases_a_connected_node() {
    let (node, journal) = recording_node(&[], false);
    let mut scheduler = Scheduler::new(node, FakeClock::default(), "n1");

    scheduler.run(&parse_schedule("0 CONNECT\n4 LIFETIME\n"));

    assert_eq!(*journal.borrow(), ["start", "register", "unregister", "stop"]);
}

#[test]
fn teardown_runs_when_a_command_panics() {
    let (node, journal) = recording_node(&["n2"], true);
    let mut scheduler = Scheduler::new(node, FakeClock::default(), "n1");
    let schedule = parse_schedule("0 CONNECT\n1 MESSAGE\n9 DISCONNECT\n");

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| scheduler.run(&schedule)));

    assert!(outcome.is_err(), "panic is re-raised after teardown");
    assert_eq!(
        *journal.borrow(),
        ["start", "register", "peers", "send", "unregister", "stop"]
    );
}

#[test]
fn elapsed_lifetime_does_not_sleep() {
    let (node, _journal) = recording_node(&[], false);
    let clock = FakeClock::default();
    let sleeps = Rc::clone(&clock.sleeps);
    let mut scheduler = Scheduler::new(node, clock, "n1");

    scheduler.run(&parse_schedule("10 CONNECT\n10 DISCONNECT\n5 LIFETIME\n"));

    assert_eq!(*sleeps.borrow(), [Duration::from_secs(10)]);
}

#[test]
fn missing_lifetime_ends_after_last_command() {
    let (node, _journal) = recording_node(&[], false);
    let clock = FakeClock::default();
    let sleeps = Rc::clone(&clock.sleeps);
    let mut scheduler = Scheduler::new(node, clock, "n1");

    scheduler.run(&parse_schedule("3 CONNECT\n"));

    assert_eq!(*sleeps.borrow(), [Duration::from_secs(3)]);
    let node = scheduler.into_node();
    assert_eq!(*node.journal.borrow(), ["start", "register", "unregister", "stop"]);
}
