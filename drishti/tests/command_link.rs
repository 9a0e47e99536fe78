//! Command Link tests against a loopback drone
//!
//! Covers reply classification over the wire, timeouts, local rejection
//! and flight-state transitions.
//!
//! Run with: `cargo test --test command_link`

mod common;

use common::{FakeDrone, always_ok, delayed, eventually, reply};
use drishti::{Error, LinkFault, Reply};
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const SHORT: Duration = Duration::from_millis(300);

#[test]
fn silent_drone_times_out() {
    let drone = FakeDrone::spawn(|_| Vec::new());
    let link = drone.link();

    let started = Instant::now();
    let outcome = link.execute("battery?", SHORT);
    let elapsed = started.elapsed();

    assert!(!outcome.acknowledged);
    assert!(!outcome.link_healthy);
    assert!(outcome.is_timeout());
    assert_eq!(outcome.reply, Reply::Missing);
    assert!(elapsed >= SHORT, "returned early after {:?}", elapsed);
    assert!(elapsed < SHORT + Duration::from_millis(500), "took {:?}", elapsed);
    assert!(!link.command_link_healthy());
    assert!(link.last_response().contains("no reply"));
}

#[test]
fn error_token_is_not_acknowledged() {
    let drone = FakeDrone::spawn(|_| vec![reply("error")]);
    let link = drone.link();

    let outcome = link.execute("streamon", SHORT);
    assert!(!outcome.acknowledged);
    assert!(outcome.link_healthy);
    assert_eq!(outcome.reply, Reply::Error);
    assert_eq!(outcome.primary_reply, "error");
    assert!(link.command_link_healthy());
}

#[test]
fn error_with_detail_stays_acknowledged() {
    let drone = FakeDrone::spawn(|_| vec![reply("error Motor stop")]);
    let link = drone.link();

    let outcome = link.execute("stop", SHORT);
    assert!(outcome.acknowledged);
    assert_eq!(outcome.reply, Reply::Ambiguous("error Motor stop".to_string()));
}

#[test]
fn bare_data_reply_is_acknowledged() {
    let drone = FakeDrone::spawn(|_| vec![reply("87\r\n")]);
    let link = drone.link();

    let outcome = link.execute("battery?", SHORT);
    assert!(outcome.acknowledged);
    assert_eq!(outcome.reply, Reply::Data("87".to_string()));
    assert_eq!(link.battery().unwrap(), 87);
}

#[test]
fn delayed_second_reply_is_attached() {
    let drone = FakeDrone::spawn(|_| vec![reply("ok"), delayed(20, "ok")]);
    let link = drone.link();

    let outcome = link.execute("command", SHORT);
    assert!(outcome.acknowledged);
    assert_eq!(outcome.secondary_reply.as_deref(), Some("ok"));
    assert_eq!(outcome.reply, Reply::OkWithMessage("ok".to_string()));
    assert_eq!(link.last_response(), "ok ok");
}

#[test]
fn error_then_ok_is_not_acknowledged() {
    let drone = FakeDrone::spawn(|_| vec![reply("error"), delayed(10, "ok")]);
    let link = drone.link();

    let outcome = link.execute("takeoff", SHORT);
    assert_eq!(outcome.reply, Reply::ErrorThenOk);
    assert!(!outcome.acknowledged);
    assert!(!link.is_flying());
}

#[test]
fn rc_rejected_while_grounded_and_sent_while_flying() {
    let drone = FakeDrone::spawn(always_ok);
    let link = drone.link();

    let rejected = link.rc(10, 0, 0, 0);
    assert!(rejected.is_rejected());
    assert!(!rejected.acknowledged);
    thread::sleep(Duration::from_millis(50));
    assert!(drone.received().is_empty());

    assert!(link.takeoff().acknowledged);
    assert!(link.is_flying());

    let started = Instant::now();
    let sent = link.rc(10, 0, 0, 0);
    assert!(sent.acknowledged);
    assert_eq!(sent.reply, Reply::NotExpected);
    assert!(started.elapsed() < Duration::from_millis(100));

    let received = drone.wait_for_commands(2, Duration::from_secs(1));
    assert_eq!(received, vec!["takeoff", "rc 10 0 0 0"]);
}

#[test]
fn takeoff_and_land_drive_flight_state() {
    let drone = FakeDrone::spawn(always_ok);
    let link = drone.link();

    assert!(!link.is_flying());
    assert!(link.takeoff().acknowledged);
    assert!(link.is_flying());

    let again = link.takeoff();
    assert!(again.is_rejected());
    assert_eq!(link.last_response(), "rejected: already flying");

    assert!(link.land().acknowledged);
    assert!(!link.is_flying());
    assert!(link.land().is_rejected());

    thread::sleep(Duration::from_millis(50));
    assert_eq!(drone.received(), vec!["takeoff", "land"]);
}

#[test]
fn failed_takeoff_keeps_grounded() {
    let drone = FakeDrone::spawn(|_| Vec::new());
    let link = drone.link();

    let outcome = link.takeoff();
    assert!(outcome.is_timeout());
    assert!(!link.is_flying());
}

#[test]
fn height_falls_back_to_last_value() {
    let drone = FakeDrone::spawn(|command| match command {
        "height?" => vec![reply("10dm")],
        _ => Vec::new(),
    });
    let link = drone.link();
    assert_eq!(link.height(), 10);
    drop(drone);

    // Drone gone: the query times out and the last height is kept
    assert_eq!(link.height(), 10);
    assert!(!link.command_link_healthy());
}

#[test]
fn late_reply_is_discarded_before_next_command() {
    let drone = FakeDrone::spawn(|command| match command {
        "command" => vec![reply("ok"), delayed(150, "late")],
        "battery?" => vec![reply("55")],
        _ => Vec::new(),
    });
    let link = drone.link();

    let first = link.execute("command", SHORT);
    assert_eq!(first.secondary_reply, None);

    // Let the late datagram land in the mailbox
    thread::sleep(Duration::from_millis(250));
    assert_eq!(link.battery().unwrap(), 55);
}

#[test]
fn replies_from_other_hosts_are_ignored() {
    let drone_ip = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2));
    let drone = FakeDrone::spawn_on(drone_ip, |_| Vec::new());
    let link = drone.link();
    let local = link.local_addr().unwrap();

    let intruder = UdpSocket::bind("127.0.0.1:0").unwrap();
    let sender = thread::spawn(move || {
        for _ in 0..10 {
            let _ = intruder.send_to(b"ok", local);
            thread::sleep(Duration::from_millis(20));
        }
    });

    let outcome = link.execute("command", SHORT);
    sender.join().unwrap();
    assert!(outcome.is_timeout());
}

#[test]
fn stopped_link_reports_not_started() {
    let drone = FakeDrone::spawn(always_ok);
    let link = drone.link();
    assert!(link.command().acknowledged);

    link.stop().unwrap();
    let outcome = link.command();
    assert_eq!(outcome.fault, Some(LinkFault::NotStarted));

    link.start().unwrap();
    assert!(eventually(Duration::from_secs(1), || link.command().acknowledged));
}

#[test]
fn sent_rc_keeps_previous_response() {
    let drone = FakeDrone::spawn(|command| match command {
        "streamon" => vec![reply("error")],
        other => always_ok(other),
    });
    let link = drone.link();
    assert!(link.takeoff().acknowledged);

    assert!(!link.execute("streamon", SHORT).acknowledged);
    assert_eq!(link.last_response(), "error");

    for _ in 0..3 {
        assert!(link.rc(0, 0, 0, 0).acknowledged);
    }
    assert_eq!(link.last_response(), "error");

    // Refusals and round trips still replace it
    assert!(link.land().acknowledged);
    assert_eq!(link.last_response(), "ok");
    assert!(link.rc(0, 0, 0, 0).is_rejected());
    assert_eq!(link.last_response(), "rejected: not flying");
}

#[test]
fn stop_releases_blocked_command() {
    let drone = FakeDrone::spawn(|_| Vec::new());
    let link = Arc::new(drone.link());
    let long = Duration::from_secs(10);

    let waiter = {
        let link = Arc::clone(&link);
        thread::spawn(move || {
            let started = Instant::now();
            let outcome = link.execute("takeoff", long);
            (outcome, started.elapsed())
        })
    };
    assert_eq!(drone.wait_for_commands(1, Duration::from_secs(1)), vec!["takeoff"]);

    let stopping = Instant::now();
    link.stop().unwrap();
    assert!(stopping.elapsed() < Duration::from_secs(1), "stop took {:?}", stopping.elapsed());
    assert!(!link.is_started());

    let (outcome, waited) = waiter.join().unwrap();
    assert!(waited < long, "execute waited {:?}", waited);
    assert_eq!(
        outcome.fault,
        Some(LinkFault::Receive("command listener stopped".to_string()))
    );
    assert!(!outcome.acknowledged);
    assert!(!link.is_flying());
}

#[test]
fn counting_queries_reject_non_integers() {
    let drone = FakeDrone::spawn(|command| match command {
        "battery?" => vec![reply("-5")],
        "time?" => vec![reply("12.5")],
        "speed?" => vec![reply("12.5")],
        _ => Vec::new(),
    });
    let link = drone.link();

    assert!(matches!(link.battery(), Err(Error::ProtocolAmbiguity(_))));
    assert!(matches!(link.flight_time(), Err(Error::ProtocolAmbiguity(_))));
    assert_eq!(link.speed().unwrap(), 12.5);
}

#[test]
fn counting_query_parses_whole_answer() {
    let drone = FakeDrone::spawn(|command| match command {
        "battery?" => vec![reply("87\r\n")],
        "time?" => vec![reply("42s")],
        _ => Vec::new(),
    });
    let link = drone.link();

    assert_eq!(link.battery().unwrap(), 87);
    assert_eq!(link.flight_time().unwrap(), 42);
}
