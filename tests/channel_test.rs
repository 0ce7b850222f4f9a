//! Command channel tests
//!
//! Exercises the round-trip machinery against the scripted mock
//! transport: the 50 ms inter-command floor, echo verification with its
//! bounded attempt budget, input flushing and transport error
//! propagation.

use std::time::Duration;
use watt_pilot::transport::MockTransport;
use watt_pilot::{Command, CommandChannel, ProtocolSettings, WattPilotError};

fn make_channel(transport: MockTransport) -> CommandChannel<MockTransport> {
    CommandChannel::new(transport, &ProtocolSettings::default())
}

#[tokio::test(start_paused = true)]
async fn transmissions_respect_the_interval_floor() {
    let transport = MockTransport::new().with_auto_echo();
    let handle = transport.clone();
    let mut channel = make_channel(transport);

    channel.send(&Command::new("a 10").unwrap()).await.unwrap();
    channel.send(&Command::new("d 10").unwrap()).await.unwrap();
    channel.send(&Command::new("st").unwrap()).await.unwrap();

    let instants = handle.write_instants();
    assert_eq!(instants.len(), 3);
    for pair in instants.windows(2) {
        assert!(
            pair[1] - pair[0] >= Duration::from_millis(50),
            "commands spaced {:?} apart",
            pair[1] - pair[0]
        );
    }
}

#[tokio::test]
async fn echo_verification_discards_noise_lines() {
    let transport = MockTransport::new();
    // A stale report and a garbled line arrive ahead of the echo.
    transport.push_replies(["1;340", "##", "m 100"]);
    let mut channel = make_channel(transport);

    channel.send(&Command::new("m 100").unwrap()).await.unwrap();
}

#[tokio::test]
async fn echo_wait_is_bounded_by_the_attempt_budget() {
    let transport = MockTransport::new();
    let mut channel = make_channel(transport);

    match channel.send(&Command::new("zp").unwrap()).await {
        Err(WattPilotError::EchoTimeout { command, attempts }) => {
            assert_eq!(command, "zp");
            assert_eq!(attempts, 20);
        }
        other => panic!("expected EchoTimeout, got {:?}", other),
    }
}

#[tokio::test]
async fn unechoed_send_leaves_the_response_unread() {
    let transport = MockTransport::new();
    transport.push_replies(["pUSB: 1 a=120"]);
    let handle = transport.clone();
    let mut channel = make_channel(transport);

    channel
        .send_unechoed(&Command::new("p").unwrap())
        .await
        .unwrap();

    assert_eq!(handle.writes(), vec!["p"]);
    assert_eq!(channel.read_line().await.unwrap(), "pUSB: 1 a=120");
}

#[tokio::test]
async fn stale_input_is_flushed_before_every_transmission() {
    let transport = MockTransport::new().with_auto_echo();
    let handle = transport.clone();
    let mut channel = make_channel(transport);

    channel.send(&Command::new("ss").unwrap()).await.unwrap();
    channel
        .send_unechoed(&Command::new("p").unwrap())
        .await
        .unwrap();

    assert_eq!(handle.flush_count(), 2);
}

#[tokio::test]
async fn transport_failures_propagate() {
    let transport = MockTransport::new();
    transport.fail_next_write();
    let mut channel = make_channel(transport);

    assert!(matches!(
        channel.send(&Command::new("st").unwrap()).await,
        Err(WattPilotError::Io(_))
    ));
}
