//! Controller facade tests
//!
//! Drives a [`WattPilot`] against the scripted mock transport:
//! - the initial settings refresh over both dump formats
//! - `move_to` short-circuiting at the current position
//! - motion waits polling through missing reports, with and without a
//!   deadline
//! - argument validation rejecting values before anything hits the wire
//! - special-cased commands (`h` for position zero, `r 6` for 1/16)
//! - deterministic, idempotent teardown

use std::time::Duration;
use watt_pilot::transport::MockTransport;
use watt_pilot::{MicrostepResolution, ProtocolSettings, WattPilot, WattPilotError};

const FULL_DUMP: &str = "0;0;120;110;1000;50;10;50;4;1;0;1;1;0;0;0;0;1;0;0;1;0;0;0;";
const LIVE_DUMP: &str = "pUSB: 1 a=120 d=110 r=4 s=1000 wm=50 ws=10 wt=50 en:1 zr:0 zs:1";

/// Mock with the connect sequence scripted: `pc` (echoed) then `p`.
fn scripted() -> MockTransport {
    let transport = MockTransport::new();
    transport.push_replies(["pc", FULL_DUMP]);
    transport.push_replies([LIVE_DUMP]);
    transport
}

async fn connected() -> (MockTransport, WattPilot<MockTransport>) {
    let transport = scripted();
    let handle = transport.clone();
    let pilot = WattPilot::connect(transport, ProtocolSettings::default())
        .await
        .unwrap();
    (handle, pilot)
}

#[tokio::test(start_paused = true)]
async fn connect_refreshes_both_settings_dumps() {
    let (handle, pilot) = connected().await;

    assert_eq!(handle.writes(), vec!["pc", "p"]);
    assert_eq!(pilot.full_settings().get_int("speed"), Some(1000));
    assert_eq!(
        pilot.full_settings().get_int("steps_per_revolution"),
        Some(62_400)
    );
    let live = pilot.live_settings().unwrap();
    assert_eq!(live.get_bool("operating_mode"), Some(true));
    assert_eq!(live.get_int("acceleration"), Some(120));
}

#[tokio::test(start_paused = true)]
async fn connect_tolerates_a_powered_off_live_dump() {
    let transport = MockTransport::new();
    transport.push_replies(["pc", FULL_DUMP]);
    transport.push_silence(); // nothing after 'p'

    let pilot = WattPilot::connect(transport, ProtocolSettings::default())
        .await
        .unwrap();
    assert!(pilot.live_settings().is_none());
}

#[tokio::test(start_paused = true)]
async fn connect_fails_against_a_silent_device() {
    let transport = MockTransport::new();
    let result = WattPilot::connect(transport, ProtocolSettings::default()).await;

    match result {
        Err(err) => assert!(err.is_recoverable(), "unexpected error class: {err}"),
        Ok(_) => panic!("connect should not succeed without a device"),
    }
}

#[tokio::test(start_paused = true)]
async fn move_to_skips_transmission_at_the_target() {
    let (handle, mut pilot) = connected().await;
    handle.push_replies(["o", "0;500"]);

    pilot.move_to(500, false).await.unwrap();

    // The state query went out; the move did not.
    assert_eq!(handle.writes(), vec!["pc", "p", "o"]);
}

#[tokio::test(start_paused = true)]
async fn move_to_transmits_when_off_target() {
    let (handle, mut pilot) = connected().await;
    handle.push_replies(["o", "0;400"]);
    handle.push_replies(["g 500"]);

    pilot.move_to(500, false).await.unwrap();

    assert_eq!(handle.writes(), vec!["pc", "p", "o", "g 500"]);
}

#[tokio::test(start_paused = true)]
async fn move_to_requires_a_state_report() {
    let (handle, mut pilot) = connected().await;
    handle.push_replies(["o"]); // echo, then silence

    assert!(matches!(
        pilot.move_to(500, false).await,
        Err(WattPilotError::NoData)
    ));
}

#[tokio::test(start_paused = true)]
async fn wait_until_stopped_polls_through_missing_reports() {
    let (handle, mut pilot) = connected().await;
    handle.push_replies(["o", "3;100"]);
    handle.push_replies(["o"]); // device silent for one poll
    handle.push_replies(["o", "2;140"]);
    handle.push_replies(["o", "0;150"]);

    let report = pilot.wait_until_stopped(None).await.unwrap();
    assert!(report.is_stopped());
    assert_eq!(report.position, 150);
}

#[tokio::test(start_paused = true)]
async fn wait_until_stopped_honors_the_deadline() {
    let (handle, mut pilot) = connected().await;
    for _ in 0..8 {
        handle.push_replies(["o", "3;100"]);
    }

    let result = pilot
        .wait_until_stopped(Some(Duration::from_millis(250)))
        .await;
    assert!(matches!(
        result,
        Err(WattPilotError::MotionTimeout(limit)) if limit == Duration::from_millis(250)
    ));
}

#[tokio::test(start_paused = true)]
async fn move_by_with_wait_blocks_until_stopped() {
    let (handle, mut pilot) = connected().await;
    handle.push_replies(["m -200"]);
    handle.push_replies(["o", "1;-60"]);
    handle.push_replies(["o", "0;-200"]);

    pilot.move_by(-200, true).await.unwrap();

    let writes = handle.writes();
    assert_eq!(writes[2], "m -200");
    assert_eq!(writes[3..], ["o", "o"]);
}

#[tokio::test(start_paused = true)]
async fn ramp_arguments_are_validated_before_transmission() {
    let (handle, mut pilot) = connected().await;

    assert!(matches!(
        pilot.set_acceleration(0).await,
        Err(WattPilotError::InvalidArgument { name: "acceleration", .. })
    ));
    assert!(pilot.set_acceleration(255).await.is_err());
    assert!(pilot.set_deceleration(0).await.is_err());

    // Nothing was written for the rejected values.
    assert_eq!(handle.writes(), vec!["pc", "p"]);

    handle.push_replies(["a 254"]);
    pilot.set_acceleration(254).await.unwrap();
    assert_eq!(handle.writes().last().map(String::as_str), Some("a 254"));
}

#[tokio::test(start_paused = true)]
async fn set_position_zero_uses_the_zero_command() {
    let (handle, mut pilot) = connected().await;

    handle.push_replies(["h"]);
    pilot.set_position(0).await.unwrap();

    handle.push_replies(["i 750"]);
    pilot.set_position(750).await.unwrap();

    assert_eq!(handle.writes()[2..], ["h", "i 750"]);
}

#[tokio::test(start_paused = true)]
async fn sixteenth_resolution_goes_out_as_code_six() {
    let (handle, mut pilot) = connected().await;

    handle.push_replies(["r 6"]);
    pilot
        .set_microstep_resolution(MicrostepResolution::Sixteenth)
        .await
        .unwrap();

    assert_eq!(handle.writes().last().map(String::as_str), Some("r 6"));
}

#[tokio::test(start_paused = true)]
async fn one_shot_commands_are_echo_verified() {
    let (handle, mut pilot) = connected().await;

    handle.push_replies(["zp"]);
    pilot.home(false).await.unwrap();

    handle.push_replies(["st"]);
    pilot.stop().await.unwrap();

    handle.push_replies(["zr 1"]);
    pilot.set_position_reporting(true).await.unwrap();

    handle.push_replies(["ss"]);
    pilot.save_settings().await.unwrap();

    assert_eq!(handle.writes()[2..], ["zp", "st", "zr 1", "ss"]);
}

#[tokio::test(start_paused = true)]
async fn device_name_reads_the_payload_line() {
    let (handle, mut pilot) = connected().await;
    handle.push_replies(["n", "Watt Pilot"]);

    assert_eq!(pilot.device_name().await.unwrap(), "Watt Pilot");
}

#[tokio::test(start_paused = true)]
async fn close_is_idempotent() {
    let (_handle, mut pilot) = connected().await;

    pilot.close().await.unwrap();
    assert!(!pilot.is_open());
    pilot.close().await.unwrap();
}
