//! ---
//! rcc_section: "15-testing-qa-runbook"
//! rcc_subsection: "integration-tests"
//! rcc_type: "test"
//! rcc_scope: "code"
//! rcc_description: "Protocol-level integration tests driving the controller through mock UARTs."
//! rcc_version: "v0.1.0"
//! rcc_owner: "tbd"
//! ---
use std::time::Duration;

use rcc_common::{AppConfig, ControlConfig};
use rcc_core::{load_setpoints, save_setpoints, ColdRoomRuntime, ControllerState, FaultReason};
use rcc_sck::text::frame_to_hex_line;
use rcc_sck::{decode_frame, encode, parse_hex_line, CommandId, Frame, Role};
use rcc_transport::{MockUart, Transport};
use tempfile::tempdir;

const TICK: Duration = Duration::from_secs(1);

struct Rig {
    runtime: ColdRoomRuntime<MockUart>,
    monitor: MockUart,
    io: MockUart,
}

fn rig() -> Rig {
    rig_with(&AppConfig::default())
}

fn rig_with(app: &AppConfig) -> Rig {
    let monitor = MockUart::new("monitor");
    let io = MockUart::new("io");
    let runtime = ColdRoomRuntime::new(app, monitor.clone(), io.clone()).expect("valid setpoints");
    Rig {
        runtime,
        monitor,
        io,
    }
}

fn decode_all(mut bytes: &[u8]) -> Vec<Frame> {
    let mut frames = Vec::new();
    while !bytes.is_empty() {
        let (frame, used) = decode_frame(bytes).expect("controller emits well-formed frames");
        frames.push(frame);
        bytes = &bytes[used..];
    }
    frames
}

#[test]
fn binary_set_config_then_get_config() {
    let mut rig = rig();
    let set = Frame::new_command(7, CommandId::SetConfig, "target_temp_c=3.5");
    let get = Frame::new_command(8, CommandId::GetConfig, "");
    rig.monitor.inject_rx(&encode(&set).unwrap());
    rig.monitor.inject_rx(&encode(&get).unwrap());

    assert_eq!(rig.runtime.service_channels(), 2);
    let replies = decode_all(&rig.monitor.drain_tx());
    assert_eq!(replies.len(), 2);

    assert_eq!(replies[0].role, Role::Status);
    assert_eq!(replies[0].tid, 7);
    assert_eq!(replies[0].command, CommandId::SetConfig.code());
    assert_eq!(replies[0].payload_text(), "ACK target_temp_c=3.5");

    assert_eq!(replies[1].tid, 8);
    assert_eq!(
        replies[1].payload_text(),
        "CONFIG target_temp_c=3.5,compressor_min_off_s=120,defrost_interval_s=21600,defrost_duration_s=1200"
    );
    assert_eq!(rig.runtime.config().target_temp_c, 3.5);
}

#[test]
fn rejected_set_config_leaves_store_untouched() {
    let mut rig = rig();
    for (tid, payload) in [
        (1, "target_temp_c=99"),
        (2, "defrost_duration_s=30000"),
        (3, "bogus=1"),
        (4, "target_temp_c=cold"),
        (5, "no assignment"),
    ] {
        let frame = Frame::new_command(tid, CommandId::SetConfig, payload);
        rig.monitor.inject_rx(&encode(&frame).unwrap());
    }
    rig.runtime.service_channels();

    let replies: Vec<String> = decode_all(&rig.monitor.drain_tx())
        .iter()
        .map(|frame| frame.payload_text().into_owned())
        .collect();
    assert_eq!(
        replies,
        [
            "ERR invalid_range",
            "ERR invalid_range",
            "ERR unknown_field",
            "ERR bad_value",
            "ERR malformed_request",
        ]
    );
    assert_eq!(rig.runtime.config(), ControlConfig::default());
}

#[test]
fn hex_line_request_gets_hex_line_reply() {
    let mut rig = rig();
    let request = Frame::new_command(0x2a, CommandId::GetIo, "");
    rig.io.inject_line(&frame_to_hex_line(&request).unwrap());
    rig.runtime.service_channels();

    let lines = rig.io.drain_tx_lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("SCK 02 20 04"), "got {}", lines[0]);
    let reply = parse_hex_line(&lines[0]).unwrap().expect("hex line");
    assert_eq!(reply.role, Role::Status);
    assert_eq!(reply.tid, 0x2a);
    assert_eq!(
        reply.payload_text(),
        "IO air_temp_c=8.0,door_open=0,power_ok=1,motion_detected=0,panic_button_pressed=0"
    );
}

#[test]
fn legacy_text_commands_on_both_channels() {
    let mut rig = rig();
    rig.monitor.inject_line("SET compressor_min_off_s=300");
    rig.monitor.inject_line("GET CONFIG");
    rig.io.inject_line("SET_SENSOR air_temp_c=-3.25");
    rig.io.inject_line("SET_INPUT door_open=1");
    rig.io.inject_line("GET IO");
    rig.runtime.service_channels();

    assert_eq!(
        rig.monitor.drain_tx_lines(),
        [
            "ACK compressor_min_off_s=300",
            "CONFIG target_temp_c=2.0,compressor_min_off_s=300,defrost_interval_s=21600,defrost_duration_s=1200",
        ]
    );
    assert_eq!(
        rig.io.drain_tx_lines(),
        [
            "ACK air_temp_c=-3.25",
            "ACK door_open=1",
            "IO air_temp_c=-3.25,door_open=1,power_ok=1,motion_detected=0,panic_button_pressed=0",
        ]
    );
}

#[test]
fn commands_are_bound_to_their_channel() {
    let mut rig = rig();
    rig.monitor.inject_line("SET_SENSOR air_temp_c=5.0");
    rig.io.inject_line("SET target_temp_c=5.0");
    rig.io.inject_line("SET_INPUT air_temp_c=5.0");
    rig.runtime.service_channels();

    assert_eq!(rig.monitor.drain_tx_lines(), ["ERR unknown_command"]);
    assert_eq!(
        rig.io.drain_tx_lines(),
        ["ERR unknown_command", "ERR unknown_field"]
    );
    assert_eq!(rig.runtime.io().air_temp_c, 8.0);
    assert_eq!(rig.runtime.config().target_temp_c, 2.0);
}

#[test]
fn unknown_verbs_and_unknown_ids_are_reported() {
    let mut rig = rig();
    rig.monitor.inject_line("REBOOT now");
    rig.monitor.inject_line("GET WEATHER");
    let frame = Frame::new_command(3, 0x0777u16, "");
    rig.monitor.inject_rx(&encode(&frame).unwrap());
    rig.runtime.service_channels();

    let bytes = rig.monitor.drain_tx();
    let text_end = bytes
        .iter()
        .position(|&b| b == rcc_sck::STX)
        .expect("binary reply present");
    let lines: Vec<&str> = std::str::from_utf8(&bytes[..text_end])
        .unwrap()
        .lines()
        .collect();
    assert_eq!(lines, ["ERR unknown_command", "ERR unknown_command"]);
    let replies = decode_all(&bytes[text_end..]);
    assert_eq!(replies[0].command, 0x0777);
    assert_eq!(replies[0].payload_text(), "ERR unknown_command");
}

#[test]
fn decoder_resyncs_after_garbage() {
    let mut rig = rig();
    let good = encode(&Frame::new_command(9, CommandId::GetStatus, "")).unwrap();
    rig.monitor.inject_rx(&[0xff, 0xfe, 0x00]);
    // header claiming a 65535-byte frame
    rig.monitor.inject_rx(&[0x02, 0x20, 0x04, 0xff, 0xff]);
    rig.monitor.inject_rx(&good);
    rig.runtime.service_channels();

    let replies = decode_all(&rig.monitor.drain_tx());
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].tid, 9);
    assert!(replies[0].payload_text().starts_with("STATUS state=idle,"));
    assert!(rig.runtime.monitor().stats().decode_errors >= 1);
}

#[test]
fn corrupted_frame_gets_checksum_error_with_same_tid() {
    let mut rig = rig();
    let mut bytes = encode(&Frame::new_command(0x33, CommandId::SetConfig, "target_temp_c=4.0")).unwrap();
    bytes[10] ^= 0x01;
    rig.monitor.inject_rx(&bytes);
    rig.runtime.service_channels();

    let replies = decode_all(&rig.monitor.drain_tx());
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].tid, 0x33);
    assert_eq!(replies[0].role, Role::Status);
    assert_eq!(replies[0].payload_text(), "ERR checksum_mismatch");
    assert_eq!(rig.runtime.config().target_temp_c, 2.0);
}

#[test]
fn foreign_version_frame_gets_unsupported_version_reply() {
    let mut rig = rig();
    let mut foreign = Frame::new_command(0x44, CommandId::SetConfig, "target_temp_c=5.0");
    foreign.version = 0x0310;
    rig.monitor.inject_rx(&encode(&foreign).unwrap());
    rig.monitor.inject_line("GET CONFIG");
    rig.runtime.service_channels();

    let bytes = rig.monitor.drain_tx();
    let (reply, used) = decode_frame(&bytes).expect("status frame first");
    assert_eq!(reply.role, Role::Status);
    assert_eq!(reply.tid, 0x44);
    assert_eq!(reply.command, CommandId::SetConfig.code());
    assert_eq!(reply.payload_text(), "ERR unsupported_version");

    // the foreign frame is consumed whole and the next request is served
    let rest = std::str::from_utf8(&bytes[used..]).unwrap();
    assert!(rest.starts_with("CONFIG target_temp_c=2.0,"), "got {rest:?}");
    assert_eq!(rig.runtime.config().target_temp_c, 2.0);
}

#[test]
fn frame_split_across_reads_is_reassembled() {
    let monitor = MockUart::new("monitor").with_read_chunk(3);
    let io = MockUart::new("io");
    let mut runtime = ColdRoomRuntime::new(&AppConfig::default(), monitor.clone(), io).unwrap();
    monitor.inject_rx(&encode(&Frame::new_command(1, CommandId::GetConfig, "")).unwrap());

    let mut handled = 0;
    for _ in 0..4 {
        handled += runtime.service_channels();
    }
    assert_eq!(handled, 1);
    assert_eq!(decode_all(&monitor.drain_tx()).len(), 1);
}

#[test]
fn get_status_is_idempotent_between_ticks() {
    let mut rig = rig();
    rig.runtime.tick(TICK);
    rig.monitor.drain_tx();

    rig.monitor.inject_line("GET STATUS");
    rig.monitor.inject_line("GET STATUS");
    rig.runtime.service_channels();
    rig.monitor.inject_line("GET STATUS");
    rig.runtime.service_channels();

    let lines = rig.monitor.drain_tx_lines();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], lines[1]);
    assert_eq!(lines[1], lines[2]);
    assert_eq!(rig.runtime.status().seconds_in_state, 1);
}

#[test]
fn status_reports_walk_in_size_and_panic_alarm() {
    let app: AppConfig = "[walk_in]\nlength_ft = 8.0\nwidth_ft = 6.0\nheight_ft = 7.5\n"
        .parse()
        .expect("walk-in profile parses");
    let mut rig = rig_with(&app);
    rig.io.inject_line("SET_INPUT panic_button_pressed=1");
    rig.runtime.tick(TICK);
    rig.monitor.drain_tx();

    rig.monitor.inject_line("GET STATUS");
    rig.runtime.service_channels();
    let lines = rig.monitor.drain_tx_lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("STATUS state=fault,"));
    assert!(lines[0].ends_with(
        ",fault_reason=panic_button,runtime_since_defrost_s=0,panic_alarm_on=1,length_ft=8.0,width_ft=6.0,height_ft=7.5,volume_ft3=360.0"
    ));

    // alarm output drops with the button even though the fault stays latched
    rig.io.inject_line("SET_INPUT panic_button_pressed=0");
    rig.runtime.tick(TICK);
    assert_eq!(rig.runtime.status().state, ControllerState::Fault);
    assert!(!rig.runtime.status().panic_alarm_on);
}

#[test]
fn fault_is_announced_and_cleared_by_acknowledgement() {
    let mut rig = rig();
    rig.io.inject_line("SET_INPUT power_ok=0");
    let outcome = rig.runtime.tick(TICK);
    assert_eq!(outcome.status.state, ControllerState::Fault);
    assert_eq!(outcome.status.fault_reason, Some(FaultReason::PowerLoss));

    let announced = rig.monitor.drain_tx_lines();
    assert_eq!(announced.len(), 1);
    assert!(announced[0].starts_with("STATUS state=fault,compressor_on=0,defrost_on=0,"));
    assert!(announced[0].contains("fault_reason=power_loss"));

    // power back on does not clear the latch by itself
    rig.io.inject_line("SET_INPUT power_ok=1");
    for _ in 0..5 {
        rig.runtime.tick(TICK);
    }
    assert_eq!(rig.runtime.status().state, ControllerState::Fault);

    assert!(rig.runtime.acknowledge_fault());
    assert_eq!(rig.runtime.status().state, ControllerState::Idle);
    assert_eq!(rig.runtime.status().fault_reason, None);
}

#[test]
fn setpoints_survive_a_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("setpoints.json");

    let mut first = rig();
    first.monitor.inject_line("SET target_temp_c=-1.5");
    first.monitor.inject_line("SET defrost_interval_s=7200");
    first.runtime.service_channels();
    save_setpoints(&first.runtime.config(), &path).unwrap();

    let mut second = rig();
    let restored = load_setpoints(&path).unwrap().expect("file was written");
    second.runtime.restore_setpoints(restored).unwrap();
    second.monitor.inject_line("GET CONFIG");
    second.runtime.service_channels();
    assert_eq!(
        second.monitor.drain_tx_lines(),
        ["CONFIG target_temp_c=-1.5,compressor_min_off_s=120,defrost_interval_s=7200,defrost_duration_s=1200"]
    );
}

#[test]
fn physical_peer_link_carries_requests_and_replies() {
    let mut rig = rig();
    let host = MockUart::new("host");
    host.connect_physical_peer(&rig.monitor);

    host.write(&encode(&Frame::new_command(4, CommandId::GetConfig, "")).unwrap())
        .unwrap();
    rig.runtime.service_channels();

    let replies = decode_all(&host.try_read().unwrap());
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].tid, 4);
    assert!(replies[0].payload_text().starts_with("CONFIG "));
    assert!(rig.monitor.drain_tx().is_empty());
}
