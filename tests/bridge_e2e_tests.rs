//! Whole-bridge scenarios: encrypted meter bytes in on one UART, SunSpec
//! register reads out on the other, within single cooperative ticks.

use chrono::{NaiveDate, NaiveDateTime};

use smartmeter_rs::bridge::{LedColor, StatusLed, TimeSource};
use smartmeter_rs::dlms::crypto::apply_keystream;
use smartmeter_rs::io::{MockByteSink, MockByteSource};
use smartmeter_rs::modbus::crc16;
use smartmeter_rs::{AesKey, Bridge, Sinks};

use std::sync::{Arc, Mutex};

const SYSTEM_TITLE: [u8; 8] = [0x4B, 0x46, 0x4D, 0x67, 0x50, 0x02, 0x50, 0x27];
const FRAME_COUNTER: u32 = 0x0000_1234;
const SLAVE: u8 = 240;

fn test_key() -> AesKey {
    AesKey::from_hex("36C66639E48A8CA4D6BC8B282A793BBB").unwrap()
}

fn entry_long_unsigned(obis: [u8; 6], raw: u16, accuracy: u8) -> Vec<u8> {
    let mut entry = vec![0x09, 0x06];
    entry.extend_from_slice(&obis);
    entry.push(0x12);
    entry.extend_from_slice(&raw.to_be_bytes());
    entry.extend_from_slice(&[0x02, 0x02]);
    entry.extend_from_slice(&[0x0F, accuracy, 0x16, 0x23, 0x00, 0x00]);
    entry
}

fn entry_double_long_unsigned(obis: [u8; 6], raw: u32) -> Vec<u8> {
    let mut entry = vec![0x09, 0x06];
    entry.extend_from_slice(&obis);
    entry.push(0x06);
    entry.extend_from_slice(&raw.to_be_bytes());
    entry.extend_from_slice(&[0x02, 0x02]);
    entry.extend_from_slice(&[0x0F, 0x00, 0x16, 0x1B, 0x00, 0x00]);
    entry
}

fn build_plaintext(entries: &[Vec<u8>]) -> Vec<u8> {
    let mut plaintext = vec![0x0F, 0x00, 0x00, 0x12, 0x34, 0x0C];
    plaintext.extend_from_slice(&[0x07, 0xE8, 0x06, 0x01, 0x06, 0x0B, 0x1E, 0x00]);
    plaintext.extend_from_slice(&[0x00, 0x80, 0x00, 0x00, 0x02, 0x19]);
    for entry in entries {
        plaintext.extend_from_slice(entry);
    }
    plaintext
}

fn build_apdu(key: &AesKey, plaintext: &[u8]) -> Vec<u8> {
    let mut iv = [0u8; 12];
    iv[..8].copy_from_slice(&SYSTEM_TITLE);
    iv[8..].copy_from_slice(&FRAME_COUNTER.to_be_bytes());
    let mut ciphertext = plaintext.to_vec();
    apply_keystream(key, &iv, &mut ciphertext);

    let declared = (plaintext.len() + 5) as u16;
    let mut apdu = vec![0xDB, 0x08];
    apdu.extend_from_slice(&SYSTEM_TITLE);
    if declared <= 0x7F {
        apdu.push(declared as u8);
    } else {
        apdu.push(0x82);
        apdu.extend_from_slice(&declared.to_be_bytes());
    }
    apdu.push(0x21);
    apdu.extend_from_slice(&FRAME_COUNTER.to_be_bytes());
    apdu.extend_from_slice(&ciphertext);
    apdu
}

fn mbus_stream(apdu: &[u8], parts: usize) -> Vec<u8> {
    let chunk_size = apdu.len().div_ceil(parts);
    let mut stream = Vec::new();
    for chunk in apdu.chunks(chunk_size) {
        let mut payload = vec![0x53, 0xFF, 0x00, 0x01, 0x67];
        payload.extend_from_slice(chunk);
        let checksum = payload.iter().fold(0u8, |sum, b| sum.wrapping_add(*b));
        stream.push(0x68);
        stream.push(payload.len() as u8);
        stream.push(payload.len() as u8);
        stream.push(0x68);
        stream.extend_from_slice(&payload);
        stream.push(checksum);
        stream.push(0x16);
    }
    stream
}

/// The meter frame used by most scenarios: 230.1/231.5/228.8 V,
/// 3.12/1.28/0.96 A, 1250 W import, no export.
fn importing_meter_stream() -> Vec<u8> {
    let entries = vec![
        entry_long_unsigned([0x01, 0x00, 0x20, 0x07, 0x00, 0xFF], 2301, 0xFF),
        entry_long_unsigned([0x01, 0x00, 0x34, 0x07, 0x00, 0xFF], 2315, 0xFF),
        entry_long_unsigned([0x01, 0x00, 0x48, 0x07, 0x00, 0xFF], 2288, 0xFF),
        entry_long_unsigned([0x01, 0x00, 0x1F, 0x07, 0x00, 0xFF], 312, 0xFE),
        entry_long_unsigned([0x01, 0x00, 0x33, 0x07, 0x00, 0xFF], 128, 0xFE),
        entry_long_unsigned([0x01, 0x00, 0x47, 0x07, 0x00, 0xFF], 96, 0xFE),
        entry_double_long_unsigned([0x01, 0x00, 0x01, 0x07, 0x00, 0xFF], 1250),
        entry_double_long_unsigned([0x01, 0x00, 0x02, 0x07, 0x00, 0xFF], 0),
        entry_double_long_unsigned([0x01, 0x00, 0x01, 0x08, 0x00, 0xFF], 6_000_000),
        entry_double_long_unsigned([0x01, 0x00, 0x02, 0x08, 0x00, 0xFF], 1_500_000),
        entry_double_long_unsigned([0x01, 0x00, 0x03, 0x08, 0x00, 0xFF], 900_000),
        entry_double_long_unsigned([0x01, 0x00, 0x04, 0x08, 0x00, 0xFF], 300_000),
    ];
    mbus_stream(&build_apdu(&test_key(), &build_plaintext(&entries)), 2)
}

fn read_request(start: u16, count: u16) -> Vec<u8> {
    let mut frame = vec![SLAVE, 0x03];
    frame.extend_from_slice(&start.to_be_bytes());
    frame.extend_from_slice(&count.to_be_bytes());
    frame.extend_from_slice(&crc16(&frame).to_le_bytes());
    frame
}

/// Parse the float payload out of a 0x03 response frame.
fn response_floats(frame: &[u8]) -> Vec<f32> {
    assert!(frame.len() >= 5);
    assert_eq!(frame[0], SLAVE);
    assert_eq!(frame[1], 0x03);
    let byte_count = frame[2] as usize;
    assert_eq!(frame.len(), 3 + byte_count + 2);
    let crc = crc16(&frame[..3 + byte_count]);
    assert_eq!(&frame[3 + byte_count..], crc.to_le_bytes());
    frame[3..3 + byte_count]
        .chunks(4)
        .map(|c| f32::from_be_bytes(c.try_into().unwrap()))
        .collect()
}

fn idle_sources() -> (MockByteSource, MockByteSource, MockByteSink) {
    (MockByteSource::new(), MockByteSource::new(), MockByteSink::new())
}

#[test]
fn test_meter_data_lands_in_registers() {
    let mut bridge = Bridge::new(test_key(), SLAVE, Sinks::new());
    let (_, mut modbus_rx, mut modbus_tx) = idle_sources();
    let mut meter = MockByteSource::from_bytes(&importing_meter_stream());
    bridge.tick(&mut meter, &mut modbus_rx, &mut modbus_tx);

    // Phase voltages: average | L1 | L2 | L3 at registers 40079..
    modbus_rx.push_bytes(&read_request(40079, 8));
    bridge.tick(&mut meter, &mut modbus_rx, &mut modbus_tx);
    let voltages = response_floats(&modbus_tx.written);
    let expected_avg = (230.1f32 + 231.5 + 228.8) / 3.0;
    assert!((voltages[0] - expected_avg).abs() < 0.01);
    assert_eq!(voltages[1], 230.1);
    assert_eq!(voltages[2], 231.5);
    assert_eq!(voltages[3], 228.8);

    // Currents: total | L1 | L2 | L3 at registers 40071..
    modbus_tx.written.clear();
    modbus_rx.push_bytes(&read_request(40071, 8));
    bridge.tick(&mut meter, &mut modbus_rx, &mut modbus_tx);
    let currents = response_floats(&modbus_tx.written);
    assert!((currents[0] - 5.36).abs() < 0.001);
    assert_eq!(currents[1], 3.12);
    assert_eq!(currents[2], 1.28);
    assert_eq!(currents[3], 0.96);
}

#[test]
fn test_derived_power_registers() {
    let mut bridge = Bridge::new(test_key(), SLAVE, Sinks::new());
    let (_, mut modbus_rx, mut modbus_tx) = idle_sources();
    let mut meter = MockByteSource::from_bytes(&importing_meter_stream());
    bridge.tick(&mut meter, &mut modbus_rx, &mut modbus_tx);

    let apparent = 230.1f32 * 3.12 + 231.5 * 1.28 + 228.8 * 0.96;
    let power_factor = (1250.0f32 / apparent).abs();

    // Total active power (signed net) at 40097.
    modbus_rx.push_bytes(&read_request(40097, 2));
    bridge.tick(&mut meter, &mut modbus_rx, &mut modbus_tx);
    let power = response_floats(&modbus_tx.written);
    assert!((power[0] - 1250.0).abs() < 0.01);

    // Apparent power group at 40105.
    modbus_tx.written.clear();
    modbus_rx.push_bytes(&read_request(40105, 8));
    bridge.tick(&mut meter, &mut modbus_rx, &mut modbus_tx);
    let apparent_read = response_floats(&modbus_tx.written);
    assert!((apparent_read[0] - apparent).abs() < 0.01);
    assert!((apparent_read[1] - 230.1 * 3.12).abs() < 0.01);

    // Power factor group at 40121.
    modbus_tx.written.clear();
    modbus_rx.push_bytes(&read_request(40121, 2));
    bridge.tick(&mut meter, &mut modbus_rx, &mut modbus_tx);
    let pf = response_floats(&modbus_tx.written);
    assert!((pf[0] - power_factor).abs() < 0.0001);

    // Frequency is pinned to the mains region.
    modbus_tx.written.clear();
    modbus_rx.push_bytes(&read_request(40095, 2));
    bridge.tick(&mut meter, &mut modbus_rx, &mut modbus_tx);
    assert_eq!(response_floats(&modbus_tx.written), vec![50.0]);
}

#[test]
fn test_energy_split_across_phases() {
    let mut bridge = Bridge::new(test_key(), SLAVE, Sinks::new());
    let (_, mut modbus_rx, mut modbus_tx) = idle_sources();
    let mut meter = MockByteSource::from_bytes(&importing_meter_stream());
    bridge.tick(&mut meter, &mut modbus_rx, &mut modbus_tx);

    // Wh imported: total | a | b | c at 40137.
    modbus_rx.push_bytes(&read_request(40137, 8));
    bridge.tick(&mut meter, &mut modbus_rx, &mut modbus_tx);
    let imported = response_floats(&modbus_tx.written);
    assert_eq!(imported[0], 6_000_000.0);
    assert_eq!(imported[1], 2_000_000.0);

    // Wh exported at 40129.
    modbus_tx.written.clear();
    modbus_rx.push_bytes(&read_request(40129, 2));
    bridge.tick(&mut meter, &mut modbus_rx, &mut modbus_tx);
    assert_eq!(response_floats(&modbus_tx.written), vec![1_500_000.0]);

    // VAh imported (reactive+) at 40153.
    modbus_tx.written.clear();
    modbus_rx.push_bytes(&read_request(40153, 2));
    bridge.tick(&mut meter, &mut modbus_rx, &mut modbus_tx);
    assert_eq!(response_floats(&modbus_tx.written), vec![900_000.0]);
}

#[test]
fn test_sunspec_header_readable_without_meter_data() {
    let mut bridge = Bridge::new(test_key(), SLAVE, Sinks::new());
    let (mut meter, mut modbus_rx, mut modbus_tx) = idle_sources();

    modbus_rx.push_bytes(&read_request(40000, 2));
    bridge.tick(&mut meter, &mut modbus_rx, &mut modbus_tx);

    assert_eq!(modbus_tx.written[0], SLAVE);
    assert_eq!(modbus_tx.written[1], 0x03);
    assert_eq!(modbus_tx.written[2], 4);
    assert_eq!(&modbus_tx.written[3..7], b"SunS");
}

#[test]
fn test_out_of_image_read_gets_illegal_address() {
    let mut bridge = Bridge::new(test_key(), SLAVE, Sinks::new());
    let (mut meter, mut modbus_rx, mut modbus_tx) = idle_sources();

    modbus_rx.push_bytes(&read_request(40195, 3));
    bridge.tick(&mut meter, &mut modbus_rx, &mut modbus_tx);

    assert_eq!(modbus_tx.written[1], 0x83);
    assert_eq!(modbus_tx.written[2], 0x02);
}

#[test]
fn test_non_read_function_gets_illegal_function() {
    let mut bridge = Bridge::new(test_key(), SLAVE, Sinks::new());
    let (mut meter, mut modbus_rx, mut modbus_tx) = idle_sources();

    let mut frame = vec![SLAVE, 0x04, 0x00, 0x02, 0x00, 0x01];
    frame.extend_from_slice(&crc16(&frame).to_le_bytes());
    modbus_rx.push_bytes(&frame);
    bridge.tick(&mut meter, &mut modbus_rx, &mut modbus_tx);

    assert_eq!(modbus_tx.written[1], 0x84);
    assert_eq!(modbus_tx.written[2], 0x01);
}

#[derive(Clone, Default)]
struct RecordingLed {
    states: Arc<Mutex<Vec<LedColor>>>,
}

impl StatusLed for RecordingLed {
    fn set(&mut self, color: LedColor) {
        self.states.lock().unwrap().push(color);
    }
}

#[test]
fn test_led_blinks_green_on_decode() {
    let led = RecordingLed::default();
    let states = led.states.clone();
    let mut bridge =
        Bridge::new(test_key(), SLAVE, Sinks::new()).with_status_led(Box::new(led));
    let (_, mut modbus_rx, mut modbus_tx) = idle_sources();

    let mut meter = MockByteSource::from_bytes(&importing_meter_stream());
    for _ in 0..8 {
        bridge.tick(&mut meter, &mut modbus_rx, &mut modbus_tx);
    }

    assert_eq!(*states.lock().unwrap(), vec![LedColor::Green, LedColor::Off]);
}

#[test]
fn test_led_blinks_red_on_garbage_apdu() {
    let led = RecordingLed::default();
    let states = led.states.clone();
    let mut bridge =
        Bridge::new(test_key(), SLAVE, Sinks::new()).with_status_led(Box::new(led));
    let (_, mut modbus_rx, mut modbus_tx) = idle_sources();

    // A checksum-valid M-Bus frame whose payload is not a DLMS APDU.
    let payload: Vec<u8> = std::iter::repeat(0xAA).take(30).collect();
    let checksum = payload.iter().fold(0u8, |sum, b| sum.wrapping_add(*b));
    let mut frame = vec![0x68, payload.len() as u8, payload.len() as u8, 0x68];
    frame.extend_from_slice(&payload);
    frame.push(checksum);
    frame.push(0x16);

    let mut meter = MockByteSource::from_bytes(&frame);
    for _ in 0..8 {
        bridge.tick(&mut meter, &mut modbus_rx, &mut modbus_tx);
    }

    assert_eq!(*states.lock().unwrap(), vec![LedColor::Red, LedColor::Off]);
}

struct FixedClock(NaiveDateTime);

impl TimeSource for FixedClock {
    fn now(&self) -> Option<NaiveDateTime> {
        Some(self.0)
    }
}

#[test]
fn test_energy_flow_window_tracks_export() {
    let noon = NaiveDate::from_ymd_opt(2024, 6, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap();
    let window_texts = Arc::new(Mutex::new(Vec::new()));
    let window_sink = window_texts.clone();
    let mut bridge = Bridge::new(test_key(), SLAVE, Sinks::new())
        .with_time_source(Box::new(FixedClock(noon)))
        .with_flow_window_sink(Box::new(move |text: &str| {
            window_sink.lock().unwrap().push(text.to_string());
        }));
    let (_, mut modbus_rx, mut modbus_tx) = idle_sources();

    assert_eq!(bridge.energy_flow_window(), "--");

    // An exporting frame: no import power, 1.5 kW feeding the grid.
    let entries = vec![
        entry_long_unsigned([0x01, 0x00, 0x20, 0x07, 0x00, 0xFF], 2301, 0xFF),
        entry_double_long_unsigned([0x01, 0x00, 0x01, 0x07, 0x00, 0xFF], 0),
        entry_double_long_unsigned([0x01, 0x00, 0x02, 0x07, 0x00, 0xFF], 1500),
    ];
    let stream = mbus_stream(&build_apdu(&test_key(), &build_plaintext(&entries)), 1);
    let mut meter = MockByteSource::from_bytes(&stream);
    bridge.tick(&mut meter, &mut modbus_rx, &mut modbus_tx);

    assert_eq!(bridge.energy_flow_window(), "12:00 - 12:00");
    assert_eq!(*window_texts.lock().unwrap(), vec!["12:00 - 12:00".to_string()]);
}

#[test]
fn test_no_time_source_keeps_placeholder() {
    let mut bridge = Bridge::new(test_key(), SLAVE, Sinks::new());
    let (_, mut modbus_rx, mut modbus_tx) = idle_sources();

    let entries = vec![
        entry_double_long_unsigned([0x01, 0x00, 0x01, 0x07, 0x00, 0xFF], 0),
        entry_double_long_unsigned([0x01, 0x00, 0x02, 0x07, 0x00, 0xFF], 1500),
    ];
    let stream = mbus_stream(&build_apdu(&test_key(), &build_plaintext(&entries)), 1);
    let mut meter = MockByteSource::from_bytes(&stream);
    bridge.tick(&mut meter, &mut modbus_rx, &mut modbus_tx);

    assert_eq!(bridge.energy_flow_window(), "--");
}
