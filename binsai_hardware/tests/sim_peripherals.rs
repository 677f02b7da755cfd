use std::time::Duration;

use binsai_hardware::NmeaParser;
use binsai_hardware::sim::{SimCloud, SimDisplay, SimGps, SimModem, SimUltrasonic};
use binsai_traits::{ChannelValue, CharDisplay, CloudLink, GpsParser, SerialPort, Ultrasonic};
use rstest::rstest;

fn drain(port: &mut impl SerialPort) -> String {
    let mut out = Vec::new();
    let mut buf = [0u8; 16];
    loop {
        let n = port.read_available(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    String::from_utf8(out).unwrap()
}

#[rstest]
#[case("AT\r", "OK")]
#[case("ATE0\r", "OK")]
#[case("AT+CPIN?\r", "+CPIN: READY")]
#[case("AT+CREG?\r", "+CREG: 0,1")]
#[case("AT+CSQ\r", "+CSQ: 18,0")]
#[case("AT+BOGUS\r", "ERROR")]
fn modem_answers_init_commands(#[case] cmd: &str, #[case] expect: &str) {
    let mut m = SimModem::new();
    m.write(cmd.as_bytes()).unwrap();
    assert!(drain(&mut m).contains(expect));
}

#[test]
fn modem_send_flow_records_message() {
    let modem = SimModem::new();
    let mut port = modem.clone();
    port.write(b"AT+CMGS=\"+15550001111\"\r").unwrap();
    assert!(drain(&mut port).contains('>'));
    port.write(b"hello bin").unwrap();
    port.write(&[0x1A]).unwrap();
    let resp = drain(&mut port);
    assert!(resp.contains("+CMGS: 1") && resp.contains("OK"), "{resp:?}");
    let sent = modem.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].number, "+15550001111");
    assert_eq!(sent[0].body, "hello bin");
}

#[test]
fn failing_number_and_silent_modem() {
    let modem = SimModem::new();
    modem.fail_number("+15550002222");
    let mut port = modem.clone();
    port.write(b"AT+CMGS=\"+15550002222\"\r").unwrap();
    assert!(drain(&mut port).contains("ERROR"));

    modem.set_responsive(false);
    port.write(b"AT\r").unwrap();
    assert_eq!(drain(&mut port), "");
    assert_eq!(modem.commands().last().map(String::as_str), Some("AT"));
}

#[test]
fn gps_emits_parseable_sentences() {
    let gps = SimGps::new(1);
    gps.set_fix(-6.2, 106.8, 6, 1.1);
    let mut port = gps.clone();
    let text = drain(&mut port);
    let mut parser = NmeaParser::new();
    text.bytes().for_each(|b| parser.feed(b));
    let fix = parser.take_update().expect("fix decoded");
    assert_eq!(fix.sats, 6);
}

#[test]
fn ultrasonic_distance_maps_to_echo_width() {
    let us = SimUltrasonic::new(20.0);
    let mut dev = us.clone();
    let w = dev.echo_width_us(Duration::from_millis(30)).unwrap();
    assert!((f64::from(w) * 0.01715 - 20.0).abs() < 0.02);
    us.set_no_echo();
    assert_eq!(dev.echo_width_us(Duration::from_millis(30)).unwrap(), 0);
    assert_eq!(us.pings(), 2);
}

#[test]
fn absent_display_rejects_writes() {
    let mut d = SimDisplay::new(false);
    assert!(!d.probe());
    assert!(d.write_row(0, "x").is_err());
}

#[test]
fn cloud_write_requires_connection() {
    let cloud = SimCloud::new();
    let mut link = cloud.clone();
    assert!(link.virtual_write(0, ChannelValue::Int(5)).is_err());
    link.connect("tok", Duration::from_secs(10)).unwrap();
    link.virtual_write(0, ChannelValue::Int(5)).unwrap();
    assert_eq!(cloud.last(0).as_deref(), Some("5"));
    cloud.set_reachable(false);
    assert!(link.run().is_err());
    assert!(!link.is_connected());
}
