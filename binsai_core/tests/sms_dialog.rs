//! SMS batch dialog against the simulated modem.

use binsai_core::classify;
use binsai_core::sms::{DialogState, Message, SmsDialog, compose_message};
use binsai_hardware::sim::SimModem;
use rstest::rstest;

fn message() -> Message {
    compose_message("BINSAI-TEST01", &classify(95.0, 900.0), None)
}

/// Tick every 10 ms until the batch reports or `limit_ms` passes.
fn drive(d: &mut SmsDialog, modem: &mut SimModem, start: u64, limit_ms: u64) -> Option<(u64, binsai_core::sms::BatchReport)> {
    let mut now = start;
    while now <= start + limit_ms {
        if let Some(r) = d.tick(now, modem) {
            return Some((now, r));
        }
        now += 10;
    }
    None
}

#[test]
fn sends_to_every_recipient_in_order() {
    let mut modem = SimModem::new();
    let numbers = vec!["+6281111111".to_string(), "+6282222222".into(), "+6283333333".into()];
    let mut d = SmsDialog::new(numbers.clone());
    d.request(message(), 0).unwrap();
    let (done_at, report) = drive(&mut d, &mut modem, 0, 30_000).unwrap();
    assert!(report.all_sent());
    assert_eq!(report.total, 3);
    // two inter-recipient pauses
    assert!((4_000..4_100).contains(&done_at), "{done_at}");
    let sent: Vec<_> = modem.sent().into_iter().map(|s| s.number).collect();
    assert_eq!(sent, numbers);
    assert_eq!(modem.sent()[0].body, message().as_str());
    assert!(d.is_idle());
}

#[rstest]
#[case::empty("")]
#[case::zeros("+0000000000")]
#[case::short("+62812")]
#[case::letters("+62812ABCDE")]
fn placeholder_numbers_skipped_and_counted(#[case] bad: &str) {
    let mut modem = SimModem::new();
    let mut d = SmsDialog::new(vec![bad.to_string(), "+6281234567".into()]);
    d.request(message(), 0).unwrap();
    let (_, report) = drive(&mut d, &mut modem, 0, 30_000).unwrap();
    assert_eq!((report.sent, report.failed), (1, 1));
    assert!(!modem.commands().iter().any(|c| c.contains(&format!("\"{bad}\""))));
}

#[test]
fn rejected_recipient_does_not_stop_batch() {
    let mut modem = SimModem::new();
    modem.fail_number("+6281111111");
    let mut d = SmsDialog::new(vec!["+6281111111".into(), "+6282222222".into()]);
    d.request(message(), 0).unwrap();
    let (_, report) = drive(&mut d, &mut modem, 0, 30_000).unwrap();
    assert_eq!((report.sent, report.failed), (1, 1));
    assert!(matches!(
        report.last_failure,
        Some(binsai_core::BinsaiError::ModemSendFailed { index: 0, .. })
    ));
}

#[test]
fn missing_confirmation_times_out_per_recipient() {
    let mut modem = SimModem::new();
    modem.set_withhold_confirm(true);
    let mut d = SmsDialog::new(vec!["+6281111111".into()]);
    d.request(message(), 0).unwrap();
    assert!(d.tick(0, &mut modem).is_none());
    assert!(matches!(d.state(), DialogState::AwaitConfirm { ix: 0, .. }));
    let (done_at, report) = drive(&mut d, &mut modem, 10, 30_000).unwrap();
    assert_eq!(done_at, 10_000);
    assert_eq!((report.sent, report.failed), (0, 1));
    assert!(!report.timed_out);
}

#[test]
fn batch_deadline_fails_remaining_recipients() {
    let mut modem = SimModem::new();
    modem.set_withhold_confirm(true);
    let numbers = (1..=3).map(|i| format!("+628100000{i}")).collect();
    let mut d = SmsDialog::new(numbers);
    d.request(message(), 0).unwrap();
    let (done_at, report) = drive(&mut d, &mut modem, 0, 40_000).unwrap();
    assert_eq!(done_at, 30_000);
    assert!(report.timed_out);
    assert_eq!((report.sent, report.failed), (0, 3));
}

#[test]
fn silent_modem_fails_on_prompt_timeout() {
    let mut modem = SimModem::new();
    modem.set_responsive(false);
    let mut d = SmsDialog::new(vec!["+6281111111".into(), "+6282222222".into()]);
    d.request(message(), 0).unwrap();
    let (done_at, report) = drive(&mut d, &mut modem, 0, 30_000).unwrap();
    // 5 s prompt wait, 2 s pause, 5 s prompt wait
    assert_eq!(done_at, 12_000);
    assert_eq!(report.failed, 2);
}

#[test]
fn request_refused_while_in_flight() {
    let mut d = SmsDialog::new(vec!["+6281111111".into()]);
    d.request(message(), 0).unwrap();
    assert!(d.request(message(), 5).is_err());
    assert_eq!(d.progress(), Some((0, 1)));
}
