use serde_json::json;
use sony_av::frames::{
    self, FM_TUNER_PREFIX, POWER_OFF, SOURCE_FEEDBACK, STATUS_MUTE_OFF, STATUS_MUTE_ON,
    VOLUME_PREFIX,
};
use sony_av::{
    AvReceiver, ChangeKind, ChangeReceiver, DeviceEndpoint, DeviceState, ListenerState,
    ReceiverConfig, ReceiverError, Source,
};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

/// Loopback stand-in for the receiver: the first connection is the feedback
/// stream, every later one carries a single command frame.
struct MockDevice {
    feedback: TcpStream,
    commands: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl MockDevice {
    async fn push(&mut self, frame: &[u8]) {
        self.feedback.write_all(frame).await.unwrap();
    }

    async fn next_command(&mut self) -> Vec<u8> {
        timeout(WAIT, self.commands.recv())
            .await
            .expect("no command received")
            .expect("command channel closed")
    }

    async fn assert_no_command(&mut self) {
        let got = timeout(Duration::from_millis(200), self.commands.recv()).await;
        assert!(got.is_err(), "unexpected command {:02X?}", got);
    }
}

fn test_config() -> ReceiverConfig {
    ReceiverConfig::default().with_reconnect_delay(Duration::from_millis(10))
}

async fn start() -> (AvReceiver, MockDevice) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let endpoint = DeviceEndpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);

    let receiver = AvReceiver::connect(endpoint, test_config());
    let (feedback, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();

    let (tx, commands) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut frame = Vec::new();
                if stream.read_to_end(&mut frame).await.is_ok() && !frame.is_empty() {
                    let _ = tx.send(frame);
                }
            });
        }
    });

    let mut listener_state = receiver.watch_listener_state();
    timeout(WAIT, listener_state.wait_for(|s| *s == ListenerState::Reading))
        .await
        .unwrap()
        .unwrap();

    (receiver, MockDevice { feedback, commands })
}

async fn wait_for_state(receiver: &AvReceiver, done: impl Fn(&DeviceState) -> bool) -> DeviceState {
    timeout(WAIT, async {
        loop {
            let state = receiver.state();
            if done(&state) {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("state never reached")
}

async fn next_change(changes: &mut ChangeReceiver) -> sony_av::ChangeEvent {
    timeout(WAIT, changes.recv()).await.unwrap().unwrap()
}

fn source_report(source: Source, status: u8) -> Vec<u8> {
    let (_, prefix) = SOURCE_FEEDBACK
        .iter()
        .find(|(s, _)| *s == source)
        .unwrap();
    let mut frame = prefix.to_vec();
    frame.extend_from_slice(&[status, 0x00]);
    frame
}

#[tokio::test]
async fn every_source_is_selected_and_confirmed() {
    let (mut receiver, mut device) = start().await;
    let mut changes = receiver.subscribe();

    for &source in Source::ALL {
        receiver.select_source(source).await.unwrap();

        let command = device.next_command().await;
        assert_eq!(command, frames::source_command(source).unwrap(), "{}", source);

        let change = next_change(&mut changes).await;
        assert_eq!(change.kind, ChangeKind::SourceChanged);
        assert_eq!(change.value, json!(source.name()));
        assert_eq!(change.display_text, source.display_name());
    }

    receiver.shutdown().await;
}

#[tokio::test]
async fn every_source_report_is_decoded() {
    let (mut receiver, mut device) = start().await;

    // Consecutive sources differ, so each report is visible once applied
    for &source in Source::ALL {
        device.push(&source_report(source, STATUS_MUTE_OFF)).await;
        let state = wait_for_state(&receiver, |s| s.source == Some(source)).await;
        assert!(state.power);
        assert!(!state.muted);
    }

    receiver.shutdown().await;
}

#[tokio::test]
async fn reselecting_active_source_sends_nothing() {
    let (mut receiver, mut device) = start().await;

    receiver.select_source(Source::Tv).await.unwrap();
    device.next_command().await;

    receiver.select_source(Source::Tv).await.unwrap();
    device.assert_no_command().await;

    receiver.shutdown().await;
}

#[tokio::test]
async fn muted_source_report() {
    let (mut receiver, mut device) = start().await;
    let mut changes = receiver.subscribe();

    device.push(&source_report(Source::Usb, STATUS_MUTE_ON)).await;

    let source = next_change(&mut changes).await;
    assert_eq!(source.kind, ChangeKind::SourceChanged);
    assert_eq!(source.value, json!("usb"));

    let muted = next_change(&mut changes).await;
    assert_eq!(muted.kind, ChangeKind::MutedChanged);
    assert_eq!(muted.display_text, "Muted");

    let state = receiver.state();
    assert_eq!(state.source, Some(Source::Usb));
    assert!(state.muted);

    receiver.shutdown().await;
}

#[tokio::test]
async fn fm_report_switches_to_tuner() {
    let (mut receiver, mut device) = start().await;
    let mut changes = receiver.subscribe();

    let mut frame = FM_TUNER_PREFIX.to_vec();
    frame.extend_from_slice(&[3, 0x00, 38, 121]);
    device.push(&frame).await;

    let tuner = next_change(&mut changes).await;
    assert_eq!(tuner.kind, ChangeKind::FmTunerChanged);
    assert_eq!(tuner.display_text, "Preset 3 (98.50 MHz)");

    let source = next_change(&mut changes).await;
    assert_eq!(source.kind, ChangeKind::SourceChanged);
    assert_eq!(source.value, json!("fmTuner"));

    let state = receiver.state();
    assert_eq!(state.fm_tuner.preset, Some(3));
    assert!(state.fm_tuner.stereo);
    assert_eq!(state.fm_tuner.frequency_mhz, 98.5);
    assert_eq!(state.status_label(), "FM Tuner (98.5)");

    receiver.shutdown().await;
}

#[tokio::test]
async fn volume_report_then_step_up() {
    let (mut receiver, mut device) = start().await;
    let mut changes = receiver.subscribe();

    let mut frame = VOLUME_PREFIX.to_vec();
    frame.push(20);
    device.push(&frame).await;

    let change = next_change(&mut changes).await;
    assert_eq!(change.kind, ChangeKind::VolumeChanged);
    assert_eq!(change.value, json!(20));
    assert_eq!(change.display_text, "Volume 20");

    receiver.volume_up().await.unwrap();
    assert_eq!(device.next_command().await, frames::volume_command(22));
    assert_eq!(receiver.state().volume, 22);

    receiver.shutdown().await;
}

#[tokio::test]
async fn toggle_power_follows_current_state() {
    let (mut receiver, mut device) = start().await;

    // Power is assumed on until the device says otherwise
    receiver.toggle_power().await.unwrap();
    assert_eq!(device.next_command().await, POWER_OFF);
    assert!(receiver.state().power);

    receiver.shutdown().await;
}

#[tokio::test]
async fn shutdown_closes_feedback_and_silences_changes() {
    let (mut receiver, mut device) = start().await;
    let mut changes = receiver.subscribe();

    receiver.shutdown().await;
    assert_eq!(receiver.listener_state(), ListenerState::Closed);

    let mut buf = [0u8; 16];
    let n = timeout(WAIT, device.feedback.read(&mut buf)).await.unwrap().unwrap();
    assert_eq!(n, 0);

    receiver.commands().set_volume(30).await.unwrap();
    assert_eq!(receiver.state().volume, 30);
    assert!(changes.try_recv().unwrap().is_none());
}

#[tokio::test]
async fn unreachable_device_reports_send_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let endpoint = DeviceEndpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
    let mut receiver = AvReceiver::connect(endpoint, test_config());

    let err = receiver.set_volume(20).await.unwrap_err();
    assert!(matches!(err, ReceiverError::SendFailed { .. }), "got {:?}", err);
    assert_eq!(receiver.state().volume, sony_av::LOW_VOLUME);

    receiver.shutdown().await;
}
