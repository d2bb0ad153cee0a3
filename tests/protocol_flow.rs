//! End-to-end protocol scenarios, driven through the public API.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use lifesos_lan_bridge::{
    classify, BaseUnit, BaseUnitConfig, BaseUnitState, ClientSession, Command, ContactId,
    DeviceChange, DeviceRegistry, FrameAssembler, LifeSosError, Message, OperationMode, Response,
};

#[test]
fn date_time_response_decodes_year_2008() {
    let response = Response::parse("!dt081215312030&").unwrap().unwrap();
    let Response::DateTime(dt) = response else {
        panic!("expected a date/time response");
    };
    assert!(!dt.was_set);
    assert_eq!(
        dt.remote_datetime.format("%Y-%m-%d %H:%M").to_string(),
        "2008-12-15 12:03"
    );
}

#[test]
fn magnet_open_event_flips_closed_state_with_one_notification() {
    let mut registry = DeviceRegistry::new();
    let Response::DeviceInfo(info) = Response::parse("!kb401234560010000102440080006120&")
        .unwrap()
        .unwrap()
    else {
        panic!("expected device info");
    };
    registry.upsert_from_info(&info);
    assert_eq!(registry.get(0x123456).unwrap().is_closed(), Some(true));

    let Some(Message::DeviceEvent(event)) = classify("MINPIC=0a4040123456001061") else {
        panic!("expected a device event");
    };
    let (changes, _code) = registry.apply_event(&event).unwrap();
    assert_eq!(changes, vec![DeviceChange::IsClosed(Some(false))]);
    assert_eq!(registry.get(0x123456).unwrap().is_closed(), Some(false));
}

#[tokio::test]
async fn execute_while_disconnected_fails_without_traffic() {
    let session = ClientSession::new(&BaseUnitConfig::default());
    let result = session.execute(Command::GetExitDelay, None, None).await;
    assert!(matches!(result, Err(LifeSosError::NotConnected)));
}

#[test]
fn split_chunks_reassemble_into_rom_version() {
    let mut assembler = FrameAssembler::new();
    assert!(assembler.push(b"!vn1.0").unwrap().is_empty());
    let lines = assembler.push(b"0&\n").unwrap();
    assert_eq!(lines.len(), 1);
    let Some(Message::Response(response)) = classify(&lines[0]) else {
        panic!("expected a response");
    };
    assert_eq!(
        response,
        Response::RomVersion {
            version: "1.00".to_string()
        }
    );
}

#[test]
fn corrupted_alarm_message_is_rejected_outright() {
    // Valid message, then the last hex digit flipped
    assert!(ContactId::parse("123418113101102b").is_ok());
    let result = ContactId::parse("123418113101102c");
    assert!(matches!(result, Err(LifeSosError::ChecksumMismatch)));
}

// Scripted stand-in for the base unit's ethernet adapter: answers the
// discovery queries, then hands the socket back for unsolicited pushes.
async fn run_scripted_adapter(listener: TcpListener) -> TcpStream {
    let (mut stream, _) = listener.accept().await.unwrap();
    let mut buf = vec![0u8; 256];
    let mut pending = String::new();
    loop {
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0, "client closed during discovery");
        pending.push_str(std::str::from_utf8(&buf[..n]).unwrap());

        // Commands are '!'..'&' framed with no line delimiters
        while let Some(end) = pending.find('&') {
            let frame: String = pending.drain(..=end).collect();
            let body = frame
                .trim_start_matches('!')
                .trim_end_matches('&')
                .to_string();
            let reply = scripted_reply(&body);
            stream.write_all(reply.as_bytes()).await.unwrap();
            if body.starts_with("s3") {
                // Switch 16 is the last discovery query
                return stream;
            }
        }
    }
}

fn scripted_reply(body: &str) -> String {
    match body {
        "vn?" => "!vn1.00&\r\n".to_string(),
        // Already in Away mode
        "n0?" => "!n02&\r\n".to_string(),
        // Exit and entry delay are both 15 seconds
        "l0?" => "!l00f&\r\n".to_string(),
        "l1?" => "!l10f&\r\n".to_string(),
        // One burglar magnet with the Delay flag set; every other slot and
        // category is empty
        "kb?00" => "!kb401234560010000102440080006120&\r\n".to_string(),
        _ => {
            if let Some(rest) = body.strip_prefix('k') {
                let category = rest.chars().next().unwrap();
                format!("!k{}no&\r\n", category)
            } else if let Some(rest) = body.strip_prefix('s') {
                // Every switch reports off
                let digit = rest.chars().next().unwrap();
                format!("!s{}<&\r\n", digit)
            } else {
                panic!("unexpected command: {:?}", body);
            }
        }
    }
}

macro_rules! wait_until {
    ($what:expr, $cond:expr) => {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if $cond {
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {}",
                $what
            );
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    };
}

#[tokio::test]
async fn entry_delay_state_dance_over_the_wire() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let adapter = tokio::spawn(run_scripted_adapter(listener));

    let config = BaseUnitConfig::builder()
        .host(addr.ip().to_string())
        .port(addr.port())
        .build();
    let unit = BaseUnit::new(config);
    unit.start();

    // Discovery completes: mode, delays and the magnet all land
    wait_until!(
        "discovery",
        unit.operation_mode().await == Some(OperationMode::Away)
            && unit.entry_delay().await == Some(15)
            && unit.device(0x123456).await.is_some()
    );
    assert_eq!(unit.state().await, Some(BaseUnitState::Away));

    let mut stream = adapter.await.unwrap();

    // Burglar Trigger while Away, Delay set, entry delay 15: the alarm is
    // deferred
    stream
        .write_all(b"MINPIC=0a5840123456001061\r\n")
        .await
        .unwrap();
    wait_until!(
        "entry delay state",
        unit.state().await == Some(BaseUnitState::AwayEntryDelay)
    );

    // Alarm-category Event while the entry delay is pending: back to Away
    stream.write_all(b"(123418113101102b)\r\n").await.unwrap();
    wait_until!(
        "return to away",
        unit.state().await == Some(BaseUnitState::Away)
    );

    unit.stop().await;
}
