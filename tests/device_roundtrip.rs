//! Exercises the driver against a scripted mock unit listening on localhost.

use std::sync::Arc;
use std::time::Duration;

use danfoss_air_tools::connection::{Connection, Error as ConnectionError};
use danfoss_air_tools::device::{Command, Device, Error as DeviceError};
use danfoss_air_tools::protocol::RESPONSE_LENGTH;
use danfoss_air_tools::registers::{Mode, RegisterIndex};
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio::net::TcpListener;

const TIMEOUT: Option<Duration> = Some(Duration::from_secs(5));

fn reply_with(meaningful: &[u8]) -> [u8; RESPONSE_LENGTH] {
    let mut reply = [0; RESPONSE_LENGTH];
    reply[..meaningful.len()].copy_from_slice(meaningful);
    reply
}

async fn bind_mock() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

#[tokio::test]
async fn read_round_trip() {
    let (listener, port) = bind_mock().await;
    let mock = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = [0; 4];
        stream.read_exact(&mut request).await.unwrap();
        assert_eq!(request, [0x01, 0x04, 0x14, 0x12]);
        stream.write_all(&reply_with(&[0x02])).await.unwrap();
    });

    let connection = Connection::with_address("127.0.0.1", port, TIMEOUT);
    connection.connect().await.unwrap();
    let mode = RegisterIndex::from_name("MODE").unwrap();
    let response = connection.send_robust_request(&mode.read_request()).await.unwrap();
    assert_eq!(response.byte(), 2);
    connection.disconnect().await;
    mock.await.unwrap();
}

#[tokio::test]
async fn reply_fragmented_across_segments_is_reassembled() {
    let (listener, port) = bind_mock().await;
    let mock = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = [0; 4];
        stream.read_exact(&mut request).await.unwrap();
        let reply = reply_with(&[0x08, 0x6b]);
        for chunk in reply.chunks(20) {
            stream.write_all(chunk).await.unwrap();
            stream.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    });

    let connection = Connection::with_address("127.0.0.1", port, TIMEOUT);
    connection.connect().await.unwrap();
    let register = RegisterIndex::from_name("ROOM_TEMPERATURE").unwrap();
    let response = connection.send_robust_request(&register.read_request()).await.unwrap();
    assert_eq!(response.short(), 2155);
    connection.disconnect().await;
    mock.await.unwrap();
}

#[tokio::test]
async fn write_reads_back_the_state_the_unit_confirms() {
    let (listener, port) = bind_mock().await;
    let mock = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut write_request = [0; 5];
        stream.read_exact(&mut write_request).await.unwrap();
        assert_eq!(write_request, [0x01, 0x06, 0x14, 0x12, 0x02]);
        stream.write_all(&reply_with(&[])).await.unwrap();
        let mut read_request = [0; 4];
        stream.read_exact(&mut read_request).await.unwrap();
        assert_eq!(read_request, [0x01, 0x04, 0x14, 0x12]);
        stream.write_all(&reply_with(&[0x02])).await.unwrap();
    });

    let device = Device::new(Connection::with_address("127.0.0.1", port, TIMEOUT));
    device.connect().await.unwrap();
    let confirmed = device.set_mode(Command::Text("MANUAL".to_string())).await.unwrap();
    assert_eq!(confirmed, Mode::Manual);
    device.disconnect().await;
    mock.await.unwrap();
}

#[tokio::test]
async fn mismatched_command_kind_skips_the_write() {
    let (listener, port) = bind_mock().await;
    let mock = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        // The only traffic must be the read-back; a write frame here would
        // make this request prefix come out as [0x01, 0x06, ..].
        let mut request = [0; 4];
        stream.read_exact(&mut request).await.unwrap();
        assert_eq!(request, [0x01, 0x04, 0x14, 0x12]);
        stream.write_all(&reply_with(&[0x00])).await.unwrap();
    });

    let device = Device::new(Connection::with_address("127.0.0.1", port, TIMEOUT));
    device.connect().await.unwrap();
    let read_back = device.set_mode(Command::Switch(true)).await.unwrap();
    assert_eq!(read_back, Mode::Demand);
    device.disconnect().await;
    mock.await.unwrap();
}

#[tokio::test]
async fn unknown_mode_name_fails_and_leaves_the_state_query_unaffected() {
    let (listener, port) = bind_mock().await;
    let mock = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = [0; 4];
        stream.read_exact(&mut request).await.unwrap();
        assert_eq!(request, [0x01, 0x04, 0x14, 0x12]);
        stream.write_all(&reply_with(&[0x00])).await.unwrap();
    });

    let device = Device::new(Connection::with_address("127.0.0.1", port, TIMEOUT));
    device.connect().await.unwrap();
    let error = device.set_mode(Command::Text("TURBO".to_string())).await.unwrap_err();
    assert!(matches!(error, DeviceError::UnknownModeName(name) if name == "TURBO"));
    assert_eq!(device.mode().await.unwrap(), Mode::Demand);
    device.disconnect().await;
    mock.await.unwrap();
}

#[tokio::test]
async fn reconnects_and_retries_once_after_a_dropped_connection() {
    let (listener, port) = bind_mock().await;
    let mock = tokio::spawn(async move {
        let (mut first, _) = listener.accept().await.unwrap();
        let mut request = [0; 4];
        first.read_exact(&mut request).await.unwrap();
        drop(first);
        let (mut second, _) = listener.accept().await.unwrap();
        second.read_exact(&mut request).await.unwrap();
        assert_eq!(request, [0x01, 0x04, 0x15, 0x30]);
        second.write_all(&reply_with(&[0x01])).await.unwrap();
    });

    let connection = Connection::with_address("127.0.0.1", port, TIMEOUT);
    connection.connect().await.unwrap();
    let boost = RegisterIndex::from_name("BOOST").unwrap();
    let response = connection.send_robust_request(&boost.read_request()).await.unwrap();
    assert!(response.boolean());
    connection.disconnect().await;
    mock.await.unwrap();
}

#[tokio::test]
async fn a_second_failure_is_fatal_and_nothing_retries_further() {
    let (listener, port) = bind_mock().await;
    let connection = Connection::with_address("127.0.0.1", port, TIMEOUT);
    connection.connect().await.unwrap();

    let mock = tokio::spawn(async move {
        for _ in 0..2 {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = [0; 4];
            stream.read_exact(&mut request).await.unwrap();
        }
        listener
    });

    let boost = RegisterIndex::from_name("BOOST").unwrap();
    let error = connection.send_robust_request(&boost.read_request()).await.unwrap_err();
    assert!(matches!(error, ConnectionError::Closed));

    // The fatal call must not have queued up a third connection attempt.
    let listener = mock.await.unwrap();
    let extra = tokio::time::timeout(Duration::from_millis(200), listener.accept()).await;
    assert!(extra.is_err());
}

#[tokio::test]
async fn read_timeout_is_recovered_by_the_single_retry() {
    let (listener, port) = bind_mock().await;
    let mock = tokio::spawn(async move {
        let (mut first, _) = listener.accept().await.unwrap();
        let mut request = [0; 4];
        first.read_exact(&mut request).await.unwrap();
        // Sit on the request without replying until the caller gives up.
        let (mut second, _) = listener.accept().await.unwrap();
        second.read_exact(&mut request).await.unwrap();
        second.write_all(&reply_with(&[0x01])).await.unwrap();
        drop(first);
    });

    let connection =
        Connection::with_address("127.0.0.1", port, Some(Duration::from_millis(200)));
    connection.connect().await.unwrap();
    let boost = RegisterIndex::from_name("BOOST").unwrap();
    let response = connection.send_robust_request(&boost.read_request()).await.unwrap();
    assert!(response.boolean());
    connection.disconnect().await;
    mock.await.unwrap();
}

#[tokio::test]
async fn concurrent_callers_never_interleave_their_exchanges() {
    let registers = ["MODE", "FAN_SPEED", "BOOST", "BYPASS", "HUMIDITY", "ROOM_TEMPERATURE"];
    const ROUNDS: usize = 3;

    let (listener, port) = bind_mock().await;
    let total = registers.len() * ROUNDS;
    let mock = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        for _ in 0..total {
            let mut request = [0; 4];
            stream.read_exact(&mut request).await.unwrap();
            // Every frame must be a whole endpoint-1 read; echo the register
            // code back so each caller can check it got its own reply.
            assert_eq!(&request[..2], &[0x01, 0x04]);
            stream.write_all(&reply_with(&request[2..4])).await.unwrap();
        }
    });

    let connection = Arc::new(Connection::with_address("127.0.0.1", port, TIMEOUT));
    connection.connect().await.unwrap();
    let mut callers = Vec::new();
    for name in registers {
        let connection = Arc::clone(&connection);
        callers.push(tokio::spawn(async move {
            let register = RegisterIndex::from_name(name).unwrap();
            let expected = i16::from_be_bytes(register.register());
            for _ in 0..ROUNDS {
                let response =
                    connection.send_robust_request(&register.read_request()).await.unwrap();
                assert_eq!(response.short(), expected);
            }
        }));
    }
    for caller in callers {
        caller.await.unwrap();
    }
    connection.disconnect().await;
    mock.await.unwrap();
}

#[tokio::test]
async fn disconnect_is_idempotent_and_never_fails() {
    let (listener, port) = bind_mock().await;
    let connection = Connection::with_address("127.0.0.1", port, TIMEOUT);
    // Disconnecting without a connection is a no-op.
    connection.disconnect().await;
    connection.connect().await.unwrap();
    connection.disconnect().await;
    connection.disconnect().await;
    drop(listener);
}
