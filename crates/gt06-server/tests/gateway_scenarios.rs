//! End-to-end scenarios against a real `GatewayRuntime` bound to a loopback
//! socket, driven with raw TCP bytes the way an actual GT06 tracker would.

use std::time::Duration;

use gt06_server::{
    GatewayConfig, GatewayListener, GatewayRuntime, MemorySessionStore, SystemEnv,
    TracingTelemetryEmitter,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

async fn spawn_gateway() -> std::net::SocketAddr {
    let config = GatewayConfig { bind_address: "127.0.0.1:0".to_string(), ..Default::default() };
    let listener = GatewayListener::bind(&config.bind_address).await.expect("bind should succeed");
    let addr = listener.local_addr().expect("local_addr should succeed");

    let env = SystemEnv::new();
    let wall_clock_env = env.clone();
    let runtime = GatewayRuntime::new(
        config,
        MemorySessionStore::new(600),
        env,
        TracingTelemetryEmitter,
        move || wall_clock_env.wall_clock_secs(),
    );

    tokio::spawn(async move {
        let _ = runtime.serve(listener).await;
    });

    addr
}

fn login_wire(imei_digits: [u8; 8], serial: u16) -> Vec<u8> {
    let mut wire = vec![0x78, 0x78, 0x0D, 0x01];
    wire.extend_from_slice(&imei_digits);
    wire.extend_from_slice(&serial.to_be_bytes());

    let crc = gt06_proto::crc::crc_itu(&wire[2..]);
    wire.extend_from_slice(&crc.to_be_bytes());
    wire.extend_from_slice(&[0x0D, 0x0A]);
    wire
}

async fn read_n(stream: &mut TcpStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    stream.read_exact(&mut buf).await.expect("expected at least n bytes from gateway");
    buf
}

#[tokio::test]
async fn login_is_acked_with_exact_bytes() {
    let addr = spawn_gateway().await;
    let mut client = TcpStream::connect(addr).await.expect("connect should succeed");

    let login = login_wire([0x01, 0x23, 0x45, 0x67, 0x89, 0x01, 0x23, 0x45], 1);
    client.write_all(&login).await.expect("write should succeed");

    let ack = read_n(&mut client, 10).await;
    assert_eq!(ack, vec![0x78, 0x78, 0x05, 0x01, 0x00, 0x01, 0xD9, 0xDC, 0x0D, 0x0A]);
}

#[tokio::test]
async fn garbage_before_login_is_skipped_and_login_still_succeeds() {
    let addr = spawn_gateway().await;
    let mut client = TcpStream::connect(addr).await.expect("connect should succeed");

    let mut wire = vec![0xFF, 0xFF, 0x00, 0x11];
    wire.extend_from_slice(&login_wire([0x01, 0x23, 0x45, 0x67, 0x89, 0x01, 0x23, 0x45], 1));
    client.write_all(&wire).await.expect("write should succeed");

    let ack = read_n(&mut client, 10).await;
    assert_eq!(&ack[..2], &[0x78, 0x78]);
    assert_eq!(ack[3], 0x01); // login opcode echoed back
}

#[tokio::test]
async fn heartbeat_before_login_gets_no_ack() {
    let addr = spawn_gateway().await;
    let mut client = TcpStream::connect(addr).await.expect("connect should succeed");

    // Heartbeat frame (opcode 0x23), empty body, serial 1.
    let mut wire = vec![0x78, 0x78, 0x05, 0x23, 0x00, 0x01];
    let crc = gt06_proto::crc::crc_itu(&wire[2..]);
    wire.extend_from_slice(&crc.to_be_bytes());
    wire.extend_from_slice(&[0x0D, 0x0A]);
    client.write_all(&wire).await.expect("write should succeed");

    // Nothing should come back; a subsequent login on a fresh connection
    // should still work, proving the gateway did not wedge.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut probe = [0u8; 1];
    let result =
        tokio::time::timeout(Duration::from_millis(50), client.read(&mut probe)).await;
    assert!(result.is_err(), "expected no ACK for an unauthenticated heartbeat");
}

#[tokio::test]
async fn reconnect_rebinds_the_same_session() {
    let addr = spawn_gateway().await;
    let imei = [0x01, 0x23, 0x45, 0x67, 0x89, 0x01, 0x23, 0x45];

    let mut first = TcpStream::connect(addr).await.expect("connect should succeed");
    first.write_all(&login_wire(imei, 1)).await.expect("write should succeed");
    read_n(&mut first, 10).await;
    drop(first);

    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut second = TcpStream::connect(addr).await.expect("connect should succeed");
    second.write_all(&login_wire(imei, 1)).await.expect("write should succeed");
    let ack = read_n(&mut second, 10).await;
    assert_eq!(&ack[..2], &[0x78, 0x78]);
}
