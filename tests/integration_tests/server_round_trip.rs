// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::Result;
use bytes::BufMut;
use memsession::monitoring::ErrorKind;
use serial_test::serial;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::sleep,
};

use crate::integration_tests::common::{read_reply, send_frame, spawn_server};

#[tokio::test]
#[serial]
async fn test_generate_add_get_over_tcp() -> Result<()> {
    let server = spawn_server().await?;
    let mut stream = TcpStream::connect(server.addr).await?;

    // GENERATE, lifetime 60s.
    send_frame(&mut stream, &[1, 0, 0, 0, 60]).await?;
    let reply = read_reply(&mut stream).await?;
    assert_eq!(reply[0], 1);
    assert_eq!(reply.len(), 17);
    let id: [u8; 16] = reply[1..].try_into().expect("id");

    // ADD_KEY on the same connection.
    let mut payload = vec![5u8];
    payload.put_slice(&id);
    payload.put_slice(b"greeting\0");
    payload.put_u32(5);
    payload.put_slice(b"hello");
    payload.put_u32(0);
    send_frame(&mut stream, &payload).await?;
    let reply = read_reply(&mut stream).await?;
    assert_eq!(reply, [1, 0, 0, 0, 1, 0, 0, 0, 0]);

    // GET_KEY, no rate ceiling.
    let mut payload = vec![6u8];
    payload.put_slice(&id);
    payload.put_slice(b"greeting\0");
    payload.put_u16(0);
    send_frame(&mut stream, &payload).await?;
    let reply = read_reply(&mut stream).await?;
    assert_eq!(reply[0], 1);
    assert_eq!(&reply[5..10], b"hello");

    assert_eq!(server.store.session_count(), 1);
    server.cancel.cancel();
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_oversize_frame_disconnects() -> Result<()> {
    let server = spawn_server().await?;
    let mut stream = TcpStream::connect(server.addr).await?;

    // 2 MiB length prefix is above the cap; the server must drop us.
    stream.write_all(&(2_097_152u32).to_be_bytes()).await?;

    let mut buf = [0u8; 1];
    match stream.read(&mut buf).await {
        Ok(0) | Err(_) => {},
        Ok(n) => panic!("expected a closed connection, read {n} bytes"),
    }

    // The disconnect counter lags the close by a hair; poll briefly.
    for _ in 0..20 {
        if server.monitoring.error_count(ErrorKind::Disconnection) > 0 {
            break;
        }
        sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(server.monitoring.error_count(ErrorKind::Disconnection), 1);

    server.cancel.cancel();
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_zero_length_frame_disconnects() -> Result<()> {
    let server = spawn_server().await?;
    let mut stream = TcpStream::connect(server.addr).await?;

    stream.write_all(&0u32.to_be_bytes()).await?;

    let mut buf = [0u8; 1];
    match stream.read(&mut buf).await {
        Ok(0) | Err(_) => {},
        Ok(n) => panic!("expected a closed connection, read {n} bytes"),
    }

    server.cancel.cancel();
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_two_clients_share_the_store() -> Result<()> {
    let server = spawn_server().await?;

    let mut first = TcpStream::connect(server.addr).await?;
    send_frame(&mut first, &[1, 0, 0, 0, 0]).await?;
    let reply = read_reply(&mut first).await?;
    let id: [u8; 16] = reply[1..].try_into().expect("id");

    // The second client probes the session the first one created.
    let mut second = TcpStream::connect(server.addr).await?;
    let mut payload = vec![2u8];
    payload.put_slice(&id);
    send_frame(&mut second, &payload).await?;
    assert_eq!(read_reply(&mut second).await?, [1]);

    server.cancel.cancel();
    Ok(())
}
