use std::time::Duration;

use anyhow::Result;
use num_bigint::BigUint;
use spdz_extio::{
    channel::{Channel, TcpChannel, tcp::party_endpoints},
    field::{Field, encode_elements},
    protocol::{PHASE_OUTPUT, PHASE_TRIPLES, RoundStatus, Session},
    sim::deal_triple,
};
use tokio::{io::AsyncReadExt, net::TcpListener, task::JoinHandle};

fn field() -> Field {
    Field::new(BigUint::from(1_000_003u32)).unwrap()
}

/// Listens on consecutive ports and plays a computing party that reveals the masked input as the
/// result, authenticated with the dealt `(y, r, y·r)` shares.
async fn spawn_parties(f: &Field, parties: usize) -> Result<(u16, Vec<JoinHandle<Result<u32>>>)> {
    let (listeners, port_base) = loop {
        let first = TcpListener::bind("127.0.0.1:0").await?;
        let base = first.local_addr()?.port();
        let mut listeners = vec![first];
        for i in 1..parties {
            let Some(port) = base.checked_add(i as u16) else {
                break;
            };
            match TcpListener::bind(("127.0.0.1", port)).await {
                Ok(listener) => listeners.push(listener),
                Err(_) => break,
            }
        }
        if listeners.len() == parties {
            break (listeners, base);
        }
    };

    let triples = deal_triple(f, &f.element(5u32), &f.element(3u32), parties);
    let outputs = deal_triple(f, &f.element(12u32), &f.element(9u32), parties);
    let mut handles = vec![];
    for ((listener, triple), output) in listeners.into_iter().zip(triples).zip(outputs) {
        handles.push(tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await?;
            let mut client_id = [0; 4];
            socket.read_exact(&mut client_id).await?;
            let channel = TcpChannel::from_streams(vec![socket]);
            let status = channel.recv_bytes_from(0, "").await?;
            assert_eq!(status, vec![1, 0, 0, 0]);
            channel.send_bytes_to(0, encode_elements(&triple), PHASE_TRIPLES).await?;
            let masked = channel.recv_bytes_from(0, "").await?;
            assert_eq!(masked.len(), 3);
            channel.send_bytes_to(0, encode_elements(&output), PHASE_OUTPUT).await?;
            Ok::<_, anyhow::Error>(u32::from_le_bytes(client_id))
        }));
    }
    Ok((port_base, handles))
}

#[tokio::test]
async fn session_over_tcp() -> Result<()> {
    let f = field();
    let parties = 3;
    let (port_base, handles) = spawn_parties(&f, parties).await?;

    let endpoints = party_endpoints("127.0.0.1", port_base, parties)?;
    let channel = TcpChannel::connect(&endpoints, Duration::from_secs(10)).await?;
    let mut session = Session::new(channel, f.clone());
    session.handshake(7, RoundStatus::Finished).await?;
    session.send_private_inputs(&[f.element(7u32)]).await?;
    assert_eq!(session.receive_result().await?, f.element(12u32));
    session.into_channel().close().await?;

    for handle in handles {
        assert_eq!(handle.await??, 7);
    }
    Ok(())
}
