//! Communication channels between the client and the computing parties.
//!
//! A [`Channel`] connects the client to every computing party of a session, each party is addressed
//! by a fixed index `0..parties()`. The protocol only ever talks to all parties at once, through the
//! [`send_to_all`] and [`recv_from_all`] barriers.

use std::{fmt, future::Future, time::Duration};

use futures::future::try_join_all;
use tokio::{
    sync::{
        Mutex,
        mpsc::{Receiver, Sender, channel, error::SendError},
    },
    time::timeout,
};
use tracing::debug;

pub mod tcp;

pub use tcp::TcpChannel;

/// Errors related to sending / receiving messages.
#[derive(Debug, thiserror::Error)]
#[error("{phase} (party {party}): {reason}")]
pub struct Error {
    /// The protocol phase during which the error occurred.
    pub phase: String,
    /// The party whose connection failed.
    pub party: usize,
    /// The specific error that was raised.
    pub reason: ErrorKind,
}

/// The specific error that occurred when trying to send / receive a message.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// The message could not be received over the channel.
    #[error("could not receive message: {0}")]
    RecvError(String),
    /// The message could not be sent over the channel.
    #[error("could not send message: {0}")]
    SendError(String),
}

/// A communication channel used to send/receive messages to/from the computing parties.
pub trait Channel {
    /// The error that can occur sending messages over the channel.
    type SendError: fmt::Debug;
    /// The error that can occur receiving messages over the channel.
    type RecvError: fmt::Debug;

    /// The number of parties reachable over this channel.
    fn parties(&self) -> usize;

    /// Sends a framed message to the party with the given index (must be between `0..parties`).
    fn send_bytes_to(
        &self,
        party: usize,
        msg: Vec<u8>,
        phase: &str,
    ) -> impl Future<Output = Result<(), Self::SendError>> + Send;

    /// Awaits a framed message from the party with the given index (must be between
    /// `0..parties`).
    fn recv_bytes_from(
        &self,
        party: usize,
        phase: &str,
    ) -> impl Future<Output = Result<Vec<u8>, Self::RecvError>> + Send;

    /// Sends bytes without a length prefix.
    ///
    /// Transports that do not distinguish framed from raw bytes send a regular message.
    fn send_raw_to(
        &self,
        party: usize,
        msg: Vec<u8>,
        phase: &str,
    ) -> impl Future<Output = Result<(), Self::SendError>> + Send {
        self.send_bytes_to(party, msg, phase)
    }
}

/// Sends a framed message to a single party.
pub async fn send_to(
    channel: &impl Channel,
    party: usize,
    phase: &str,
    msg: Vec<u8>,
) -> Result<(), Error> {
    channel
        .send_bytes_to(party, msg, phase)
        .await
        .map_err(|e| Error {
            phase: phase.to_string(),
            party,
            reason: ErrorKind::SendError(format!("{e:?}")),
        })
}

/// Sends unframed bytes to a single party.
pub async fn send_raw_to(
    channel: &impl Channel,
    party: usize,
    phase: &str,
    msg: Vec<u8>,
) -> Result<(), Error> {
    channel
        .send_raw_to(party, msg, phase)
        .await
        .map_err(|e| Error {
            phase: phase.to_string(),
            party,
            reason: ErrorKind::SendError(format!("{e:?}")),
        })
}

/// Receives a framed message from a single party.
pub async fn recv_from(channel: &impl Channel, party: usize, phase: &str) -> Result<Vec<u8>, Error> {
    channel
        .recv_bytes_from(party, phase)
        .await
        .map_err(|e| Error {
            phase: phase.to_string(),
            party,
            reason: ErrorKind::RecvError(format!("{e:?}")),
        })
}

/// Sends the identical message to every party.
///
/// The sends run concurrently, the first failure aborts the others.
pub async fn send_to_all(channel: &impl Channel, phase: &str, msg: Vec<u8>) -> Result<(), Error> {
    let parties = channel.parties();
    debug!("Sending {phase} ({} bytes) to {parties} parties", msg.len());
    try_join_all((0..parties).map(|p| send_to(channel, p, phase, msg.clone()))).await?;
    Ok(())
}

/// Receives exactly one message from every party, indexed by party.
///
/// Only returns once all parties have answered, the first failure aborts the others and no partial
/// result is returned.
pub async fn recv_from_all(channel: &impl Channel, phase: &str) -> Result<Vec<Vec<u8>>, Error> {
    let parties = channel.parties();
    debug!("Waiting for {phase} from {parties} parties");
    try_join_all((0..parties).map(|p| recv_from(channel, p, phase))).await
}

/// The default time to wait for a message before giving up.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// A simple in-memory channel using [`Sender`] and [`Receiver`].
#[derive(Debug)]
pub struct SimpleChannel {
    s: Vec<Sender<Vec<u8>>>,
    r: Vec<Mutex<Receiver<Vec<u8>>>>,
    timeout: Duration,
}

impl SimpleChannel {
    /// Creates a client channel connected to `parties` party channels.
    ///
    /// Each party channel has a single peer, the client, at index 0.
    pub fn star(parties: usize) -> (Self, Vec<Self>) {
        let buffer_capacity = 1024;
        let mut client = SimpleChannel {
            s: vec![],
            r: vec![],
            timeout: DEFAULT_TIMEOUT,
        };
        let mut party_channels = vec![];
        for _ in 0..parties {
            let (send_to_party, recv_from_client) = channel(buffer_capacity);
            let (send_to_client, recv_from_party) = channel(buffer_capacity);
            client.s.push(send_to_party);
            client.r.push(Mutex::new(recv_from_party));
            party_channels.push(SimpleChannel {
                s: vec![send_to_client],
                r: vec![Mutex::new(recv_from_client)],
                timeout: DEFAULT_TIMEOUT,
            });
        }
        (client, party_channels)
    }

    /// Sets the time to wait for each message.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// The error raised by `recv` calls of a [`SimpleChannel`].
#[derive(Debug)]
pub enum AsyncRecvError {
    /// The channel has been closed.
    Closed,
    /// No message was received before the timeout.
    TimeoutElapsed,
    /// There is no party with this index.
    UnknownParty(usize),
}

/// The error raised by `send` calls of a [`SimpleChannel`].
#[derive(Debug)]
pub enum AsyncSendError {
    /// The receiving side has been dropped.
    Closed(SendError<Vec<u8>>),
    /// There is no party with this index.
    UnknownParty(usize),
}

impl Channel for SimpleChannel {
    type SendError = AsyncSendError;
    type RecvError = AsyncRecvError;

    fn parties(&self) -> usize {
        self.s.len()
    }

    async fn send_bytes_to(&self, p: usize, msg: Vec<u8>, phase: &str) -> Result<(), AsyncSendError> {
        let s = self.s.get(p).ok_or(AsyncSendError::UnknownParty(p))?;
        debug!("Sending msg {phase} to party {p} ({} bytes)...", msg.len());
        s.send(msg).await.map_err(AsyncSendError::Closed)
    }

    async fn recv_bytes_from(&self, p: usize, _phase: &str) -> Result<Vec<u8>, AsyncRecvError> {
        let mut r = self
            .r
            .get(p)
            .ok_or(AsyncRecvError::UnknownParty(p))?
            .lock()
            .await;
        match timeout(self.timeout, r.recv()).await {
            Ok(Some(bytes)) => Ok(bytes),
            Ok(None) => Err(AsyncRecvError::Closed),
            Err(_) => Err(AsyncRecvError::TimeoutElapsed),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{Channel, ErrorKind, SimpleChannel, recv_from_all, send_to_all};

    #[tokio::test]
    async fn broadcast_reaches_every_party() -> Result<(), super::Error> {
        let (client, parties) = SimpleChannel::star(3);
        assert_eq!(client.parties(), 3);
        send_to_all(&client, "hello", vec![1, 2, 3]).await?;
        for party in &parties {
            assert_eq!(party.parties(), 1);
            assert_eq!(party.recv_bytes_from(0, "hello").await.unwrap(), vec![1, 2, 3]);
        }
        Ok(())
    }

    #[tokio::test]
    async fn collect_all_keeps_party_order() -> Result<(), super::Error> {
        let (client, parties) = SimpleChannel::star(3);
        for (i, party) in parties.iter().enumerate().rev() {
            party.send_bytes_to(0, vec![i as u8], "reply").await.unwrap();
        }
        let msgs = recv_from_all(&client, "reply").await?;
        assert_eq!(msgs, vec![vec![0], vec![1], vec![2]]);
        Ok(())
    }

    #[tokio::test]
    async fn collect_all_fails_on_silent_party() {
        let (client, parties) = SimpleChannel::star(3);
        let client = client.with_timeout(Duration::from_millis(50));
        parties[0].send_bytes_to(0, vec![0], "reply").await.unwrap();
        parties[1].send_bytes_to(0, vec![1], "reply").await.unwrap();
        let err = recv_from_all(&client, "reply").await.unwrap_err();
        assert_eq!(err.party, 2);
        assert_eq!(err.phase, "reply");
        assert!(matches!(err.reason, ErrorKind::RecvError(ref e) if e == "TimeoutElapsed"));
    }

    #[tokio::test]
    async fn dropped_party_closes_channel() {
        let (client, mut parties) = SimpleChannel::star(2);
        parties.pop();
        let err = recv_from_all(&client, "reply").await.unwrap_err();
        assert_eq!(err.party, 1);
        assert!(matches!(err.reason, ErrorKind::RecvError(ref e) if e == "Closed"));
        let err = send_to_all(&client, "masked inputs", vec![]).await.unwrap_err();
        assert_eq!(err.party, 1);
        assert!(matches!(err.reason, ErrorKind::SendError(_)));
    }
}
