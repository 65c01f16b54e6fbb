//! A [`Channel`] over one TCP connection per computing party.
//!
//! Frames are an 8-byte little-endian length followed by the payload. The connections are neither
//! encrypted nor authenticated: confidentiality of inputs and integrity of outputs rest on the
//! masking and the algebraic checks of the protocol, everything else must be provided by the
//! network the parties run in.

use std::time::Duration;

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::Mutex,
    time::timeout,
};
use tracing::{debug, info};

use super::{Channel, DEFAULT_TIMEOUT};

/// The largest frame that will be accepted from a party.
pub const MAX_FRAME_LEN: u64 = 64 * 1024 * 1024;

/// The size of the length prefix of a frame.
const LEN_PREFIX: usize = 8;

/// Errors raised by a [`TcpChannel`].
#[derive(Debug, thiserror::Error)]
pub enum TcpChannelError {
    /// The underlying socket failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The party did not answer in time.
    #[error("timeout elapsed")]
    TimeoutElapsed,
    /// The announced frame length exceeds [`MAX_FRAME_LEN`].
    #[error("frame of {0} bytes exceeds the maximum frame length")]
    FrameTooLarge(u64),
    /// There is no party with this index.
    #[error("unknown party {0}")]
    UnknownParty(usize),
    /// No endpoints were given to connect to.
    #[error("no computing parties to connect to")]
    NoParties,
    /// The port of a party does not fit into 16 bits.
    #[error("port base {base} + party {party} is not a valid port")]
    InvalidPort {
        /// The port of party 0.
        base: u16,
        /// The party index.
        party: usize,
    },
}

#[derive(Debug)]
struct Connection {
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
}

/// One TCP connection per computing party, indexed in the order the endpoints were given.
#[derive(Debug)]
pub struct TcpChannel {
    conns: Vec<Connection>,
    timeout: Duration,
}

/// The endpoints of `parties` computing parties on `host`, party `i` listening on
/// `port_base + i`.
pub fn party_endpoints(
    host: &str,
    port_base: u16,
    parties: usize,
) -> Result<Vec<(String, u16)>, TcpChannelError> {
    (0..parties)
        .map(|party| {
            u16::try_from(party)
                .ok()
                .and_then(|offset| port_base.checked_add(offset))
                .map(|port| (host.to_string(), port))
                .ok_or(TcpChannelError::InvalidPort {
                    base: port_base,
                    party,
                })
        })
        .collect()
}

impl TcpChannel {
    /// Connects to every endpoint in order, failing if any connection cannot be established within
    /// `timeout` or if there are no endpoints at all.
    ///
    /// The same `timeout` applies to every message received later on.
    pub async fn connect(
        endpoints: &[(String, u16)],
        timeout: Duration,
    ) -> Result<Self, TcpChannelError> {
        if endpoints.is_empty() {
            return Err(TcpChannelError::NoParties);
        }
        let mut conns = vec![];
        for (party, (host, port)) in endpoints.iter().enumerate() {
            debug!("Connecting to party {party} at {host}:{port}");
            let stream = tokio::time::timeout(timeout, TcpStream::connect((host.as_str(), *port)))
                .await
                .map_err(|_| TcpChannelError::TimeoutElapsed)??;
            stream.set_nodelay(true)?;
            conns.push(Connection::new(stream));
        }
        info!("Connected to {} parties", conns.len());
        Ok(Self { conns, timeout })
    }

    /// Wraps already established connections, e.g. accepted by a listener.
    pub fn from_streams(streams: Vec<TcpStream>) -> Self {
        Self {
            conns: streams.into_iter().map(Connection::new).collect(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the time to wait for each message.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Shuts down the write side of every connection and closes all sockets.
    ///
    /// Dropping the channel also closes the sockets, this additionally flushes pending writes.
    pub async fn close(self) -> Result<(), TcpChannelError> {
        for conn in self.conns {
            conn.writer.into_inner().shutdown().await?;
        }
        Ok(())
    }

    fn conn(&self, party: usize) -> Result<&Connection, TcpChannelError> {
        self.conns
            .get(party)
            .ok_or(TcpChannelError::UnknownParty(party))
    }
}

impl Connection {
    fn new(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        }
    }
}

impl Channel for TcpChannel {
    type SendError = TcpChannelError;
    type RecvError = TcpChannelError;

    fn parties(&self) -> usize {
        self.conns.len()
    }

    async fn send_bytes_to(&self, p: usize, msg: Vec<u8>, phase: &str) -> Result<(), TcpChannelError> {
        let mut frame = Vec::with_capacity(LEN_PREFIX + msg.len());
        frame.extend((msg.len() as u64).to_le_bytes());
        frame.extend(msg);
        self.send_raw_to(p, frame, phase).await
    }

    async fn recv_bytes_from(&self, p: usize, phase: &str) -> Result<Vec<u8>, TcpChannelError> {
        let mut reader = self.conn(p)?.reader.lock().await;
        let read = async {
            let mut len = [0; LEN_PREFIX];
            reader.read_exact(&mut len).await?;
            let len = u64::from_le_bytes(len);
            if len > MAX_FRAME_LEN {
                return Err(TcpChannelError::FrameTooLarge(len));
            }
            let mut msg = vec![0; len as usize];
            reader.read_exact(&mut msg).await?;
            Ok::<_, TcpChannelError>(msg)
        };
        let msg = timeout(self.timeout, read)
            .await
            .map_err(|_| TcpChannelError::TimeoutElapsed)??;
        debug!("Received msg {phase} from party {p} ({} bytes)", msg.len());
        Ok(msg)
    }

    async fn send_raw_to(&self, p: usize, msg: Vec<u8>, phase: &str) -> Result<(), TcpChannelError> {
        let mut writer = self.conn(p)?.writer.lock().await;
        debug!("Sending msg {phase} to party {p} ({} bytes)...", msg.len());
        writer.write_all(&msg).await?;
        writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::{MAX_FRAME_LEN, TcpChannel, TcpChannelError, party_endpoints};
    use crate::channel::Channel;

    #[test]
    fn endpoints_use_consecutive_ports() {
        let endpoints = party_endpoints("localhost", 14000, 3).unwrap();
        assert_eq!(
            endpoints,
            vec![
                ("localhost".to_string(), 14000),
                ("localhost".to_string(), 14001),
                ("localhost".to_string(), 14002)
            ]
        );
        assert!(matches!(
            party_endpoints("localhost", u16::MAX, 2),
            Err(TcpChannelError::InvalidPort { party: 1, .. })
        ));
    }

    #[tokio::test]
    async fn refuses_empty_endpoints() {
        assert!(matches!(
            TcpChannel::connect(&[], Duration::from_secs(1)).await,
            Err(TcpChannelError::NoParties)
        ));
    }

    #[tokio::test]
    async fn frames_are_length_prefixed() -> Result<(), TcpChannelError> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let party = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await?;
            let mut raw = [0; 4];
            socket.read_exact(&mut raw).await?;
            let mut len = [0; 8];
            socket.read_exact(&mut len).await?;
            let mut frame = vec![0; u64::from_le_bytes(len) as usize];
            socket.read_exact(&mut frame).await?;
            socket.write_all(&3u64.to_le_bytes()).await?;
            socket.write_all(&[7, 8, 9]).await?;
            Ok::<_, std::io::Error>((raw, frame))
        });

        let channel =
            TcpChannel::connect(&[("127.0.0.1".to_string(), port)], Duration::from_secs(5)).await?;
        channel.send_raw_to(0, vec![1, 0, 0, 0], "client id").await?;
        channel.send_bytes_to(0, vec![5, 6], "status").await?;
        assert_eq!(channel.recv_bytes_from(0, "reply").await?, vec![7, 8, 9]);
        let (raw, frame) = party.await.unwrap()?;
        assert_eq!(raw, [1, 0, 0, 0]);
        assert_eq!(frame, vec![5, 6]);
        channel.close().await
    }

    #[tokio::test]
    async fn rejects_oversized_frames() -> Result<(), TcpChannelError> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let party = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await?;
            socket.write_all(&(MAX_FRAME_LEN + 1).to_le_bytes()).await?;
            Ok::<_, std::io::Error>(socket)
        });
        let channel =
            TcpChannel::connect(&[("127.0.0.1".to_string(), port)], Duration::from_secs(5)).await?;
        let _socket = party.await.unwrap()?;
        assert!(matches!(
            channel.recv_bytes_from(0, "reply").await,
            Err(TcpChannelError::FrameTooLarge(len)) if len == MAX_FRAME_LEN + 1
        ));
        Ok(())
    }

    #[tokio::test]
    async fn silent_party_times_out() -> Result<(), TcpChannelError> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let party = tokio::spawn(async move { listener.accept().await });
        let channel = TcpChannel::connect(
            &[("127.0.0.1".to_string(), port)],
            Duration::from_millis(100),
        )
        .await?;
        let _socket = party.await.unwrap()?;
        assert!(matches!(
            channel.recv_bytes_from(0, "reply").await,
            Err(TcpChannelError::TimeoutElapsed)
        ));
        Ok(())
    }
}
