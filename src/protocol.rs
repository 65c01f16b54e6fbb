//! The client side of the external input/output protocol of SPDZ-style MPC engines, following
//! [Damgård et al., "Confidential Benchmarking based on Multiparty
//! Computation"](https://eprint.iacr.org/2015/1006.pdf).
//!
//! A client contributes private inputs to a running computation and learns its result without
//! trusting any single computing party:
//!
//! 1. **Handshake**: the client announces its id and whether the current round is finished.
//! 2. **Masked inputs**: every party sends its shares of one random triple `(a, b, a·b)` per input.
//!    The client reconstructs the triples, aborts if any of them is inconsistent, and broadcasts
//!    `x + a` for every input `x`. As long as the parties do not pool their shares of `a`, the
//!    masked value reveals nothing about `x`.
//! 3. **Authenticated output**: every party sends its shares of `(y, r, y·r)` for the result `y`
//!    and a random `r`. The result is only returned if the reconstructed values satisfy the
//!    relation.
//!
//! All operations talk to every party in lock-step: nothing is sent or used before all parties have
//! answered, and any failure aborts the whole operation. The transport itself is neither encrypted
//! nor authenticated, see [`crate::channel::tcp`].

use tracing::{Level, debug, info, instrument};

use crate::{
    channel::{self, Channel, recv_from_all, send_raw_to, send_to, send_to_all},
    field::{Field, FieldError, Fp, encode_elements},
    reconstruct::{self, Triple, reconstruct_triples},
};

/// The phase label of the triple shares sent by the parties.
pub const PHASE_TRIPLES: &str = "triple shares";
/// The phase label of the masked inputs sent by the client.
pub const PHASE_MASKED_INPUTS: &str = "masked inputs";
/// The phase label of the output shares sent by the parties.
pub const PHASE_OUTPUT: &str = "output shares";
/// The phase label of the client id sent during the handshake.
pub const PHASE_CLIENT_ID: &str = "client id";
/// The phase label of the round status sent during the handshake.
pub const PHASE_ROUND_STATUS: &str = "round status";

/// A custom error type for the client protocol.
///
/// None of these errors can be recovered from within a session: a retry requires a new round of
/// the whole computation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A message could not be sent or received, or a party did not answer in time.
    #[error("transport error: {0}")]
    Transport(#[from] channel::Error),
    /// A party sent a frame with the wrong number of elements or non-canonical elements.
    #[error("malformed {phase} frame from party {party}: {reason}")]
    Framing {
        /// The party that sent the frame.
        party: usize,
        /// The protocol phase of the frame.
        phase: &'static str,
        /// Why the frame could not be decoded.
        reason: FieldError,
    },
    /// The reconstructed masking triple violates `a·b = c`, a party is cheating or faulty.
    #[error("incorrect triple at input {slot}, aborting")]
    TripleInconsistency {
        /// The input slot of the offending triple.
        slot: usize,
    },
    /// The reconstructed output violates `y·r = w`, the result must not be trusted.
    #[error("unable to authenticate output value as correct, aborting")]
    OutputAuthenticationFailure,
    /// The channel does not reach any computing party, so no value could ever be authenticated.
    #[error("no computing parties to talk to")]
    NoParties,
    /// The number of inputs does not match the number of triples.
    #[error("wrong input size, expected {expected} values, found {actual}")]
    WrongInputSize {
        /// The number of available triples.
        expected: usize,
        /// The number of provided inputs.
        actual: usize,
    },
}

/// Whether more clients will join the current round of the computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RoundStatus {
    /// More clients may still join this round.
    Open = 0,
    /// Registration is closed, the parties start computing.
    Finished = 1,
}

impl From<bool> for RoundStatus {
    fn from(finished: bool) -> Self {
        if finished {
            RoundStatus::Finished
        } else {
            RoundStatus::Open
        }
    }
}

fn require_parties(channel: &impl Channel) -> Result<(), Error> {
    if channel.parties() == 0 {
        return Err(Error::NoParties);
    }
    Ok(())
}

/// Announces the client to every party: the raw client id, then a frame with the round status.
///
/// Both are 4-byte little-endian integers, passed on to the engine verbatim.
#[instrument(level = Level::DEBUG, skip(channel), err)]
pub async fn handshake(
    channel: &impl Channel,
    client_id: u32,
    status: RoundStatus,
) -> Result<(), Error> {
    require_parties(channel)?;
    for party in 0..channel.parties() {
        send_raw_to(channel, party, PHASE_CLIENT_ID, client_id.to_le_bytes().to_vec()).await?;
        let status = (status as u32).to_le_bytes().to_vec();
        send_to(channel, party, PHASE_ROUND_STATUS, status).await?;
    }
    info!("Finished setup of connections to {} parties", channel.parties());
    Ok(())
}

/// Receives one masking triple per input from every party and reconstructs them.
///
/// Fails with [`Error::TripleInconsistency`] for the first triple with `a·b ≠ c`, and with
/// [`Error::NoParties`] if the channel does not reach any party.
#[instrument(level = Level::DEBUG, skip(channel, field), err)]
pub async fn fetch_triples(
    channel: &impl Channel,
    field: &Field,
    num_inputs: usize,
) -> Result<Vec<Triple>, Error> {
    let frames = recv_from_all(channel, PHASE_TRIPLES).await?;
    let triples = reconstruct_triples(field, &frames, num_inputs).map_err(|e| match e {
        reconstruct::Error::NoShares => Error::NoParties,
        reconstruct::Error::Malformed { party, reason } => Error::Framing {
            party,
            phase: PHASE_TRIPLES,
            reason,
        },
        reconstruct::Error::Inconsistent { slot } => Error::TripleInconsistency { slot },
    })?;
    debug!("Reconstructed {num_inputs} consistent triples");
    Ok(triples)
}

/// Masks every input with the first component of its triple and sends the masked values to all
/// parties, in input order.
///
/// Every party receives the identical frame.
#[instrument(level = Level::DEBUG, skip_all, err)]
pub async fn submit_inputs(
    channel: &impl Channel,
    values: &[Fp],
    triples: &[Triple],
) -> Result<(), Error> {
    require_parties(channel)?;
    if values.len() != triples.len() {
        return Err(Error::WrongInputSize {
            expected: triples.len(),
            actual: values.len(),
        });
    }
    let masked: Vec<Fp> = values.iter().zip(triples).map(|(x, t)| x + &t.a).collect();
    send_to_all(channel, PHASE_MASKED_INPUTS, encode_elements(&masked)).await?;
    Ok(())
}

/// Sends private inputs to the computation: fetches and verifies one triple per input, then
/// broadcasts the masked inputs.
pub async fn send_private_inputs(
    channel: &impl Channel,
    field: &Field,
    values: &[Fp],
) -> Result<(), Error> {
    let triples = fetch_triples(channel, field, values.len()).await?;
    submit_inputs(channel, values, &triples).await
}

/// Receives shares of `(y, r, y·r)` from every party and returns `y` if the reconstructed values
/// are consistent.
///
/// Fails with [`Error::OutputAuthenticationFailure`] otherwise, without revealing `y`. A channel
/// without parties fails with [`Error::NoParties`].
#[instrument(level = Level::DEBUG, skip_all, err)]
pub async fn fetch_result(channel: &impl Channel, field: &Field) -> Result<Fp, Error> {
    let frames = recv_from_all(channel, PHASE_OUTPUT).await?;
    let mut outputs = reconstruct_triples(field, &frames, 1).map_err(|e| match e {
        reconstruct::Error::NoShares => Error::NoParties,
        reconstruct::Error::Malformed { party, reason } => Error::Framing {
            party,
            phase: PHASE_OUTPUT,
            reason,
        },
        reconstruct::Error::Inconsistent { .. } => Error::OutputAuthenticationFailure,
    })?;
    let Triple { a: y, .. } = outputs.remove(0);
    debug!("Authenticated output value");
    Ok(y)
}

/// A client session with a fixed set of computing parties.
///
/// The session owns the channel, so operations over it can never interleave. The connections are
/// released when the session (or the channel returned by [`Session::into_channel`]) is dropped.
#[derive(Debug)]
pub struct Session<C: Channel> {
    channel: C,
    field: Field,
}

impl<C: Channel> Session<C> {
    /// Starts a session over `channel`, with all values living in `field`.
    pub fn new(channel: C, field: Field) -> Self {
        Self { channel, field }
    }

    /// The field of this session.
    pub fn field(&self) -> &Field {
        &self.field
    }

    /// The number of computing parties.
    pub fn parties(&self) -> usize {
        self.channel.parties()
    }

    /// See [`handshake`].
    pub async fn handshake(&mut self, client_id: u32, status: RoundStatus) -> Result<(), Error> {
        handshake(&self.channel, client_id, status).await
    }

    /// See [`send_private_inputs`].
    pub async fn send_private_inputs(&mut self, values: &[Fp]) -> Result<(), Error> {
        send_private_inputs(&self.channel, &self.field, values).await
    }

    /// See [`fetch_result`].
    pub async fn receive_result(&mut self) -> Result<Fp, Error> {
        fetch_result(&self.channel, &self.field).await
    }

    /// Ends the session, returning the channel.
    pub fn into_channel(self) -> C {
        self.channel
    }
}
