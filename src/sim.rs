//! In-process computing parties, for tests and local experiments.
//!
//! [`simulate_round`] runs a real client [`Session`] against `n` simulated computing parties over
//! [`SimpleChannel`]s. A trusted dealer stands in for the preprocessing and the computation itself:
//! it deals the masking triples, collects the parties' input shares, evaluates the function in the
//! clear and deals authenticated shares of the result.

use futures::future::try_join_all;
use tokio::{sync::oneshot, task};
use tracing::{debug, warn};

use crate::{
    channel::{self, SimpleChannel, recv_from, send_to},
    field::{Field, FieldError, Fp, encode_elements},
    protocol::{self, PHASE_MASKED_INPUTS, PHASE_OUTPUT, PHASE_TRIPLES, RoundStatus, Session},
};

/// Errors of a simulated computing party.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A message could not be sent or received.
    #[error("channel error: {0}")]
    Channel(#[from] channel::Error),
    /// The client sent a malformed message.
    #[error("malformed message from client: {0}")]
    Malformed(#[from] FieldError),
    /// The handshake did not contain a 4-byte integer.
    #[error("malformed handshake")]
    Handshake,
    /// The dealer or a party stopped before the round was complete.
    #[error("simulation aborted")]
    Aborted,
    /// The client side of the round failed.
    #[error("client error: {0}")]
    Client(#[from] protocol::Error),
}

/// Splits `value` into `parties` random additive shares, none if there are no parties.
pub fn deal(field: &Field, value: &Fp, parties: usize) -> Vec<Fp> {
    if parties == 0 {
        return vec![];
    }
    let mut rng = rand::rng();
    let mut shares: Vec<Fp> = (1..parties).map(|_| field.random(&mut rng)).collect();
    let sum = shares.iter().fold(field.zero(), |acc, s| &acc + s);
    shares.push(value - &sum);
    shares
}

/// Deals shares of `(a, b, a·b)` for a random `a` and `b`, one share triple per party.
pub fn deal_triple(field: &Field, a: &Fp, b: &Fp, parties: usize) -> Vec<[Fp; 3]> {
    let c = a * b;
    let a = deal(field, a, parties);
    let b = deal(field, b, parties);
    let c = deal(field, &c, parties);
    a.into_iter()
        .zip(b)
        .zip(c)
        .map(|((a, b), c)| [a, b, c])
        .collect()
}

/// The index of the highest bonus, the first one wins ties.
///
/// This is the computation of the bankers' bonus program: the banker with the highest bonus pays
/// for lunch.
pub fn bankers_bonus(bonuses: &[Fp]) -> Option<usize> {
    let mut winner: Option<(usize, &Fp)> = None;
    for (i, bonus) in bonuses.iter().enumerate() {
        match winner {
            Some((_, best)) if bonus.value() <= best.value() => {}
            _ => winner = Some((i, bonus)),
        }
    }
    winner.map(|(i, _)| i)
}

struct PartyScript {
    triples: Vec<[Fp; 3]>,
    input_shares: oneshot::Sender<Vec<Fp>>,
    output_shares: oneshot::Receiver<[Fp; 3]>,
}

/// Plays one computing party: answers the handshake, provides its triple shares, derives its
/// shares of the inputs from the masked values and finally sends its output shares.
async fn run_party(
    channel: SimpleChannel,
    party: usize,
    field: Field,
    script: PartyScript,
) -> Result<(), Error> {
    let client = 0;
    let client_id = recv_from(&channel, client, protocol::PHASE_CLIENT_ID).await?;
    let status = recv_from(&channel, client, protocol::PHASE_ROUND_STATUS).await?;
    let client_id = u32::from_le_bytes(client_id.try_into().map_err(|_| Error::Handshake)?);
    let status = u32::from_le_bytes(status.try_into().map_err(|_| Error::Handshake)?);
    debug!("Party {party} accepted client {client_id} (round status {status})");

    let triples = encode_elements(script.triples.iter().flatten());
    send_to(&channel, client, PHASE_TRIPLES, triples).await?;

    let masked = recv_from(&channel, client, PHASE_MASKED_INPUTS).await?;
    let masked = field.decode_elements(&masked, script.triples.len())?;
    let shares = masked
        .iter()
        .zip(&script.triples)
        .map(|(m, [a, _, _])| if party == 0 { m - a } else { -a })
        .collect();
    script.input_shares.send(shares).map_err(|_| Error::Aborted)?;

    let output = script.output_shares.await.map_err(|_| Error::Aborted)?;
    send_to(&channel, client, PHASE_OUTPUT, encode_elements(&output)).await?;
    Ok(())
}

/// Reconstructs the inputs from the parties' shares, evaluates `f` and deals authenticated shares
/// `(y, r, y·r)` of the result.
async fn run_dealer(
    field: Field,
    input_shares: Vec<oneshot::Receiver<Vec<Fp>>>,
    output_shares: Vec<oneshot::Sender<[Fp; 3]>>,
    f: impl FnOnce(&[Fp]) -> Fp,
) -> Result<(), Error> {
    let input_shares = try_join_all(input_shares).await.map_err(|_| Error::Aborted)?;
    let slots = input_shares.first().map_or(0, Vec::len);
    let inputs: Vec<Fp> = (0..slots)
        .map(|slot| {
            input_shares
                .iter()
                .filter_map(|shares| shares.get(slot))
                .fold(field.zero(), |acc, s| &acc + s)
        })
        .collect();
    let y = f(&inputs);
    let r = field.random(&mut rand::rng());
    let shares = deal_triple(&field, &y, &r, output_shares.len());
    for (sender, share) in output_shares.into_iter().zip(shares) {
        sender.send(share).map_err(|_| Error::Aborted)?;
    }
    Ok(())
}

/// Runs one client through a full round against `parties` simulated computing parties and returns
/// the authenticated result of `f` applied to the client's inputs.
///
/// A round needs at least one party, `parties = 0` fails with [`protocol::Error::NoParties`].
pub async fn simulate_round(
    field: &Field,
    parties: usize,
    client_id: u32,
    inputs: &[Fp],
    f: impl FnOnce(&[Fp]) -> Fp + Send + 'static,
) -> Result<Fp, Error> {
    if parties == 0 {
        return Err(protocol::Error::NoParties.into());
    }
    let (client, party_channels) = SimpleChannel::star(parties);

    let mut triples_per_party = vec![vec![]; parties];
    for _ in inputs {
        let (a, b) = {
            let mut rng = rand::rng();
            (field.random(&mut rng), field.random(&mut rng))
        };
        for (p, share) in deal_triple(field, &a, &b, parties).into_iter().enumerate() {
            triples_per_party[p].push(share);
        }
    }

    let mut input_receivers = vec![];
    let mut output_senders = vec![];
    for (party, (channel, triples)) in party_channels.into_iter().zip(triples_per_party).enumerate()
    {
        let (input_shares, input_receiver) = oneshot::channel();
        let (output_sender, output_shares) = oneshot::channel();
        input_receivers.push(input_receiver);
        output_senders.push(output_sender);
        let script = PartyScript {
            triples,
            input_shares,
            output_shares,
        };
        let field = field.clone();
        task::spawn(async move {
            if let Err(e) = run_party(channel, party, field, script).await {
                warn!("Simulated party {party} failed: {e}");
            }
        });
    }
    let dealer_field = field.clone();
    task::spawn(async move {
        if let Err(e) = run_dealer(dealer_field, input_receivers, output_senders, f).await {
            warn!("Simulated dealer failed: {e}");
        }
    });

    let mut session = Session::new(client, field.clone());
    session.handshake(client_id, RoundStatus::Finished).await?;
    session.send_private_inputs(inputs).await?;
    Ok(session.receive_result().await?)
}
