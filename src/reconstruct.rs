//! Reconstruction of additively shared `(x, y, x·y)` triples.
//!
//! Both the masking triples and the authenticated outputs arrive as one frame per party holding
//! shares of `(x, y, z)` triples. Summing the shares of all parties reconstructs the triples, which
//! are only accepted if `x·y = z` holds for every one of them: a party that lies about its share of
//! `x` would have to guess the product with the unknown `y`, which succeeds with probability about
//! `1/p`.

use subtle::ConstantTimeEq;
use tracing::debug;

use crate::field::{Field, FieldError, Fp};

/// A reconstructed triple `(a, b, c)` that is expected to satisfy `a·b = c`.
///
/// For outputs the components are the revealed value, the random check value and their product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triple {
    /// The first factor.
    pub a: Fp,
    /// The second factor.
    pub b: Fp,
    /// The claimed product.
    pub c: Fp,
}

impl Triple {
    fn zero(field: &Field) -> Self {
        Self {
            a: field.zero(),
            b: field.zero(),
            c: field.zero(),
        }
    }

    /// Checks `a·b = c` in constant time.
    pub fn is_consistent(&self) -> bool {
        (&self.a * &self.b).ct_eq(&self.c).into()
    }
}

/// Errors raised while reconstructing triples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Error {
    /// No party contributed any shares.
    NoShares,
    /// The frame of a party does not decode to the expected number of triples.
    Malformed { party: usize, reason: FieldError },
    /// The triple at this slot does not satisfy `a·b = c`.
    Inconsistent { slot: usize },
}

/// Sums the `slots` triple shares sent by every party and checks each reconstructed triple.
///
/// Every frame is decoded before any triple is checked, so a malformed frame is reported as such
/// even if an earlier triple would already fail the check. The check stops at the first
/// inconsistent slot. Without any frame there is nothing to check and [`Error::NoShares`] is
/// returned.
pub(crate) fn reconstruct_triples(
    field: &Field,
    frames: &[Vec<u8>],
    slots: usize,
) -> Result<Vec<Triple>, Error> {
    if frames.is_empty() {
        return Err(Error::NoShares);
    }
    let shares = frames
        .iter()
        .enumerate()
        .map(|(party, frame)| {
            field
                .decode_elements(frame, slots.saturating_mul(3))
                .map_err(|reason| Error::Malformed { party, reason })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let mut triples = vec![Triple::zero(field); slots];
    for shares in &shares {
        for (triple, share) in triples.iter_mut().zip(shares.chunks_exact(3)) {
            triple.a = &triple.a + &share[0];
            triple.b = &triple.b + &share[1];
            triple.c = &triple.c + &share[2];
        }
    }
    debug!("Verifying {slots} triples reconstructed from {} parties", frames.len());
    if let Some(slot) = triples.iter().position(|t| !t.is_consistent()) {
        return Err(Error::Inconsistent { slot });
    }
    Ok(triples)
}
