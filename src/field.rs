//! Arithmetic in the prime field `GF(p)` shared by the client and all computing parties.
//!
//! A [`Field`] is an explicit value describing the modulus, it is never stored in global state, so
//! that independent sessions can run over different fields side by side. Elements ([`Fp`]) carry a
//! cheap handle to their field and are always kept in canonical form `0 <= x < p`.

use std::{
    fmt,
    ops::{Add, Mul, Neg, Sub},
    sync::Arc,
};

use num_bigint::BigUint;
use num_traits::{One, Zero};
use rand::Rng;
use subtle::{Choice, ConstantTimeEq};

/// Errors that can occur when creating a field or decoding elements.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    /// The modulus is too small to define a field.
    #[error("invalid modulus {0}, expected a prime >= 2")]
    InvalidModulus(BigUint),
    /// The buffer does not hold the expected number of encoded elements.
    #[error("expected {expected} bytes, found {actual}")]
    InvalidLength {
        /// The number of bytes needed for the requested elements.
        expected: usize,
        /// The number of bytes that were actually received.
        actual: usize,
    },
    /// An encoded value is not a canonical residue modulo `p`.
    #[error("encoded element {index} is not reduced modulo p")]
    NonCanonical {
        /// The position of the offending element in the buffer.
        index: usize,
    },
}

#[derive(Debug, PartialEq, Eq)]
struct Modulus {
    p: BigUint,
    width: usize,
}

/// The prime field `GF(p)`.
#[derive(Clone, PartialEq, Eq)]
pub struct Field(Arc<Modulus>);

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Field(p = {})", self.0.p)
    }
}

impl Field {
    /// Creates the field `GF(modulus)`.
    ///
    /// The modulus is expected to be prime, which is not checked here: it must be the same modulus
    /// the computing parties were set up with, otherwise shares cannot be combined.
    pub fn new(modulus: BigUint) -> Result<Self, FieldError> {
        if modulus < BigUint::from(2u8) {
            return Err(FieldError::InvalidModulus(modulus));
        }
        let width = (modulus.bits() as usize).div_ceil(8);
        Ok(Field(Arc::new(Modulus { p: modulus, width })))
    }

    /// The modulus `p`.
    pub fn modulus(&self) -> &BigUint {
        &self.0.p
    }

    /// The number of bytes of a single encoded element.
    pub fn element_width(&self) -> usize {
        self.0.width
    }

    /// The additive identity.
    pub fn zero(&self) -> Fp {
        Fp {
            field: self.clone(),
            value: BigUint::zero(),
        }
    }

    /// The multiplicative identity.
    pub fn one(&self) -> Fp {
        self.element(BigUint::one())
    }

    /// Reduces `value` modulo `p`.
    pub fn element(&self, value: impl Into<BigUint>) -> Fp {
        Fp {
            field: self.clone(),
            value: value.into() % &self.0.p,
        }
    }

    /// Samples a random element.
    ///
    /// Draws 64 bits more than the modulus needs before reducing, which keeps the bias negligible.
    pub fn random(&self, rng: &mut impl Rng) -> Fp {
        let mut bytes = vec![0u8; self.0.width + 8];
        rng.fill(&mut bytes[..]);
        self.element(BigUint::from_bytes_le(&bytes))
    }

    /// Decodes a single element from exactly [`Field::element_width`] bytes.
    pub fn decode(&self, bytes: &[u8]) -> Result<Fp, FieldError> {
        let mut elements = self.decode_elements(bytes, 1)?;
        Ok(elements.remove(0))
    }

    /// Decodes exactly `count` consecutive elements, rejecting short, long or non-canonical input.
    pub fn decode_elements(&self, bytes: &[u8], count: usize) -> Result<Vec<Fp>, FieldError> {
        let width = self.0.width;
        let expected = count.saturating_mul(width);
        if bytes.len() != expected {
            return Err(FieldError::InvalidLength {
                expected,
                actual: bytes.len(),
            });
        }
        bytes
            .chunks_exact(width)
            .enumerate()
            .map(|(index, chunk)| {
                let value = BigUint::from_bytes_le(chunk);
                if value >= self.0.p {
                    return Err(FieldError::NonCanonical { index });
                }
                Ok(Fp {
                    field: self.clone(),
                    value,
                })
            })
            .collect()
    }
}

/// Encodes the elements back to back, in order.
pub fn encode_elements<'a>(elements: impl IntoIterator<Item = &'a Fp>) -> Vec<u8> {
    let mut buf = vec![];
    for element in elements {
        element.encode_into(&mut buf);
    }
    buf
}

/// An element of a [`Field`].
#[derive(Clone)]
pub struct Fp {
    field: Field,
    value: BigUint,
}

impl Fp {
    /// The field this element belongs to.
    pub fn field(&self) -> &Field {
        &self.field
    }

    /// The canonical representative in `[0, p)`.
    pub fn value(&self) -> &BigUint {
        &self.value
    }

    /// Appends the fixed-width little-endian encoding to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        let width = self.field.element_width();
        let mut bytes = self.value.to_bytes_le();
        bytes.resize(width, 0);
        buf.extend_from_slice(&bytes);
    }

    /// The fixed-width little-endian encoding.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.field.element_width());
        self.encode_into(&mut buf);
        buf
    }

    fn with_value(&self, value: BigUint) -> Fp {
        Fp {
            field: self.field.clone(),
            value,
        }
    }

    fn same_field(&self, other: &Fp) {
        debug_assert!(
            self.field == other.field,
            "mixing elements of {:?} and {:?}",
            self.field,
            other.field
        );
    }
}

impl fmt::Debug for Fp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fp({})", self.value)
    }
}

impl fmt::Display for Fp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl PartialEq for Fp {
    fn eq(&self, other: &Self) -> bool {
        self.field == other.field && self.value == other.value
    }
}

impl Eq for Fp {}

impl ConstantTimeEq for Fp {
    fn ct_eq(&self, other: &Self) -> Choice {
        self.same_field(other);
        self.to_bytes().ct_eq(&other.to_bytes())
    }
}

impl Add<&Fp> for &Fp {
    type Output = Fp;

    fn add(self, rhs: &Fp) -> Fp {
        self.same_field(rhs);
        self.with_value((&self.value + &rhs.value) % self.field.modulus())
    }
}

impl Sub<&Fp> for &Fp {
    type Output = Fp;

    fn sub(self, rhs: &Fp) -> Fp {
        self.same_field(rhs);
        let p = self.field.modulus();
        self.with_value((&self.value + p - &rhs.value) % p)
    }
}

impl Mul<&Fp> for &Fp {
    type Output = Fp;

    fn mul(self, rhs: &Fp) -> Fp {
        self.same_field(rhs);
        self.with_value((&self.value * &rhs.value) % self.field.modulus())
    }
}

impl Neg for &Fp {
    type Output = Fp;

    fn neg(self) -> Fp {
        &self.field.zero() - self
    }
}

impl Add for Fp {
    type Output = Fp;

    fn add(self, rhs: Fp) -> Fp {
        &self + &rhs
    }
}

impl Sub for Fp {
    type Output = Fp;

    fn sub(self, rhs: Fp) -> Fp {
        &self - &rhs
    }
}

impl Mul for Fp {
    type Output = Fp;

    fn mul(self, rhs: Fp) -> Fp {
        &self * &rhs
    }
}

impl Neg for Fp {
    type Output = Fp;

    fn neg(self) -> Fp {
        -&self
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigUint;
    use subtle::ConstantTimeEq;

    use super::{Field, FieldError, encode_elements};

    fn f101() -> Field {
        Field::new(BigUint::from(101u32)).unwrap()
    }

    #[test]
    fn rejects_tiny_modulus() {
        assert!(matches!(
            Field::new(BigUint::from(1u8)),
            Err(FieldError::InvalidModulus(_))
        ));
        assert!(Field::new(BigUint::from(2u8)).is_ok());
    }

    #[test]
    fn arithmetic_wraps_around() {
        let f = f101();
        let a = f.element(100u32);
        let b = f.element(5u32);
        assert_eq!(&a + &b, f.element(4u32));
        assert_eq!(&b - &a, f.element(6u32));
        assert_eq!(&a * &b, f.element(96u32));
        assert_eq!(-&b, f.element(96u32));
        assert_eq!(f.element(202u32), f.zero());
    }

    #[test]
    fn constant_time_equality() {
        let f = f101();
        assert!(bool::from(f.element(7u32).ct_eq(&f.element(108u32))));
        assert!(!bool::from(f.element(7u32).ct_eq(&f.element(8u32))));
    }

    #[test]
    fn encoding_is_fixed_width() {
        let p = (BigUint::from(1u8) << 127u32) - BigUint::from(1u8);
        let f = Field::new(p).unwrap();
        assert_eq!(f.element_width(), 16);
        let bytes = f.element(3u32).to_bytes();
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes[0], 3);
        assert!(bytes[1..].iter().all(|b| *b == 0));
    }

    #[test]
    fn decode_rejects_malformed_buffers() {
        let f = f101();
        let bytes = encode_elements(&[f.element(1u32), f.element(2u32)]);
        assert_eq!(
            f.decode_elements(&bytes, 3),
            Err(FieldError::InvalidLength {
                expected: 3,
                actual: 2
            })
        );
        assert_eq!(
            f.decode_elements(&[4, 101], 2),
            Err(FieldError::NonCanonical { index: 1 })
        );
        assert_eq!(
            f.decode_elements(&bytes, 2).unwrap(),
            vec![f.element(1u32), f.element(2u32)]
        );
    }

    #[test]
    fn huge_counts_are_invalid_lengths() {
        let f = f101();
        assert_eq!(
            f.decode_elements(&[1, 2], usize::MAX),
            Err(FieldError::InvalidLength {
                expected: usize::MAX,
                actual: 2
            })
        );
        let wide = Field::new(BigUint::from(1u8) << 64u32).unwrap();
        assert_eq!(wide.element_width(), 9);
        assert!(matches!(
            wide.decode_elements(&[], usize::MAX / 2),
            Err(FieldError::InvalidLength {
                expected: usize::MAX,
                ..
            })
        ));
    }

    #[test]
    fn random_elements_are_canonical() {
        let f = f101();
        let mut rng = rand::rng();
        for _ in 0..100 {
            let x = f.random(&mut rng);
            assert!(x.value() < f.modulus());
        }
    }
}
