//! Tillich-Zémor hash over SL(2, GF(2^127)).
//!
//! Each input bit selects one of two generator matrices and the digest is
//! their ordered product, so the hash of a concatenation is the product of
//! the hashes of the parts. Range hashes of split objects are combined this
//! way without refetching payload.
//!
//! Field elements are polynomials over GF(2) reduced by `x^127 + x^63 + 1`,
//! stored in the low 127 bits of a `u128`.

use std::fmt;

use crate::hasher::HasherError;

const MASK: u128 = (1u128 << 127) - 1;
/// `x^127 = x^63 + 1` in the field.
const REDUCTION: u128 = (1u128 << 63) | 1;

/// Digest size: four field elements of 16 bytes each.
pub const SIZE: usize = 64;

fn mul_x(a: u128) -> u128 {
    let carry = (a >> 126) & 1 == 1;
    let shifted = (a << 1) & MASK;
    if carry {
        shifted ^ REDUCTION
    } else {
        shifted
    }
}

fn mul(a: u128, b: u128) -> u128 {
    let mut acc = 0u128;
    for i in (0..127).rev() {
        acc = mul_x(acc);
        if (b >> i) & 1 == 1 {
            acc ^= a;
        }
    }
    acc
}

/// 2x2 matrix `[[a, b], [c, d]]` stored row-major.
type Matrix = [u128; 4];

const IDENTITY: Matrix = [1, 0, 0, 1];

fn mul_matrix(m: &Matrix, n: &Matrix) -> Matrix {
    [
        mul(m[0], n[0]) ^ mul(m[1], n[2]),
        mul(m[0], n[1]) ^ mul(m[1], n[3]),
        mul(m[2], n[0]) ^ mul(m[3], n[2]),
        mul(m[2], n[1]) ^ mul(m[3], n[3]),
    ]
}

/// Right-multiply by `A = [[x, 1], [1, 0]]` (bit 0) or
/// `B = [[x, x+1], [1, 1]]` (bit 1).
fn step(m: &mut Matrix, bit: bool) {
    let [a, b, c, d] = *m;
    let ax_b = mul_x(a) ^ b;
    let cx_d = mul_x(c) ^ d;
    if bit {
        *m = [ax_b, ax_b ^ a, cx_d, cx_d ^ c];
    } else {
        *m = [ax_b, a, cx_d, c];
    }
}

/// Finished Tillich-Zémor digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TzHash(Matrix);

impl TzHash {
    /// Hash of the empty input.
    pub const fn identity() -> Self {
        Self(IDENTITY)
    }

    pub fn digest(data: &[u8]) -> Self {
        let mut h = TzHasher::new();
        h.update(data);
        h.finalize()
    }

    /// Hash of the concatenation of the inputs that produced `parts`, in order.
    pub fn concat(parts: &[TzHash]) -> Self {
        parts
            .iter()
            .fold(Self::identity(), |acc, p| Self(mul_matrix(&acc.0, &p.0)))
    }

    pub fn to_bytes(&self) -> [u8; SIZE] {
        let mut out = [0u8; SIZE];
        for (chunk, elem) in out.chunks_exact_mut(16).zip(self.0.iter()) {
            chunk.copy_from_slice(&elem.to_be_bytes());
        }
        out
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, HasherError> {
        if bytes.len() != SIZE {
            return Err(HasherError::InvalidLength {
                expected: SIZE,
                actual: bytes.len(),
            });
        }
        let mut m = [0u128; 4];
        for (elem, chunk) in m.iter_mut().zip(bytes.chunks_exact(16)) {
            let mut word = [0u8; 16];
            word.copy_from_slice(chunk);
            *elem = u128::from_be_bytes(word) & MASK;
        }
        Ok(Self(m))
    }
}

impl fmt::Debug for TzHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.to_bytes();
        write!(f, "TzHash(")?;
        for b in &bytes[..4] {
            write!(f, "{b:02x}")?;
        }
        write!(f, "..)")
    }
}

/// Streaming Tillich-Zémor hasher.
#[derive(Clone)]
pub struct TzHasher {
    state: Matrix,
}

impl TzHasher {
    pub fn new() -> Self {
        Self { state: IDENTITY }
    }

    pub fn update(&mut self, data: &[u8]) {
        for byte in data {
            for shift in (0..8).rev() {
                step(&mut self.state, (byte >> shift) & 1 == 1);
            }
        }
    }

    pub fn finalize(&self) -> TzHash {
        TzHash(self.state)
    }
}

impl Default for TzHasher {
    fn default() -> Self {
        Self::new()
    }
}
