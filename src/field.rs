use serde::{Deserialize, Serialize};

/// Element of GF(2^128) in two 64-bit limbs. Addition is carry-free XOR.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldElement {
    pub low: u64,
    pub high: u64,
}

impl FieldElement {
    pub fn new(low: u64, high: u64) -> Self {
        Self { low, high }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.low == 0 && self.high == 0
    }

    pub fn add(&self, other: &Self) -> Self {
        Self {
            low: self.low ^ other.low,
            high: self.high ^ other.high,
        }
    }

    pub fn from_be_bytes(bytes: &[u8; 16]) -> Self {
        let mut high = [0u8; 8];
        let mut low = [0u8; 8];
        high.copy_from_slice(&bytes[..8]);
        low.copy_from_slice(&bytes[8..]);
        Self {
            low: u64::from_be_bytes(low),
            high: u64::from_be_bytes(high),
        }
    }

    pub fn to_be_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[..8].copy_from_slice(&self.high.to_be_bytes());
        out[8..].copy_from_slice(&self.low.to_be_bytes());
        out
    }
}
