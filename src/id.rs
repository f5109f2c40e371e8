use primitive_types::U256;
use rand::{
    distributions::{Distribution, Standard},
    Rng,
};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::{
    convert::{TryFrom, TryInto},
    fmt,
    ops::BitXor,
    str::FromStr,
};
use thiserror::Error;

/// Length of a `NodeId` in bytes.
pub const NODE_ID_LEN: usize = 20;

/// Number of bits in a `NodeId`.
pub const NODE_ID_BITS: usize = NODE_ID_LEN * 8;

/// 160-bit identifier of nodes and keys in the overlay.
///
/// Bytes are stored big-endian so the derived ordering is the ordering of the
/// underlying unsigned integer.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct NodeId(#[serde(with = "byte_array")] [u8; NODE_ID_LEN]);

impl NodeId {
    /// Id with every bit cleared.
    pub const MIN: NodeId = NodeId([0u8; NODE_ID_LEN]);

    /// Id with every bit set.
    pub const MAX: NodeId = NodeId([255u8; NODE_ID_LEN]);

    /// Create a NodeId by hashing the given bytes using SHA-1.
    pub fn sha1(bytes: &[u8]) -> Self {
        let hash = Sha1::digest(bytes);
        Self(hash.into())
    }

    /// XOR distance between two ids, itself ordered as an unsigned integer.
    pub fn distance(&self, other: &NodeId) -> NodeId {
        *self ^ *other
    }

    pub(crate) fn to_u256(self) -> U256 {
        U256::from_big_endian(&self.0)
    }

    /// Panics if the value does not fit into 160 bits.
    pub(crate) fn from_u256(value: U256) -> Self {
        assert!(
            value.bits() <= NODE_ID_BITS,
            "value out of id space - implementation error"
        );

        let mut buffer = [0u8; 32];
        value.to_big_endian(&mut buffer);

        let mut bytes = [0u8; NODE_ID_LEN];
        bytes.copy_from_slice(&buffer[32 - NODE_ID_LEN..]);

        Self(bytes)
    }
}

/// Exclusive upper bound of the id space, `2^160`.
pub(crate) fn id_space_end() -> U256 {
    U256::one() << NODE_ID_BITS
}

impl AsRef<[u8]> for NodeId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<NodeId> for [u8; NODE_ID_LEN] {
    fn from(id: NodeId) -> [u8; NODE_ID_LEN] {
        id.0
    }
}

impl From<[u8; NODE_ID_LEN]> for NodeId {
    fn from(id: [u8; NODE_ID_LEN]) -> NodeId {
        Self(id)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum IdError {
    #[error("invalid node id length: expected {} bytes, got {0}", NODE_ID_LEN)]
    InvalidLength(usize),
    #[error("invalid hex in node id")]
    InvalidHex(#[from] hex::FromHexError),
}

impl<'a> TryFrom<&'a [u8]> for NodeId {
    type Error = IdError;

    fn try_from(slice: &'a [u8]) -> Result<Self, Self::Error> {
        Ok(Self(
            slice
                .try_into()
                .map_err(|_| IdError::InvalidLength(slice.len()))?,
        ))
    }
}

impl FromStr for NodeId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != NODE_ID_LEN * 2 {
            return Err(IdError::InvalidLength(s.len() / 2));
        }

        let mut bytes = [0u8; NODE_ID_LEN];
        hex::decode_to_slice(s, &mut bytes)?;

        Ok(Self(bytes))
    }
}

impl BitXor for NodeId {
    type Output = Self;

    fn bitxor(mut self, rhs: Self) -> Self {
        for (src, dst) in rhs.0.iter().zip(self.0.iter_mut()) {
            *dst ^= *src;
        }

        self
    }
}

impl Distribution<NodeId> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> NodeId {
        NodeId(rng.gen())
    }
}

impl fmt::LowerHex for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }

        Ok(())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:x}", self)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:x}", self)
    }
}

mod byte_array {
    use super::NODE_ID_LEN;
    use serde::{
        de::{Deserialize, Deserializer, Error},
        ser::{Serialize, Serializer},
    };
    use serde_bytes::{ByteBuf, Bytes};
    use std::convert::TryInto;

    pub(super) fn serialize<S: Serializer>(
        bytes: &[u8; NODE_ID_LEN],
        s: S,
    ) -> Result<S::Ok, S::Error> {
        Bytes::new(bytes.as_ref()).serialize(s)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<[u8; NODE_ID_LEN], D::Error> {
        let buf = ByteBuf::deserialize(d)?;
        let buf = buf.into_vec();
        let len = buf.len();

        buf.try_into().map_err(|_| {
            let expected = format!("{}", NODE_ID_LEN);
            D::Error::invalid_length(len, &expected.as_ref())
        })
    }
}

// ----------------------------------------------------------------------------//

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_distance_symmetric() {
        for _ in 0..32 {
            let a: NodeId = rand::random();
            let b: NodeId = rand::random();

            assert_eq!(a.distance(&b), b.distance(&a));
            assert_eq!(a.distance(&a), NodeId::MIN);
        }
    }

    #[test]
    fn positive_hex_round_trip() {
        let id = NodeId::sha1(b"overlay");
        let text = id.to_string();

        assert_eq!(text.len(), NODE_ID_LEN * 2);
        assert_eq!(text, hex::encode(id.as_ref()));
        assert_eq!(text.parse::<NodeId>().unwrap(), id);
        assert_eq!(text.to_uppercase().parse::<NodeId>().unwrap(), id);
    }

    #[test]
    fn negative_hex_wrong_length() {
        assert_eq!(
            "abcd".parse::<NodeId>().unwrap_err(),
            IdError::InvalidLength(2)
        );
    }

    #[test]
    fn negative_hex_invalid_digit() {
        let text = "zz".repeat(NODE_ID_LEN);

        assert!(matches!(
            text.parse::<NodeId>(),
            Err(IdError::InvalidHex(_))
        ));
    }

    #[test]
    fn positive_integer_ordering() {
        let mut low = [0u8; NODE_ID_LEN];
        low[NODE_ID_LEN - 1] = 255;
        let mut high = [0u8; NODE_ID_LEN];
        high[0] = 1;

        assert!(NodeId::from(low) < NodeId::from(high));
        assert!(NodeId::from(low).to_u256() < NodeId::from(high).to_u256());
    }

    #[test]
    fn positive_u256_round_trip() {
        let id: NodeId = rand::random();

        assert_eq!(NodeId::from_u256(id.to_u256()), id);
        assert_eq!(NodeId::from_u256(id_space_end() - 1), NodeId::MAX);
    }

    #[test]
    #[should_panic]
    fn negative_u256_out_of_space() {
        NodeId::from_u256(id_space_end());
    }
}
