//! Sample keys and content digests.
//!
//! Every sample written to an archive is identified by an
//! [`ArraySampleKey`]: a 128-bit murmur3 digest of the payload plus its
//! byte size and data type. Equal keys are treated as identical samples.

use crate::util::{DataType, Dimensions};
use std::fmt;

/// 16-byte content digest.
pub type SampleDigest = [u8; 16];

/// MurmurHash3 x64_128 with seed 0: `h1` then `h2`, both little-endian.
#[inline]
fn murmur3_digest(data: &[u8]) -> SampleDigest {
    fastmurmur3::hash(data).to_le_bytes()
}

/// Digest of `data` laid out as elements of `pod_size` bytes. Elements are
/// hashed in little-endian order on every target.
pub fn compute_digest(data: &[u8], pod_size: usize) -> SampleDigest {
    if cfg!(target_endian = "big") && pod_size > 1 {
        let swapped: Vec<u8> = data
            .chunks(pod_size)
            .flat_map(|chunk| chunk.iter().rev().copied())
            .collect();
        return murmur3_digest(&swapped);
    }
    murmur3_digest(data)
}

/// Content key of one sample.
#[derive(Clone, Copy, Hash, Eq, PartialEq)]
pub struct ArraySampleKey {
    pub digest: SampleDigest,
    pub num_bytes: u64,
    pub data_type: DataType,
}

impl ArraySampleKey {
    /// Key of a scalar sample, or of a rank-1 array sample.
    pub fn from_data(data: &[u8], data_type: DataType) -> Self {
        Self {
            digest: compute_digest(data, data_type.pod.num_bytes()),
            num_bytes: data.len() as u64,
            data_type,
        }
    }

    /// Key of an array sample. Shapes other than rank 1 are folded into the
    /// digest so equal bytes with a different shape do not compare equal.
    pub fn for_array(data: &[u8], data_type: DataType, dims: &Dimensions) -> Self {
        let mut key = Self::from_data(data, data_type);
        if dims.rank() != 1 {
            let mut builder = DigestBuilder::new();
            builder.update(&key.digest);
            builder.update_u64(dims.rank() as u64);
            builder.update(&dims.to_le_bytes());
            key.digest = builder.finish();
        }
        key
    }

    pub fn digest_hex(&self) -> String {
        to_hex(&self.digest)
    }
}

impl fmt::Debug for ArraySampleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.digest_hex(), self.num_bytes, self.data_type)
    }
}

/// Accumulates bytes and hashes them once with murmur3.
#[derive(Default)]
pub struct DigestBuilder {
    buf: Vec<u8>,
}

impl DigestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn update_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn update_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Length-prefixed string.
    pub fn update_str(&mut self, s: &str) {
        self.update_u64(s.len() as u64);
        self.buf.extend_from_slice(s.as_bytes());
    }

    pub fn finish(self) -> SampleDigest {
        murmur3_digest(&self.buf)
    }
}

pub fn to_hex(digest: &SampleDigest) -> String {
    hex::encode(digest)
}

/// `None` unless `s` is exactly 32 hex digits.
pub fn from_hex(s: &str) -> Option<SampleDigest> {
    let mut out = [0u8; 16];
    hex::decode_to_slice(s, &mut out).ok()?;
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_payloads_share_key() {
        let a = ArraySampleKey::from_data(&[1, 2, 3, 4], DataType::INT32);
        let b = ArraySampleKey::from_data(&[1, 2, 3, 4], DataType::INT32);
        assert_eq!(a, b);
        let c = ArraySampleKey::from_data(&[1, 2, 3, 5], DataType::INT32);
        assert_ne!(a, c);
    }

    #[test]
    fn test_data_type_is_part_of_key() {
        let a = ArraySampleKey::from_data(&[0; 4], DataType::INT32);
        let b = ArraySampleKey::from_data(&[0; 4], DataType::FLOAT32);
        assert_eq!(a.digest, b.digest);
        assert_ne!(a, b);
    }

    #[test]
    fn test_array_shape_folded() {
        let data = [0u8; 24];
        let flat = ArraySampleKey::for_array(&data, DataType::FLOAT32, &Dimensions::d1(6));
        assert_eq!(flat, ArraySampleKey::from_data(&data, DataType::FLOAT32));
        let a = ArraySampleKey::for_array(&data, DataType::FLOAT32, &Dimensions::d2(2, 3));
        let b = ArraySampleKey::for_array(&data, DataType::FLOAT32, &Dimensions::d2(3, 2));
        assert_ne!(a, b);
        assert_ne!(a, flat);
    }

    #[test]
    fn test_hex_roundtrip() {
        let key = ArraySampleKey::from_data(b"payload", DataType::UINT8);
        let hex = key.digest_hex();
        assert_eq!(hex.len(), 32);
        assert_eq!(from_hex(&hex), Some(key.digest));
        assert_eq!(from_hex("zz"), None);
        assert_eq!(from_hex(&hex[..30]), None);
        assert_eq!(from_hex(&format!("{}g", &hex[..31])), None);
    }

    #[test]
    fn test_pinned_digests() {
        // MurmurHash3_x64_128("hello", seed 0) = (0xcbd8a7b341bd9b02, 0x5b1e906a48ae1d19)
        assert_eq!(
            to_hex(&compute_digest(b"hello", 1)),
            "029bbd41b3a7d8cb191dae486a901e5b"
        );
        let ints: Vec<u8> = [1i32, 2, 3].iter().flat_map(|v| v.to_le_bytes()).collect();
        assert_eq!(
            ArraySampleKey::from_data(&ints, DataType::INT32).digest_hex(),
            "b55c69c3c551cf504135d724a388b34d"
        );
        let ramp: Vec<u8> = (0..40).collect();
        assert_eq!(
            to_hex(&compute_digest(&ramp, 1)),
            "64808c41d854a0c3ad124c9730ca01a0"
        );
        assert_eq!(compute_digest(&[], 4), [0u8; 16]);
    }
}
