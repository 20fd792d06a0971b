//! Shape of an array sample.

use smallvec::SmallVec;

/// Dimensions of an array sample. Rank 0 means a single element.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Dimensions {
    dims: SmallVec<[usize; 4]>,
}

impl Dimensions {
    pub fn scalar() -> Self {
        Self { dims: SmallVec::new() }
    }

    pub fn d1(size: usize) -> Self {
        Self { dims: smallvec::smallvec![size] }
    }

    pub fn d2(width: usize, height: usize) -> Self {
        Self { dims: smallvec::smallvec![width, height] }
    }

    pub fn from_slice(sizes: &[usize]) -> Self {
        Self { dims: SmallVec::from_slice(sizes) }
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn size(&self, dim: usize) -> Option<usize> {
        self.dims.get(dim).copied()
    }

    pub fn sizes(&self) -> &[usize] {
        &self.dims
    }

    /// Product of all sizes; 1 for rank 0.
    pub fn num_points(&self) -> usize {
        self.dims.iter().product()
    }

    /// Little-endian u64 per dimension, as stored by the engines.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.dims
            .iter()
            .flat_map(|&d| (d as u64).to_le_bytes())
            .collect()
    }

    /// Inverse of [`Dimensions::to_le_bytes`]; trailing partial words are ignored.
    pub fn from_le_bytes(bytes: &[u8]) -> Self {
        let dims = bytes
            .chunks_exact(8)
            .map(|c| {
                let mut word = [0u8; 8];
                word.copy_from_slice(c);
                u64::from_le_bytes(word) as usize
            })
            .collect();
        Self { dims }
    }
}

impl From<usize> for Dimensions {
    fn from(size: usize) -> Self {
        Self::d1(size)
    }
}

impl From<Vec<usize>> for Dimensions {
    fn from(v: Vec<usize>) -> Self {
        Self { dims: SmallVec::from_vec(v) }
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, s) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, " x ")?;
            }
            write!(f, "{}", s)?;
        }
        write!(f, "]")
    }
}
