//! Serialized form of a legacy archive.
//!
//! A legacy file is the magic line [`LEGACY_MAGIC`] followed by one JSON
//! document. Sample payloads live in a content-addressed dataset table;
//! properties refer to datasets by position.

use serde::{Deserialize, Serialize};

pub const LEGACY_MAGIC: &[u8] = b"ABCLEGACY1\n";

pub const LEGACY_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyDocument {
    pub version: u32,
    #[serde(default)]
    pub archive_metadata: String,
    pub time_samplings: Vec<LegacyTimeSampling>,
    pub datasets: Vec<LegacyDataset>,
    pub top: LegacyGroup,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyTimeSampling {
    pub time_per_cycle: f64,
    pub times: Vec<f64>,
    #[serde(default)]
    pub max_samples: u32,
}

/// One stored payload and its digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyDataset {
    pub digest: String,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

/// An object: its properties and child objects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LegacyGroup {
    pub name: String,
    #[serde(default)]
    pub metadata: String,
    #[serde(default)]
    pub properties: Vec<LegacyProperty>,
    #[serde(default)]
    pub children: Vec<LegacyGroup>,
    #[serde(default)]
    pub properties_hash: String,
    #[serde(default)]
    pub children_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LegacyProperty {
    Compound {
        name: String,
        #[serde(default)]
        metadata: String,
        #[serde(default)]
        properties: Vec<LegacyProperty>,
    },
    Scalar {
        name: String,
        #[serde(default)]
        metadata: String,
        pod: String,
        extent: u8,
        #[serde(default)]
        time_sampling: u32,
        samples: Vec<usize>,
    },
    Array {
        name: String,
        #[serde(default)]
        metadata: String,
        pod: String,
        extent: u8,
        #[serde(default)]
        time_sampling: u32,
        samples: Vec<LegacyArraySample>,
    },
}

impl LegacyProperty {
    pub fn name(&self) -> &str {
        match self {
            Self::Compound { name, .. } | Self::Scalar { name, .. } | Self::Array { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyArraySample {
    pub dataset: usize,
    pub dims: Vec<usize>,
}

/// Byte payloads as lowercase hex strings.
mod hex_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(&text).map_err(|e| D::Error::custom(format!("invalid hex payload: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_hex_payload() {
        let ds = LegacyDataset {
            digest: "00".repeat(16),
            data: vec![0x00, 0xab, 0xff],
        };
        let json = serde_json::to_string(&ds).unwrap();
        assert!(json.contains("\"00abff\""));
        let back: LegacyDataset = serde_json::from_str(&json).unwrap();
        assert_eq!(back.data, ds.data);

        for bad in [r#"{"digest":"","data":"abc"}"#, r#"{"digest":"","data":"zz"}"#] {
            let err = serde_json::from_str::<LegacyDataset>(bad).unwrap_err();
            assert!(err.to_string().contains("invalid hex payload"), "{err}");
        }
    }

    #[test]
    fn test_property_tagging() {
        let prop = LegacyProperty::Scalar {
            name: "x".into(),
            metadata: String::new(),
            pod: "float32_t".into(),
            extent: 1,
            time_sampling: 0,
            samples: vec![0, 0],
        };
        let json = serde_json::to_value(&prop).unwrap();
        assert_eq!(json["kind"], "scalar");
        assert_eq!(prop.name(), "x");
    }
}
