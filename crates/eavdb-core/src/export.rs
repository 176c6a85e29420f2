//! # Canonical Export Module
//!
//! A bit-exact `postcard` encoding of a database's facts.
//!
//! In-memory iteration order follows insertion history, so two databases
//! holding the same facts can iterate differently. The canonical form sorts
//! every triple first; identical fact sets always export to identical bytes.
//! Blocks are not exported.
//!
//! Format:
//! ```text
//! [header_len: u32 LE] [CanonicalHeader (postcard)] [CanonicalDatabase (postcard)]
//! ```

use crate::database::Database;
use crate::primitives::{FORMAT_VERSION, MAGIC_BYTES};
use crate::{EavError, EntityId, Triple, Value};
use serde::{Deserialize, Serialize};

/// Maximum triple count accepted on import.
pub const MAX_IMPORT_TRIPLE_COUNT: u64 = 10_000_000;

// =============================================================================
// HEADER
// =============================================================================

/// Header for canonical export data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalHeader {
    pub magic: [u8; 4],
    pub version: u8,
    pub triple_count: u64,
    /// FNV-1a digest of the data section.
    pub checksum: u64,
}

impl CanonicalHeader {
    #[must_use]
    pub fn new(triple_count: u64, checksum: u64) -> Self {
        Self {
            magic: *MAGIC_BYTES,
            version: FORMAT_VERSION,
            triple_count,
            checksum,
        }
    }

    /// Reject foreign or future data.
    pub fn validate(&self) -> Result<(), EavError> {
        if &self.magic != MAGIC_BYTES {
            return Err(EavError::SerializationError(
                "Invalid file format".to_string(),
            ));
        }
        if self.version != FORMAT_VERSION {
            return Err(EavError::SerializationError(
                "Unsupported file version".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// CANONICAL DATA
// =============================================================================

/// Postcard-friendly mirror of [`Value`]; the wire form of `Value` is
/// self-describing JSON and cannot be read back by a non-self-describing
/// format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
enum CanonicalValue {
    Id(u64),
    Text(String),
    Number(i64),
}

impl From<&Value> for CanonicalValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Id(id) => Self::Id(id.0),
            Value::Text(s) => Self::Text(s.clone()),
            Value::Number(n) => Self::Number(*n),
        }
    }
}

impl From<CanonicalValue> for Value {
    fn from(value: CanonicalValue) -> Self {
        match value {
            CanonicalValue::Id(id) => Self::Id(EntityId(id)),
            CanonicalValue::Text(s) => Self::Text(s),
            CanonicalValue::Number(n) => Self::Number(n),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
struct CanonicalTriple {
    entity: u64,
    attribute: CanonicalValue,
    value: CanonicalValue,
}

/// A database's facts in canonical, sorted form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalDatabase {
    pub name: String,
    triples: Vec<CanonicalTriple>,
}

impl CanonicalDatabase {
    /// Collect and sort every triple of `db`.
    #[must_use]
    pub fn from_database(db: &Database) -> Self {
        let mut triples: Vec<CanonicalTriple> = db
            .index()
            .triples()
            .map(|t| CanonicalTriple {
                entity: t.entity.0,
                attribute: CanonicalValue::from(&t.attribute),
                value: CanonicalValue::from(&t.value),
            })
            .collect();
        triples.sort();
        Self {
            name: db.name().to_string(),
            triples,
        }
    }

    /// The sorted triples.
    #[must_use]
    pub fn triples(&self) -> Vec<Triple> {
        self.triples
            .iter()
            .map(|t| Triple {
                entity: EntityId(t.entity),
                attribute: t.attribute.clone().into(),
                value: t.value.clone().into(),
            })
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.triples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// Rebuild a database (with no Blocks) from the canonical facts.
    #[must_use]
    pub fn to_database(&self) -> Database {
        let mut db = Database::new(self.name.clone());
        for triple in self.triples() {
            db.insert(triple.entity, triple.attribute, triple.value);
        }
        db
    }

    /// Deterministic, order-sensitive checksum of the facts.
    ///
    /// Not cryptographic; enable `crypto-hash` for a BLAKE3 digest.
    #[must_use]
    pub fn checksum(&self) -> u64 {
        let mut hasher = Fnv::default();
        hasher.bytes(self.name.as_bytes());
        for triple in &self.triples {
            hasher.word(triple.entity);
            hasher.value(&triple.attribute);
            hasher.value(&triple.value);
        }
        hasher.finish()
    }
}

#[derive(Debug)]
struct Fnv(u64);

impl Default for Fnv {
    fn default() -> Self {
        Self(0xcbf2_9ce4_8422_2325)
    }
}

impl Fnv {
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    fn bytes(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.0 ^= u64::from(*byte);
            self.0 = self.0.wrapping_mul(Self::PRIME);
        }
        // Length terminator keeps adjacent strings apart.
        self.word(bytes.len() as u64);
    }

    fn word(&mut self, word: u64) {
        for byte in word.to_le_bytes() {
            self.0 ^= u64::from(byte);
            self.0 = self.0.wrapping_mul(Self::PRIME);
        }
    }

    fn value(&mut self, value: &CanonicalValue) {
        match value {
            CanonicalValue::Id(id) => {
                self.word(0);
                self.word(*id);
            }
            CanonicalValue::Text(s) => {
                self.word(1);
                self.bytes(s.as_bytes());
            }
            CanonicalValue::Number(n) => {
                self.word(2);
                self.word(*n as u64);
            }
        }
    }

    fn finish(&self) -> u64 {
        self.0
    }
}

// =============================================================================
// EXPORT / IMPORT
// =============================================================================

/// Export a database's facts to canonical postcard bytes.
pub fn export_canonical(db: &Database) -> Result<Vec<u8>, EavError> {
    let canonical = CanonicalDatabase::from_database(db);
    let header = CanonicalHeader::new(canonical.len() as u64, canonical.checksum());

    let header_bytes = postcard::to_allocvec(&header)
        .map_err(|e| EavError::SerializationError(format!("Header: {}", e)))?;
    let data_bytes = postcard::to_allocvec(&canonical)
        .map_err(|e| EavError::SerializationError(format!("Data: {}", e)))?;

    let mut result = Vec::with_capacity(4 + header_bytes.len() + data_bytes.len());
    result.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
    result.extend_from_slice(&header_bytes);
    result.extend_from_slice(&data_bytes);
    Ok(result)
}

/// Import canonical bytes, verifying header, counts and checksum.
pub fn import_canonical(data: &[u8]) -> Result<Database, EavError> {
    let too_short = || EavError::SerializationError("Data too short".to_string());

    let len_bytes: [u8; 4] = data
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(too_short)?;
    let header_len = u32::from_le_bytes(len_bytes) as usize;
    let header_bytes = data.get(4..4 + header_len).ok_or_else(too_short)?;
    let data_bytes = data.get(4 + header_len..).ok_or_else(too_short)?;

    let header: CanonicalHeader = postcard::from_bytes(header_bytes)
        .map_err(|e| EavError::SerializationError(format!("Header: {}", e)))?;
    header.validate()?;

    if header.triple_count > MAX_IMPORT_TRIPLE_COUNT {
        return Err(EavError::SerializationError(format!(
            "Triple count {} exceeds maximum allowed {}",
            header.triple_count, MAX_IMPORT_TRIPLE_COUNT
        )));
    }

    let canonical: CanonicalDatabase = postcard::from_bytes(data_bytes)
        .map_err(|e| EavError::SerializationError(format!("Data: {}", e)))?;

    let computed = canonical.checksum();
    if computed != header.checksum {
        return Err(EavError::SerializationError(format!(
            "Checksum mismatch: expected {}, got {}",
            header.checksum, computed
        )));
    }
    if canonical.len() as u64 != header.triple_count {
        return Err(EavError::SerializationError(
            "Triple count mismatch".to_string(),
        ));
    }

    Ok(canonical.to_database())
}

/// Checksum of a database's canonical form.
#[must_use]
pub fn canonical_checksum(db: &Database) -> u64 {
    CanonicalDatabase::from_database(db).checksum()
}

/// BLAKE3 digest of a database's canonical export, as hex.
#[cfg(feature = "crypto-hash")]
pub fn canonical_crypto_hash(db: &Database) -> Result<String, EavError> {
    let data = export_canonical(db)?;
    Ok(blake3::hash(&data).to_hex().to_string())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(order: &[(u64, &str, Value)]) -> Database {
        let mut db = Database::new("facts");
        for (e, a, v) in order {
            db.insert(EntityId(*e), Value::text(*a), v.clone());
        }
        db
    }

    #[test]
    fn canonical_roundtrip() {
        let db = sample(&[
            (1, "name", Value::text("ann")),
            (1, "age", Value::Number(30)),
            (2, "knows", Value::Id(EntityId(1))),
        ]);

        let bytes = export_canonical(&db).expect("export");
        let back = import_canonical(&bytes).expect("import");
        assert_eq!(back.name(), "facts");
        assert_eq!(back.len(), 3);
        assert_eq!(canonical_checksum(&back), canonical_checksum(&db));
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let a = sample(&[
            (1, "x", Value::Number(1)),
            (2, "y", Value::text("b")),
        ]);
        let b = sample(&[
            (2, "y", Value::text("b")),
            (1, "x", Value::Number(1)),
        ]);
        assert_eq!(
            export_canonical(&a).expect("export"),
            export_canonical(&b).expect("export")
        );
    }

    #[test]
    fn corrupted_data_is_rejected() {
        let db = sample(&[(1, "x", Value::Number(1))]);
        let mut bytes = export_canonical(&db).expect("export");
        if let Some(last) = bytes.last_mut() {
            *last ^= 0xff;
        }
        assert!(import_canonical(&bytes).is_err());
        assert!(import_canonical(&[1, 2]).is_err());
    }

    #[test]
    fn checksum_distinguishes_value_kinds() {
        let text = sample(&[(1, "x", Value::text("1"))]);
        let number = sample(&[(1, "x", Value::Number(1))]);
        assert_ne!(canonical_checksum(&text), canonical_checksum(&number));
    }

    #[cfg(feature = "crypto-hash")]
    #[test]
    fn crypto_hash_is_hex() {
        let db = sample(&[(1, "x", Value::Number(1))]);
        let hash = canonical_crypto_hash(&db).expect("hash");
        assert_eq!(hash.len(), 64);
    }
}
