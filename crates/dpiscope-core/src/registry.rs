use crate::error::RegistryError;
use crate::session::{AliveState, DpiVerdict, ProbeTarget};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Width of the revision tag. This is the one field whose position and width
/// never change, so a decoder can always read it before knowing anything else.
pub const REVISION_BITS: u32 = 128;

/// 2026-01-01T00:00:00Z.
pub const CURRENT_EPOCH_MS: u64 = 1_767_225_600_000;

/// A 128-bit schema revision tag: the leading 32 hex digits of a commit SHA.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Revision([u8; 16]);

impl Revision {
    pub const HEX_LEN: usize = 32;

    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn from_u128(v: u128) -> Self {
        Self(v.to_be_bytes())
    }

    pub fn to_u128(self) -> u128 {
        u128::from_be_bytes(self.0)
    }

    /// Parses up to 32 hex digits. Shorter input is treated as having lost its
    /// leading zeros.
    pub fn from_hex(s: &str) -> Result<Self, RegistryError> {
        let s = s.trim();
        if s.is_empty() || s.len() > Self::HEX_LEN {
            return Err(RegistryError::Invalid(format!("revision `{}` is not 1..=32 hex digits", s)));
        }
        let padded = format!("{:0>32}", s);
        let mut out = [0u8; 16];
        hex::decode_to_slice(&padded, &mut out)
            .map_err(|e| RegistryError::Invalid(format!("revision `{}`: {}", s, e)))?;
        Ok(Self(out))
    }

    /// Truncates a full commit SHA to its revision tag.
    pub fn from_commit_sha(sha: &str) -> Result<Self, RegistryError> {
        let sha = sha.trim();
        if sha.len() < Self::HEX_LEN || !sha.is_char_boundary(Self::HEX_LEN) {
            return Err(RegistryError::Invalid(format!("commit sha `{}` is too short", sha)));
        }
        Self::from_hex(&sha[..Self::HEX_LEN])
    }

    /// Always 32 lowercase digits, zero padded.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Revision({})", self.to_hex())
    }
}

/// Bit layout of a share token for one revision.
///
/// Layouts are immutable. A change to any width or cardinality ships as a new
/// layout under a new revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaLayout {
    pub revision_bits: u32,
    pub timestamp_bits: u32,
    pub asn_bits: u32,
    pub item_state_bits: u32,
    pub alive_cardinality: u32,
    pub dpi_cardinality: u32,
    pub epoch_millis: u64,
}

impl SchemaLayout {
    /// The layout this build encodes with.
    pub const CURRENT: SchemaLayout = SchemaLayout {
        revision_bits: REVISION_BITS,
        timestamp_bits: 23,
        asn_bits: 32,
        item_state_bits: 4,
        alive_cardinality: AliveState::CARDINALITY,
        dpi_cardinality: DpiVerdict::CARDINALITY,
        epoch_millis: CURRENT_EPOCH_MS,
    };

    pub fn header_bits(&self) -> usize {
        (self.revision_bits + self.timestamp_bits + self.asn_bits) as usize
    }

    pub fn total_bits(&self, items: usize) -> usize {
        self.header_bits() + self.item_state_bits as usize * items
    }

    /// Token size in bytes, final byte zero padded.
    pub fn token_bytes(&self, items: usize) -> usize {
        self.total_bits(items).div_ceil(8)
    }

    /// Number of distinct composed item states.
    pub fn state_count(&self) -> u64 {
        self.alive_cardinality as u64 * self.dpi_cardinality as u64
    }

    pub fn validate(&self) -> Result<(), RegistryError> {
        let invalid = |msg: String| Err(RegistryError::Invalid(msg));

        if self.revision_bits != REVISION_BITS {
            return invalid(format!("revisionBits must be {}, got {}", REVISION_BITS, self.revision_bits));
        }
        if !(1..=64).contains(&self.timestamp_bits) {
            return invalid(format!("timestampBits {} outside 1..=64", self.timestamp_bits));
        }
        if !(1..=32).contains(&self.asn_bits) {
            return invalid(format!("asnBits {} outside 1..=32", self.asn_bits));
        }
        if !(1..=32).contains(&self.item_state_bits) {
            return invalid(format!("itemStateBits {} outside 1..=32", self.item_state_bits));
        }
        if self.alive_cardinality == 0 || self.dpi_cardinality == 0 {
            return invalid("cardinalities must be non-zero".to_string());
        }
        if self.state_count() > 1u64 << self.item_state_bits {
            return invalid(format!(
                "itemStateBits {} cannot hold {} x {} states",
                self.item_state_bits, self.alive_cardinality, self.dpi_cardinality
            ));
        }
        Ok(())
    }
}

/// Everything a decoder needs for one revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaSnapshot {
    pub revision: Revision,
    pub layout: SchemaLayout,
    /// Sorted ascending by id; position i owns item state i.
    pub roster: Vec<ProbeTarget>,
}

impl SchemaSnapshot {
    pub fn new(revision: Revision, layout: SchemaLayout, mut roster: Vec<ProbeTarget>) -> Self {
        roster.sort_by(|a, b| a.id.cmp(&b.id));
        Self { revision, layout, roster }
    }
}

/// Resolves the layout and roster that were in effect at a revision.
#[async_trait]
pub trait SchemaRegistry: Send + Sync {
    async fn resolve(&self, revision: &Revision) -> Result<Arc<SchemaSnapshot>, RegistryError>;
}

/// Reports the newest published revision.
#[async_trait]
pub trait RevisionSource: Send + Sync {
    async fn latest(&self) -> Result<Revision, RegistryError>;
}

/// In-memory registry. Unknown revisions are reported as `NotFound`.
#[derive(Default)]
pub struct StaticRegistry {
    snapshots: HashMap<Revision, Arc<SchemaSnapshot>>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(mut self, snapshot: SchemaSnapshot) -> Self {
        self.insert(snapshot);
        self
    }

    pub fn insert(&mut self, snapshot: SchemaSnapshot) {
        self.snapshots.insert(snapshot.revision, Arc::new(snapshot));
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[async_trait]
impl SchemaRegistry for StaticRegistry {
    async fn resolve(&self, revision: &Revision) -> Result<Arc<SchemaSnapshot>, RegistryError> {
        self.snapshots
            .get(revision)
            .cloned()
            .ok_or(RegistryError::NotFound(*revision))
    }
}

/// Fixed answer for `RevisionSource`; used when the revision is pinned by configuration.
pub struct StaticRevisionSource(pub Revision);

#[async_trait]
impl RevisionSource for StaticRevisionSource {
    async fn latest(&self) -> Result<Revision, RegistryError> {
        Ok(self.0)
    }
}

/// Resolves each revision through `inner` at most once. Failures are not cached.
pub struct CachingRegistry<R> {
    inner: R,
    cache: RwLock<HashMap<Revision, Arc<SchemaSnapshot>>>,
}

impl<R: SchemaRegistry> CachingRegistry<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub async fn cached(&self) -> usize {
        self.cache.read().await.len()
    }
}

#[async_trait]
impl<R: SchemaRegistry> SchemaRegistry for CachingRegistry<R> {
    async fn resolve(&self, revision: &Revision) -> Result<Arc<SchemaSnapshot>, RegistryError> {
        if let Some(hit) = self.cache.read().await.get(revision) {
            return Ok(hit.clone());
        }

        let snapshot = self.inner.resolve(revision).await?;
        tracing::debug!("registry: cached schema for revision {}", revision);
        self.cache
            .write()
            .await
            .entry(*revision)
            .or_insert_with(|| snapshot.clone());
        Ok(snapshot)
    }
}

#[async_trait]
impl<T: SchemaRegistry + ?Sized> SchemaRegistry for Arc<T> {
    async fn resolve(&self, revision: &Revision) -> Result<Arc<SchemaSnapshot>, RegistryError> {
        (**self).resolve(revision).await
    }
}

#[async_trait]
impl<T: RevisionSource + ?Sized> RevisionSource for Arc<T> {
    async fn latest(&self) -> Result<Revision, RegistryError> {
        (**self).latest().await
    }
}
