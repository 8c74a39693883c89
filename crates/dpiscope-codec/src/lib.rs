//! # dpiscope-codec: Share Tokens
//!
//! Packs a finished session into a short URL-safe token and back. The token
//! carries no strings: targets are identified by their position in the roster
//! of the revision the token was produced under.

pub mod share;
pub mod state;
pub mod text;

pub use share::{decode_bytes, decode_with, encode_bytes, encode_for, quantize_timestamp, read_revision, DecodedShare};
pub use state::{compose_state, decompose_state};
pub use text::{from_text, to_text};

use dpiscope_core::{CodecError, RevisionSource, SchemaRegistry, Session};
use std::sync::Arc;

/// Encoder/decoder pair bound to its revision sources.
///
/// Encoding tags the token with the latest published revision and packs it
/// with the layout and roster resolved for that same revision. Decoding
/// resolves the layout of the revision found in the token.
pub struct ShareCodec {
    revisions: Arc<dyn RevisionSource>,
    registry: Arc<dyn SchemaRegistry>,
}

impl ShareCodec {
    pub fn new(revisions: Arc<dyn RevisionSource>, registry: Arc<dyn SchemaRegistry>) -> Self {
        Self { revisions, registry }
    }

    /// Fails with `RevisionLookupFailed` when the latest revision cannot be
    /// determined. No fallback revision is ever substituted.
    pub async fn encode(&self, session: &Session) -> Result<String, CodecError> {
        let revision = self
            .revisions
            .latest()
            .await
            .map_err(|e| CodecError::RevisionLookupFailed(e.to_string()))?;

        let snapshot = self.registry.resolve(&revision).await?;
        if snapshot.revision != revision {
            return Err(CodecError::UnknownRevision(revision.to_hex()));
        }

        let bytes = encode_for(&snapshot, session)?;
        let token = to_text(&bytes);
        tracing::info!(
            "share: encoded {} items under revision {} ({} bytes)",
            session.len(),
            revision,
            bytes.len()
        );
        Ok(token)
    }

    pub async fn decode(&self, token: &str) -> Result<DecodedShare, CodecError> {
        let bytes = from_text(token)?;
        let decoded = decode_bytes(&bytes, self.registry.as_ref()).await?;
        tracing::info!(
            "share: decoded {} items from revision {}",
            decoded.items.len(),
            decoded.revision_hex
        );
        Ok(decoded)
    }
}
