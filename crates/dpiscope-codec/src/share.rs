use crate::state::{compose_state, decompose_state};
use dpiscope_core::{
    CodecError, ProbeResult, Revision, SchemaLayout, SchemaRegistry, SchemaSnapshot, Session,
    REVISION_BITS,
};
use dpiscope_dsa::{zeroed, BitReader, BitWriter};

const MINUTE_MS: u64 = 60_000;

/// A decoded share token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedShare {
    pub revision: Revision,
    pub revision_hex: String,
    /// Unix milliseconds, minute precision.
    pub timestamp_ms: u64,
    pub asn: u32,
    /// In roster order (ascending id).
    pub items: Vec<ProbeResult>,
}

impl DecodedShare {
    /// Rebuilds the session the token was produced from, minus task faults.
    pub fn into_session(self) -> Session {
        let mut session = Session::with_timestamp(self.asn, self.timestamp_ms);
        for item in self.items {
            session.record(item);
        }
        session
    }
}

/// Whole minutes elapsed since the layout epoch.
pub fn quantize_timestamp(layout: &SchemaLayout, timestamp_ms: u64) -> Result<u64, CodecError> {
    if timestamp_ms < layout.epoch_millis {
        return Err(CodecError::TimestampBeforeEpoch {
            timestamp_ms,
            epoch_ms: layout.epoch_millis,
        });
    }
    Ok((timestamp_ms - layout.epoch_millis) / MINUTE_MS)
}

fn check_fits(field: &'static str, value: u128, bits: u32) -> Result<(), CodecError> {
    if bits < 128 && value >> bits != 0 {
        return Err(CodecError::FieldOverflow { field, value, bits });
    }
    Ok(())
}

/// Packs a session under `layout`, tagged with `revision`.
///
/// ## Layout
/// `revision ∥ minutes ∥ asn ∥ state₀ ∥ state₁ ∥ …`, items in ascending id
/// order, final byte zero padded.
pub fn encode_bytes(layout: &SchemaLayout, revision: Revision, session: &Session) -> Result<Vec<u8>, CodecError> {
    layout.validate()?;

    let minutes = quantize_timestamp(layout, session.timestamp_ms())?;
    check_fits("timestamp", minutes as u128, layout.timestamp_bits)?;
    check_fits("asn", session.asn() as u128, layout.asn_bits)?;

    let mut states = Vec::with_capacity(session.len());
    for result in session.results() {
        if result.is_faulted() {
            tracing::debug!("share: {} faulted, encoding as {}/{}", result.target.id, result.alive, result.dpi);
        }
        states.push(compose_state(layout, result.alive, result.dpi)?);
    }

    let mut buf = zeroed(layout.total_bits(states.len()));
    let mut writer = BitWriter::new(&mut buf);
    writer
        .put(REVISION_BITS as usize, revision.to_u128())
        .put(layout.timestamp_bits as usize, minutes as u128)
        .put(layout.asn_bits as usize, session.asn() as u128);
    for state in states {
        writer.put(layout.item_state_bits as usize, state as u128);
    }

    Ok(buf)
}

/// Packs a session under a resolved snapshot: its layout, and its roster as
/// the only acceptable set of ids.
///
/// The token carries positions, not ids, so a session whose ids differ from
/// the roster in any way is refused with `RosterMismatch`.
pub fn encode_for(snapshot: &SchemaSnapshot, session: &Session) -> Result<Vec<u8>, CodecError> {
    check_roster(snapshot, session)?;
    encode_bytes(&snapshot.layout, snapshot.revision, session)
}

fn check_roster(snapshot: &SchemaSnapshot, session: &Session) -> Result<(), CodecError> {
    let mismatch = |detail: String| CodecError::RosterMismatch {
        revision: snapshot.revision.to_hex(),
        detail,
    };

    let mut ids = session.results().map(|r| r.target.id.as_str());
    for (i, target) in snapshot.roster.iter().enumerate() {
        match ids.next() {
            Some(id) if id == target.id => {}
            Some(id) => {
                return Err(mismatch(format!(
                    "position {} holds `{}`, roster expects `{}`",
                    i, id, target.id
                )))
            }
            None => {
                return Err(mismatch(format!(
                    "{} results for {} roster targets",
                    i,
                    snapshot.roster.len()
                )))
            }
        }
    }
    if let Some(extra) = ids.next() {
        return Err(mismatch(format!("`{}` is not in the roster", extra)));
    }
    Ok(())
}

/// Reads the revision tag, resolves its schema, and decodes the rest with it.
///
/// The revision is read with the fixed `REVISION_BITS` anchor. Nothing past it
/// is interpreted until the registry has answered for that exact revision.
pub async fn decode_bytes(bytes: &[u8], registry: &dyn SchemaRegistry) -> Result<DecodedShare, CodecError> {
    let revision = read_revision(bytes)?;
    let snapshot = registry.resolve(&revision).await?;
    if snapshot.revision != revision {
        return Err(CodecError::UnknownRevision(revision.to_hex()));
    }
    decode_with(bytes, &snapshot)
}

pub fn read_revision(bytes: &[u8]) -> Result<Revision, CodecError> {
    BitReader::new(bytes)
        .try_take(REVISION_BITS as usize)
        .map(Revision::from_u128)
        .ok_or_else(|| {
            CodecError::MalformedToken(format!("{} bytes is shorter than the revision tag", bytes.len()))
        })
}

/// Decodes a token whose schema is already known.
pub fn decode_with(bytes: &[u8], snapshot: &SchemaSnapshot) -> Result<DecodedShare, CodecError> {
    let layout = &snapshot.layout;
    layout.validate()?;

    let expected = layout.token_bytes(snapshot.roster.len());
    if bytes.len() != expected {
        return Err(CodecError::MalformedToken(format!(
            "revision {} with {} items needs {} bytes, got {}",
            snapshot.revision,
            snapshot.roster.len(),
            expected,
            bytes.len()
        )));
    }

    let mut reader = BitReader::at(bytes, REVISION_BITS as usize);
    let minutes = reader.take(layout.timestamp_bits as usize) as u64;
    let timestamp_ms = minutes
        .checked_mul(MINUTE_MS)
        .and_then(|ms| ms.checked_add(layout.epoch_millis))
        .ok_or_else(|| CodecError::MalformedToken(format!("timestamp {} minutes overflows", minutes)))?;
    let asn = reader.take(layout.asn_bits as usize) as u32;

    let mut items = Vec::with_capacity(snapshot.roster.len());
    for target in &snapshot.roster {
        let state = reader.take(layout.item_state_bits as usize) as u32;
        let (alive, dpi) = decompose_state(layout, state)?;
        items.push(ProbeResult::new(target.clone(), alive, dpi));
    }

    let padding = reader.remaining();
    if padding > 0 && reader.take(padding) != 0 {
        return Err(CodecError::MalformedToken("non-zero padding bits".to_string()));
    }

    Ok(DecodedShare {
        revision: snapshot.revision,
        revision_hex: snapshot.revision.to_hex(),
        timestamp_ms,
        asn,
        items,
    })
}
