//! Mixed-radix item states: `state = alive + alive_cardinality * dpi`.
//!
//! The radix comes from the resolved layout, never from the enums, so a later
//! layout can widen either axis without touching the bit math.

use dpiscope_core::{AliveState, CodecError, DpiVerdict, SchemaLayout};

pub fn compose_state(layout: &SchemaLayout, alive: AliveState, dpi: DpiVerdict) -> Result<u32, CodecError> {
    if alive.index() >= layout.alive_cardinality {
        return Err(CodecError::FieldOverflow {
            field: "alive",
            value: alive.index() as u128,
            bits: layout.item_state_bits,
        });
    }
    if dpi.index() >= layout.dpi_cardinality {
        return Err(CodecError::FieldOverflow {
            field: "dpi",
            value: dpi.index() as u128,
            bits: layout.item_state_bits,
        });
    }
    Ok(alive.index() + layout.alive_cardinality * dpi.index())
}

pub fn decompose_state(layout: &SchemaLayout, state: u32) -> Result<(AliveState, DpiVerdict), CodecError> {
    let alive_idx = state % layout.alive_cardinality;
    let dpi_idx = state / layout.alive_cardinality;

    if dpi_idx >= layout.dpi_cardinality {
        return Err(CodecError::MalformedToken(format!(
            "item state {} exceeds {} x {} states",
            state, layout.alive_cardinality, layout.dpi_cardinality
        )));
    }
    let alive = AliveState::from_index(alive_idx)
        .ok_or_else(|| CodecError::MalformedToken(format!("alive index {} has no meaning", alive_idx)))?;
    let dpi = DpiVerdict::from_index(dpi_idx)
        .ok_or_else(|| CodecError::MalformedToken(format!("dpi index {} has no meaning", dpi_idx)))?;
    Ok((alive, dpi))
}
