//! Pattern interchange format.
//!
//! Two JSON schemas, consumed/produced on demand (never per-tick):
//!
//! - `mpl.pattern.v1` — single layer: `{schema, size, channel, meta}`
//! - `mpl.pattern.layers.v1` — multi layer: `{schema, layers, meta}`
//!
//! `channel` is a base64-encoded raw `u8` array in the same flattened
//! index order as live snapshots. Applying a pattern takes an origin,
//! an optional target layer, and a merge mode (`replace` overwrites,
//! `add` saturates at 255, `max` keeps the larger value).

use crate::buffer::{GridSize, VoxelBuffer};
use crate::layer::Layer;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pattern I/O failures.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid base64 channel: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("channel length {actual} does not match size {x}x{y}x{z}")]
    ChannelSizeMismatch {
        actual: usize,
        x: usize,
        y: usize,
        z: usize,
    },

    #[error("no layer with id '{0}'")]
    UnknownLayer(String),

    #[error("pattern has no layers")]
    EmptyPattern,
}

/// Optional pattern metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "createdAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A single-layer pattern document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinglePattern {
    pub size: GridSize,
    /// base64(raw cell bytes)
    pub channel: String,
    #[serde(default)]
    pub meta: PatternMeta,
}

/// One layer of a multi-layer pattern document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternLayer {
    pub id: String,
    pub name: String,
    pub size: GridSize,
    pub channel: String,
    #[serde(default)]
    pub meta: PatternMeta,
}

/// A multi-layer pattern document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayersPattern {
    pub layers: Vec<PatternLayer>,
    #[serde(default)]
    pub meta: PatternMeta,
}

/// A pattern document, discriminated by its `schema` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "schema")]
pub enum Pattern {
    #[serde(rename = "mpl.pattern.v1")]
    Single(SinglePattern),
    #[serde(rename = "mpl.pattern.layers.v1")]
    Layers(LayersPattern),
}

/// How pattern cells combine with destination cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    /// Overwrite destination cells.
    Replace,
    /// `dest + src`, clamped to `[0, 255]`.
    Add,
    /// `max(dest, src)`.
    Max,
}

impl MergeMode {
    #[inline]
    fn merge(self, dest: u8, src: u8) -> u8 {
        match self {
            MergeMode::Replace => src,
            MergeMode::Add => dest.saturating_add(src),
            MergeMode::Max => dest.max(src),
        }
    }
}

/// Placement options for applying a pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyOptions {
    pub origin: Origin,
    #[serde(rename = "targetLayer", skip_serializing_if = "Option::is_none")]
    pub target_layer: Option<String>,
    #[serde(rename = "mergeMode")]
    pub merge_mode: MergeMode,
}

/// Pattern placement origin (may be negative; out-of-range destination
/// cells are clipped).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

// ─────────────────────────────────────────────────────────────────────
// Encode / decode
// ─────────────────────────────────────────────────────────────────────

/// Encode raw channel bytes as base64.
pub fn encode_channel(cells: &[u8]) -> String {
    BASE64.encode(cells)
}

/// Decode a base64 channel and validate its length against `size`.
pub fn decode_channel(channel: &str, size: GridSize) -> Result<Vec<u8>, PatternError> {
    let bytes = BASE64.decode(channel)?;
    if bytes.len() != size.len() {
        return Err(PatternError::ChannelSizeMismatch {
            actual: bytes.len(),
            x: size.x,
            y: size.y,
            z: size.z,
        });
    }
    Ok(bytes)
}

/// Export one buffer as a single-layer pattern.
pub fn export_single(buffer: &VoxelBuffer, meta: PatternMeta) -> Pattern {
    Pattern::Single(SinglePattern {
        size: buffer.size(),
        channel: encode_channel(buffer.as_slice()),
        meta,
    })
}

/// Export a set of layers as a multi-layer pattern.
pub fn export_layers(layers: &[Layer], meta: PatternMeta) -> Pattern {
    Pattern::Layers(LayersPattern {
        layers: layers
            .iter()
            .map(|layer| PatternLayer {
                id: layer.id.clone(),
                name: layer.name.clone(),
                size: layer.buffer.size(),
                channel: encode_channel(layer.buffer.as_slice()),
                meta: PatternMeta::default(),
            })
            .collect(),
        meta,
    })
}

/// Serialize a pattern document to JSON.
pub fn to_json(pattern: &Pattern) -> Result<String, PatternError> {
    Ok(serde_json::to_string_pretty(pattern)?)
}

/// Parse a pattern document from JSON.
pub fn from_json(json: &str) -> Result<Pattern, PatternError> {
    Ok(serde_json::from_str(json)?)
}

// ─────────────────────────────────────────────────────────────────────
// Apply
// ─────────────────────────────────────────────────────────────────────

/// Merge a decoded source channel into a destination buffer at an
/// origin, clipping out-of-range destination cells. Returns how many
/// cells landed.
pub fn apply_channel(
    dest: &mut VoxelBuffer,
    src: &[u8],
    src_size: GridSize,
    origin: Origin,
    mode: MergeMode,
) -> usize {
    debug_assert_eq!(src.len(), src_size.len());
    let mut written = 0;
    for sz in 0..src_size.z {
        for sy in 0..src_size.y {
            for sx in 0..src_size.x {
                let value = src[src_size.index(sx, sy, sz)];
                let dx = origin.x + sx as i64;
                let dy = origin.y + sy as i64;
                let dz = origin.z + sz as i64;
                let dest_value = dest.get(dx, dy, dz);
                if dest.set(dx, dy, dz, mode.merge(dest_value, value)) {
                    written += 1;
                }
            }
        }
    }
    written
}

/// Apply a pattern document onto a set of layers.
///
/// Single-layer patterns land on `options.target_layer` (matched by id)
/// or `default_layer` when unset. Multi-layer patterns match each
/// pattern layer to the grid layer with the same id; misses are skipped
/// with a warning; `options.target_layer` narrows the application to
/// one pattern layer.
pub fn apply_pattern(
    layers: &mut [Layer],
    default_layer: usize,
    pattern: &Pattern,
    options: &ApplyOptions,
) -> Result<usize, PatternError> {
    match pattern {
        Pattern::Single(single) => {
            let target = match &options.target_layer {
                Some(id) => layers
                    .iter_mut()
                    .find(|l| &l.id == id)
                    .ok_or_else(|| PatternError::UnknownLayer(id.clone()))?,
                None => layers
                    .get_mut(default_layer)
                    .expect("default layer index out of range"),
            };
            let src = decode_channel(&single.channel, single.size)?;
            Ok(apply_channel(
                &mut target.buffer,
                &src,
                single.size,
                options.origin,
                options.merge_mode,
            ))
        }
        Pattern::Layers(multi) => {
            if multi.layers.is_empty() {
                return Err(PatternError::EmptyPattern);
            }
            let mut written = 0;
            for pattern_layer in &multi.layers {
                if let Some(filter) = &options.target_layer {
                    if &pattern_layer.id != filter {
                        continue;
                    }
                }
                let Some(target) = layers.iter_mut().find(|l| l.id == pattern_layer.id) else {
                    warn!(
                        "pattern layer '{}' has no matching grid layer; skipped",
                        pattern_layer.id
                    );
                    continue;
                };
                let src = decode_channel(&pattern_layer.channel, pattern_layer.size)?;
                written += apply_channel(
                    &mut target.buffer,
                    &src,
                    pattern_layer.size,
                    options.origin,
                    options.merge_mode,
                );
            }
            Ok(written)
        }
    }
}
