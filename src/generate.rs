//! Synthetic payload generation.
//!
//! Deterministic for a given seed: the generator owns a seeded ChaCha8 RNG,
//! so the same seed and shape reproduce the same documents. Nothing is
//! retained or cached between calls.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde_json::Value;

use crate::store::SoupEntry;
use crate::{BenchError, BenchResult};

/// Reference code-point range of the benchmark payloads.
pub const DEFAULT_MIN_CODE_POINT: u32 = 0x20;
pub const DEFAULT_MAX_CODE_POINT: u32 = 0xFF;

// Caps children^depth; beyond this a single entry would exhaust memory long
// before the store sees it.
const MAX_LEAVES: u64 = 1 << 24;

/// Size and structure parameters of one generated document.
///
/// A document holds `children ^ depth` leaf strings of `value_length` code
/// points each; key bytes are overhead on top of that budget.
#[derive(Debug, Clone, Copy)]
pub struct EntryShape {
    /// Nesting depth; 0 generates a bare string value.
    pub depth: u32,
    /// Branches at each level.
    pub children: u32,
    /// Code points per generated key.
    pub key_length: u32,
    /// Code points per leaf value.
    pub value_length: u32,
}

impl EntryShape {
    /// Derive the leaf value length from a per-entry byte budget: the budget
    /// divided across `children ^ depth` leaves.
    pub fn for_budget(
        per_entry_size: u64,
        depth: u32,
        children: u32,
        key_length: u32,
    ) -> BenchResult<Self> {
        if children == 0 {
            return Err(BenchError::InvalidShape("children must be >= 1".into()));
        }
        let leaves = (children as u64)
            .checked_pow(depth)
            .filter(|&l| l <= MAX_LEAVES)
            .ok_or_else(|| {
                BenchError::InvalidShape(format!("{children}^{depth} leaves exceed the sanity cap"))
            })?;
        let value_length = per_entry_size / leaves;
        if value_length == 0 {
            return Err(BenchError::InvalidShape(format!(
                "per-entry budget of {per_entry_size} bytes is smaller than {leaves} leaves"
            )));
        }
        let value_length = u32::try_from(value_length).map_err(|_| {
            BenchError::InvalidShape(format!("leaf value length {value_length} overflows"))
        })?;
        let shape = Self {
            depth,
            children,
            key_length,
            value_length,
        };
        shape.validate()?;
        Ok(shape)
    }

    /// Leaf strings per document, `children ^ depth`.
    pub fn leaf_count(&self) -> u64 {
        (self.children as u64).pow(self.depth)
    }

    pub fn validate(&self) -> BenchResult<()> {
        if self.children == 0 {
            return Err(BenchError::InvalidShape("children must be >= 1".into()));
        }
        if self.key_length == 0 {
            return Err(BenchError::InvalidShape("key length must be >= 1".into()));
        }
        if self.value_length == 0 {
            return Err(BenchError::InvalidShape("leaf value length must be >= 1".into()));
        }
        if (self.children as u64).checked_pow(self.depth).filter(|&l| l <= MAX_LEAVES).is_none() {
            return Err(BenchError::InvalidShape(format!(
                "{}^{} leaves exceed the sanity cap",
                self.children, self.depth
            )));
        }
        Ok(())
    }
}

/// Payload generator. Owns the RNG and the code-point range.
pub struct EntryGen {
    rng: ChaCha8Rng,
    min_code_point: u32,
    max_code_point: u32,
}

impl EntryGen {
    /// Generator over the default range 0x20–0xFF.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            min_code_point: DEFAULT_MIN_CODE_POINT,
            max_code_point: DEFAULT_MAX_CODE_POINT,
        }
    }

    /// Generator over an inclusive code-point range of its own.
    pub fn with_code_points(seed: u64, min: u32, max: u32) -> BenchResult<Self> {
        validate_code_points(min, max)?;
        Ok(Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            min_code_point: min,
            max_code_point: max,
        })
    }

    /// Random string of exactly `len` code points, each drawn independently
    /// and uniformly from the configured range. Repeats within and across
    /// calls are expected and never deduplicated.
    pub fn gen_string(&mut self, len: u32) -> String {
        (0..len)
            .map(|_| {
                let cp = self.rng.gen_range(self.min_code_point..=self.max_code_point);
                // range validated at construction
                char::from_u32(cp).unwrap_or(char::REPLACEMENT_CHARACTER)
            })
            .collect()
    }

    /// Nested value: depth 0 is a leaf string of `value_length` code points;
    /// otherwise a JSON object with `children` freshly keyed branches,
    /// recursive at `depth - 1`.
    ///
    /// Sibling keys can collide, in which case one branch is silently lost —
    /// accepted behavior, the object then has fewer than `children` entries.
    pub fn gen_object(
        &mut self,
        depth: u32,
        children: u32,
        key_length: u32,
        value_length: u32,
    ) -> Value {
        if depth == 0 {
            return Value::String(self.gen_string(value_length));
        }
        let mut map = serde_json::Map::with_capacity(children as usize);
        for _ in 0..children {
            let key = self.gen_string(key_length);
            map.insert(key, self.gen_object(depth - 1, children, key_length, value_length));
        }
        Value::Object(map)
    }

    /// Compose a full entry for `shape`: a top-level key of `key_length`
    /// plus a value via [`Self::gen_object`].
    pub fn gen_entry(&mut self, shape: &EntryShape) -> BenchResult<SoupEntry> {
        shape.validate()?;
        Ok(SoupEntry {
            key: self.gen_string(shape.key_length),
            value: self.gen_object(
                shape.depth,
                shape.children,
                shape.key_length,
                shape.value_length,
            ),
        })
    }
}

fn validate_code_points(min: u32, max: u32) -> BenchResult<()> {
    if min > max {
        return Err(BenchError::InvalidShape(format!(
            "empty code-point range {min:#x}..={max:#x}"
        )));
    }
    if max > char::MAX as u32 {
        return Err(BenchError::InvalidShape(format!(
            "code point {max:#x} past char::MAX"
        )));
    }
    if min <= 0xDFFF && max >= 0xD800 {
        return Err(BenchError::InvalidShape(format!(
            "code-point range {min:#x}..={max:#x} overlaps the surrogate block"
        )));
    }
    Ok(())
}
