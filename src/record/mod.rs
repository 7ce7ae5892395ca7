//! 行抽出とレコード正規化

pub mod extract;
pub mod normalize;
mod types;

pub use extract::{extract_fields, read_row};
pub use normalize::{normalize, normalize_named, CapacityConvention};
pub use types::{
    CanonicalRecord, CellLink, ExtractedFields, Field, FieldMap, FieldValue, RawCell, RawRow,
    Slot, MIN_DATA_CELLS, UNAVAILABLE,
};
