//! Inverted bitmap index over integer record attributes.
//!
//! For each `(field, value)` pair the index keeps a compressed bitmap of
//! record ids. Search filters are answered by handing the matching bitmap
//! to the ANN index as an allow-list.

mod field_bitmap;


pub use field_bitmap::{FieldBitmap, FilterOp};
