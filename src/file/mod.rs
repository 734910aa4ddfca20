//! Byte-level reading and writing.
//!
//! [`io`] holds the bounds-checked primitive conversions and the variable-length integer
//! writers; [`parser`] holds the cursor that every blob decoder in the crate is built on.

pub mod io;
pub mod parser;
