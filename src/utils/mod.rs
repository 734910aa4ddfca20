//! Small helpers shared by the metadata and runtime layers.

mod math;

pub use math::{align_up, to_u16, to_u32};
