//! `pcon-core` - postcode grammar shared by every other crate.

pub mod postcode;

pub use postcode::{Postcode, PostcodeParts};
