//! Audio transport and encoding.

#[cfg(feature = "serial")]
pub mod serial;
pub mod source;
pub mod wav;
