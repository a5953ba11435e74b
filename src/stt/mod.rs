//! Speech-to-text backends.

pub mod transcriber;
#[cfg(feature = "wit")]
pub mod wit;
