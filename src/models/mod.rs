//! Models Module - Errors, Log Records & Response Envelopes

pub mod errors;
pub mod logging;
pub mod responses;

pub use errors::*;
pub use logging::*;
pub use responses::*;
