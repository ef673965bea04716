//! Serial line ingestion.
//!
//! Raw bytes from the device are framed into lines by [`LineFramer`]
//! and handed to [`LineParser`], which is the only code path allowed to
//! write into the gauge registry.

mod framing;
mod parser;

pub use framing::{LineFramer, DEFAULT_MAX_LINE_BYTES};
pub use parser::{
    LineOutcome, LineParser, ParseError, Reading, ReadingValue, DEFAULT_PREFIX_PATTERN,
};
