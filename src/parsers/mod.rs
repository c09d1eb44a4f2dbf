pub mod vectorcast;

use crate::error::Result;
use crate::model::CoverageDocument;

/// Every document format parser implements this trait.
pub trait Parser {
    /// Parse the input bytes into a stream of hierarchy and coverage events.
    fn parse(&self, input: &[u8]) -> Result<CoverageDocument>;
}
