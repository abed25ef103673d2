use crate::error::VmError;
use crate::memory::Memory;

/// Lexical analysis of player input against a dictionary.
///
/// Called by `sread`/`aread` once the line is in the text buffer, and by
/// `tokenise`. Implementations fill the parse buffer in place using the text
/// buffer layout of the story's version.
pub trait Tokenizer {
    fn tokenise(
        &mut self,
        memory: &mut Memory,
        request: &TokeniseRequest,
    ) -> Result<(), VmError>;
}

/// Buffers and options for a single tokenise call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokeniseRequest {
    pub text_buffer: usize,
    pub parse_buffer: usize,
    /// Dictionary to look words up in; the header dictionary when None
    pub dictionary: Option<usize>,
    /// Leave parse entries of unrecognised words untouched
    pub skip_unknown: bool,
}
