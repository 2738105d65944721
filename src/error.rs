use std::fmt;

/// The single error type returned by every fallible operation in this crate.
///
/// Every fault the Leiden engine can raise — inconsistent input sizes, invalid
/// edge weights, malformed graph files, bad CLI arguments — is reported
/// through this type rather than through a constellation of `From`-convertible
/// error enums, so that callers only ever need to match on one thing.
#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
}

impl Error {
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Error {
        Error {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}

/// All optimisation failures reported by this crate collapse to a single
/// fault kind, `OptimizationFailure`, distinguished only by `Error::message`;
/// the other variants here are ambient (loader, CLI) concerns that reuse the
/// same `Error` type rather than inventing a parallel hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Inconsistent input sizes: a membership, weight, or node-size vector
    /// whose length does not match the graph it describes.
    InconsistentSizes,
    /// An edge weight was NaN, infinite, or negative where positivity is
    /// required by the quality function in use.
    InvalidWeight,
    /// `move_node` was asked to grow the community range past `n`.
    TooManyCommunities,
    /// Any other condition that prevents `optimise_partition` from
    /// completing a call; this is the single fault kind named in the Leiden
    /// engine's error-handling design (`OptimizationFailure`).
    OptimizationFailure,
    /// A graph-format loader (NSL-E/NSA/NCOL) could not parse its input.
    InvalidFileFormat,
    /// A CLI argument failed to parse or was out of range.
    ArgumentParsingError,
}
