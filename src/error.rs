use thiserror::Error;

/// Failure kinds surfaced while parsing a snapshot.
///
/// Errors travel inside [`anyhow::Error`]; recover the kind with
/// `err.downcast_ref::<ParseError>()`. I/O failures from the byte source
/// propagate as plain [`std::io::Error`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The file does not start with the `REDIS` magic.
    #[error("invalid snapshot file")]
    InvalidSnapshot,
    /// The version field is not a decimal number in the supported range.
    #[error("unsupported snapshot version")]
    UnsupportedVersion,
    /// A length prefix uses an unknown bit pattern, or a special encoding
    /// appeared where a plain length was required.
    #[error("invalid length encoding")]
    InvalidLengthEncoding,
    /// A zipmap length byte in the forbidden region.
    #[error("invalid zipmap entry")]
    InvalidZipmapEntry,
    /// An LZF literal or back-reference would read out of bounds.
    #[error("invalid compressed data")]
    InvalidCompressedData,
    /// The byte source was exhausted mid-read.
    #[error("unexpected end of input")]
    UnexpectedEndOfInput,
    /// A packed frame (ziplist, zipmap, intset) ended short.
    #[error("malformed packed payload")]
    PayloadParse,
}
