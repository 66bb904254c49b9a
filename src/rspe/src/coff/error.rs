use std::fmt;

/// Crate-local `Result` alias; every fallible operation in `rspe` returns this.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds surfaced by the codec, per the propagation policy:
/// `InvalidImageSignature`, `TruncatedStream`, and `StreamNotSeekable` are
/// fatal and abort the current parse. `MalformedDirectory` is recovered in
/// place — the affected record is returned with empty/sentinel fields and
/// parsing continues. `BadSectionName` and `RvaOutOfRange` are raised by
/// mutators/readers validating their own preconditions.
#[derive(Debug)]
pub enum Error {
    /// The DOS or PE signature did not match a known value.
    InvalidImageSignature { found: u32 },

    /// `magic` in the optional header was not `PE32` (0x10B), `PE32Plus`
    /// (0x20B), or `Rom` (0x107).
    UnsupportedOptionalHeaderMagic { magic: u16 },

    /// A fixed-size field would run past end-of-stream.
    TruncatedStream { context: &'static str, source: std::io::Error },

    /// The supplied stream does not support random access.
    StreamNotSeekable,

    /// A setter rejected a section name longer than 8 ASCII bytes.
    BadSectionName { name: String },

    /// A typed reader was asked to resolve an RVA outside of any section,
    /// or past the initialized data within one.
    RvaOutOfRange { rva: u32 },

    /// A non-fatal parsing anomaly inside a data directory (an
    /// undersized certificate entry, an unresolvable name RVA, ...). The
    /// surrounding parse is not aborted; the affected record carries
    /// empty or sentinel fields instead.
    MalformedDirectory { context: &'static str },

    /// Any other I/O failure not covered by `TruncatedStream` (e.g. a
    /// write that failed partway through).
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidImageSignature { found } => {
                write!(f, "invalid image signature: 0x{found:08X}")
            }
            Error::UnsupportedOptionalHeaderMagic { magic } => {
                write!(f, "unsupported optional header magic: 0x{magic:04X}")
            }
            Error::TruncatedStream { context, .. } => {
                write!(f, "truncated stream while reading {context}")
            }
            Error::StreamNotSeekable => write!(f, "stream does not support seeking"),
            Error::BadSectionName { name } => {
                write!(f, "section name {name:?} exceeds 8 ASCII bytes")
            }
            Error::RvaOutOfRange { rva } => write!(f, "RVA 0x{rva:08X} is out of range"),
            Error::MalformedDirectory { context } => {
                write!(f, "malformed directory entry in {context}")
            }
            Error::Io(source) => write!(f, "I/O error: {source}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::TruncatedStream { source, .. } => Some(source),
            Error::Io(source) => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::TruncatedStream { context: "field", source },
            _ => Error::Io(source),
        }
    }
}

/// Annotate an I/O result with the field/record being read, turning a bare
/// `UnexpectedEof` into a `TruncatedStream` naming the caller's context.
pub(crate) trait IoContext<T> {
    fn ctx(self, context: &'static str) -> Result<T>;
}

impl<T> IoContext<T> for std::result::Result<T, std::io::Error> {
    fn ctx(self, context: &'static str) -> Result<T> {
        self.map_err(|source| match source.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::TruncatedStream { context, source },
            _ => Error::Io(source),
        })
    }
}
