/// Errors of the relay's persistence path.
#[derive(Debug, derive_more::Display, derive_more::From)]
#[non_exhaustive]
pub enum Error {
    /// Reading, writing or deleting the snapshot file failed.
    #[display(fmt = "snapshot i/o failed: {_0}")]
    #[from]
    Io(std::io::Error),
    /// The snapshot body could not be encoded or decoded. This includes
    /// merkle states that do not match their leaf count.
    #[display(fmt = "snapshot codec failed: {_0}")]
    #[from]
    Codec(postcard::Error),
    /// The file does not start with the snapshot magic.
    #[display(fmt = "the file is not a relay snapshot")]
    InvalidMagic,
    #[display(fmt = "unsupported snapshot version {found}, expected {expected}")]
    UnsupportedVersion { found: u8, expected: u8 },
    #[display(fmt = "{_0} unexpected bytes after the snapshot body")]
    TrailingBytes(usize),
}

impl core::error::Error for Error {}

pub type Result<T> = core::result::Result<T, Error>;
