pub type Result<T> = std::result::Result<T, Error>;
impl<T> From<Error> for Result<T> {
    fn from(e: Error) -> Self {
        Err(e)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// Invalid data, which typically includes decoding errors or unexpected internal values.
    InvalidData(String),
    /// Invalid user input, such as a record that does not match the file's record size.
    InvalidInput(String),
    /// An IO error has occurred.
    IO(String),
    /// An out-of-bounds access has occurred, such as a slot index beyond the page geometry.
    OutOfBounds,
    /// A page cache error has occurred.
    PageCacheError(String),
    /// The requested page number is invalid, a sentinel, or was never allocated.
    PageNotFound(u32),
    /// A positional insert targeted a slot that already holds a live record.
    SlotOccupied(String),
    /// The slot's occupancy bit is clear, so there is no live record to operate on.
    SlotNotOccupied(String),
}

impl std::error::Error for Error {}
impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidData(msg) => write!(f, "Invalid data: {}", msg),
            Error::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            Error::IO(msg) => write!(f, "IO error: {}", msg),
            Error::OutOfBounds => write!(f, "Out of bounds"),
            Error::PageCacheError(msg) => write!(f, "Page cache error: {}", msg),
            Error::PageNotFound(page_no) => write!(f, "Page {} not found", page_no),
            Error::SlotOccupied(rid) => write!(f, "Slot {} is already occupied", rid),
            Error::SlotNotOccupied(rid) => write!(f, "Slot {} holds no record", rid),
        }
    }
}

impl serde::de::Error for Error {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        Error::InvalidData(msg.to_string())
    }
}

impl serde::ser::Error for Error {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        Error::InvalidInput(msg.to_string())
    }
}

impl From<std::array::TryFromSliceError> for Error {
    fn from(e: std::array::TryFromSliceError) -> Self {
        Error::InvalidData(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IO(e.to_string())
    }
}

impl From<std::num::TryFromIntError> for Error {
    fn from(e: std::num::TryFromIntError) -> Self {
        Error::InvalidData(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        // This occurs when a different thread panics when holding a mutex. Since this is
        // fatal, we should panic here too.
        panic!("{e}")
    }
}
