pub mod binning;
pub mod driver;
pub mod feature;
pub mod identifiability;
pub mod index;
pub mod mass;
pub mod matching;
pub mod protein;
pub mod tolerance;

#[derive(Debug)]
pub enum Error {
    /// Invalid global settings
    Config(String),
    /// Nothing to identify, or nothing to compare against
    EmptyInput(String),
    /// A catalog changed after its [`index::RangeIndex`] was built
    StaleIndex { built: u64, current: u64 },
    /// Cancellation was requested by the caller
    Aborted,
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl Error {
    /// Cancellation is a distinct termination, not a failure
    pub fn is_abort(&self) -> bool {
        matches!(self, Error::Aborted)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "invalid configuration: {}", msg),
            Self::EmptyInput(msg) => write!(f, "empty input: {}", msg),
            Self::StaleIndex { built, current } => write!(
                f,
                "feature catalog was modified after indexing (generation {} -> {})",
                built, current
            ),
            Self::Aborted => f.write_str("processing aborted by caller"),
            Self::Io(e) => e.fmt(f),
            Self::Json(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

pub fn read_json<P, T>(path: P) -> Result<T, Error>
where
    P: AsRef<std::path::Path>,
    T: for<'de> serde::Deserialize<'de>,
{
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(Error::Json)
}
