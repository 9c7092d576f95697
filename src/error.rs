use std::path::PathBuf;

use thiserror::Error;

use crate::colour::Channel;

pub type Result<T> = std::result::Result<T, ThorError>;

#[derive(Error, Debug)]
pub enum ThorError {
    #[error("can't access {path:?}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported OTU table format: {0}")]
    UnsupportedFormat(String),
    #[error("{0}")]
    Format(String),

    #[error("sketch `{id}`: element {index} ({value}) does not fit in 32 bits")]
    Overflow { id: String, index: usize, value: u64 },
    #[error("adding {by} to {channel} channel value {value} overflows 8 bits")]
    ChannelOverflow { channel: Channel, value: u8, by: u8 },
    #[error("sketch `{id}`: adding {by} to {channel} channel of element {index} ({value}) overflows 8 bits")]
    ElementOverflow {
        id: String,
        index: usize,
        channel: Channel,
        value: u8,
        by: u8,
    },

    #[error("duplicate sketch name found: {0}")]
    DuplicateKey(String),
    #[error("sketch `{id}` has length {found}, store sketch length is {expected}")]
    LengthMismatch { id: String, expected: usize, found: usize },
    #[error("colour sketch has no identifier")]
    MissingId,
    #[error("colour sketch store is empty")]
    EmptyStore,

    #[error("sample {sample}: the genus `{otu}` (abundance: {abundance}) could not be found in the colour sketches")]
    Lookup { sample: String, otu: String, abundance: u64 },

    #[error("OTU table has already been read")]
    AlreadyParsed,
    #[error("top N OTUs have already been selected for this table")]
    AlreadyReduced,
    #[error("OTU table has not been parsed yet")]
    NotParsed,
    #[error("top N OTUs have not been selected for this table yet")]
    NotReduced,
    #[error("requested top {requested} OTUs but the table only holds {available} genera")]
    InsufficientData { requested: usize, available: usize },
    #[error("sample index {index} out of range ({samples} samples)")]
    SampleIndex { index: usize, samples: usize },

    #[error("was expecting a row of length {expected}, received one of length {found}")]
    WidthMismatch { expected: u32, found: usize },
    #[error("image full ({0} rows drawn)")]
    CanvasFull(u32),
    #[error("number of rows > sketch length ({rows} : {side}), suggest keeping the top {side} OTUs")]
    TooManyRows { rows: usize, side: u32 },
    #[error("nothing drawn on canvas")]
    EmptyCanvas,

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<ThorError>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error("colour sketch store encoding: {0}")]
    Codec(#[from] bincode::Error),
}

impl ThorError {
    pub(crate) fn input(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ThorError::Input {
            path: path.into(),
            source,
        }
    }

    /// Prefix the error with the item it happened on.
    pub fn context(self, context: impl Into<String>) -> Self {
        ThorError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}
