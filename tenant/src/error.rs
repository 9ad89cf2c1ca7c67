use thiserror::Error;

/// Error kinds per the error handling design (§7).
#[derive(Debug, Error)]
pub enum Error {
    #[error("not found")]
    NotFound,
    #[error("unexpected multiple items retrieved")]
    MultipleItems,
    #[error("not yet implemented")]
    Unimplemented,
    #[error("vendor error {code}: {message}")]
    VendorError { code: String, message: String },
    #[error("rate limited, retry exhausted")]
    RateLimited,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("store error: {0}")]
    Store(#[from] store::Error),
    #[error("credentials error: {0}")]
    Credentials(#[from] credentials::Error),
}

impl Error {
    pub fn from_store(err: store::Error) -> Self {
        match err {
            store::Error::NotFound => Error::NotFound,
            store::Error::MultipleItems => Error::MultipleItems,
            other => Error::Store(other),
        }
    }
}
