use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found")]
    NotFound,
    #[error("unexpected multiple items retrieved")]
    MultipleItems,
    #[error("tenant group {0:?} not found")]
    GroupNotFound(String),
    #[error("unknown tenant {0:?}")]
    UnknownTenant(String),
    #[error("no intent tenant registered for this group")]
    NoIntentTenant,
    #[error("tenant error: {0}")]
    Tenant(#[from] tenant::Error),
    #[error("store error: {0}")]
    Store(#[from] store::Error),
    #[error("credentials error: {0}")]
    Credentials(#[from] credentials::Error),
    #[error("loader error: {0}")]
    Loader(#[from] loader::Error),
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
