//! Error taxonomy returned by [`crate::Manager`] operations.

/// The four outcomes a manager operation can fail with.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The named filter is absent, or present but no longer active, in the
    /// current directory version.
    #[error("filter '{0}' not found")]
    NotFound(String),

    /// `create` collided with an already-active entry of the same name.
    #[error("filter '{0}' already exists")]
    AlreadyExists(String),

    /// `clear` was called on a filter that is not currently proxied
    /// (unmapped from memory).
    #[error("filter '{0}' is not proxied")]
    NotProxied(String),

    /// Allocation, I/O, or other backend failure. Wraps whatever the
    /// [`crate::filter::FilterBackend`]/[`crate::filter::FilterObject`]
    /// implementation reported.
    #[error("internal error: {0}")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps an arbitrary backend error as [`Error::Internal`].
    pub fn internal<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Internal(Box::new(err))
    }
}

/// Error from a bulk key operation (`check_keys`/`set_keys`). A plain
/// `Result<Vec<bool>, Error>` can't express §4.3/§7's requirement that
/// results produced before a failing key are retained rather than
/// discarded, so the partial buffer rides along with the error instead.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct KeyOpError {
    /// Results for every key processed before `error` occurred. Empty if
    /// the filter itself couldn't be resolved.
    pub partial: Vec<bool>,
    #[source]
    pub error: Error,
}
