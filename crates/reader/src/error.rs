use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReaderError {
    /// The buffer could not be opened as a book
    #[error("Malformed book: {0}")]
    Malformed(String),

    #[error("Unknown theme: {0}")]
    UnknownTheme(String),

    /// The book contains nothing that can be displayed
    #[error("Book has no renderable content")]
    Empty,

    /// The rendition or book was torn down
    #[error("Rendition has been destroyed")]
    Destroyed,
}

pub type Result<T> = std::result::Result<T, ReaderError>;
