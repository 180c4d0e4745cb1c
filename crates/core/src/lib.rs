//! Shelf core types and utilities

pub mod error;
pub mod types;

#[cfg(feature = "tracing")]
pub mod tracing;

pub use error::{CoreError, CoreResult, ErrorContext};
pub use types::{
    AuthResponse, Book, BookFormat, BookQuery, Bookmark, Folder, Page, Rating, ReadingProgress,
    TokenPair, User,
};
