//! Shelf EPUB reader
//!
//! Renders an in-memory EPUB buffer onto a [`Surface`], with switchable
//! reading themes and section navigation.

pub mod engine;
pub mod epub;
pub mod error;
pub mod surface;
pub mod theme;
pub mod viewer;

pub use engine::{
    Book, BookMetadata, Location, RenderEngine, RenderedPage, Rendition, SharedSurface, Surface,
};
pub use epub::{EpubBook, EpubEngine, EpubRendition};
pub use error::{ReaderError, Result};
pub use surface::PageSurface;
pub use theme::{Theme, ThemeColors};
pub use viewer::{EpubViewer, Navigator};
