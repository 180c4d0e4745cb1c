//! Rendering engine abstractions
//!
//! An engine opens a [`Book`] from bytes; a book is bound to a [`Surface`] to
//! produce a [`Rendition`], which owns navigation and theming. Both books and
//! renditions hold engine resources and must be destroyed explicitly.

use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::theme::{Theme, ThemeColors};

/// Surface shared between the viewer and the rendition drawing into it
pub type SharedSurface = Arc<Mutex<dyn Surface + Send>>;

/// Book-level metadata available once a book is opened
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookMetadata {
    pub title: Option<String>,
    /// Number of spine entries
    pub sections: usize,
}

/// Position of a rendition within its book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    /// Zero-based spine index
    pub index: usize,
    pub total: usize,
}

impl Location {
    /// Percent of the book before and including this section
    pub fn percentage(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        (self.index + 1) as f32 / self.total as f32 * 100.0
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 >= self.total
    }
}

/// A page handed to a surface
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    pub location: Location,
    /// Section markup as found in the book
    pub content: String,
    pub colors: ThemeColors,
}

/// Container a rendition draws into
pub trait Surface {
    fn mount(&mut self);
    fn paint(&mut self, page: &RenderedPage);
    fn clear(&mut self);
}

pub trait RenderEngine {
    type Book: Book;

    fn open(&self, bytes: Vec<u8>) -> Result<Self::Book>;
}

pub trait Book {
    type Rendition: Rendition;

    fn metadata(&self) -> &BookMetadata;

    /// Bind the book to a surface
    fn render_to(&mut self, surface: SharedSurface) -> Result<Self::Rendition>;

    /// Release engine resources; idempotent
    fn destroy(&mut self);
}

pub trait Rendition {
    fn register_theme(&mut self, theme: Theme, colors: ThemeColors);

    /// Switch to a registered theme, repainting the current page
    fn select_theme(&mut self, theme: Theme) -> Result<()>;

    fn display_first(&mut self) -> Result<Location>;

    /// Advance one section; `None` at the end of the book
    fn next(&mut self) -> Result<Option<Location>>;

    /// Go back one section; `None` at the start of the book
    fn prev(&mut self) -> Result<Option<Location>>;

    fn location(&self) -> Option<Location>;

    /// Release engine resources; idempotent
    fn destroy(&mut self);
}
