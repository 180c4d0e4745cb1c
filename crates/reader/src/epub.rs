//! EPUB engine backed by the `epub` crate
//!
//! Navigation walks the spine one section at a time. Sections without
//! readable markup (images, fonts referenced from the spine) are rendered as
//! empty pages, except at the start of the book where they are skipped.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex, PoisonError};

use epub::doc::EpubDoc;
use tracing::debug;

use crate::engine::{Book, BookMetadata, Location, RenderEngine, RenderedPage, Rendition, SharedSurface};
use crate::error::{ReaderError, Result};
use crate::theme::{Theme, ThemeColors};

type Doc = EpubDoc<Cursor<Vec<u8>>>;
type SharedDoc = Arc<Mutex<Option<Doc>>>;

#[derive(Debug, Default, Clone, Copy)]
pub struct EpubEngine;

impl EpubEngine {
    pub fn new() -> Self {
        Self
    }
}

impl RenderEngine for EpubEngine {
    type Book = EpubBook;

    fn open(&self, bytes: Vec<u8>) -> Result<EpubBook> {
        let mut doc = EpubDoc::from_reader(Cursor::new(bytes))
            .map_err(|err| ReaderError::Malformed(err.to_string()))?;

        let sections = doc.spine.len();
        if sections == 0 {
            return Err(ReaderError::Empty);
        }
        let title = doc.get_title().filter(|title| !title.trim().is_empty());

        debug!(sections, title = ?title, "opened epub");
        Ok(EpubBook {
            doc: Arc::new(Mutex::new(Some(doc))),
            metadata: BookMetadata { title, sections },
        })
    }
}

pub struct EpubBook {
    doc: SharedDoc,
    metadata: BookMetadata,
}

impl std::fmt::Debug for EpubBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EpubBook")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

impl Book for EpubBook {
    type Rendition = EpubRendition;

    fn metadata(&self) -> &BookMetadata {
        &self.metadata
    }

    fn render_to(&mut self, surface: SharedSurface) -> Result<EpubRendition> {
        if self.doc.lock().unwrap_or_else(PoisonError::into_inner).is_none() {
            return Err(ReaderError::Destroyed);
        }
        surface.lock().unwrap_or_else(PoisonError::into_inner).mount();

        Ok(EpubRendition {
            doc: Arc::clone(&self.doc),
            surface,
            themes: HashMap::new(),
            colors: Theme::default().colors(),
            page: None,
            total: self.metadata.sections,
            destroyed: false,
        })
    }

    fn destroy(&mut self) {
        if self
            .doc
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
        {
            debug!("epub book destroyed");
        }
    }
}

pub struct EpubRendition {
    doc: SharedDoc,
    surface: SharedSurface,
    themes: HashMap<Theme, ThemeColors>,
    colors: ThemeColors,
    page: Option<RenderedPage>,
    total: usize,
    destroyed: bool,
}

impl std::fmt::Debug for EpubRendition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EpubRendition")
            .field("location", &self.location())
            .field("destroyed", &self.destroyed)
            .finish_non_exhaustive()
    }
}

impl EpubRendition {
    fn with_doc<T>(&self, f: impl FnOnce(&mut Doc) -> T) -> Result<T> {
        if self.destroyed {
            return Err(ReaderError::Destroyed);
        }
        let mut doc = self.doc.lock().unwrap_or_else(PoisonError::into_inner);
        let doc = doc.as_mut().ok_or(ReaderError::Destroyed)?;
        Ok(f(doc))
    }

    fn show(&mut self, index: usize, content: String) -> Location {
        let location = Location {
            index,
            total: self.total,
        };
        let page = RenderedPage {
            location,
            content,
            colors: self.colors,
        };
        self.surface
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .paint(&page);
        self.page = Some(page);
        location
    }

    fn step(&mut self, forward: bool) -> Result<Option<Location>> {
        if self.location().is_none() {
            return self.display_first().map(Some);
        }

        let moved = self.with_doc(|doc| {
            let moved = if forward { doc.go_next() } else { doc.go_prev() };
            moved.then(|| {
                let content = doc
                    .get_current_str()
                    .map(|(markup, _mime)| markup)
                    .unwrap_or_default();
                (doc.get_current_page(), content)
            })
        })?;

        Ok(moved.map(|(index, content)| self.show(index, content)))
    }
}

impl Rendition for EpubRendition {
    fn register_theme(&mut self, theme: Theme, colors: ThemeColors) {
        self.themes.insert(theme, colors);
    }

    fn select_theme(&mut self, theme: Theme) -> Result<()> {
        if self.destroyed {
            return Err(ReaderError::Destroyed);
        }
        let colors = *self
            .themes
            .get(&theme)
            .ok_or_else(|| ReaderError::UnknownTheme(theme.to_string()))?;
        self.colors = colors;

        if let Some(page) = self.page.as_mut() {
            page.colors = colors;
            self.surface
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .paint(page);
        }
        Ok(())
    }

    fn display_first(&mut self) -> Result<Location> {
        let first = self.with_doc(|doc| {
            while doc.go_prev() {}
            loop {
                if let Some((markup, _mime)) = doc.get_current_str() {
                    return Some((doc.get_current_page(), markup));
                }
                if !doc.go_next() {
                    return None;
                }
            }
        })?;

        let (index, content) = first.ok_or(ReaderError::Empty)?;
        Ok(self.show(index, content))
    }

    fn next(&mut self) -> Result<Option<Location>> {
        self.step(true)
    }

    fn prev(&mut self) -> Result<Option<Location>> {
        self.step(false)
    }

    fn location(&self) -> Option<Location> {
        self.page.as_ref().map(|page| page.location)
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.page = None;
        debug!("epub rendition destroyed");
    }
}
