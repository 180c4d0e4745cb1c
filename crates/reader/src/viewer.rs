//! EPUB viewer with scoped engine resources
//!
//! The viewer owns at most one book and one rendition at a time. Loading a
//! new buffer and dropping the viewer both tear the previous pair down,
//! rendition first, before anything else happens.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::{debug, info};

use crate::engine::{Book, BookMetadata, Location, RenderEngine, Rendition, SharedSurface};
use crate::error::{ReaderError, Result};
use crate::theme::Theme;

type RenditionOf<E> = <<E as RenderEngine>::Book as Book>::Rendition;

/// Navigation handle passed to the ready callback
///
/// Holds a weak reference: once the viewer reloads or is dropped, every call
/// fails with [`ReaderError::Destroyed`].
pub struct Navigator<R> {
    rendition: Weak<Mutex<R>>,
}

impl<R> Clone for Navigator<R> {
    fn clone(&self) -> Self {
        Self {
            rendition: Weak::clone(&self.rendition),
        }
    }
}

impl<R: Rendition> Navigator<R> {
    fn with<T>(&self, f: impl FnOnce(&mut R) -> Result<T>) -> Result<T> {
        let rendition = self.rendition.upgrade().ok_or(ReaderError::Destroyed)?;
        let mut rendition = rendition.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rendition)
    }

    pub fn next(&self) -> Result<Option<Location>> {
        self.with(|r| r.next())
    }

    pub fn prev(&self) -> Result<Option<Location>> {
        self.with(|r| r.prev())
    }

    pub fn location(&self) -> Result<Option<Location>> {
        self.with(|r| Ok(r.location()))
    }

    pub fn is_alive(&self) -> bool {
        self.rendition.strong_count() > 0
    }
}

struct Loaded<B: Book> {
    book: B,
    rendition: Arc<Mutex<B::Rendition>>,
}

pub struct EpubViewer<E: RenderEngine> {
    engine: E,
    surface: SharedSurface,
    theme: Theme,
    loaded: Option<Loaded<E::Book>>,
}

impl<E: RenderEngine> EpubViewer<E> {
    pub fn new(engine: E, surface: SharedSurface) -> Self {
        Self {
            engine,
            surface,
            theme: Theme::default(),
            loaded: None,
        }
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn metadata(&self) -> Option<&BookMetadata> {
        self.loaded.as_ref().map(|loaded| loaded.book.metadata())
    }

    pub fn location(&self) -> Option<Location> {
        self.loaded.as_ref().and_then(|loaded| {
            loaded
                .rendition
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .location()
        })
    }

    /// Show `bytes` with `theme`, replacing whatever was loaded before
    ///
    /// An empty buffer only tears down the previous book. `on_ready` runs once
    /// the first section is on the surface.
    pub fn load<F>(&mut self, bytes: Vec<u8>, theme: Theme, on_ready: F) -> Result<()>
    where
        F: FnOnce(Navigator<RenditionOf<E>>, &BookMetadata),
    {
        self.teardown();
        self.theme = theme;

        if bytes.is_empty() {
            debug!("empty buffer; nothing to render");
            return Ok(());
        }

        let mut book = self.engine.open(bytes)?;
        let mut rendition = match book.render_to(Arc::clone(&self.surface)) {
            Ok(rendition) => rendition,
            Err(err) => {
                book.destroy();
                return Err(err);
            }
        };

        for theme in Theme::ALL {
            rendition.register_theme(theme, theme.colors());
        }
        let shown = rendition
            .select_theme(theme)
            .and_then(|()| rendition.display_first());
        if let Err(err) = shown {
            rendition.destroy();
            book.destroy();
            self.clear_surface();
            return Err(err);
        }

        let rendition = Arc::new(Mutex::new(rendition));
        let navigator = Navigator {
            rendition: Arc::downgrade(&rendition),
        };
        let loaded = self.loaded.insert(Loaded { book, rendition });
        info!(sections = loaded.book.metadata().sections, %theme, "book ready");

        on_ready(navigator, loaded.book.metadata());
        Ok(())
    }

    /// Reselect the theme on the current rendition without reopening the book
    pub fn set_theme(&mut self, theme: Theme) -> Result<()> {
        self.theme = theme;
        match &self.loaded {
            Some(loaded) => loaded
                .rendition
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .select_theme(theme),
            None => Ok(()),
        }
    }

    /// Destroy the current rendition and book, if any
    pub fn unload(&mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        let Some(Loaded { mut book, rendition }) = self.loaded.take() else {
            return;
        };
        rendition
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .destroy();
        drop(rendition);
        book.destroy();
        self.clear_surface();
        debug!("previous book released");
    }

    fn clear_surface(&self) {
        self.surface
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl<E: RenderEngine> Drop for EpubViewer<E> {
    fn drop(&mut self) {
        self.teardown();
    }
}
