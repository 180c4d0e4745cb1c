//! Last-known book records with optimistic patching
//!
//! Mutations such as rating a book are applied to the cache before the server
//! confirms them. A [`PatchGuard`] restores the previous record when dropped
//! unless the caller commits it.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use shelf_core::Book;
use tracing::debug;

/// Shared cache of books keyed by id
#[derive(Debug, Clone, Default)]
pub struct LibraryCache {
    books: Arc<RwLock<HashMap<String, Book>>>,
}

impl LibraryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<Book> {
        self.books
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn insert(&self, book: Book) {
        self.books
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(book.id.clone(), book);
    }

    pub fn insert_many(&self, books: impl IntoIterator<Item = Book>) {
        let mut map = self.books.write().unwrap_or_else(PoisonError::into_inner);
        for book in books {
            map.insert(book.id.clone(), book);
        }
    }

    pub fn remove(&self, id: &str) -> Option<Book> {
        self.books
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    pub fn clear(&self) {
        self.books
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.books
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply `patch` to the cached book now, rolling back on drop
    ///
    /// Returns `None` when the book is not cached; there is nothing to patch
    /// or restore in that case.
    pub fn patch_optimistic(&self, id: &str, patch: impl FnOnce(&mut Book)) -> Option<PatchGuard> {
        let mut map = self.books.write().unwrap_or_else(PoisonError::into_inner);
        let book = map.get_mut(id)?;
        let previous = book.clone();
        patch(book);
        Some(PatchGuard {
            cache: self.clone(),
            previous: Some(previous),
        })
    }
}

/// Pending optimistic update; restores the previous record unless committed
#[must_use = "dropping the guard immediately rolls the patch back"]
#[derive(Debug)]
pub struct PatchGuard {
    cache: LibraryCache,
    previous: Option<Book>,
}

impl PatchGuard {
    /// Keep the patched record
    pub fn commit(mut self) {
        self.previous = None;
    }

    /// Keep the server's version of the record instead of the local patch
    pub fn commit_with(mut self, book: Book) {
        self.previous = None;
        self.cache.insert(book);
    }
}

impl Drop for PatchGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            debug!(book_id = %previous.id, "rolling back optimistic update");
            self.cache.insert(previous);
        }
    }
}
