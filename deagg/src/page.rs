//! Reference-counted backing pages.
//!
//! Hardware fills large receive pages that many descriptors then point into.
//! A page stays alive as long as any fragment references it; the last
//! reference dropping frees the page. `Arc` carries the reference count, so
//! cloning a [`PageRef`] pins the page and dropping one releases it.

use std::sync::Arc;

/// Shared handle to a backing page.
pub type PageRef = Arc<Page>;

/// An immutable block of received bytes.
///
/// Pages are filled once (by the receive path or a test helper) and never
/// mutated afterwards, so shared slices into them stay valid for the life of
/// any referencing fragment.
pub struct Page {
    data: Box<[u8]>,
}

impl Page {
    /// Allocate a zero-filled page.
    pub fn new(size: usize) -> PageRef {
        Arc::new(Page {
            data: vec![0u8; size].into_boxed_slice(),
        })
    }

    /// Allocate a page holding a copy of `data`.
    pub fn from_slice(data: &[u8]) -> PageRef {
        Arc::new(Page { data: data.into() })
    }

    /// Size of the page in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the page holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The page contents.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page").field("len", &self.data.len()).finish()
    }
}
