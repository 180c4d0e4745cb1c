use crate::engine::{RenderedPage, Surface};

/// In-memory surface keeping the last painted page
#[derive(Debug, Default)]
pub struct PageSurface {
    mounted: bool,
    page: Option<RenderedPage>,
    paints: usize,
}

impl PageSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn page(&self) -> Option<&RenderedPage> {
        self.page.as_ref()
    }

    /// Number of paints since creation
    pub fn paint_count(&self) -> usize {
        self.paints
    }
}

impl Surface for PageSurface {
    fn mount(&mut self) {
        self.mounted = true;
    }

    fn paint(&mut self, page: &RenderedPage) {
        self.page = Some(page.clone());
        self.paints += 1;
    }

    fn clear(&mut self) {
        self.mounted = false;
        self.page = None;
    }
}
