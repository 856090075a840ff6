use candle_core::Tensor;

/// Model-ready representation of a document: one `3 x H x W` tensor per page,
/// in document order.
#[derive(Debug, Clone)]
pub struct ModelInput {
    pub pages: Vec<Tensor>,
    pub length: usize,
}

impl ModelInput {
    pub fn new(pages: Vec<Tensor>) -> Self {
        let length = pages.len();
        Self { pages, length }
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}
