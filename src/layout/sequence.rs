//! Fixed and wildcard repetitions of one element type.

use std::sync::Arc;

use super::record::Type;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequenceCount {
    Static(usize),
    /// Unbounded trailing array; the caller supplies the length at allocation time.
    Wildcard,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArrayType {
    pub element: Arc<Type>,
    pub count: SequenceCount,
}

impl ArrayType {
    pub fn new(element: Arc<Type>, count: SequenceCount) -> Self {
        Self { element, count }
    }

    pub fn fixed(element: Arc<Type>, len: usize) -> Self {
        Self::new(element, SequenceCount::Static(len))
    }

    pub fn wildcard(element: Arc<Type>) -> Self {
        Self::new(element, SequenceCount::Wildcard)
    }

    pub fn element_count(&self) -> Option<usize> {
        match self.count {
            SequenceCount::Static(len) => Some(len),
            SequenceCount::Wildcard => None,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self.count, SequenceCount::Wildcard)
    }

    pub fn stride(&self) -> usize {
        self.element.layout().size
    }

    /// Fixes a wildcard to a concrete length; static arrays keep their own length.
    pub fn resolved(&self, len: usize) -> ArrayType {
        match self.count {
            SequenceCount::Static(_) => self.clone(),
            SequenceCount::Wildcard => ArrayType::fixed(self.element.clone(), len),
        }
    }
}
