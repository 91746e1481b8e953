//! Function signatures. Never storable on their own; they appear standalone or as pointees.

use std::sync::Arc;

use smallvec::SmallVec;

use super::aggregate::Field;
use super::record::Type;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionType {
    pub params: SmallVec<[Field; 4]>,
    pub ret: Arc<Type>,
    pub variadic: bool,
}

impl FunctionType {
    pub fn new(params: impl IntoIterator<Item = Field>, ret: Arc<Type>, variadic: bool) -> Self {
        Self {
            params: params.into_iter().collect(),
            ret,
            variadic,
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Checks an argument count against the fixed parameters and the variadic tail.
    pub fn accepts(&self, argc: usize) -> bool {
        if self.variadic {
            argc >= self.params.len()
        } else {
            argc == self.params.len()
        }
    }
}
