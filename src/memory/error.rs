use thiserror::Error;

use crate::layout::LayoutError;

pub type AccessResult<T> = Result<T, AccessError>;

/// Coarse classification so callers can branch on the failure family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    Liveness,
    Bounds,
    NullArgument,
    Binding,
    Alloc,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AccessError {
    #[error("scope is not alive")]
    ScopeNotAlive,
    #[error("access of {len} bytes at 0x{address:X} is outside the accessible region")]
    OutOfBounds { address: usize, len: usize },
    #[error("index {index} is out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("null pointer dereference")]
    NullDereference,
    #[error("argument mismatch: {reason}")]
    Mismatch { reason: String },
    #[error("null handle passed to {operation}")]
    NullArgument { operation: &'static str },
    #[error("binding failed: {reason}")]
    Binding { reason: String },
    #[error("failed to allocate {size} bytes")]
    Alloc { size: usize },
    #[error(transparent)]
    Layout(#[from] LayoutError),
}

impl AccessError {
    pub fn mismatch(reason: impl Into<String>) -> Self {
        AccessError::Mismatch {
            reason: reason.into(),
        }
    }

    pub fn binding(reason: impl Into<String>) -> Self {
        AccessError::Binding {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AccessError::ScopeNotAlive => ErrorKind::Liveness,
            AccessError::OutOfBounds { .. }
            | AccessError::IndexOutOfRange { .. }
            | AccessError::NullDereference
            | AccessError::Mismatch { .. } => ErrorKind::Bounds,
            AccessError::NullArgument { .. } => ErrorKind::NullArgument,
            AccessError::Binding { .. } => ErrorKind::Binding,
            AccessError::Alloc { .. } => ErrorKind::Alloc,
            AccessError::Layout(_) => ErrorKind::Parse,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liveness_message_is_stable() {
        assert_eq!(AccessError::ScopeNotAlive.to_string(), "scope is not alive");
        assert_eq!(AccessError::ScopeNotAlive.kind(), ErrorKind::Liveness);
    }

    #[test]
    fn layout_errors_convert() {
        let err: AccessError = LayoutError::invalid("empty container", "[]", 0).into();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(err.to_string().contains("empty container"));
    }
}
