use thiserror::Error;

pub type LayoutResult<T> = Result<T, LayoutError>;

/// Failures raised while reading or assembling layout descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    /// Malformed grammar; `fragment` is the offending substring starting at `offset`.
    #[error("invalid descriptor at offset {offset}: {reason} (near '{fragment}')")]
    InvalidDescriptor {
        reason: String,
        fragment: String,
        offset: usize,
    },
}

impl LayoutError {
    pub fn invalid(reason: impl Into<String>, fragment: impl Into<String>, offset: usize) -> Self {
        LayoutError::InvalidDescriptor {
            reason: reason.into(),
            fragment: fragment.into(),
            offset,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            LayoutError::InvalidDescriptor { reason, .. } => reason,
        }
    }

    pub fn fragment(&self) -> &str {
        match self {
            LayoutError::InvalidDescriptor { fragment, .. } => fragment,
        }
    }
}
