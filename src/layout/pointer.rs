//! Data and function pointer metadata.

use std::sync::Arc;

use super::error::{LayoutError, LayoutResult};
use super::record::Type;
use super::scalar::{ScalarKind, ScalarType};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PointerType {
    /// Address-sized unsigned storage (32 or 64 bits).
    pub storage: ScalarType,
    pub pointee: Arc<Type>,
}

impl PointerType {
    pub fn new(storage: ScalarType, pointee: Arc<Type>) -> LayoutResult<Self> {
        let valid_width = matches!(storage.bits, 32 | 64);
        if !matches!(storage.kind, ScalarKind::Int { signed: false }) || !valid_width {
            return Err(LayoutError::invalid(
                "pointer storage must be an unsigned 32 or 64 bit integer",
                "",
                0,
            ));
        }
        Ok(Self { storage, pointee })
    }

    /// Host-width pointer with native byte order.
    pub fn host(pointee: Arc<Type>) -> Self {
        Self {
            storage: ScalarType::int(usize::BITS as u16, false),
            pointee,
        }
    }

    pub fn byte_size(&self) -> usize {
        self.storage.byte_size()
    }

    pub fn is_function(&self) -> bool {
        matches!(*self.pointee, Type::Function(_))
    }

    pub fn is_opaque(&self) -> bool {
        matches!(&*self.pointee, Type::Scalar(scalar) if scalar.is_void())
    }
}

#[cfg(test)]
mod tests {
    //! Pointer level guarantees that keep handle logic predictable.
    use super::*;

    #[test]
    fn host_pointer_matches_usize() {
        let ptr = PointerType::host(Arc::new(Type::Scalar(ScalarType::VOID)));
        assert_eq!(ptr.byte_size(), std::mem::size_of::<usize>());
        assert!(ptr.is_opaque(), "void pointee should report opaque");
        assert!(!ptr.is_function());
    }

    #[test]
    fn signed_storage_is_rejected() {
        let pointee = Arc::new(Type::Scalar(ScalarType::int(32, true)));
        assert!(PointerType::new(ScalarType::int(64, true), pointee.clone()).is_err());
        assert!(PointerType::new(ScalarType::int(16, false), pointee.clone()).is_err());
        assert!(PointerType::new(ScalarType::int(32, false), pointee).is_ok());
    }
}
