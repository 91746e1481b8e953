//! Fluent construction helpers for building `Type` trees in code rather than from text.

use std::sync::Arc;

use super::aggregate::{AggregateKind, Container, Field};
use super::bitfield::BitFieldSpec;
use super::callable::FunctionType;
use super::error::{LayoutError, LayoutResult};
use super::pointer::PointerType;
use super::record::Type;
use super::scalar::{DataModel, Endianness, ScalarType};
use super::sequence::ArrayType;

#[derive(Clone, Copy, Debug, Default)]
pub struct TypeBuilder {
    model: DataModel,
}

impl TypeBuilder {
    pub fn new(model: DataModel) -> Self {
        Self { model }
    }

    pub fn model(&self) -> DataModel {
        self.model
    }

    pub fn code(&self, code: char) -> LayoutResult<Arc<Type>> {
        self.model
            .scalar_for_code(code)
            .map(|scalar| Arc::new(Type::Scalar(scalar)))
            .ok_or_else(|| LayoutError::invalid("unknown type code", code.to_string(), 0))
    }

    pub fn int(&self, bits: u16, signed: bool) -> Arc<Type> {
        Arc::new(Type::Scalar(ScalarType::int(bits, signed)))
    }

    pub fn int_with(&self, bits: u16, signed: bool, endianness: Endianness) -> Arc<Type> {
        Arc::new(Type::Scalar(
            ScalarType::int(bits, signed).with_endianness(endianness),
        ))
    }

    pub fn float(&self, bits: u16) -> Arc<Type> {
        Arc::new(Type::Scalar(ScalarType::float(bits)))
    }

    pub fn void(&self) -> Arc<Type> {
        Arc::new(Type::Scalar(ScalarType::VOID))
    }

    pub fn pointer(&self, pointee: Arc<Type>) -> Arc<Type> {
        let storage = ScalarType::int(self.model.pointer_bits(), false);
        Arc::new(Type::Pointer(PointerType { storage, pointee }))
    }

    pub fn array(&self, element: Arc<Type>, len: usize) -> Arc<Type> {
        Arc::new(Type::Array(ArrayType::fixed(element, len)))
    }

    pub fn wildcard(&self, element: Arc<Type>) -> Arc<Type> {
        Arc::new(Type::Array(ArrayType::wildcard(element)))
    }

    pub fn bitfields(&self, storage: ScalarType, widths: &[u16]) -> LayoutResult<Arc<Type>> {
        let spec = widths
            .iter()
            .fold(BitFieldSpec::builder(storage), |builder, width| {
                builder.width(*width)
            })
            .finish()?;
        Ok(Arc::new(Type::BitFields(spec)))
    }

    pub fn function(&self, params: Vec<Arc<Type>>, ret: Arc<Type>, variadic: bool) -> Arc<Type> {
        let params = params.into_iter().map(Field::new);
        Arc::new(Type::Function(FunctionType::new(params, ret, variadic)))
    }

    pub fn structure(&self) -> ContainerBuilder {
        ContainerBuilder::new(AggregateKind::Struct)
    }

    pub fn union(&self) -> ContainerBuilder {
        ContainerBuilder::new(AggregateKind::Union)
    }
}

pub struct ContainerBuilder {
    kind: AggregateKind,
    members: Vec<Field>,
}

impl ContainerBuilder {
    fn new(kind: AggregateKind) -> Self {
        Self {
            kind,
            members: Vec::new(),
        }
    }

    pub fn member(mut self, name: impl Into<String>, ty: Arc<Type>) -> Self {
        self.members.push(Field::named(name, ty));
        self
    }

    pub fn anonymous(mut self, ty: Arc<Type>) -> Self {
        self.members.push(Field::new(ty));
        self
    }

    pub fn finish(self) -> LayoutResult<Arc<Type>> {
        let container = Container::new(self.kind, self.members)?;
        Ok(Arc::new(Type::Container(container)))
    }
}
