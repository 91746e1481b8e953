//! Canonical descriptor printer. Parsing the printed text yields a structurally equal type.

use std::fmt::{self, Display, Formatter, Write};

use super::aggregate::{Container, Field};
use super::bitfield::BitFieldSpec;
use super::callable::FunctionType;
use super::record::Type;
use super::scalar::{ScalarKind, ScalarType};
use super::sequence::{ArrayType, SequenceCount};

impl Display for ScalarType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = self.endianness.prefix() {
            f.write_char(prefix)?;
        }
        match self.kind {
            ScalarKind::Void => f.write_char('v'),
            ScalarKind::Bool if self.bits == 8 => f.write_char('z'),
            ScalarKind::Bool => write!(f, "z={}", self.bits),
            ScalarKind::Float if self.bits == 64 => f.write_char('d'),
            ScalarKind::Float => f.write_char('f'),
            ScalarKind::Int { signed: true } => write!(f, "i{}", self.bits),
            ScalarKind::Int { signed: false } => write!(f, "u{}", self.bits),
        }
    }
}

impl Display for BitFieldSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.storage)?;
        if !self.needs_member_syntax() {
            f.write_char(':')?;
            for field in &self.fields {
                write!(f, "{}b", field.width)?;
            }
            return Ok(());
        }
        f.write_str("=[")?;
        for (index, field) in self.fields.iter().enumerate() {
            if index > 0 {
                f.write_char(' ')?;
            }
            let code = if field.signed { 'i' } else { 'u' };
            write!(f, "{code}{}", field.width)?;
            if let Some(name) = &field.name {
                write!(f, "({name})")?;
            }
        }
        f.write_char(']')
    }
}

impl Display for Container {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let separator = if self.is_union() { "|" } else { " " };
        f.write_char('[')?;
        for (index, member) in self.members.iter().enumerate() {
            if index > 0 {
                f.write_str(separator)?;
            }
            write!(f, "{member}")?;
        }
        f.write_char(']')
    }
}

impl Display for ArrayType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.count {
            SequenceCount::Static(len) => write!(f, "{len}")?,
            SequenceCount::Wildcard => f.write_char('*')?,
        }
        // a nested count would run into ours, so separate it with an explicit native prefix
        if matches!(*self.element, Type::Array(_)) {
            f.write_char('@')?;
        }
        write!(f, "{}", self.element)
    }
}

impl Display for FunctionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_char('(')?;
        for (index, param) in self.params.iter().enumerate() {
            if index > 0 {
                f.write_char(' ')?;
            }
            write!(f, "{param}")?;
        }
        if self.variadic {
            if !self.params.is_empty() {
                f.write_char(' ')?;
            }
            f.write_char('*')?;
        }
        write!(f, "){}", self.ret)
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Type::Scalar(scalar) => Display::fmt(scalar, f),
            Type::BitFields(spec) => Display::fmt(spec, f),
            Type::Container(container) => Display::fmt(container, f),
            Type::Array(array) => Display::fmt(array, f),
            Type::Pointer(pointer) => write!(f, "{}:{}", pointer.storage, pointer.pointee),
            Type::Function(function) => Display::fmt(function, f),
        }
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ty)?;
        if let Some(name) = &self.name {
            write!(f, "({name})")?;
        }
        Ok(())
    }
}

/// Prints a sequence of top-level items back to descriptor text.
pub fn print_layout<'a>(items: impl IntoIterator<Item = &'a Field>) -> String {
    let mut out = String::new();
    for (index, item) in items.into_iter().enumerate() {
        if index > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{item}");
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::layout::{DataModel, Endianness, TypeBuilder};

    #[test]
    fn scalars_print_canonical_codes() {
        assert_eq!(ScalarType::int(32, true).to_string(), "i32");
        assert_eq!(ScalarType::int(24, false).to_string(), "u24");
        assert_eq!(ScalarType::float(64).to_string(), "d");
        assert_eq!(ScalarType::bool().to_string(), "z");
        assert_eq!(
            ScalarType::int(16, false)
                .with_endianness(Endianness::Big)
                .to_string(),
            ">u16"
        );
    }

    #[test]
    fn nested_arrays_are_separated() {
        let builder = TypeBuilder::new(DataModel::Lp64);
        let inner = builder.array(builder.int(32, true), 3);
        let outer = builder.array(inner, 2);
        assert_eq!(outer.to_string(), "2@3i32");
    }

    #[test]
    fn functions_and_pointers_print_inline() {
        let builder = TypeBuilder::new(DataModel::Lp64);
        let func = builder.function(vec![builder.int(32, true)], builder.void(), true);
        assert_eq!(func.to_string(), "(i32 *)v");
        assert_eq!(builder.pointer(func).to_string(), "u64:(i32 *)v");
    }

    #[test]
    fn named_items_join_with_spaces() {
        let int: Arc<Type> = Arc::new(Type::Scalar(ScalarType::int(8, true)));
        let items = [Field::named("a", int.clone()), Field::new(int)];
        assert_eq!(print_layout(&items), "i8(a) i8");
    }
}
