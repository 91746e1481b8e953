//! Entry point for the layout subsystem: the closed `Type` model, its layout
//! arithmetic, the descriptor printer and the descriptor parser.

pub mod aggregate;
pub mod bitfield;
pub mod builder;
pub mod callable;
pub mod error;
pub mod fmt;
pub mod parser;
pub mod pointer;
pub mod record;
pub mod scalar;
pub mod sequence;

pub use aggregate::{AggregateKind, Container, Field};
pub use bitfield::{BitField, BitFieldSpec, BitFieldSpecBuilder};
pub use builder::{ContainerBuilder, TypeBuilder};
pub use callable::FunctionType;
pub use error::{LayoutError, LayoutResult};
pub use fmt::print_layout;
pub use parser::{Layouts, Parser, parse_all, parse_layout, parse_one};
pub use pointer::PointerType;
pub use record::{LayoutSize, Type};
pub use scalar::{DataModel, Endianness, ScalarKind, ScalarType};
pub use sequence::{ArrayType, SequenceCount};
