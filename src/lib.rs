//! Native memory layout descriptors and scope-bounded typed memory access.
//!
//! `layout` turns descriptor text such as `[u16(bf)=[u2(first)u9(second)u5(third)]]`
//! into an immutable [`Type`](layout::Type) tree. `memory` owns native regions
//! through [`Scope`](memory::Scope) arenas and exposes typed handles over them
//! that fail with a liveness error once their scope has closed.

pub mod layout;
pub mod memory;

pub use layout::{DataModel, Endianness, Field, LayoutError, LayoutResult, Type, parse_layout};
pub use memory::{
    AccessError, AccessResult, Array, Binding, Callback, ErrorKind, Pointer, Scope, Struct, Value,
    assign,
};
