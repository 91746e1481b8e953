//! Scope-owned native memory and the typed handles that read and write it.

pub mod array;
pub mod bits;
pub mod callback;
pub mod endianword;
pub mod error;
pub mod handle;
pub mod region;
pub mod scope;
pub mod structs;
pub mod value;

pub use array::Array;
pub use callback::{Callback, CallbackFn, CallbackResource};
pub use error::{AccessError, AccessResult, ErrorKind};
pub use handle::{AsPointer, BitFieldRef, Extent, Pointer, assign};
pub use scope::{Scope, ScopeConfig, ScopeStats};
pub use structs::{Binding, MemberTable, Struct};
pub use value::{NativeScalar, Value};
