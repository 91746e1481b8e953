//! Host-side values read from and written to typed memory, and the byte codec between them.

use crate::layout::{BitFieldSpec, ScalarKind, ScalarType, Type};

use super::bits::{extract, insert, mask_bits, sign_extend};
use super::endianword::{load_word, store_word};
use super::error::{AccessError, AccessResult};

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Void,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Raw address held by pointer-typed memory; `0` is the null pointer.
    Address(usize),
    /// Members of a struct, union or bitfield group, or elements of an array, in order.
    Aggregate(Vec<Value>),
}

impl Value {
    pub const NULL: Value = Value::Address(0);

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int(value) => Some(value),
            Value::UInt(value) => i64::try_from(value).ok(),
            Value::Bool(value) => Some(i64::from(value)),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::UInt(value) => Some(value),
            Value::Int(value) => u64::try_from(value).ok(),
            Value::Bool(value) => Some(u64::from(value)),
            Value::Address(address) => Some(address as u64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Float(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_address(&self) -> Option<usize> {
        match *self {
            Value::Address(address) => Some(address),
            _ => None,
        }
    }

    pub fn as_slice(&self) -> Option<&[Value]> {
        match self {
            Value::Aggregate(values) => Some(values),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Address(0))
    }
}

macro_rules! value_from {
    ($variant:ident, $target:ty => $($t:ty),+) => {
        $(
            impl From<$t> for Value {
                fn from(value: $t) -> Self {
                    Value::$variant(<$target>::from(value))
                }
            }
        )+
    };
}

value_from!(Int, i64 => i8, i16, i32, i64);
value_from!(UInt, u64 => u8, u16, u32, u64);
value_from!(Float, f64 => f32, f64);
value_from!(Bool, bool => bool);

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::Aggregate(values)
    }
}

/// Rust primitives that map one-to-one onto a scalar layout.
pub trait NativeScalar: Copy {
    const KIND: ScalarKind;
    const BITS: u16;

    fn from_raw(raw: u64) -> Self;
    fn to_raw(self) -> u64;

    fn matches(scalar: &ScalarType) -> bool {
        scalar.kind == Self::KIND && scalar.bits == Self::BITS
    }
}

macro_rules! native_int {
    ($($t:ty => $signed:expr),+) => {
        $(
            impl NativeScalar for $t {
                const KIND: ScalarKind = ScalarKind::Int { signed: $signed };
                const BITS: u16 = <$t>::BITS as u16;

                #[inline(always)]
                fn from_raw(raw: u64) -> Self {
                    raw as $t
                }

                #[inline(always)]
                fn to_raw(self) -> u64 {
                    self as u64 & mask_bits(Self::BITS as u32)
                }
            }
        )+
    };
}

native_int!(i8 => true, i16 => true, i32 => true, i64 => true);
native_int!(u8 => false, u16 => false, u32 => false, u64 => false);

impl NativeScalar for f32 {
    const KIND: ScalarKind = ScalarKind::Float;
    const BITS: u16 = 32;

    fn from_raw(raw: u64) -> Self {
        f32::from_bits(raw as u32)
    }

    fn to_raw(self) -> u64 {
        u64::from(self.to_bits())
    }
}

impl NativeScalar for f64 {
    const KIND: ScalarKind = ScalarKind::Float;
    const BITS: u16 = 64;

    fn from_raw(raw: u64) -> Self {
        f64::from_bits(raw)
    }

    fn to_raw(self) -> u64 {
        self.to_bits()
    }
}

impl NativeScalar for bool {
    const KIND: ScalarKind = ScalarKind::Bool;
    const BITS: u16 = 8;

    fn from_raw(raw: u64) -> Self {
        raw != 0
    }

    fn to_raw(self) -> u64 {
        u64::from(self)
    }
}

pub(crate) fn decode_scalar(raw: u64, scalar: &ScalarType) -> Value {
    let bits = u32::from(scalar.bits);
    match scalar.kind {
        ScalarKind::Void => Value::Void,
        ScalarKind::Bool => Value::Bool(raw & mask_bits(bits) != 0),
        ScalarKind::Int { signed: true } => Value::Int(sign_extend(raw, bits)),
        ScalarKind::Int { signed: false } => Value::UInt(raw & mask_bits(bits)),
        ScalarKind::Float if scalar.bits == 32 => Value::Float(f64::from(f32::from_bits(raw as u32))),
        ScalarKind::Float => Value::Float(f64::from_bits(raw)),
    }
}

/// Converts `value` into the raw bit pattern of `scalar`, truncating integers to its width.
pub(crate) fn encode_scalar(value: &Value, scalar: &ScalarType) -> AccessResult<u64> {
    let raw = match (scalar.kind, value) {
        (ScalarKind::Float, Value::Float(float)) if scalar.bits == 32 => {
            u64::from((*float as f32).to_bits())
        }
        (ScalarKind::Float, Value::Float(float)) => float.to_bits(),
        (ScalarKind::Float, Value::Int(int)) if scalar.bits == 32 => {
            u64::from((*int as f32).to_bits())
        }
        (ScalarKind::Float, Value::Int(int)) => (*int as f64).to_bits(),
        (ScalarKind::Float, Value::UInt(int)) if scalar.bits == 32 => {
            u64::from((*int as f32).to_bits())
        }
        (ScalarKind::Float, Value::UInt(int)) => (*int as f64).to_bits(),
        (ScalarKind::Bool, Value::Bool(flag)) => u64::from(*flag),
        (ScalarKind::Bool | ScalarKind::Int { .. }, Value::Int(int)) => *int as u64,
        (ScalarKind::Bool | ScalarKind::Int { .. }, Value::UInt(int)) => *int,
        (ScalarKind::Int { .. }, Value::Bool(flag)) => u64::from(*flag),
        (ScalarKind::Int { .. }, Value::Address(address)) => *address as u64,
        _ => {
            return Err(AccessError::mismatch(format!(
                "cannot store {value:?} into {scalar}"
            )));
        }
    };
    Ok(raw & mask_bits(u32::from(scalar.bits)))
}

pub(crate) fn decode_bitfields(word: u64, spec: &BitFieldSpec) -> Vec<Value> {
    let mut offset = 0u32;
    spec.fields
        .iter()
        .map(|field| {
            let width = u32::from(field.width);
            let raw = extract(word, offset, width);
            offset += width;
            if field.signed {
                Value::Int(sign_extend(raw, width))
            } else {
                Value::UInt(raw)
            }
        })
        .collect()
}

pub(crate) fn encode_bitfields(mut word: u64, spec: &BitFieldSpec, values: &[Value]) -> AccessResult<u64> {
    if values.len() != spec.fields.len() {
        return Err(AccessError::mismatch(format!(
            "bitfield group has {} fields but {} values were given",
            spec.fields.len(),
            values.len()
        )));
    }
    let mut offset = 0u32;
    for (field, value) in spec.fields.iter().zip(values) {
        let raw = value
            .as_u64()
            .or_else(|| value.as_i64().map(|int| int as u64))
            .ok_or_else(|| AccessError::mismatch(format!("cannot store {value:?} into a bitfield")))?;
        let width = u32::from(field.width);
        word = insert(word, offset, width, raw);
        offset += width;
    }
    Ok(word)
}

/// Decodes the bytes of one value of `ty`. `bytes` starts at the value and covers its size.
pub(crate) fn decode(bytes: &[u8], ty: &Type) -> AccessResult<Value> {
    match ty {
        Type::Scalar(scalar) if scalar.is_void() => Ok(Value::Void),
        Type::Scalar(scalar) => {
            let raw = load_word(&bytes[..scalar.byte_size()], scalar.endianness);
            Ok(decode_scalar(raw, scalar))
        }
        Type::BitFields(spec) => {
            let word = load_word(&bytes[..spec.storage.byte_size()], spec.storage.endianness);
            Ok(Value::Aggregate(decode_bitfields(word, spec)))
        }
        Type::Pointer(pointer) => {
            let raw = load_word(&bytes[..pointer.byte_size()], pointer.storage.endianness);
            Ok(Value::Address(raw as usize))
        }
        Type::Container(container) => container
            .members
            .iter()
            .enumerate()
            .map(|(index, member)| {
                let offset = container.offset_of(index).unwrap_or(0);
                decode(&bytes[offset..], &member.ty)
            })
            .collect::<AccessResult<Vec<_>>>()
            .map(Value::Aggregate),
        Type::Array(array) => {
            let len = array.element_count().unwrap_or(0);
            let stride = array.stride();
            (0..len)
                .map(|index| decode(&bytes[index * stride..], &array.element))
                .collect::<AccessResult<Vec<_>>>()
                .map(Value::Aggregate)
        }
        Type::Function(_) => Err(AccessError::mismatch("a function has no stored value")),
    }
}

/// Encodes `value` over `bytes` in place. Bits the value does not cover keep their contents.
pub(crate) fn encode(bytes: &mut [u8], ty: &Type, value: &Value) -> AccessResult<()> {
    match ty {
        Type::Scalar(scalar) if scalar.is_void() => {
            Err(AccessError::mismatch("cannot store through a void type"))
        }
        Type::Scalar(scalar) => {
            let raw = encode_scalar(value, scalar)?;
            store_word(raw, &mut bytes[..scalar.byte_size()], scalar.endianness);
            Ok(())
        }
        Type::BitFields(spec) => {
            let storage = &mut bytes[..spec.storage.byte_size()];
            let word = match value {
                Value::Aggregate(values) => {
                    let current = load_word(storage, spec.storage.endianness);
                    encode_bitfields(current, spec, values)?
                }
                scalar => encode_scalar(scalar, &spec.storage)?,
            };
            store_word(word, storage, spec.storage.endianness);
            Ok(())
        }
        Type::Pointer(pointer) => {
            let raw = match value {
                Value::Address(address) => *address as u64,
                other => other
                    .as_u64()
                    .ok_or_else(|| AccessError::mismatch(format!("cannot store {other:?} into a pointer")))?,
            };
            store_word(raw, &mut bytes[..pointer.byte_size()], pointer.storage.endianness);
            Ok(())
        }
        Type::Container(container) if container.is_union() => Err(AccessError::mismatch(
            "unions are written through one of their members",
        )),
        Type::Container(container) => {
            let values = aggregate_of(value, container.members.len())?;
            for (index, (member, value)) in container.members.iter().zip(values).enumerate() {
                let offset = container.offset_of(index).unwrap_or(0);
                encode(&mut bytes[offset..], &member.ty, value)?;
            }
            Ok(())
        }
        Type::Array(array) => {
            let len = array.element_count().unwrap_or(0);
            let values = aggregate_of(value, len)?;
            let stride = array.stride();
            for (index, value) in values.iter().enumerate() {
                encode(&mut bytes[index * stride..], &array.element, value)?;
            }
            Ok(())
        }
        Type::Function(_) => Err(AccessError::mismatch("a function has no stored value")),
    }
}

fn aggregate_of(value: &Value, expected: usize) -> AccessResult<&[Value]> {
    match value {
        Value::Aggregate(values) if values.len() == expected => Ok(values),
        Value::Aggregate(values) => Err(AccessError::mismatch(format!(
            "expected {expected} values but {} were given",
            values.len()
        ))),
        other => Err(AccessError::mismatch(format!(
            "expected an aggregate of {expected} values, found {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{DataModel, Endianness, Parser};

    fn ty(text: &str) -> Type {
        let item = Parser::with_model(text, DataModel::Lp64).single().unwrap();
        (*item.ty).clone()
    }

    #[test]
    fn signed_scalars_sign_extend() {
        let scalar = ScalarType::int(8, true);
        assert_eq!(decode_scalar(0xFF, &scalar), Value::Int(-1));
        assert_eq!(encode_scalar(&Value::Int(-1), &scalar).unwrap(), 0xFF);
        assert_eq!(decode_scalar(0xFF, &ScalarType::int(8, false)), Value::UInt(255));
    }

    #[test]
    fn floats_round_trip_through_bits() {
        let scalar = ScalarType::float(32);
        let raw = encode_scalar(&Value::Float(1.5), &scalar).unwrap();
        assert_eq!(raw, u64::from(1.5f32.to_bits()));
        assert_eq!(decode_scalar(raw, &scalar), Value::Float(1.5));
    }

    #[test]
    fn incompatible_values_are_rejected() {
        let err = encode_scalar(&Value::Float(1.0), &ScalarType::int(32, true)).unwrap_err();
        assert!(matches!(err, AccessError::Mismatch { .. }));
    }

    #[test]
    fn struct_codec_honours_offsets_and_endianness() {
        // a big-endian short after a byte sits at offset 2
        let layout = ty("[C >S]");
        let mut bytes = [0u8; 4];
        let value = Value::Aggregate(vec![Value::UInt(7), Value::UInt(0x1234)]);
        encode(&mut bytes, &layout, &value).unwrap();
        assert_eq!(bytes, [7, 0, 0x12, 0x34]);
        assert_eq!(decode(&bytes, &layout).unwrap(), value);
    }

    #[test]
    fn bitfield_aggregate_writes_keep_spare_bits() {
        let layout = ty("u16:2b9b");
        let mut bytes = 0xFFFFu16.to_ne_bytes();
        let value = Value::Aggregate(vec![Value::UInt(0), Value::UInt(0)]);
        encode(&mut bytes, &layout, &value).unwrap();
        assert_eq!(u16::from_ne_bytes(bytes), 0xF800, "bits above the group stay set");
    }

    #[test]
    fn native_scalars_describe_their_layout() {
        assert!(i32::matches(&ScalarType::int(32, true)));
        assert!(!u32::matches(&ScalarType::int(32, true)));
        assert!(f64::matches(&ScalarType::float(64).with_endianness(Endianness::Big)));
        assert_eq!((-2i16).to_raw(), 0xFFFE);
        assert_eq!(i16::from_raw(0xFFFE), -2);
    }
}
