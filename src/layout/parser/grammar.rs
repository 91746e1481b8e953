//! Grammar rules. Every rule reads left to right with one byte of lookahead and fails on
//! the first malformed construct.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::layout::aggregate::{AggregateKind, Container, Field};
use crate::layout::bitfield::{BitField, BitFieldSpec};
use crate::layout::callable::FunctionType;
use crate::layout::error::{LayoutError, LayoutResult};
use crate::layout::pointer::PointerType;
use crate::layout::record::Type;
use crate::layout::scalar::{Endianness, ScalarKind, ScalarType};
use crate::layout::sequence::ArrayType;

use super::Parser;
use super::literals::{decimal_len, literal_len, parse_numeric_literal};

const MAX_SCALAR_BITS: u64 = 64;

/// Where a type appears; decides which shapes are legal there.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Position {
    TopLevel,
    Member,
    Param,
    Element,
    Pointee,
    Return,
}

pub(super) struct Parsed {
    ty: Type,
    name: Option<String>,
}

impl Parsed {
    fn unnamed(ty: Type) -> Self {
        Self { ty, name: None }
    }
}

impl Parser<'_> {
    pub(super) fn parse_element(
        &mut self,
        endian: Endianness,
        position: Position,
    ) -> LayoutResult<Field> {
        self.cursor.skip_trivia()?;
        let start = self.cursor.pos();
        let parsed = self.parse_type(endian, position)?;
        self.check_position(&parsed.ty, position, start)?;
        Ok(Field {
            name: parsed.name,
            ty: Arc::new(parsed.ty),
        })
    }

    fn parse_type(&mut self, inherited: Endianness, position: Position) -> LayoutResult<Parsed> {
        self.cursor.skip_trivia()?;
        let start = self.cursor.pos();
        let Some(byte) = self.cursor.peek() else {
            return Err(self.cursor.error("unexpected end of descriptor", start));
        };
        let mut parsed = match Endianness::from_prefix(byte as char) {
            Some(endian) => {
                self.cursor.bump();
                match self.cursor.peek() {
                    None => return Err(self.cursor.error("dangling endianness prefix", start)),
                    Some(next) if Endianness::from_prefix(next as char).is_some() => {
                        return Err(self.cursor.error("repeated endianness prefix", start));
                    }
                    Some(_) if self.cursor.at_whitespace() => {
                        return Err(self.cursor.error(
                            "whitespace after an endianness prefix is not allowed",
                            start,
                        ));
                    }
                    Some(b'(') => {
                        return Err(self.cursor.error("endianness prefix before a function", start));
                    }
                    Some(_) => {}
                }
                self.parse_body(endian, position)?
            }
            None => self.parse_body(inherited, position)?,
        };
        self.parse_trailing_name(&mut parsed)?;
        Ok(parsed)
    }

    fn parse_body(&mut self, endian: Endianness, position: Position) -> LayoutResult<Parsed> {
        let start = self.cursor.pos();
        match self.cursor.peek() {
            Some(b'0'..=b'9') => self.parse_array(endian),
            Some(b'*') => self.parse_wildcard(endian),
            Some(b'[') => self.parse_container(endian),
            Some(b'(') => self.parse_function(),
            Some(byte) if byte.is_ascii_alphabetic() => self.parse_scalar(endian),
            Some(_) if position == Position::TopLevel => {
                Err(self.cursor.error("invalid descriptor", start))
            }
            Some(_) => Err(self.cursor.error("invalid type code", start)),
            None => Err(self.cursor.error("unexpected end of descriptor", start)),
        }
    }

    fn parse_array(&mut self, endian: Endianness) -> LayoutResult<Parsed> {
        let start = self.cursor.pos();
        let len = literal_len(self.cursor.rest());
        let text = self.cursor.slice(start, start + len);
        let count =
            parse_numeric_literal(text).map_err(|reason| self.cursor.error(reason, start))?;
        self.cursor.advance(len);
        self.ensure_adjacent("a count", start)?;
        if count == 0 {
            return Err(self.cursor.error("0 length array is not allowed", start));
        }
        let count = usize::try_from(count)
            .map_err(|_| self.cursor.error("array count out of range", start))?;
        let element = self.parse_array_element(endian)?;
        let ty = Type::Array(ArrayType::fixed(Arc::new(element.ty), count));
        if ty.checked_layout().is_none() {
            return Err(self.cursor.error("array size overflows", start));
        }
        Ok(Parsed {
            ty,
            name: element.name,
        })
    }

    fn parse_wildcard(&mut self, endian: Endianness) -> LayoutResult<Parsed> {
        let start = self.cursor.pos();
        self.cursor.bump();
        self.ensure_adjacent("'*'", start)?;
        let element = self.parse_array_element(endian)?;
        Ok(Parsed {
            ty: Type::Array(ArrayType::wildcard(Arc::new(element.ty))),
            name: element.name,
        })
    }

    fn parse_array_element(&mut self, endian: Endianness) -> LayoutResult<Parsed> {
        let start = self.cursor.pos();
        let element = self.parse_type(endian, Position::Element)?;
        self.check_position(&element.ty, Position::Element, start)?;
        Ok(element)
    }

    fn parse_container(&mut self, endian: Endianness) -> LayoutResult<Parsed> {
        let start = self.cursor.pos();
        self.cursor.bump();
        let mut segments: Vec<Vec<(Field, usize)>> = vec![Vec::new()];
        loop {
            self.cursor.skip_trivia()?;
            let at = self.cursor.pos();
            match self.cursor.peek() {
                None => return Err(self.cursor.error("unterminated container", start)),
                Some(b']') => {
                    self.cursor.bump();
                    break;
                }
                Some(b'|') => {
                    if segments.last().is_some_and(Vec::is_empty) {
                        return Err(self.cursor.error("empty union member", at));
                    }
                    self.cursor.bump();
                    segments.push(Vec::new());
                }
                Some(_) => {
                    let field = self.parse_element(endian, Position::Member)?;
                    if let Some(segment) = segments.last_mut() {
                        segment.push((field, at));
                    }
                }
            }
        }

        let (kind, members) = if segments.len() == 1 {
            let members = segments.pop().unwrap_or_default();
            if members.is_empty() {
                return Err(self.cursor.error("empty container", start));
            }
            (AggregateKind::Struct, members)
        } else {
            let mut members = Vec::with_capacity(segments.len());
            for mut segment in segments {
                match segment.len() {
                    0 => return Err(self.cursor.error("empty union member", start)),
                    1 => members.extend(segment.pop()),
                    _ => {
                        return Err(
                            self.cursor
                                .error("union member must be a single type", segment[1].1),
                        );
                    }
                }
            }
            (AggregateKind::Union, members)
        };

        let last = members.len() - 1;
        for (index, (field, at)) in members.iter().enumerate() {
            if field.ty.is_open_ended() && (kind == AggregateKind::Union || index != last) {
                return Err(self.cursor.error(
                    "wildcard array is only allowed as the trailing struct member",
                    *at,
                ));
            }
        }
        let members = members.into_iter().map(|(field, _)| field).collect();
        let container = Container::new(kind, members).map_err(|err| self.relocate(err, start))?;
        Ok(Parsed::unnamed(Type::Container(container)))
    }

    fn parse_function(&mut self) -> LayoutResult<Parsed> {
        let start = self.cursor.pos();
        self.cursor.bump();
        let mut params: SmallVec<[Field; 4]> = SmallVec::new();
        let mut variadic = false;
        loop {
            self.cursor.skip_trivia()?;
            match self.cursor.peek() {
                None => {
                    return Err(self.cursor.error("unterminated function signature", start));
                }
                Some(b')') => {
                    self.cursor.bump();
                    break;
                }
                Some(b'*') if self.at_variadic_marker() => {
                    self.cursor.bump();
                    self.cursor.skip_trivia()?;
                    self.cursor.bump();
                    variadic = true;
                    break;
                }
                Some(_) => params.push(self.parse_element(Endianness::Native, Position::Param)?),
            }
        }
        match self.cursor.peek() {
            None | Some(b']' | b')' | b'|') => {
                return Err(self.cursor.error("function needs return type", start));
            }
            Some(_) if self.cursor.at_whitespace() => {
                return Err(self.cursor.error("function needs return type", start));
            }
            Some(_) => {}
        }
        let ret_start = self.cursor.pos();
        let ret = self.parse_type(Endianness::Native, Position::Return)?;
        self.check_position(&ret.ty, Position::Return, ret_start)?;
        Ok(Parsed {
            ty: Type::Function(FunctionType::new(params, Arc::new(ret.ty), variadic)),
            name: ret.name,
        })
    }

    /// `*` directly followed (modulo whitespace) by `)` marks a variadic tail.
    fn at_variadic_marker(&self) -> bool {
        self.cursor.rest()[1..]
            .iter()
            .find(|byte| !matches!(**byte, b' ' | b'\t' | b'\n' | b'\r'))
            == Some(&b')')
    }

    fn parse_scalar(&mut self, endian: Endianness) -> LayoutResult<Parsed> {
        let start = self.cursor.pos();
        let mut scalar = self.parse_scalar_code()?;

        if self.cursor.peek() == Some(b'=') && self.cursor.peek_at(1) != Some(b'[') {
            let eq_at = self.cursor.pos();
            self.cursor.bump();
            self.ensure_adjacent("'='", eq_at)?;
            if !self.cursor.peek().is_some_and(|byte| byte.is_ascii_digit()) {
                return Err(self.cursor.error("expected a bit count after '='", eq_at));
            }
            let len = literal_len(self.cursor.rest());
            let text = self.cursor.slice(self.cursor.pos(), self.cursor.pos() + len);
            let bits =
                parse_numeric_literal(text).map_err(|reason| self.cursor.error(reason, eq_at))?;
            self.cursor.advance(len);
            scalar = self.resize(scalar, bits, eq_at)?;
        }
        scalar.endianness = endian;

        let mut name = self.parse_name_tag()?;
        match self.cursor.peek() {
            Some(b':') => {
                let colon_at = self.cursor.pos();
                self.cursor.bump();
                if self.at_group_end() {
                    return Err(self.cursor.error("not finished bitfields", colon_at));
                }
                if self.at_bit_widths() {
                    let spec = self.parse_bit_widths(scalar, colon_at)?;
                    return Ok(Parsed {
                        ty: Type::BitFields(spec),
                        name,
                    });
                }
                let pointee_at = self.cursor.pos();
                let pointee = self.parse_type(Endianness::Native, Position::Pointee)?;
                self.check_position(&pointee.ty, Position::Pointee, pointee_at)?;
                if let Some(inner) = pointee.name {
                    if name.is_some() {
                        return Err(self.cursor.error("duplicate name tag", pointee_at));
                    }
                    name = Some(inner);
                }
                let pointer = PointerType::new(scalar, Arc::new(pointee.ty))
                    .map_err(|err| self.relocate(err, start))?;
                Ok(Parsed {
                    ty: Type::Pointer(pointer),
                    name,
                })
            }
            Some(b'=') => {
                let eq_at = self.cursor.pos();
                if self.cursor.peek_at(1) != Some(b'[') {
                    return Err(self
                        .cursor
                        .error("bit count must precede the name tag", eq_at));
                }
                self.cursor.advance(2);
                let spec = self.parse_named_bitfields(scalar, eq_at)?;
                Ok(Parsed {
                    ty: Type::BitFields(spec),
                    name,
                })
            }
            _ => Ok(Parsed {
                ty: Type::Scalar(scalar),
                name,
            }),
        }
    }

    /// Reads a type code: a table letter, or `i`/`u` followed by a decimal width.
    fn parse_scalar_code(&mut self) -> LayoutResult<ScalarType> {
        let at = self.cursor.pos();
        let Some(code) = self.cursor.bump().map(char::from) else {
            return Err(self.cursor.error("unexpected end of descriptor", at));
        };
        let sized = matches!(code, 'i' | 'u')
            && self.cursor.peek().is_some_and(|byte| byte.is_ascii_digit());
        if sized {
            let digits_at = self.cursor.pos();
            let len = decimal_len(self.cursor.rest());
            let text = self.cursor.slice(digits_at, digits_at + len);
            let bits =
                parse_numeric_literal(text).map_err(|reason| self.cursor.error(reason, at))?;
            self.cursor.advance(len);
            return self.resize(ScalarType::int(32, code == 'i'), bits, at);
        }
        self.model
            .scalar_for_code(code)
            .ok_or_else(|| self.cursor.error(format!("invalid type code '{code}'"), at))
    }

    fn resize(&self, scalar: ScalarType, bits: u64, at: usize) -> LayoutResult<ScalarType> {
        if bits == 0 {
            return Err(self.cursor.error("0 bit is not allowed", at));
        }
        match scalar.kind {
            ScalarKind::Void => Err(self.cursor.error("void has no width", at)),
            ScalarKind::Float if bits != 32 && bits != 64 => {
                Err(self.cursor.error("float width must be 32 or 64", at))
            }
            ScalarKind::Int { .. } | ScalarKind::Bool if bits > MAX_SCALAR_BITS => Err(self
                .cursor
                .error("scalars wider than 64 bits are not supported", at)),
            _ => Ok(ScalarType {
                bits: bits as u16,
                ..scalar
            }),
        }
    }

    /// After `:`, a decimal run closed by `b` starts a width list; `0b1...` is a binary count.
    fn at_bit_widths(&self) -> bool {
        let rest = self.cursor.rest();
        let run = decimal_len(rest);
        if run == 0 || rest.get(run) != Some(&b'b') {
            return false;
        }
        !(run == 1 && rest[0] == b'0' && matches!(rest.get(2), Some(b'0' | b'1')))
    }

    fn at_group_end(&self) -> bool {
        self.cursor.at_whitespace() || matches!(self.cursor.peek(), None | Some(b']' | b')' | b'|'))
    }

    fn parse_bit_widths(&mut self, storage: ScalarType, colon_at: usize) -> LayoutResult<BitFieldSpec> {
        let mut builder = BitFieldSpec::builder(storage);
        loop {
            let at = self.cursor.pos();
            let len = decimal_len(self.cursor.rest());
            if len == 0 {
                break;
            }
            let text = self.cursor.slice(at, at + len);
            let width =
                parse_numeric_literal(text).map_err(|reason| self.cursor.error(reason, at))?;
            self.cursor.advance(len);
            if !self.cursor.eat(b'b') {
                return Err(self.cursor.error("bitfield width must end with 'b'", at));
            }
            if width == 0 {
                return Err(self.cursor.error("0 bit is not allowed", at));
            }
            let width = u16::try_from(width)
                .map_err(|_| self.cursor.error("bitfield width out of range", at))?;
            builder = builder.width(width);
        }
        builder.finish().map_err(|err| self.relocate(err, colon_at))
    }

    fn parse_named_bitfields(&mut self, storage: ScalarType, eq_at: usize) -> LayoutResult<BitFieldSpec> {
        let mut builder = BitFieldSpec::builder(storage);
        loop {
            self.cursor.skip_trivia()?;
            let at = self.cursor.pos();
            match self.cursor.peek() {
                None => return Err(self.cursor.error("unterminated bitfield group", eq_at)),
                Some(b']') => {
                    self.cursor.bump();
                    break;
                }
                Some(byte) if byte.is_ascii_alphabetic() => {
                    let member = self.parse_scalar_code()?;
                    let ScalarKind::Int { signed } = member.kind else {
                        return Err(self.cursor.error("bitfield member must be an integer", at));
                    };
                    let mut field = BitField::new(member.bits, signed);
                    field.name = self.parse_name_tag()?;
                    builder = builder.field(field);
                }
                Some(_) => return Err(self.cursor.error("invalid bitfield member", at)),
            }
        }
        builder.finish().map_err(|err| self.relocate(err, eq_at))
    }

    fn parse_name_tag(&mut self) -> LayoutResult<Option<String>> {
        if self.cursor.peek() != Some(b'(') {
            return Ok(None);
        }
        let at = self.cursor.pos();
        self.cursor.bump();
        let name_at = self.cursor.pos();
        let len = self
            .cursor
            .rest()
            .iter()
            .take_while(|byte| byte.is_ascii_alphanumeric() || **byte == b'_')
            .count();
        if len == 0 {
            return Err(self.cursor.error("invalid name tag", at));
        }
        let name = self.cursor.slice(name_at, name_at + len).to_string();
        self.cursor.advance(len);
        if !self.cursor.eat(b')') {
            return Err(self.cursor.error("unterminated name tag", at));
        }
        Ok(Some(name))
    }

    fn parse_trailing_name(&mut self, parsed: &mut Parsed) -> LayoutResult<()> {
        let at = self.cursor.pos();
        if let Some(name) = self.parse_name_tag()? {
            if parsed.name.is_some() {
                return Err(self.cursor.error("duplicate name tag", at));
            }
            parsed.name = Some(name);
        }
        Ok(())
    }

    fn ensure_adjacent(&self, what: &str, at: usize) -> LayoutResult<()> {
        if self.cursor.peek().is_none() {
            return Err(self.cursor.error(format!("missing type after {what}"), at));
        }
        if self.cursor.at_whitespace() {
            return Err(self
                .cursor
                .error(format!("whitespace after {what} is not allowed"), at));
        }
        Ok(())
    }

    fn check_position(&self, ty: &Type, position: Position, at: usize) -> LayoutResult<()> {
        match ty {
            Type::Scalar(scalar)
                if scalar.is_void() && !matches!(position, Position::Pointee | Position::Return) =>
            {
                Err(self
                    .cursor
                    .error("void is only allowed as a pointee or return type", at))
            }
            Type::Function(_) if !matches!(position, Position::TopLevel | Position::Pointee) => Err(
                self.cursor
                    .error("function type is not storable; use a pointer", at),
            ),
            _ if ty.is_open_ended() && !matches!(position, Position::TopLevel | Position::Member) => {
                Err(self.cursor.error(
                    "wildcard array is only allowed as the trailing struct member",
                    at,
                ))
            }
            _ => Ok(()),
        }
    }

    fn relocate(&self, err: LayoutError, at: usize) -> LayoutError {
        self.cursor.error(err.reason().to_string(), at)
    }
}
