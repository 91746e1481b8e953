//! Recursive descent parser that turns descriptor text into a lazy sequence of top-level items.
//!
//! A descriptor may hold several items back to back (a parameter list, for example), so
//! parsing yields an iterator rather than a single type. The iterator stops after the first
//! error; it never skips invalid input.

mod cursor;
mod grammar;
mod literals;

use log::{debug, trace};

use super::aggregate::Field;
use super::error::{LayoutError, LayoutResult};
use super::scalar::{DataModel, Endianness};

use cursor::Cursor;
use grammar::Position;

pub struct Parser<'src> {
    cursor: Cursor<'src>,
    model: DataModel,
    failed: bool,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> Self {
        Self::with_model(source, DataModel::host())
    }

    pub fn with_model(source: &'src str, model: DataModel) -> Self {
        Self {
            cursor: Cursor::new(source),
            model,
            failed: false,
        }
    }

    pub fn model(&self) -> DataModel {
        self.model
    }

    /// Parses the next top-level item; `None` once the input is exhausted or an error was reported.
    pub fn next_item(&mut self) -> Option<LayoutResult<Field>> {
        if self.failed {
            return None;
        }
        if let Err(err) = self.cursor.skip_trivia() {
            self.failed = true;
            return Some(Err(err));
        }
        self.cursor.peek()?;
        let result = self.parse_element(Endianness::Native, Position::TopLevel);
        match &result {
            Ok(item) => trace!("parsed layout item {item}"),
            Err(err) => {
                self.failed = true;
                debug!("descriptor rejected: {err}");
            }
        }
        Some(result)
    }

    /// Parses exactly one item and rejects anything that follows it.
    pub fn single(mut self) -> LayoutResult<Field> {
        let item = match self.next_item() {
            Some(item) => item?,
            None => return Err(LayoutError::invalid("empty descriptor", "", 0)),
        };
        self.cursor.skip_trivia()?;
        if self.cursor.peek().is_some() {
            let at = self.cursor.pos();
            return Err(self.cursor.error("unexpected trailing input", at));
        }
        Ok(item)
    }

    pub fn items(self) -> Layouts<'src> {
        Layouts { parser: self }
    }
}

/// Lazy, finite, non-restartable sequence of parsed items.
pub struct Layouts<'src> {
    parser: Parser<'src>,
}

impl Iterator for Layouts<'_> {
    type Item = LayoutResult<Field>;

    fn next(&mut self) -> Option<Self::Item> {
        self.parser.next_item()
    }
}

/// Parses `text` with the host data model.
pub fn parse_layout(text: &str) -> Layouts<'_> {
    Parser::new(text).items()
}

pub fn parse_all(text: &str) -> LayoutResult<Vec<Field>> {
    parse_layout(text).collect()
}

pub fn parse_one(text: &str) -> LayoutResult<Field> {
    Parser::new(text).single()
}
