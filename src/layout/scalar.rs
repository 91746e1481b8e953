//! Primitive scalar descriptions and the closed type-code table.

/// Byte order of a scalar. `Native` follows the host.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Endianness {
    #[default]
    Native,
    Big,
    Little,
}

impl Endianness {
    #[inline(always)]
    pub const fn host() -> Self {
        if cfg!(target_endian = "big") {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }

    /// Collapses `Native` into the concrete host order.
    #[inline(always)]
    pub const fn resolve(self) -> Self {
        match self {
            Endianness::Native => Self::host(),
            other => other,
        }
    }

    pub fn from_prefix(prefix: char) -> Option<Self> {
        match prefix {
            '>' => Some(Endianness::Big),
            '<' => Some(Endianness::Little),
            '@' => Some(Endianness::Native),
            _ => None,
        }
    }

    /// Descriptor prefix; `None` for native since absence already means native.
    pub fn prefix(self) -> Option<char> {
        match self {
            Endianness::Native => None,
            Endianness::Big => Some('>'),
            Endianness::Little => Some('<'),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Void,
    Bool,
    Int { signed: bool },
    Float,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScalarType {
    pub kind: ScalarKind,
    pub bits: u16,
    pub endianness: Endianness,
}

impl ScalarType {
    pub const VOID: Self = Self {
        kind: ScalarKind::Void,
        bits: 0,
        endianness: Endianness::Native,
    };

    pub const fn new(kind: ScalarKind, bits: u16) -> Self {
        Self {
            kind,
            bits,
            endianness: Endianness::Native,
        }
    }

    pub const fn int(bits: u16, signed: bool) -> Self {
        Self::new(ScalarKind::Int { signed }, bits)
    }

    pub const fn float(bits: u16) -> Self {
        Self::new(ScalarKind::Float, bits)
    }

    pub const fn bool() -> Self {
        Self::new(ScalarKind::Bool, 8)
    }

    pub const fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    pub const fn byte_size(&self) -> usize {
        (self.bits as usize).div_ceil(8)
    }

    /// Natural alignment: the byte size rounded up to a power of two, capped at 8.
    pub fn align(&self) -> usize {
        self.byte_size().max(1).next_power_of_two().min(8)
    }

    pub fn is_void(&self) -> bool {
        matches!(self.kind, ScalarKind::Void)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self.kind, ScalarKind::Int { .. })
    }

    pub fn is_signed(&self) -> bool {
        matches!(self.kind, ScalarKind::Int { signed: true })
    }
}

/// C data model selecting the widths of the platform-dependent codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataModel {
    /// 64-bit `long` and pointers (Unix 64-bit).
    Lp64,
    /// 32-bit `long`, 64-bit pointers (Windows 64-bit).
    Llp64,
    /// 32-bit `long` and pointers.
    Ilp32,
}

impl Default for DataModel {
    fn default() -> Self {
        Self::host()
    }
}

impl DataModel {
    pub const fn host() -> Self {
        if cfg!(target_pointer_width = "32") {
            DataModel::Ilp32
        } else if cfg!(windows) {
            DataModel::Llp64
        } else {
            DataModel::Lp64
        }
    }

    pub const fn long_bits(self) -> u16 {
        match self {
            DataModel::Lp64 => 64,
            DataModel::Llp64 | DataModel::Ilp32 => 32,
        }
    }

    pub const fn pointer_bits(self) -> u16 {
        match self {
            DataModel::Lp64 | DataModel::Llp64 => 64,
            DataModel::Ilp32 => 32,
        }
    }

    /// Resolves a single-letter type code. `i`/`u` followed by digits are handled by the parser.
    pub fn scalar_for_code(self, code: char) -> Option<ScalarType> {
        let scalar = match code {
            'v' => ScalarType::VOID,
            'z' => ScalarType::bool(),
            'c' | 'C' => ScalarType::int(8, code.is_ascii_lowercase()),
            's' | 'S' => ScalarType::int(16, code.is_ascii_lowercase()),
            'i' | 'I' => ScalarType::int(32, code.is_ascii_lowercase()),
            'l' | 'L' => ScalarType::int(self.long_bits(), code.is_ascii_lowercase()),
            'j' | 'J' => ScalarType::int(64, code.is_ascii_lowercase()),
            'p' | 'P' => ScalarType::int(self.pointer_bits(), code.is_ascii_lowercase()),
            'f' => ScalarType::float(32),
            'd' => ScalarType::float(64),
            _ => return None,
        };
        Some(scalar)
    }
}
