use std::fmt;

/// Primitive value types of the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Type {
    /// 64-bit signed integer.
    #[default]
    Int,
    /// 64-bit IEEE double.
    Float,
    /// 8-bit integer; also the result of comparisons.
    Chr,
    /// Pointer to a nul-terminated string constant.
    Str,
}

impl Type {
    pub fn is_integer(self) -> bool {
        matches!(self, Type::Int | Type::Chr)
    }

    pub fn is_float(self) -> bool {
        matches!(self, Type::Float)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Decodes the type names accepted as parameter suffixes and as the
    /// return type of a declaration-only form.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "int" => Some(Type::Int),
            "float" => Some(Type::Float),
            "chr" => Some(Type::Chr),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Type::Int => "int",
            Type::Float => "float",
            Type::Chr => "chr",
            Type::Str => "str",
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parameter and return types of a callable function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub params: Vec<Type>,
    pub ret: Type,
}

impl Signature {
    pub fn new(params: Vec<Type>, ret: Type) -> Self {
        Self { params, ret }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ") -> {}", self.ret)
    }
}
