use indexmap::IndexMap;
use serde_json::Value;

/// A parsed JSCN document: a root type and its named definitions,
/// in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaAst {
    pub root: Type,
    pub defs: IndexMap<String, Type>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    /// A back-quoted JSON value, or a bare quoted string.
    Literal(Value),
    /// An all-literal union, folded from an `|` chain.
    Enum(Vec<Value>),
    Keyword(Keyword),
    Regex(String),
    Format(String),
    StringCard(Cardinal),
    IntegerCard {
        card: Cardinal,
        multiple_of: Option<u64>,
    },
    NumberCard {
        card: Cardinal,
        multiple_of: Option<u64>,
    },
    Ref(String),
    Not(Box<Type>),
    AllOf(Vec<Type>),
    AnyOf(Vec<Type>),
    Conditional {
        /// `(condition, consequence)` pairs: the `if`/`then` head plus any
        /// `elif`/`then` continuations, lowered right-associatively.
        branches: Vec<(Type, Type)>,
        otherwise: Option<Box<Type>>,
    },
    Object {
        properties: Vec<ObjectProperty>,
        restriction: Restriction,
        card: Cardinal,
    },
    Array {
        /// Fixed item types, after any trailing repeated type is split off.
        prefix: Vec<Type>,
        tail: RepeatMode,
        only: bool,
        unique: bool,
        card: Cardinal,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Boolean,
    Str,
    Integer,
    Number,
    Null,
    Object,
    Array,
    Forbidden,
}

impl Keyword {
    /// JSON Schema `type` name; `forbidden` has none (it is the `false` schema).
    pub fn type_name(self) -> Option<&'static str> {
        match self {
            Self::Boolean => Some("boolean"),
            Self::Str => Some("string"),
            Self::Integer => Some("integer"),
            Self::Number => Some("number"),
            Self::Null => Some("null"),
            Self::Object => Some("object"),
            Self::Array => Some("array"),
            Self::Forbidden => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectProperty {
    pub key: String,
    pub optional: bool,
    pub value: Type,
}

/// The `only ...` prefix of an object body.
#[derive(Debug, Clone, PartialEq)]
pub enum Restriction {
    /// No restriction: extra properties allowed, unconstrained.
    None,
    /// Bare `only`: no properties beyond the listed ones.
    OnlyListed,
    /// `only <nc>`: every property name must match the constraint.
    OnlyNames(NameConstraint),
    /// `only <nc>: T` / `only _: T`: extra values are typed; `names` is
    /// `None` for the `_` wildcard.
    OnlyKv {
        names: Option<NameConstraint>,
        value: Box<Type>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum NameConstraint {
    Regex(String),
    Ref(String),
}

/// Trailing `*`/`+` on the last listed array item type.
#[derive(Debug, Clone, PartialEq)]
pub enum RepeatMode {
    Closed,
    ZeroOrMore(Box<Type>),
    OneOrMore(Box<Type>),
}

/// `{min, max}` bound; `None` is unbounded on that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cardinal {
    pub min: Option<u64>,
    pub max: Option<u64>,
}

impl Cardinal {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn exact(n: u64) -> Self {
        Self {
            min: Some(n),
            max: Some(n),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}
