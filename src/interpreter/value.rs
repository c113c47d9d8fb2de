// File: src/interpreter/value.rs
//
// Runtime value types for the Probotics scripting language. `Value` is the
// tagged sum every instruction produces and consumes; `List`/`Object` carry
// shared-mutation semantics (reference-counted cells) so a `PropertyRef` can
// write back into the container it was taken from.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::bytecode::Block;

pub type ObjectRef = Rc<RefCell<HashMap<String, Value>>>;
pub type ListRef = Rc<RefCell<Vec<Value>>>;

/// The key half of a `PropertyRef`: either a named field or a list index.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKey {
    Name(String),
    Index(usize),
}

/// What a `PropertyRef` points into.
#[derive(Debug, Clone)]
pub enum PropertyOwner {
    Object(ObjectRef),
    List(ListRef),
}

#[derive(Clone)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    List(ListRef),
    Object(ObjectRef),
    /// An unresolved name, produced by `PushImmediate(Symbol(..))` in an
    /// assignable context (the LHS of `:=`, never evaluated as a read).
    Symbol(String),
    /// A live reference into an `Object`/`List`, produced by `Property`/
    /// `Index` and consumed by `GetProperty`/`GetIndex`/`Assignment`.
    PropertyRef(PropertyOwner, PropertyKey),
    Block(Rc<Block>),
}

impl Value {
    pub fn object() -> Self {
        Value::Object(Rc::new(RefCell::new(HashMap::new())))
    }

    pub fn list() -> Self {
        Value::List(Rc::new(RefCell::new(Vec::new())))
    }

    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn block(b: Block) -> Self {
        Value::Block(Rc::new(b))
    }

    /// "null/false/0/""/empty -> false; else true", per the truthiness rule.
    /// `List`/`Object` truthiness was an open question in the source; this
    /// crate resolves it as "empty container is falsy", matching Python's
    /// general truthiness convention that the original implementation relied
    /// on elsewhere (documented as a decision in DESIGN.md).
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.borrow().is_empty(),
            Value::Object(o) => !o.borrow().is_empty(),
            Value::Symbol(_) => true,
            Value::PropertyRef(..) => true,
            Value::Block(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Object(_) => "object",
            Value::Symbol(_) => "symbol",
            Value::PropertyRef(..) => "property_ref",
            Value::Block(_) => "block",
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(self, Value::Block(_))
    }

    /// Numeric promotion helper: both operands as `f64` if either is `Float`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::List(l) => write!(f, "{:?}", l.borrow()),
            Value::Object(o) => write!(f, "{:?}", o.borrow()),
            Value::Symbol(n) => write!(f, "Symbol({n})"),
            Value::PropertyRef(_, key) => write!(f, "PropertyRef(.. , {key:?})"),
            Value::Block(b) => write!(f, "Block({:?})", b.name),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(l) => {
                write!(f, "[")?;
                for (i, v) in l.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Object(o) => {
                write!(f, "{{")?;
                for (i, (k, v)) in o.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Symbol(n) => write!(f, "{n}"),
            Value::PropertyRef(..) => write!(f, "<property-ref>"),
            Value::Block(b) => write!(f, "<block {}>", b.name.as_deref().unwrap_or("anonymous")),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Block(a), Value::Block(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_containers_are_falsy() {
        assert!(!Value::list().is_truthy());
        assert!(!Value::object().is_truthy());
    }

    #[test]
    fn numeric_equality_promotes() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
    }

    #[test]
    fn display_renders_list() {
        let v = Value::list();
        if let Value::List(l) = &v {
            l.borrow_mut().push(Value::Int(1));
            l.borrow_mut().push(Value::Str("x".into()));
        }
        assert_eq!(format!("{v}"), "[1, x]");
    }
}
