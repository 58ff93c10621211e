//! Compile-time constant values.

use skit_common::symbol::Symbol;

use crate::symtab::ClassId;

/// A value known at compile time.
///
/// The carrying node's [`Type`](crate::types::Type) decides how the payload
/// is interpreted: `Int` backs every integer-kind value including bools,
/// colors, sound ids and cue indices.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstVal {
    Int(i32),
    Float(f64),
    Str(String),
    Name(Symbol),
    Class(ClassId),
    Null,
    Vec2([f64; 2]),
    Vec3([f64; 3]),
}

impl ConstVal {
    /// The integer payload, if this is an integer-kind constant.
    #[inline]
    pub fn as_int(&self) -> Option<i32> {
        match self {
            ConstVal::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// The float payload, if this is a float constant.
    #[inline]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ConstVal::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Whether this constant is the zero value of its family.
    pub fn is_zero(&self) -> bool {
        match self {
            ConstVal::Int(v) => *v == 0,
            ConstVal::Float(v) => *v == 0.0,
            ConstVal::Str(s) => s.is_empty(),
            ConstVal::Name(sym) => sym.is_dummy(),
            ConstVal::Null => true,
            ConstVal::Class(_) => false,
            ConstVal::Vec2(v) => v.iter().all(|c| *c == 0.0),
            ConstVal::Vec3(v) => v.iter().all(|c| *c == 0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_values() {
        assert!(ConstVal::Int(0).is_zero());
        assert!(!ConstVal::Int(1).is_zero());
        assert!(ConstVal::Null.is_zero());
        assert!(ConstVal::Str(String::new()).is_zero());
        assert!(!ConstVal::Float(0.5).is_zero());
    }
}
