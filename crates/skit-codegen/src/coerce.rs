//! Numeric promotion and constant folding.
//!
//! The promotion lattice is small: narrow integers widen to signed int,
//! a pair of 32-bit unsigned operands stays unsigned, any signed operand
//! makes the pair signed, and any float operand promotes both to float.
//! Folding happens on resolved operands so constant subtrees collapse
//! before any register is touched.

use crate::expr::BinOp;
use crate::symtab::SymbolTable;
use crate::types::Type;

/// Widens a narrow integer kind to the working type. Narrow unsigned
/// kinds widen to signed int; only full-width `UInt` operates unsigned.
/// Other types pass through.
#[inline]
pub fn widen_numeric(ty: Type) -> Type {
    match ty {
        Type::Int8 | Type::Int16 | Type::UInt8 | Type::UInt16 => Type::Int,
        other => other,
    }
}

/// The common type two numeric operands promote to. Callers verify both
/// sides are numeric (bool counts as int here) before asking.
pub fn common_numeric(a: Type, b: Type) -> Type {
    debug_assert!(a.is_numeric() || a == Type::Bool);
    debug_assert!(b.is_numeric() || b == Type::Bool);
    if a == Type::Float || b == Type::Float {
        return Type::Float;
    }
    let a = widen_numeric(a);
    let b = widen_numeric(b);
    if a == Type::UInt && b == Type::UInt {
        Type::UInt
    } else {
        Type::Int
    }
}

/// True when a pointer of type `from` may flow where `to` is expected:
/// null into any pointer, same class, or an upcast. Writability may be
/// dropped but never gained.
pub fn pointer_assignable(symtab: &SymbolTable, from: Type, to: Type) -> bool {
    match (from, to) {
        (Type::NullPtr, Type::Ptr { .. }) | (Type::NullPtr, Type::NullPtr) => true,
        (
            Type::Ptr {
                class: fc,
                readonly: fr,
            },
            Type::Ptr {
                class: tc,
                readonly: tr,
            },
        ) => (tr || !fr) && symtab.descends_from(fc, tc),
        _ => false,
    }
}

/// Folds an integer binary operation with 32-bit wrapping semantics.
/// Shift counts mask to the low five bits.
pub fn fold_int(op: BinOp, a: i32, b: i32, unsigned: bool) -> Result<i32, &'static str> {
    let r = match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div => {
            if b == 0 {
                return Err("division by zero in constant expression");
            }
            if unsigned {
                ((a as u32) / (b as u32)) as i32
            } else {
                a.wrapping_div(b)
            }
        }
        BinOp::Mod => {
            if b == 0 {
                return Err("modulo by zero in constant expression");
            }
            if unsigned {
                ((a as u32) % (b as u32)) as i32
            } else {
                a.wrapping_rem(b)
            }
        }
        BinOp::BitAnd => a & b,
        BinOp::BitOr => a | b,
        BinOp::BitXor => a ^ b,
        BinOp::Shl => a.wrapping_shl(b as u32),
        BinOp::Shr => {
            if unsigned {
                ((a as u32).wrapping_shr(b as u32)) as i32
            } else {
                a.wrapping_shr(b as u32)
            }
        }
        BinOp::Pow => return Err("'**' is not defined for integers"),
    };
    Ok(r)
}

/// Folds a float binary operation. Division and modulo by a constant zero
/// are rejected rather than folded to an infinity or NaN.
pub fn fold_float(op: BinOp, a: f64, b: f64) -> Result<f64, &'static str> {
    let r = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err("division by zero in constant expression");
            }
            a / b
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err("modulo by zero in constant expression");
            }
            // fmod: the result takes the dividend's sign.
            a % b
        }
        BinOp::Pow => a.powf(b),
        BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::Shl | BinOp::Shr => {
            return Err("bitwise operators are not defined for floats")
        }
    };
    Ok(r)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_promotion() {
        assert_eq!(common_numeric(Type::Int, Type::Int), Type::Int);
        assert_eq!(common_numeric(Type::UInt, Type::UInt), Type::UInt);
        assert_eq!(common_numeric(Type::UInt, Type::Int), Type::Int);
        assert_eq!(common_numeric(Type::Int, Type::Float), Type::Float);
    }

    #[test]
    fn test_narrow_unsigned_promotes_signed() {
        assert_eq!(widen_numeric(Type::UInt8), Type::Int);
        assert_eq!(widen_numeric(Type::UInt16), Type::Int);
        assert_eq!(common_numeric(Type::UInt8, Type::UInt8), Type::Int);
        assert_eq!(common_numeric(Type::UInt8, Type::UInt16), Type::Int);
        assert_eq!(common_numeric(Type::UInt16, Type::UInt), Type::Int);
    }

    #[test]
    fn test_fold_int_wrapping() {
        assert_eq!(fold_int(BinOp::Add, i32::MAX, 1, false), Ok(i32::MIN));
        assert_eq!(fold_int(BinOp::Mul, 3, 7, false), Ok(21));
        assert_eq!(fold_int(BinOp::Shl, 1, 33, false), Ok(2));
    }

    #[test]
    fn test_fold_int_division() {
        assert_eq!(fold_int(BinOp::Div, 7, 2, false), Ok(3));
        assert_eq!(fold_int(BinOp::Div, -2, 2, true), Ok(0x7FFF_FFFF));
        assert!(fold_int(BinOp::Div, 1, 0, false).is_err());
        assert!(fold_int(BinOp::Mod, 1, 0, true).is_err());
    }

    #[test]
    fn test_fold_int_unsigned_shift() {
        assert_eq!(fold_int(BinOp::Shr, -1, 28, true), Ok(15));
        assert_eq!(fold_int(BinOp::Shr, -1, 28, false), Ok(-1));
    }

    #[test]
    fn test_fold_float() {
        assert_eq!(fold_float(BinOp::Add, 1.5, 2.0), Ok(3.5));
        assert_eq!(fold_float(BinOp::Pow, 2.0, 10.0), Ok(1024.0));
        assert!(fold_float(BinOp::Div, 1.0, 0.0).is_err());
        assert!(fold_float(BinOp::BitAnd, 1.0, 1.0).is_err());
    }

    #[test]
    fn test_fold_float_mod_keeps_dividend_sign() {
        assert_eq!(fold_float(BinOp::Mod, -7.5, 2.0), Ok(-1.5));
        assert_eq!(fold_float(BinOp::Mod, 7.5, -2.0), Ok(1.5));
        assert!(fold_float(BinOp::Mod, 1.0, 0.0).is_err());
    }
}
