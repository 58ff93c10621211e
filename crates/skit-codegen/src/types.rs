//! Value type descriptors.
//!
//! A [`Type`] is a small copyable descriptor. Compound types (classes,
//! structs, arrays) are indices into tables owned by the symbol table, so
//! structural equality of two descriptors is identity.

use skit_vm::instruction::{MEM_SIGNED, MEM_W1, MEM_W2, MEM_W4, MEM_W8};
use skit_vm::{Opcode, RegBank};

use crate::symtab::{ArrayTypeId, ClassId, StructId};

/// A semantic value type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Type {
    Void,
    Bool,
    /// Signed 32-bit integer, the working integer type.
    Int,
    /// Unsigned 32-bit integer.
    UInt,
    // Narrow integer kinds; storage-only, always widened when operated on.
    Int8,
    UInt8,
    Int16,
    UInt16,
    /// 64-bit IEEE float, the working float type.
    Float,
    String,
    /// An interned name.
    Name,
    /// A sound reference (engine sound id).
    Sound,
    /// A packed ARGB color.
    Color,
    /// A cue label: a position in an actor's behavior timeline.
    Cue,
    Vec2,
    Vec3,
    /// A class-reference value (points at a class descriptor).
    ClassRef(ClassId),
    /// A pointer to an instance of a class.
    Ptr { class: ClassId, readonly: bool },
    /// The type of the `null` literal before it is adopted by context.
    NullPtr,
    Struct(StructId),
    Array(ArrayTypeId),
}

impl Type {
    /// The register bank this type occupies, or `None` for types that are
    /// never register-resident (void, structs, arrays).
    pub fn bank(self) -> Option<RegBank> {
        match self {
            Type::Void | Type::Struct(_) | Type::Array(_) => None,
            Type::Bool
            | Type::Int
            | Type::UInt
            | Type::Int8
            | Type::UInt8
            | Type::Int16
            | Type::UInt16
            | Type::Sound
            | Type::Color
            | Type::Cue => Some(RegBank::Int),
            Type::Float | Type::Vec2 | Type::Vec3 => Some(RegBank::Float),
            Type::String | Type::Name => Some(RegBank::String),
            Type::ClassRef(_) | Type::Ptr { .. } | Type::NullPtr => Some(RegBank::Ptr),
        }
    }

    /// How many registers a value of this type occupies.
    #[inline]
    pub fn reg_count(self) -> u16 {
        match self {
            Type::Void => 0,
            Type::Vec2 => 2,
            Type::Vec3 => 3,
            _ => 1,
        }
    }

    /// True for every integer-kind type, bool and the handle types that
    /// share the int bank excluded.
    #[inline]
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Type::Int | Type::UInt | Type::Int8 | Type::UInt8 | Type::Int16 | Type::UInt16
        )
    }

    /// True for the narrow storage-only integer kinds.
    #[inline]
    pub fn is_narrow(self) -> bool {
        matches!(
            self,
            Type::Int8 | Type::UInt8 | Type::Int16 | Type::UInt16
        )
    }

    /// True for unsigned integer kinds.
    #[inline]
    pub fn is_unsigned(self) -> bool {
        matches!(self, Type::UInt | Type::UInt8 | Type::UInt16)
    }

    #[inline]
    pub fn is_numeric(self) -> bool {
        self.is_integer() || self == Type::Float
    }

    #[inline]
    pub fn is_vector(self) -> bool {
        matches!(self, Type::Vec2 | Type::Vec3)
    }

    /// The string-compatible family: types a string/name may be compared
    /// against with an implicit cast.
    #[inline]
    pub fn is_string_family(self) -> bool {
        matches!(
            self,
            Type::String | Type::Name | Type::Sound | Type::Color | Type::Cue | Type::ClassRef(_)
        )
    }

    #[inline]
    pub fn is_pointer(self) -> bool {
        matches!(self, Type::Ptr { .. } | Type::NullPtr)
    }

    /// Size in bytes when stored in an object or array.
    pub fn byte_size(self) -> u32 {
        match self {
            Type::Void => 0,
            Type::Bool | Type::Int8 | Type::UInt8 => 1,
            Type::Int16 | Type::UInt16 => 2,
            Type::Int | Type::UInt | Type::Sound | Type::Color | Type::Cue => 4,
            Type::Float
            | Type::String
            | Type::Name
            | Type::ClassRef(_)
            | Type::Ptr { .. }
            | Type::NullPtr => 8,
            Type::Vec2 => 16,
            Type::Vec3 => 24,
            // Compound sizes live in the symbol table.
            Type::Struct(_) | Type::Array(_) => 0,
        }
    }

    /// The load opcode and memory flags for reading a field of this type
    /// through an object pointer.
    pub fn load_op(self) -> (Opcode, u8) {
        match self {
            Type::Bool | Type::UInt8 => (Opcode::LdI, MEM_W1),
            Type::Int8 => (Opcode::LdI, MEM_W1 | MEM_SIGNED),
            Type::UInt16 => (Opcode::LdI, MEM_W2),
            Type::Int16 => (Opcode::LdI, MEM_W2 | MEM_SIGNED),
            Type::Int => (Opcode::LdI, MEM_W4 | MEM_SIGNED),
            Type::UInt | Type::Sound | Type::Color | Type::Cue => (Opcode::LdI, MEM_W4),
            Type::Float => (Opcode::LdF, MEM_W8),
            Type::String | Type::Name => (Opcode::LdS, MEM_W8),
            Type::ClassRef(_) | Type::Ptr { .. } | Type::NullPtr => (Opcode::LdP, MEM_W8),
            Type::Vec2 => (Opcode::LdV2, MEM_W8),
            Type::Vec3 => (Opcode::LdV3, MEM_W8),
            Type::Void | Type::Struct(_) | Type::Array(_) => {
                unreachable!("type {:?} is not loadable", self)
            }
        }
    }

    /// The store opcode and memory flags for writing a field of this type.
    pub fn store_op(self) -> (Opcode, u8) {
        match self {
            Type::Bool | Type::Int8 | Type::UInt8 => (Opcode::StI, MEM_W1),
            Type::Int16 | Type::UInt16 => (Opcode::StI, MEM_W2),
            Type::Int | Type::UInt | Type::Sound | Type::Color | Type::Cue => {
                (Opcode::StI, MEM_W4)
            }
            Type::Float => (Opcode::StF, MEM_W8),
            Type::String | Type::Name => (Opcode::StS, MEM_W8),
            Type::ClassRef(_) | Type::Ptr { .. } | Type::NullPtr => (Opcode::StP, MEM_W8),
            Type::Vec2 => (Opcode::StV2, MEM_W8),
            Type::Vec3 => (Opcode::StV3, MEM_W8),
            Type::Void | Type::Struct(_) | Type::Array(_) => {
                unreachable!("type {:?} is not storable", self)
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banks() {
        assert_eq!(Type::Int.bank(), Some(RegBank::Int));
        assert_eq!(Type::Color.bank(), Some(RegBank::Int));
        assert_eq!(Type::Float.bank(), Some(RegBank::Float));
        assert_eq!(Type::Vec3.bank(), Some(RegBank::Float));
        assert_eq!(Type::Name.bank(), Some(RegBank::String));
        assert_eq!(Type::NullPtr.bank(), Some(RegBank::Ptr));
        assert_eq!(Type::Void.bank(), None);
    }

    #[test]
    fn test_reg_counts() {
        assert_eq!(Type::Int.reg_count(), 1);
        assert_eq!(Type::Vec2.reg_count(), 2);
        assert_eq!(Type::Vec3.reg_count(), 3);
        assert_eq!(Type::Void.reg_count(), 0);
    }

    #[test]
    fn test_kind_predicates() {
        assert!(Type::UInt16.is_integer());
        assert!(Type::UInt16.is_narrow());
        assert!(!Type::Bool.is_integer());
        assert!(Type::Float.is_numeric());
        assert!(Type::Cue.is_string_family());
        assert!(!Type::Float.is_string_family());
    }

    #[test]
    fn test_narrow_load_signedness() {
        let (op, flags) = Type::Int8.load_op();
        assert_eq!(op, Opcode::LdI);
        assert_ne!(flags & MEM_SIGNED, 0);
        let (_, flags) = Type::UInt8.load_op();
        assert_eq!(flags & MEM_SIGNED, 0);
    }
}
