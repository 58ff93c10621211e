//! The compile-time symbol table.
//!
//! The front end populates these tables from class declarations before any
//! function body is compiled; the back end only reads them (the one
//! exception is the native registry, which hands out generator ids on
//! demand). Lookups that walk the inheritance chain live here so expression
//! resolution stays free of tree-walking.

use hashbrown::HashMap;

use skit_common::symbol::{Symbol, SymbolInterner};
use skit_vm::{FunctionId, NativeId};

use crate::types::Type;
use crate::value::ConstVal;

/// Index of a class in [`SymbolTable::classes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(pub u32);

/// Index of a struct in [`SymbolTable::structs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StructId(pub u32);

/// Index of an array type in [`SymbolTable::array_types`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrayTypeId(pub u32);

/// An instance field of a class or struct.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: Symbol,
    pub ty: Type,
    /// Byte offset from the start of the object.
    pub offset: u32,
    pub read_only: bool,
    pub private: bool,
    pub deprecated: bool,
}

/// A declared parameter of a method or native routine.
#[derive(Debug, Clone)]
pub struct ParamDef {
    pub name: Symbol,
    pub ty: Type,
    /// Passed by address; the callee may write through it.
    pub by_ref: bool,
    /// Default value for trailing optional parameters.
    pub default: Option<ConstVal>,
}

/// A script method.
#[derive(Debug, Clone)]
pub struct MethodDef {
    pub name: Symbol,
    pub id: FunctionId,
    pub params: Vec<ParamDef>,
    pub returns: Vec<Type>,
    /// `Some` when the method is dispatched through the virtual table.
    pub vtable_index: Option<u16>,
    pub is_static: bool,
    pub is_final: bool,
    /// Cue functions take the three implicit actor-context pointers.
    pub is_cue: bool,
    pub private: bool,
    pub deprecated: bool,
    pub owner: ClassId,
}

impl MethodDef {
    /// Number of implicit leading pointer parameters.
    #[inline]
    pub fn implicit_count(&self) -> u16 {
        if self.is_static {
            0
        } else if self.is_cue {
            3
        } else {
            1
        }
    }
}

/// A class declaration.
#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: Symbol,
    pub parent: Option<ClassId>,
    pub fields: Vec<FieldDef>,
    /// Field name to index in `fields`, this class only.
    pub field_index: HashMap<Symbol, usize>,
    pub methods: Vec<MethodDef>,
    pub method_index: HashMap<Symbol, usize>,
    /// Class-scoped named constants.
    pub constants: HashMap<Symbol, (Type, ConstVal)>,
    /// Cue labels declared by this class, name to timeline index.
    pub cues: HashMap<Symbol, u32>,
    /// Instance size in bytes, parent included.
    pub size: u32,
}

impl ClassDef {
    pub fn new(name: Symbol, parent: Option<ClassId>) -> Self {
        Self {
            name,
            parent,
            fields: Vec::new(),
            field_index: HashMap::new(),
            methods: Vec::new(),
            method_index: HashMap::new(),
            constants: HashMap::new(),
            cues: HashMap::new(),
            size: 0,
        }
    }

    /// Adds a field, assigning the next offset. Alignment follows the
    /// field's natural size.
    pub fn add_field(&mut self, name: Symbol, ty: Type, read_only: bool) -> usize {
        let size = ty.byte_size().max(1);
        let align = size.min(8);
        let offset = (self.size + align - 1) & !(align - 1);
        let idx = self.fields.len();
        self.fields.push(FieldDef {
            name,
            ty,
            offset,
            read_only,
            private: false,
            deprecated: false,
        });
        self.field_index.insert(name, idx);
        self.size = offset + size;
        idx
    }

    pub fn add_method(&mut self, method: MethodDef) -> usize {
        let idx = self.methods.len();
        self.method_index.insert(method.name, idx);
        self.methods.push(method);
        idx
    }
}

/// A struct declaration (value aggregate, no methods or inheritance).
#[derive(Debug, Clone)]
pub struct StructDef {
    pub name: Symbol,
    pub fields: Vec<FieldDef>,
    pub field_index: HashMap<Symbol, usize>,
    pub size: u32,
}

/// A fixed-length array type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayType {
    pub elem: Type,
    pub len: u32,
}

/// A module-level variable.
#[derive(Debug, Clone)]
pub struct GlobalVar {
    pub name: Symbol,
    pub ty: Type,
    /// Slot in the engine's global table.
    pub index: u32,
    pub read_only: bool,
}

/// Everything name resolution can see.
#[derive(Debug, Default)]
pub struct SymbolTable {
    pub classes: Vec<ClassDef>,
    pub class_names: HashMap<Symbol, ClassId>,
    pub structs: Vec<StructDef>,
    pub array_types: Vec<ArrayType>,
    pub globals: HashMap<Symbol, GlobalVar>,
    /// Module-level named constants.
    pub constants: HashMap<Symbol, (Type, ConstVal)>,
    /// Host-provided compile-time switches, readable from scripts.
    pub directives: HashMap<Symbol, i32>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_class(&mut self, class: ClassDef) -> ClassId {
        let id = ClassId(self.classes.len() as u32);
        self.class_names.insert(class.name, id);
        self.classes.push(class);
        id
    }

    #[inline]
    pub fn class(&self, id: ClassId) -> &ClassDef {
        &self.classes[id.0 as usize]
    }

    #[inline]
    pub fn struct_def(&self, id: StructId) -> &StructDef {
        &self.structs[id.0 as usize]
    }

    #[inline]
    pub fn array_type(&self, id: ArrayTypeId) -> ArrayType {
        self.array_types[id.0 as usize]
    }

    /// Interns an array type, reusing an existing entry when one matches.
    pub fn intern_array_type(&mut self, elem: Type, len: u32) -> ArrayTypeId {
        let at = ArrayType { elem, len };
        if let Some(pos) = self.array_types.iter().position(|t| *t == at) {
            return ArrayTypeId(pos as u32);
        }
        let id = ArrayTypeId(self.array_types.len() as u32);
        self.array_types.push(at);
        id
    }

    pub fn lookup_class(&self, name: Symbol) -> Option<ClassId> {
        self.class_names.get(&name).copied()
    }

    /// True if `child` is `ancestor` or descends from it.
    pub fn descends_from(&self, child: ClassId, ancestor: ClassId) -> bool {
        let mut cur = Some(child);
        while let Some(id) = cur {
            if id == ancestor {
                return true;
            }
            cur = self.class(id).parent;
        }
        false
    }

    /// Finds a field by name, walking the inheritance chain.
    pub fn lookup_field(&self, class: ClassId, name: Symbol) -> Option<&FieldDef> {
        let mut cur = Some(class);
        while let Some(id) = cur {
            let def = self.class(id);
            if let Some(&idx) = def.field_index.get(&name) {
                return Some(&def.fields[idx]);
            }
            cur = def.parent;
        }
        None
    }

    /// Finds a method by name, walking the inheritance chain.
    pub fn lookup_method(&self, class: ClassId, name: Symbol) -> Option<&MethodDef> {
        let mut cur = Some(class);
        while let Some(id) = cur {
            let def = self.class(id);
            if let Some(&idx) = def.method_index.get(&name) {
                return Some(&def.methods[idx]);
            }
            cur = def.parent;
        }
        None
    }

    /// Finds a class-scoped constant, walking the inheritance chain.
    pub fn lookup_class_constant(
        &self,
        class: ClassId,
        name: Symbol,
    ) -> Option<&(Type, ConstVal)> {
        let mut cur = Some(class);
        while let Some(id) = cur {
            let def = self.class(id);
            if let Some(entry) = def.constants.get(&name) {
                return Some(entry);
            }
            cur = def.parent;
        }
        None
    }

    /// Finds a cue label by name, walking the inheritance chain.
    pub fn lookup_cue(&self, class: ClassId, name: Symbol) -> Option<u32> {
        let mut cur = Some(class);
        while let Some(id) = cur {
            let def = self.class(id);
            if let Some(&idx) = def.cues.get(&name) {
                return Some(idx);
            }
            cur = def.parent;
        }
        None
    }

    /// Human-readable name for a type, for diagnostics.
    pub fn type_name(&self, ty: Type, interner: &SymbolInterner) -> String {
        match ty {
            Type::Void => "void".into(),
            Type::Bool => "bool".into(),
            Type::Int => "int".into(),
            Type::UInt => "uint".into(),
            Type::Int8 => "int8".into(),
            Type::UInt8 => "uint8".into(),
            Type::Int16 => "int16".into(),
            Type::UInt16 => "uint16".into(),
            Type::Float => "float".into(),
            Type::String => "string".into(),
            Type::Name => "name".into(),
            Type::Sound => "sound".into(),
            Type::Color => "color".into(),
            Type::Cue => "cue".into(),
            Type::Vec2 => "vec2".into(),
            Type::Vec3 => "vec3".into(),
            Type::ClassRef(id) => {
                format!("class<{}>", interner.display(self.class(id).name))
            }
            Type::Ptr { class, readonly } => {
                let name = interner.display(self.class(class).name);
                if readonly {
                    format!("readonly<{}>", name)
                } else {
                    name.to_string()
                }
            }
            Type::NullPtr => "null".into(),
            Type::Struct(id) => interner.display(self.struct_def(id).name).to_string(),
            Type::Array(id) => {
                let at = self.array_type(id);
                format!("{}[{}]", self.type_name(at.elem, interner), at.len)
            }
        }
    }
}

/// A registered native routine callable from scripts.
#[derive(Debug, Clone)]
pub struct NativeDef {
    pub name: Symbol,
    pub id: NativeId,
    pub params: Vec<ParamDef>,
    pub returns: Vec<Type>,
}

/// The set of native routines plus the named pseudo-random generators.
///
/// Generator ids are handed out on first use, so the registry is the one
/// table the back end mutates during compilation.
#[derive(Debug, Default)]
pub struct NativeRegistry {
    pub defs: Vec<NativeDef>,
    pub by_name: HashMap<Symbol, NativeId>,
    generators: HashMap<Symbol, u32>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, def: NativeDef) -> NativeId {
        let id = NativeId(self.defs.len() as u32);
        let mut def = def;
        def.id = id;
        self.by_name.insert(def.name, id);
        self.defs.push(def);
        id
    }

    pub fn lookup(&self, name: Symbol) -> Option<&NativeDef> {
        self.by_name.get(&name).map(|id| &self.defs[id.0 as usize])
    }

    #[inline]
    pub fn get(&self, id: NativeId) -> &NativeDef {
        &self.defs[id.0 as usize]
    }

    /// Id of the named random generator, allocating on first use.
    pub fn generator_id(&mut self, name: Symbol) -> u32 {
        let next = self.generators.len() as u32;
        *self.generators.entry(name).or_insert(next)
    }

    pub fn generator_count(&self) -> usize {
        self.generators.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table(interner: &mut SymbolInterner) -> (SymbolTable, ClassId, ClassId) {
        let mut table = SymbolTable::new();

        let mut base = ClassDef::new(interner.intern("Actor"), None);
        base.add_field(interner.intern("health"), Type::Int, false);
        base.add_field(interner.intern("pos"), Type::Vec3, false);
        base.cues.insert(interner.intern("Spawn"), 0);
        let base_id = table.add_class(base);

        let mut derived = ClassDef::new(interner.intern("Imp"), Some(base_id));
        derived.size = table.class(base_id).size;
        derived.add_field(interner.intern("rage"), Type::UInt8, false);
        let derived_id = table.add_class(derived);

        (table, base_id, derived_id)
    }

    #[test]
    fn test_field_offsets() {
        let mut interner = SymbolInterner::new();
        let (table, base, _) = sample_table(&mut interner);
        let health = table.lookup_field(base, interner.intern("health")).unwrap();
        assert_eq!(health.offset, 0);
        // vec3 aligns to 8 after the 4-byte int.
        let pos = table.lookup_field(base, interner.intern("pos")).unwrap();
        assert_eq!(pos.offset, 8);
        assert_eq!(table.class(base).size, 32);
    }

    #[test]
    fn test_inherited_lookup() {
        let mut interner = SymbolInterner::new();
        let (table, base, derived) = sample_table(&mut interner);
        let health = interner.intern("health");

        assert!(table.lookup_field(derived, health).is_some());
        assert!(table.lookup_field(base, interner.intern("rage")).is_none());
        assert_eq!(table.lookup_cue(derived, interner.intern("Spawn")), Some(0));
    }

    #[test]
    fn test_descends_from() {
        let mut interner = SymbolInterner::new();
        let (table, base, derived) = sample_table(&mut interner);
        assert!(table.descends_from(derived, base));
        assert!(table.descends_from(base, base));
        assert!(!table.descends_from(base, derived));
    }

    #[test]
    fn test_array_type_interning() {
        let mut table = SymbolTable::new();
        let a = table.intern_array_type(Type::Int, 4);
        let b = table.intern_array_type(Type::Int, 4);
        let c = table.intern_array_type(Type::Float, 4);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_generator_ids_stable() {
        let mut interner = SymbolInterner::new();
        let mut natives = NativeRegistry::new();
        let crit = interner.intern("crit");
        let loot = interner.intern("loot");

        let a = natives.generator_id(crit);
        let b = natives.generator_id(loot);
        let c = natives.generator_id(crit);
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(natives.generator_count(), 2);
    }
}
