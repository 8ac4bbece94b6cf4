//! The seam between the checker and a host type model.
//!
//! The checker never inspects a concrete type representation. It asks a
//! [`TypeSystem`] for the underlying [`Shape`] of a type, for field and
//! method lookups, and for assignability; [`crate::language::reflect`]
//! provides the model used by default.

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BasicKind {
    Bool,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uintptr,
    Float32,
    Float64,
    Complex64,
    Complex128,
    String,
    UnsafePointer,

    UntypedBool,
    UntypedInt,
    UntypedRune,
    UntypedFloat,
    UntypedComplex,
    UntypedString,
    UntypedNil,
}

impl BasicKind {
    pub fn name(self) -> &'static str {
        match self {
            BasicKind::Bool => "bool",
            BasicKind::Int => "int",
            BasicKind::Int8 => "int8",
            BasicKind::Int16 => "int16",
            BasicKind::Int32 => "int32",
            BasicKind::Int64 => "int64",
            BasicKind::Uint => "uint",
            BasicKind::Uint8 => "uint8",
            BasicKind::Uint16 => "uint16",
            BasicKind::Uint32 => "uint32",
            BasicKind::Uint64 => "uint64",
            BasicKind::Uintptr => "uintptr",
            BasicKind::Float32 => "float32",
            BasicKind::Float64 => "float64",
            BasicKind::Complex64 => "complex64",
            BasicKind::Complex128 => "complex128",
            BasicKind::String => "string",
            BasicKind::UnsafePointer => "unsafe.Pointer",
            BasicKind::UntypedBool => "untyped bool",
            BasicKind::UntypedInt => "untyped int",
            BasicKind::UntypedRune => "untyped rune",
            BasicKind::UntypedFloat => "untyped float",
            BasicKind::UntypedComplex => "untyped complex",
            BasicKind::UntypedString => "untyped string",
            BasicKind::UntypedNil => "untyped nil",
        }
    }

    pub fn is_untyped(self) -> bool {
        matches!(
            self,
            BasicKind::UntypedBool
                | BasicKind::UntypedInt
                | BasicKind::UntypedRune
                | BasicKind::UntypedFloat
                | BasicKind::UntypedComplex
                | BasicKind::UntypedString
                | BasicKind::UntypedNil
        )
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            BasicKind::Int
                | BasicKind::Int8
                | BasicKind::Int16
                | BasicKind::Int32
                | BasicKind::Int64
                | BasicKind::Uint
                | BasicKind::Uint8
                | BasicKind::Uint16
                | BasicKind::Uint32
                | BasicKind::Uint64
                | BasicKind::Uintptr
                | BasicKind::UntypedInt
                | BasicKind::UntypedRune
        )
    }

    pub fn is_float(self) -> bool {
        matches!(
            self,
            BasicKind::Float32 | BasicKind::Float64 | BasicKind::UntypedFloat
        )
    }

    pub fn is_complex(self) -> bool {
        matches!(
            self,
            BasicKind::Complex64 | BasicKind::Complex128 | BasicKind::UntypedComplex
        )
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float() || self.is_complex()
    }

    pub fn is_string(self) -> bool {
        matches!(self, BasicKind::String | BasicKind::UntypedString)
    }

    /// The concrete kind an untyped constant takes when nothing else fixes it.
    pub fn default_kind(self) -> BasicKind {
        match self {
            BasicKind::UntypedBool => BasicKind::Bool,
            BasicKind::UntypedInt => BasicKind::Int,
            BasicKind::UntypedRune => BasicKind::Int32,
            BasicKind::UntypedFloat => BasicKind::Float64,
            BasicKind::UntypedComplex => BasicKind::Complex128,
            BasicKind::UntypedString => BasicKind::String,
            other => other,
        }
    }
}

impl fmt::Display for BasicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Function or method signature. When `variadic` is set the last parameter
/// holds the slice type of the variadic arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct Signature<T> {
    pub params: Vec<T>,
    pub results: Vec<T>,
    pub variadic: bool,
}

impl<T> Signature<T> {
    pub fn new(params: Vec<T>, results: Vec<T>) -> Self {
        Self {
            params,
            results,
            variadic: false,
        }
    }

    pub fn variadic(params: Vec<T>, results: Vec<T>) -> Self {
        Self {
            params,
            results,
            variadic: true,
        }
    }
}

/// Underlying kind of a type with any naming stripped away.
#[derive(Clone, Debug)]
pub enum Shape<T> {
    Basic(BasicKind),
    Pointer(T),
    Struct,
    Slice(T),
    Array { len: u64, elem: T },
    Map { key: T, elem: T },
    Chan(T),
    Signature(Signature<T>),
    Interface,
}

#[derive(Clone, Debug)]
pub enum Member<T> {
    Field(T),
    Method(Signature<T>),
}

pub trait TypeSystem {
    type Type: Clone + fmt::Debug;

    fn shape(&self, ty: &Self::Type) -> Shape<Self::Type>;

    /// Finds a field or method named `name` on `ty` (or on what `ty` points
    /// to). `package` is the package the access happens from.
    fn lookup_field_or_method(
        &self,
        ty: &Self::Type,
        name: &str,
        package: Option<&str>,
    ) -> Option<Member<Self::Type>>;

    fn assignable(&self, from: &Self::Type, to: &Self::Type) -> bool;

    /// Whether `ty` can stand in for the host's error type.
    fn is_error_like(&self, ty: &Self::Type) -> bool;

    fn basic(&self, kind: BasicKind) -> Self::Type;

    fn slice_of(&self, elem: &Self::Type) -> Self::Type;

    fn describe(&self, ty: &Self::Type) -> String;
}

/// Exported identifiers start with an upper-case letter.
pub fn is_exported(ident: &str) -> bool {
    ident.chars().next().is_some_and(char::is_uppercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untyped_kinds_default_to_concrete_kinds() {
        assert_eq!(BasicKind::UntypedInt.default_kind(), BasicKind::Int);
        assert_eq!(BasicKind::UntypedRune.default_kind(), BasicKind::Int32);
        assert_eq!(BasicKind::UntypedFloat.default_kind(), BasicKind::Float64);
        assert_eq!(BasicKind::UntypedComplex.default_kind(), BasicKind::Complex128);
        assert_eq!(BasicKind::UntypedString.default_kind(), BasicKind::String);
        assert_eq!(BasicKind::UntypedNil.default_kind(), BasicKind::UntypedNil);
        assert_eq!(BasicKind::Uint8.default_kind(), BasicKind::Uint8);
    }

    #[test]
    fn exported_identifiers() {
        assert!(is_exported("Name"));
        assert!(is_exported("Ärger"));
        assert!(!is_exported("name"));
        assert!(!is_exported("_Name"));
        assert!(!is_exported(""));
    }
}
