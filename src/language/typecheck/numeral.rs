use crate::language::{
    ast::NumberNode,
    typecheck::CheckErrorKind,
    types::{BasicKind, Shape, TypeSystem},
};

/// Untyped constant kind of a number literal.
pub fn classify_number(node: &NumberNode) -> Result<BasicKind, CheckErrorKind> {
    let text = node.text.as_str();
    if node.is_complex {
        return Ok(BasicKind::UntypedComplex);
    }
    if node.is_float && !is_hex_int(text) && !is_rune(text) && text.contains(['.', 'e', 'E', 'p', 'P'])
    {
        return Ok(BasicKind::UntypedFloat);
    }
    if node.is_int {
        // Any int64 fits a 64-bit machine int.
        return Ok(BasicKind::UntypedInt);
    }
    if node.is_uint {
        return Err(CheckErrorKind::Overflow {
            text: text.to_string(),
        });
    }
    Ok(BasicKind::UntypedInt)
}

fn is_hex_int(text: &str) -> bool {
    let digits = text.trim_start_matches(['+', '-']);
    digits.len() > 2
        && (digits.starts_with("0x") || digits.starts_with("0X"))
        && !digits.contains(['p', 'P'])
}

fn is_rune(text: &str) -> bool {
    text.starts_with('\'')
}

/// Replaces an untyped constant type with its default concrete type.
/// Untyped nil and typed values pass through unchanged.
pub fn downgrade<S: TypeSystem>(types: &S, ty: &S::Type) -> S::Type {
    match types.shape(ty) {
        Shape::Basic(kind) if kind.is_untyped() && kind != BasicKind::UntypedNil => {
            types.basic(kind.default_kind())
        }
        _ => ty.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::{
        literal::parse_number,
        reflect::{HostTypes, Type},
    };

    fn kind(text: &str) -> Result<BasicKind, CheckErrorKind> {
        let node = parse_number(text, text.starts_with('\'')).expect("number literal");
        classify_number(&node)
    }

    #[test]
    fn integers_within_machine_width_are_untyped_int() {
        for text in ["0", "42", "-7", "0x1e", "0o17", "0b101", "1_000", "9223372036854775807", "'a'"] {
            assert_eq!(kind(text), Ok(BasicKind::UntypedInt), "{text}");
        }
    }

    #[test]
    fn unsigned_only_integers_overflow() {
        for text in ["9223372036854775808", "18446744073709551615", "0xFFFFFFFFFFFFFFFF"] {
            assert_eq!(
                kind(text),
                Err(CheckErrorKind::Overflow {
                    text: text.to_string()
                }),
                "{text}"
            );
        }
    }

    #[test]
    fn fractions_and_exponents_are_untyped_float() {
        for text in ["1.5", "1e3", "0x1p-2", ".5"] {
            assert_eq!(kind(text), Ok(BasicKind::UntypedFloat), "{text}");
        }
        assert_eq!(kind("2i"), Ok(BasicKind::UntypedComplex));
        assert_eq!(kind("1+2i"), Ok(BasicKind::UntypedComplex));
    }

    #[test]
    fn downgrade_picks_default_kinds() {
        let types = HostTypes;
        let cases = [
            (BasicKind::UntypedInt, BasicKind::Int),
            (BasicKind::UntypedRune, BasicKind::Int32),
            (BasicKind::UntypedFloat, BasicKind::Float64),
            (BasicKind::UntypedComplex, BasicKind::Complex128),
            (BasicKind::UntypedString, BasicKind::String),
            (BasicKind::UntypedBool, BasicKind::Bool),
            (BasicKind::UntypedNil, BasicKind::UntypedNil),
        ];
        for (from, to) in cases {
            let downgraded = downgrade(&types, &Type::basic(from));
            assert!(matches!(downgraded, Type::Basic(kind) if kind == to), "{from}");
        }
        let slice = Type::slice(Type::int());
        assert!(matches!(downgrade(&types, &slice), Type::Slice(_)));
    }
}
