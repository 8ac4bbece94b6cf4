//! End-to-end checks: parse a template source, then type check it against
//! a host data type.

use crate::{
    check, check_with_options, default_functions, parse,
    language::{
        reflect::{Field, Method, Type},
        typecheck::{CheckErrorKind, ErrorCategory},
        types::{Signature, TypeSystem},
    },
    CheckOptions, HostTypes, TypeError,
};

fn check_source(name: &str, source: &str, data: &Type) -> Result<(), TypeError> {
    let set = parse(name, source).expect("template parses");
    let tree = set.get(name).expect("named tree");
    check(tree, data, &HostTypes, &set, &default_functions()).map(|_| ())
}

#[test]
fn range_over_numbers_calls_method_on_root() {
    let data = Type::new_named(
        Some("main"),
        "T",
        Type::structure(vec![Field::new("Numbers", Type::slice(Type::float64()))]),
        vec![Method::value(
            "F",
            Signature::new(vec![Type::int(), Type::float64()], vec![Type::string()]),
        )],
    );
    check_source(
        "numbers",
        "{{range $k, $v := .Numbers}}{{$.F $k $v}}{{end}}",
        &data,
    )
    .expect("well typed");
}

#[test]
fn missing_method_on_method_result() {
    let result = Type::new_named(Some("main"), "Result", Type::structure(Vec::new()), Vec::new());
    let data = Type::new_named(
        Some("main"),
        "T",
        Type::structure(Vec::new()),
        vec![Method::value("Method", Signature::new(Vec::new(), vec![result]))],
    );
    let err = check_source("method", "{{.Method.Foo}}", &data).expect_err("Foo is missing");
    assert_eq!(err.category(), ErrorCategory::Lookup);
    let message = err.to_string();
    assert!(message.contains("Foo"), "{message}");
    assert!(message.contains("main.Result"), "{message}");
}

#[test]
fn index_on_array_is_not_bounds_checked() {
    let data = Type::array(3, Type::string());
    check_source("array", "{{index . 10}}", &data).expect("literal index past the end");
}

#[test]
fn with_else_keeps_the_outer_dot() {
    let data = Type::new_named(
        Some("main"),
        "T",
        Type::structure(vec![
            Field::new("Name", Type::string()),
            Field::new("Fallback", Type::int()),
        ]),
        Vec::new(),
    );
    check_source(
        "with",
        "{{with $x := .Name}}{{len .}}{{else}}{{.Fallback}}{{end}}",
        &data,
    )
    .expect("else sees T");
}

#[test]
fn generator_with_two_variables_is_rejected() {
    let data = Type::structure(vec![Field::new("Values", Type::seq(Type::int()))]);
    let err = check_source("seq", "{{range $i, $v := .Values}}{{end}}", &data)
        .expect_err("single value iterator");
    assert!(err.to_string().contains("iterate over more than one variable"));
}

#[test]
fn shadowed_variable_keeps_outer_type_after_block() {
    let set = parse(
        "shadow",
        r#"{{$x := 1}}{{if true}}{{$x := "s"}}{{end}}{{$x}}"#,
    )
    .expect("parse");
    let tree = set.get("shadow").expect("tree");
    let result = check(
        tree,
        &Type::structure(Vec::new()),
        &HostTypes,
        &set,
        &default_functions(),
    )
    .expect("well typed")
    .expect("result");
    assert_eq!(HostTypes.describe(&result), "untyped int");
}

#[test]
fn unexported_fields_are_hidden_even_inside_their_package() {
    let data = Type::structure(vec![Field::new("secret", Type::string())]);
    let set = parse("hidden", "{{.secret}}").expect("parse");
    let tree = set.get("hidden").expect("tree");
    let options = CheckOptions::default().with_package("main");
    let err = check_with_options(
        tree,
        &data,
        &HostTypes,
        &set,
        &default_functions(),
        &options,
    )
    .expect_err("unexported");
    assert_eq!(err.category(), ErrorCategory::Visibility);
    assert!(matches!(err.kind, CheckErrorKind::Unexported { .. }));
}
