use super::*;
use crate::language::{
    parser::parse,
    reflect::{default_functions, error_type, Field, HostTypes, Method, NamedType, Type},
    types::{BasicKind, Signature},
};

fn inner() -> Type {
    Type::new_named(
        Some("app"),
        "Inner",
        Type::structure(vec![Field::new("Name", Type::string())]),
        Vec::new(),
    )
}

fn page() -> Type {
    let page = NamedType::declare(Some("app"), "Page");
    let fields = vec![
        Field::new("Numbers", Type::slice(Type::float64())),
        Field::new("Title", Type::string()),
        Field::new("title", Type::string()),
        Field::new("Count", Type::int()),
        Field::new("Items", Type::map(Type::string(), Type::int())),
        Field::new("Scores", Type::map(Type::int(), Type::string())),
        Field::new("Tags", Type::slice(Type::string())),
        Field::new("Seq", Type::seq(Type::string())),
        Field::new("Pairs", Type::seq2(Type::int(), Type::string())),
        Field::new("Fn", Type::func(vec![Type::int()], vec![Type::string()])),
        Field::new("Next", Type::pointer(Type::named(&page))),
        Field::new("Ch", Type::chan(Type::string())),
        Field::new("Arr", Type::array(2, Type::int())),
    ];
    let methods = vec![
        Method::value(
            "F",
            Signature::new(vec![Type::int(), Type::float64()], vec![Type::string()]),
        ),
        Method::value("Method", Signature::new(Vec::new(), vec![inner()])),
        Method::value(
            "Broken",
            Signature::new(Vec::new(), vec![Type::int(), Type::string()]),
        ),
        Method::value("Nothing", Signature::new(Vec::new(), Vec::new())),
        Method::value(
            "Three",
            Signature::new(Vec::new(), vec![Type::int(), Type::int(), Type::int()]),
        ),
        Method::pointer(
            "Lookup",
            Signature::new(vec![Type::string()], vec![inner(), error_type()]),
        ),
    ];
    page.define(Type::structure(fields), methods)
        .expect("define page");
    Type::named(&page)
}

fn functions() -> Functions<Type> {
    default_functions()
        .with(
            "wantInt",
            Signature::new(vec![Type::int()], vec![Type::string()]),
        )
        .with(
            "wantString",
            Signature::new(vec![Type::string()], vec![Type::string()]),
        )
        .with(
            "wantFloat",
            Signature::new(vec![Type::float64()], vec![Type::string()]),
        )
}

fn run(source: &str, data: &Type, options: &CheckOptions) -> Result<Option<Type>, TypeError> {
    let set = parse("page", source).expect("template parses");
    let tree = set.get("page").expect("top-level tree");
    check_with_options(tree, data, &HostTypes, &set, &functions(), options)
}

fn check_page(source: &str) -> Result<Option<Type>, TypeError> {
    run(source, &page(), &CheckOptions::default())
}

fn kind_of(source: &str) -> CheckErrorKind {
    check_page(source).expect_err("template should be rejected").kind
}

fn describe(result: Result<Option<Type>, TypeError>) -> String {
    let ty = result.expect("template should type check").expect("a result type");
    HostTypes.describe(&ty)
}

#[test]
fn fields_and_dot_resolve_to_their_types() {
    assert_eq!(describe(check_page("{{.Title}}")), "string");
    assert_eq!(describe(check_page("{{.}}")), "app.Page");
    assert_eq!(describe(check_page("{{.Next.Next.Count}}")), "int");
    assert_eq!(describe(check_page("{{.Method.Name}}")), "string");
}

#[test]
fn literals_stay_untyped() {
    assert_eq!(describe(check_page("{{1}}")), "untyped int");
    assert_eq!(describe(check_page("{{1.5}}")), "untyped float");
    assert_eq!(describe(check_page("{{\"s\"}}")), "untyped string");
    assert_eq!(describe(check_page("{{true}}")), "untyped bool");
}

#[test]
fn pipelines_pass_the_previous_result_last() {
    assert_eq!(describe(check_page("{{.Count | wantInt}}")), "string");
    assert_eq!(describe(check_page("{{.Tags | len}}")), "int");
    assert!(matches!(
        kind_of("{{.Title | wantInt}}"),
        CheckErrorKind::ArgumentMismatch { index: 0, .. }
    ));
    assert!(matches!(
        kind_of("{{.Count | .Title}}"),
        CheckErrorKind::NotAMethod { ref ident } if ident == "Title"
    ));
}

#[test]
fn variables_are_declared_and_assigned() {
    assert_eq!(describe(check_page("{{$x := .Count}}{{$x}}")), "int");
    assert_eq!(
        describe(check_page("{{$x := 1}}{{$x = .Title}}{{$x}}")),
        "string"
    );
    assert_eq!(describe(check_page("{{$.Title}}")), "string");
    assert_eq!(
        kind_of("{{$y = 1}}"),
        CheckErrorKind::UndefinedVariable {
            name: "$y".to_string()
        }
    );
    assert_eq!(
        kind_of("{{$missing}}"),
        CheckErrorKind::UndefinedVariable {
            name: "$missing".to_string()
        }
    );
}

#[test]
fn inner_declarations_do_not_leak_out_of_blocks() {
    let source = r#"{{$x := 1}}{{if true}}{{$x := "s"}}{{end}}{{$x}}"#;
    assert_eq!(describe(check_page(source)), "untyped int");
    assert!(matches!(
        kind_of("{{if .Count}}{{$inner := 1}}{{end}}{{$inner}}"),
        CheckErrorKind::UndefinedVariable { .. }
    ));
}

#[test]
fn if_condition_variables_reach_both_branches() {
    check_page("{{if $t := .Title}}{{wantString $t}}{{else}}{{wantString $t}}{{end}}")
        .expect("declared in condition");
}

#[test]
fn with_rebinds_dot_only_in_its_body() {
    check_page("{{with $t := .Title}}{{wantString .}}{{else}}{{wantInt .Count}}{{end}}")
        .expect("else keeps the outer dot");
    assert!(matches!(
        kind_of("{{with .Title}}{{.Count}}{{end}}"),
        CheckErrorKind::FieldNotFound { ref ident, .. } if ident == "Count"
    ));
}

#[test]
fn range_binds_keys_and_elements() {
    check_page("{{range $i, $n := .Numbers}}{{wantInt $i}}{{wantFloat $n}}{{end}}")
        .expect("slice index and element");
    check_page("{{range .Numbers}}{{wantFloat .}}{{end}}").expect("slice element as dot");
    check_page("{{range $k, $v := .Items}}{{wantString $k}}{{wantInt $v}}{{end}}")
        .expect("map key and element");
    check_page("{{range $v := .Items}}{{wantInt $v}}{{end}}").expect("map element only");
    assert!(matches!(
        kind_of("{{range $v := .Items}}{{wantString $v}}{{end}}"),
        CheckErrorKind::ArgumentMismatch { .. }
    ));
    check_page("{{range $i := .Count}}{{wantInt $i}}{{end}}").expect("range over int");
    check_page("{{range $i := 3}}{{wantInt $i}}{{end}}").expect("range over constant");
}

#[test]
fn range_over_arrays_and_channels() {
    check_page("{{range $i, $v := .Arr}}{{wantInt $i}}{{wantInt $v}}{{end}}")
        .expect("array index and element");
    check_page("{{range .Arr}}{{wantInt .}}{{end}}").expect("array element as dot");
    check_page("{{range .Ch}}{{wantString .}}{{end}}").expect("channel element as dot");
    check_page("{{range $v := .Ch}}{{wantString $v}}{{end}}").expect("channel element");
    assert_eq!(
        kind_of("{{range $i, $v := .Ch}}{{end}}"),
        CheckErrorKind::RangeVariables {
            ty: "chan string".to_string()
        }
    );
    assert!(matches!(
        kind_of("{{range $v := .Ch}}{{wantInt $v}}{{end}}"),
        CheckErrorKind::ArgumentMismatch { .. }
    ));
}

#[test]
fn range_else_sees_the_outer_dot() {
    check_page("{{range .Tags}}{{wantString .}}{{else}}{{wantString .Title}}{{end}}")
        .expect("else uses the outer dot");
}

#[test]
fn range_over_iterators() {
    check_page("{{range $v := .Seq}}{{wantString $v}}{{end}}").expect("seq value");
    check_page("{{range $k, $v := .Pairs}}{{wantInt $k}}{{wantString $v}}{{end}}")
        .expect("seq2 key and value");
    check_page("{{range $k := .Pairs}}{{wantInt $k}}{{end}}").expect("seq2 single variable");
    assert!(matches!(
        kind_of("{{range $k, $v := .Seq}}{{end}}"),
        CheckErrorKind::RangeVariables { .. }
    ));
    assert!(matches!(
        kind_of("{{range $i, $v := .Count}}{{end}}"),
        CheckErrorKind::RangeVariables { .. }
    ));
}

#[test]
fn range_rejects_unsupported_kinds() {
    for source in ["{{range .Title}}{{end}}", "{{range .Fn}}{{end}}", "{{range 1.5}}{{end}}"] {
        assert!(
            matches!(kind_of(source), CheckErrorKind::CannotRange { .. }),
            "{source}"
        );
    }
}

#[test]
fn method_results_must_be_one_value_or_value_and_error() {
    assert_eq!(
        kind_of("{{.Nothing}}"),
        CheckErrorKind::ResultCount {
            name: "Nothing".to_string(),
            count: 0
        }
    );
    assert_eq!(
        kind_of("{{.Three}}"),
        CheckErrorKind::ResultCount {
            name: "Three".to_string(),
            count: 3
        }
    );
    assert_eq!(
        kind_of("{{.Broken}}"),
        CheckErrorKind::SecondResultNotError {
            name: "Broken".to_string(),
            ty: "string".to_string()
        }
    );
    assert_eq!(describe(check_page(r#"{{(.Lookup "a").Name}}"#)), "string");
}

#[test]
fn method_arguments_are_checked() {
    check_page("{{.F 1 2.5}}").expect("matching arguments");
    check_page("{{.F .Count 2}}").expect("untyped int converts to float64");
    assert!(matches!(
        kind_of(r#"{{.F "a" 1.0}}"#),
        CheckErrorKind::ArgumentMismatch { index: 0, .. }
    ));
    assert!(matches!(
        kind_of("{{.F 1}}"),
        CheckErrorKind::WrongArgCount { want: 2, got: 1, .. }
    ));
    assert!(matches!(
        kind_of("{{.Method.Name 1}}"),
        CheckErrorKind::NotAMethod { .. }
    ));
}

#[test]
fn identifier_paths_report_lookup_and_visibility_errors() {
    assert_eq!(
        kind_of("{{.Method.Foo}}"),
        CheckErrorKind::FieldNotFound {
            ident: "Foo".to_string(),
            ty: "app.Inner".to_string()
        }
    );
    assert!(matches!(
        kind_of("{{.title}}"),
        CheckErrorKind::Unexported { ref ident, .. } if ident == "title"
    ));
    assert!(matches!(
        kind_of("{{.Fn.X}}"),
        CheckErrorKind::ChainUnsupported { .. }
    ));
}

#[test]
fn map_fields_use_the_key_kind() {
    assert_eq!(describe(check_page("{{.Items.anything}}")), "int");
    assert!(matches!(
        kind_of("{{.Scores.first}}"),
        CheckErrorKind::MapKeyNotInteger { .. }
    ));
}

#[test]
fn non_functions_reject_arguments() {
    assert!(matches!(
        kind_of(r#"{{"x" 1}}"#),
        CheckErrorKind::NotAFunction { .. }
    ));
    assert!(matches!(
        kind_of("{{$ 1}}"),
        CheckErrorKind::NotAFunction { .. }
    ));
    assert_eq!(kind_of("{{nil}}"), CheckErrorKind::NilCommand);
}

#[test]
fn builtins_are_checked_when_not_registered() {
    assert_eq!(describe(check_page("{{index .Items \"a\"}}")), "int");
    assert_eq!(describe(check_page("{{slice .Tags 1 2}}")), "[]string");
    assert_eq!(describe(check_page("{{slice .Arr 0 1}}")), "[]int");
    assert_eq!(describe(check_page("{{len .Ch}}")), "int");
    assert_eq!(describe(check_page("{{len .Arr}}")), "int");
    assert_eq!(describe(check_page("{{eq .Count 1}}")), "bool");
    assert_eq!(describe(check_page("{{and .Title .Count}}")), "string");
    assert_eq!(describe(check_page("{{call .Fn 1}}")), "string");
    assert_eq!(
        kind_of("{{slice .Tags -1}}"),
        CheckErrorKind::NegativeIndex { index: -1 }
    );
    assert_eq!(
        kind_of("{{nope}}"),
        CheckErrorKind::UnknownFunction {
            name: "nope".to_string()
        }
    );
}

#[test]
fn overflowing_literals_are_rejected() {
    assert_eq!(
        kind_of("{{wantInt 18446744073709551615}}"),
        CheckErrorKind::Overflow {
            text: "18446744073709551615".to_string()
        }
    );
}

#[test]
fn template_invocations_check_the_named_tree() {
    check_page(r#"{{define "row"}}{{wantInt .}}{{end}}{{template "row" 1}}"#)
        .expect("constant downgraded to int");
    check_page(r#"{{define "row"}}{{wantString .Title}}{{end}}{{template "row" .}}"#)
        .expect("dot passed through");
    let err = check_page(r#"{{define "row"}}{{wantInt .}}{{end}}{{template "row" "s"}}"#)
        .expect_err("string into int");
    assert_eq!(err.name, "row");
    assert!(matches!(err.kind, CheckErrorKind::ArgumentMismatch { .. }));
    assert_eq!(
        kind_of(r#"{{template "missing"}}"#),
        CheckErrorKind::TemplateNotFound {
            name: "missing".to_string()
        }
    );
    assert!(matches!(
        kind_of(r#"{{define "row"}}{{.Title}}{{end}}{{template "row"}}"#),
        CheckErrorKind::FieldNotFound { .. }
    ));
}

#[test]
fn recursive_templates_terminate() {
    check_page(r#"{{define "tree"}}{{.Title}}{{with .Next}}{{template "tree" .}}{{end}}{{end}}{{template "tree" .}}"#)
        .expect("self reference through a pointer field");
}

#[test]
fn template_depth_is_bounded() {
    let source = r#"{{define "b"}}{{.}}{{end}}{{define "a"}}{{template "b" .}}{{end}}{{template "a" .}}"#;
    let shallow = CheckOptions::default().with_max_template_depth(1);
    let err = run(source, &page(), &shallow).expect_err("depth exceeded");
    assert_eq!(err.category(), ErrorCategory::Recursion);
    let deep = CheckOptions::default().with_max_template_depth(2);
    run(source, &page(), &deep).expect("within depth");
}

#[test]
fn pointer_data_reaches_pointer_methods() {
    let data = Type::pointer(page());
    let result = run(r#"{{(.Lookup "id").Name}}"#, &data, &CheckOptions::default())
        .expect("pointer receiver")
        .expect("result");
    assert!(matches!(result, Type::Basic(BasicKind::String)));
}

#[test]
fn errors_carry_location_and_context() {
    let err = check_page("text\n  {{.Missing}}").expect_err("missing field");
    assert_eq!(err.line, 2);
    assert_eq!(err.column, 5);
    assert_eq!(err.context, ".Missing");
    assert_eq!(err.code(), "T0101");
    assert_eq!(
        err.to_string(),
        "type check failed: page:2:5: executing \"page\" at <.Missing>: can't evaluate field Missing in type app.Page"
    );
}
