use miette::Diagnostic;
use voxel_config::{
    Config, ConfigError, ErrorKind, ExternalClass, LoadOptions, ResolutionContext, ResolveError,
};

fn config() -> Config {
    let context = ResolutionContext::new()
        .with_global(ExternalClass::new("Box"))
        .with_global(ExternalClass::new("Label"));
    Config::new().with_context(context)
}

fn load_err(source: &str) -> ConfigError {
    match config().load(source) {
        Ok(_) => panic!("expected an error for:\n{source}"),
        Err(err) => err,
    }
}

#[test]
fn test_redefining_an_external_class() {
    let err = load_err("<Box(Label)>\n");
    assert_eq!(err.record(), (1, "<Box(Label)>", "ExternalClassRedefined"));
    assert_eq!(
        err.kind,
        ErrorKind::Resolve(ResolveError::ExternalClassRedefined("Box".to_string()))
    );
}

#[test]
fn test_alias_defined_in_base() {
    let text = "\
<Box -> card>
    Label -> title
<Box -> page>
    Box(card) -> main
    Label -> title
";
    let err = load_err(text);
    assert_eq!(err.record(), (4, "    Box(card) -> main", "AliasDefinedInBase"));
}

#[test]
fn test_alias_defined_in_a_base_of_the_base() {
    let text = "\
<Box -> card>
    Label -> title
<Panel(Box(card)) -> page>
<Box -> site>
    Panel(page) -> main
    Label -> title
";
    let err = load_err(text);
    assert_eq!(err.record(), (5, "    Panel(page) -> main", "AliasDefinedInBase"));
    assert_eq!(
        err.kind,
        ErrorKind::Resolve(ResolveError::AliasDefinedInBase("title".to_string()))
    );
}

#[test]
fn test_nested_alias_must_exist() {
    let err = load_err("<Box -> page>\n    Box(nope) -> main\n");
    assert_eq!((err.line, err.message_code()), (2, "AliasMustExist"));
}

#[test]
fn test_reactive_cycle_across_nodes() {
    let text = "\
<Box -> a>
    w: c0.w
    Box -> b
        w: p.w
";
    let err = load_err(text);
    assert_eq!(err.message_code(), "ReactiveCycle");
    assert_eq!(err.line, 2);
}

#[test]
fn test_unsafe_mode_from_options_file() {
    let text = "<Box -> a>\n    w: missing + 1\n    h: 2\n";
    assert_eq!(load_err(text).message_code(), "UnknownReference");

    let options: LoadOptions = serde_yaml::from_str("unsafe_mode: true\n").unwrap();
    let tree = config().with_options(options).load(text).unwrap();
    let a = tree.class("Box-a").unwrap();
    assert!(tree.get(a, "w").is_none());
    assert!(tree.get(a, "h").is_some());
}

#[test]
fn test_errors_render_with_help() {
    let err = load_err("<Box -> a>\n    Label\n<Label -> a>\n    Missing\n");
    assert_eq!(err.message_code(), "ClassNotFound");
    let help = err.help().map(|h| h.to_string()).unwrap_or_default();
    assert!(help.contains("plugin table"));
    let rendered = format!("{:?}", miette::Report::new(err));
    assert!(rendered.contains("class `Missing` not found"));
    assert!(rendered.contains("config.vox"));
}

#[test]
fn test_oversized_repetition_is_an_evaluation_error() {
    let text = "<Box -> a>\n    w: 'ab' * 9223372036854775807\n    h: 2\n";
    let err = load_err(text);
    assert_eq!(
        err.record(),
        (2, "    w: 'ab' * 9223372036854775807", "ExpressionRuntimeError")
    );

    let text = "<Box -> a>\n    w(unsafe): [0] * 9223372036854775807\n    h: 2\n";
    let tree = config().load(text).unwrap();
    let a = tree.class("Box-a").unwrap();
    assert!(tree.get(a, "w").is_none());
    assert!(tree.get(a, "h").is_some());
}

#[test]
fn test_integer_literal_out_of_range() {
    let err = load_err("<Box -> a>\n    w(int): 99999999999999999999\n");
    assert_eq!((err.line, err.message_code()), (2, "ExpressionRuntimeError"));
    assert!(err.to_string().contains("does not fit in 64 bits"));
}
