use std::io::Write;
use voxel_config::{
    load, AttrState, Config, ExternalClass, LoadError, NodeId, ResolutionContext, Tree, Value,
};

const WIDGETS: &str = include_str!("ok/widgets.vox");
const INHERIT: &str = include_str!("ok/inherit.vox");
const LITERALS: &str = include_str!("ok/literals.vox");

fn context() -> ResolutionContext {
    ResolutionContext::new()
        .with_global(ExternalClass::new("Box"))
        .with_global(ExternalClass::new("Label"))
        .with_plugin(ExternalClass::new("Button").with_default("width", 80_i64))
}

fn load_ok(source: &str) -> Tree {
    match Config::new().with_context(context()).load(source) {
        Ok(tree) => tree,
        Err(err) => panic!("{:?}", miette::Report::new(err)),
    }
}

fn names(tree: &Tree) -> Vec<(String, usize)> {
    tree.walk(true)
        .map(|(id, depth)| (tree.node(id).name().to_string(), depth))
        .collect()
}

#[test]
fn test_global_class_root() {
    let context = ResolutionContext::new().with_global(ExternalClass::new("T"));
    let tree = Config::new().with_context(context).load("<T>\n").unwrap();
    let roots = tree.node(tree.root()).children();
    assert_eq!(roots.len(), 1);
    assert_eq!(tree.node(roots[0]).name(), "T");
}

#[test]
fn test_widgets_values() {
    let tree = load_ok(WIDGETS);
    let form = tree.class("Box-form").unwrap();
    let title = tree.node(form).ids()["title"];
    let submit = tree.node(form).ids()["submit"];

    assert_eq!(tree.get(form, "height"), Some(&Value::Float(100.0)));
    assert_eq!(tree.get(title, "text"), Some(&Value::Str("Name: Login".into())));
    assert_eq!(tree.get(submit, "width"), Some(&Value::Int(180)));
    assert_eq!(tree.get(submit, "offset"), Some(&Value::Int(4)));
    assert_eq!(tree.node(title).attrs()["visible"].state, AttrState::Static);
    assert_eq!(tree.node(submit).attrs()["width"].state, AttrState::Dynamic);
    assert_eq!(
        tree.node(title).triggers("visible")[0].reverse_path,
        "self.p.c1"
    );
}

#[test]
fn test_walk_order_and_depth() {
    let tree = load_ok(WIDGETS);
    assert_eq!(
        names(&tree),
        vec![
            ("root".to_string(), 0),
            ("Box-form".to_string(), 1),
            ("Label".to_string(), 2),
            ("Button".to_string(), 2),
        ]
    );
    // Each walk is a fresh traversal.
    assert_eq!(tree.walk(false).count(), 3);
    assert_eq!(tree.walk(false).count(), 3);
}

#[test]
fn test_multiple_inheritance() {
    let tree = load_ok(INHERIT);
    let main = tree.class("Panel-main").unwrap();
    let base = tree.class("Box-base").unwrap();
    let extra = tree.class("Box-extra").unwrap();

    assert_eq!(tree.node(main).bases(), &[base, extra]);
    assert_eq!(tree.get(main, "area"), Some(&Value::Int(96)));
    assert_eq!(tree.get(main, "h"), Some(&Value::Int(8)));
    assert_eq!(tree.get(main, "depth"), Some(&Value::Int(3)));
    assert_eq!(
        tree.get(main, "tags"),
        Some(&Value::List(vec![Value::Str("a".into()), Value::Str("b".into())]))
    );
    assert!(tree.is_instance(main, "Box-base"));
    assert!(tree.is_instance(main, "Panel"));

    let mut declared: Vec<&str> = tree.classes().map(|(name, _)| name).collect();
    declared.sort_unstable();
    assert_eq!(declared, vec!["Box", "Box-base", "Box-extra", "Panel-main"]);
}

#[test]
fn test_literals() {
    let tree = load_ok(LITERALS);
    let data = tree.class("Box-data").unwrap();
    assert_eq!(tree.get(data, "ratio"), Some(&Value::Float(-0.5)));
    assert_eq!(
        tree.get(data, "flags"),
        Some(&Value::Tuple(vec![
            Value::Bool(true),
            Value::Bool(false),
            Value::None
        ]))
    );
    assert_eq!(tree.get(data, "note"), Some(&Value::Str("multi: line".into())));
    for attr in tree.node(data).attrs().values() {
        assert_eq!(attr.state, AttrState::Static);
        assert!(attr.analysis.is_constant());
    }
}

#[test]
fn test_round_trip() {
    let tree = load_ok(WIDGETS);
    let text = tree.to_source();
    let again = load_ok(&text);

    assert_eq!(names(&tree), names(&again));
    let pairs: Vec<(NodeId, NodeId)> = tree
        .walk(false)
        .map(|(id, _)| id)
        .zip(again.walk(false).map(|(id, _)| id))
        .collect();
    for (a, b) in pairs {
        for (name, attr) in tree.node(a).attrs() {
            if attr.state == AttrState::Static {
                assert_eq!(tree.get(a, name), again.get(b, name), "{name}");
            }
        }
        assert_eq!(
            tree.node(a).attrs().keys().collect::<Vec<_>>(),
            again.node(b).attrs().keys().collect::<Vec<_>>()
        );
    }
    assert_eq!(again.to_source(), text);
}

#[test]
fn test_snapshot_formats() {
    let tree = load_ok(INHERIT);
    let json: serde_json::Value = serde_json::from_str(&tree.to_json().unwrap()).unwrap();
    assert_eq!(json[0]["name"], "Box-base");
    assert_eq!(json[0]["attributes"]["tags"], serde_json::json!(["a", "b"]));
    assert_eq!(json[2]["name"], "Panel-main");
    assert_eq!(json[2]["attributes"]["area"], 96);
    // Inherited attributes are not part of the snapshot.
    assert!(json[2]["attributes"].get("h").is_none());

    let yaml = tree.to_yaml().unwrap();
    assert!(yaml.contains("name: Panel-main"));
}

#[test]
fn test_load_file_normalises_line_endings() {
    let mut file = tempfile::Builder::new().suffix(".vox").tempfile().unwrap();
    file.write_all(b"<Box -> a>\r\n    w: 1\r\n    h: w + 1\r").unwrap();

    let tree = Config::new()
        .with_context(context())
        .load_file(file.path())
        .unwrap();
    let a = tree.class("Box-a").unwrap();
    assert_eq!(tree.get(a, "h"), Some(&Value::Int(2)));
}

#[test]
fn test_load_file_errors() {
    let missing = Config::new().load_file("/definitely/not/here.vox");
    assert!(matches!(missing, Err(LoadError::Io { .. })));

    let mut file = tempfile::Builder::new().suffix(".vox").tempfile().unwrap();
    file.write_all(b"<Missing>\n").unwrap();
    match Config::new().load_file(file.path()) {
        Err(LoadError::Config(err)) => {
            assert_eq!(err.message_code(), "ClassNotFound");
            let rendered = format!("{:?}", miette::Report::new(err));
            let file_name = file.path().file_name().unwrap().to_string_lossy();
            assert!(rendered.contains(file_name.as_ref()));
        }
        other => panic!("expected a config error, got {other:?}"),
    }
}

#[test]
fn test_empty_source() {
    let tree = load("# nothing here\n\n", "empty.vox").unwrap();
    assert!(tree.is_empty());
    assert_eq!(tree.walk(false).count(), 0);
}
