use std::cell::RefCell;
use std::rc::Rc;
use voxel_config::{Config, EvalError, ExternalClass, ResolutionContext, Tree, Value};

const REACTIVE: &str = include_str!("ok/reactive.vox");

fn load_ok(source: &str) -> Tree {
    let context = ResolutionContext::new().with_global(ExternalClass::new("Box"));
    match Config::new().with_context(context).load(source) {
        Ok(tree) => tree,
        Err(err) => panic!("{:?}", miette::Report::new(err)),
    }
}

#[test]
fn test_parent_write_updates_child() {
    let mut tree = load_ok(REACTIVE);
    let p = tree.class("Box-p").unwrap();
    let kid = tree.node(p).ids()["kid"];

    assert_eq!(tree.get(kid, "d"), Some(&Value::Int(3)));
    tree.set_field(p, "a", Value::Int(10)).unwrap();
    assert_eq!(tree.get(kid, "d"), Some(&Value::Int(12)));
    // The cascade continues through dependents of `d`.
    assert_eq!(tree.get(kid, "e"), Some(&Value::Int(120)));

    tree.set_field(p, "b", Value::Int(-10)).unwrap();
    assert_eq!(tree.get(kid, "d"), Some(&Value::Int(0)));
    assert_eq!(tree.get(kid, "e"), Some(&Value::Int(0)));
}

#[test]
fn test_callbacks_see_every_cascaded_write() {
    let mut tree = load_ok(REACTIVE);
    let p = tree.class("Box-p").unwrap();
    let kid = tree.node(p).ids()["kid"];

    let log = Rc::new(RefCell::new(Vec::new()));
    for field in ["d", "e"] {
        let log = Rc::clone(&log);
        tree.on_change(kid, field, move |old, new| {
            log.borrow_mut().push(format!("{field}: {old} -> {new}"));
            Ok(())
        });
    }

    tree.set_field(p, "a", Value::Int(2)).unwrap();
    assert_eq!(*log.borrow(), vec!["d: 3 -> 4", "e: 30 -> 40"]);
}

#[test]
fn test_failing_callback_does_not_block_the_write() {
    let mut tree = load_ok(REACTIVE);
    let p = tree.class("Box-p").unwrap();
    let kid = tree.node(p).ids()["kid"];
    tree.on_change(kid, "d", |_, _| Err("listener failed".into()));

    tree.set_field(p, "a", Value::Int(5)).unwrap();
    assert_eq!(tree.get(kid, "d"), Some(&Value::Int(7)));
    assert_eq!(tree.get(kid, "e"), Some(&Value::Int(70)));
}

#[test]
fn test_failed_recompute_keeps_old_value() {
    let mut tree = load_ok("<Box -> a>\n    n: 1\n    inv: 10 // n\n");
    let a = tree.class("Box-a").unwrap();
    assert_eq!(tree.get(a, "inv"), Some(&Value::Int(10)));

    tree.set_field(a, "n", Value::Int(0)).unwrap();
    assert_eq!(tree.get(a, "n"), Some(&Value::Int(0)));
    assert_eq!(tree.get(a, "inv"), Some(&Value::Int(10)));

    tree.set_field(a, "n", Value::Int(5)).unwrap();
    assert_eq!(tree.get(a, "inv"), Some(&Value::Int(2)));
}

#[test]
fn test_aliases_resolve_across_the_root() {
    let text = "\
<Box -> app>
    scale: 2
    Box -> sidebar
        width: 100 * root.scale
    Box -> content
        width: 800 - sidebar.width
";
    let mut tree = load_ok(text);
    let app = tree.class("Box-app").unwrap();
    let content = tree.node(app).ids()["content"];
    assert_eq!(tree.get(content, "width"), Some(&Value::Int(600)));

    tree.set_field(app, "scale", Value::Int(3)).unwrap();
    assert_eq!(tree.get(content, "width"), Some(&Value::Int(500)));
}

#[test]
fn test_member_access_on_node_values() {
    let text = "<Box -> a>\n    target: c0\n    copy: target.v\n    Box -> b\n        v: 7\n";
    let mut tree = load_ok(text);
    let a = tree.class("Box-a").unwrap();
    assert_eq!(tree.get(a, "copy"), Some(&Value::Int(7)));
    assert_eq!(
        tree.execute(a, "copy").map(|v| v.type_name()),
        Ok("int")
    );
    assert!(matches!(
        tree.execute(a, "missing"),
        Err(EvalError::UnknownReference(_))
    ));
}
