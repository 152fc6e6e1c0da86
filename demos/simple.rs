use voxel_config::{Config, ExternalClass, ResolutionContext, Value};

fn main() {
    let source = r#"
<Box -> window>
    width: 640
    title: 'Editor'
    Label -> header
        text: root.title + ' (' + str_width + ')'
        str_width: '640'
    Box -> body
        width: p.width - 40
"#;

    let context = ResolutionContext::new()
        .with_global(ExternalClass::new("Box"))
        .with_global(ExternalClass::new("Label"));

    let mut tree = match Config::new().with_context(context).load(source) {
        Ok(tree) => tree,
        Err(e) => {
            eprintln!("Failed to load configuration: {:?}", miette::Report::new(e));
            return;
        }
    };

    let Some(window) = tree.class("Box-window") else {
        return;
    };
    let Some(body) = tree.child(window, "Box") else {
        return;
    };
    tree.on_change(body, "width", |old, new| {
        println!("body width changed: {old} -> {new}");
        Ok(())
    });

    if let Err(e) = tree.set_field(window, "width", Value::Int(1024)) {
        eprintln!("Update failed: {e}");
    }

    match tree.to_json() {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Failed to serialize: {e}"),
    }
    print!("{}", tree.to_source());
}
