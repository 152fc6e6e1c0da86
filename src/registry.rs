//! Lookup tables for classes that live outside the configuration text.

use indexmap::IndexMap;

use crate::value::Value;

/// Where a class name resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassOrigin {
    /// Declared earlier in the file being loaded.
    Local,
    Plugin,
    Global,
}

/// A class supplied by the host. Its defaults become static attributes of
/// every node that inherits from it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExternalClass {
    pub name: String,
    pub defaults: IndexMap<String, Value>,
}

impl ExternalClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            defaults: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn with_default(mut self, attr: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(attr.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClassTable {
    classes: IndexMap<String, ExternalClass>,
}

impl ClassTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, class: ExternalClass) {
        self.classes.insert(class.name.clone(), class);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ExternalClass> {
        self.classes.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }
}

impl FromIterator<ExternalClass> for ClassTable {
    fn from_iter<I: IntoIterator<Item = ExternalClass>>(iter: I) -> Self {
        let mut table = ClassTable::new();
        for class in iter {
            table.insert(class);
        }
        table
    }
}

/// The plugin and global class tables consulted after local declarations.
#[derive(Debug, Clone, Default)]
pub struct ResolutionContext {
    pub plugins: ClassTable,
    pub globals: ClassTable,
}

impl ResolutionContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_plugin(mut self, class: ExternalClass) -> Self {
        self.plugins.insert(class);
        self
    }

    #[must_use]
    pub fn with_global(mut self, class: ExternalClass) -> Self {
        self.globals.insert(class);
        self
    }

    /// Plugin first, then global.
    #[must_use]
    pub fn external(&self, name: &str) -> Option<(ClassOrigin, &ExternalClass)> {
        if let Some(class) = self.plugins.get(name) {
            return Some((ClassOrigin::Plugin, class));
        }
        self.globals.get(name).map(|class| (ClassOrigin::Global, class))
    }

    /// Resolves `name` local first, then plugin, then global.
    #[must_use]
    pub fn origin(&self, name: &str, is_local: impl Fn(&str) -> bool) -> Option<ClassOrigin> {
        if is_local(name) {
            return Some(ClassOrigin::Local);
        }
        self.external(name).map(|(origin, _)| origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_order() {
        let context = ResolutionContext::new()
            .with_plugin(ExternalClass::new("Button").with_default("width", 10_i64))
            .with_global(ExternalClass::new("Button"))
            .with_global(ExternalClass::new("Label"));

        assert_eq!(context.origin("Button", |_| false), Some(ClassOrigin::Plugin));
        assert_eq!(context.origin("Label", |_| false), Some(ClassOrigin::Global));
        assert_eq!(context.origin("Label", |n| n == "Label"), Some(ClassOrigin::Local));
        assert_eq!(context.origin("Missing", |_| false), None);

        let (_, button) = context.external("Button").unwrap();
        assert_eq!(button.defaults.get("width"), Some(&Value::Int(10)));
    }

    #[test]
    fn test_table_from_iter() {
        let table: ClassTable = ["A", "B"].into_iter().map(ExternalClass::new).collect();
        assert!(table.contains("A"));
        assert_eq!(table.names().collect::<Vec<_>>(), vec!["A", "B"]);
    }
}
