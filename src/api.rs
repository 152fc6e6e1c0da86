use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ConfigError, LoadError, SourceFile};
use crate::grammar::parse_lines;
use crate::node::Tree;
use crate::registry::ResolutionContext;
use crate::resolver::Resolver;

/// Per-load settings. Every field has a default, so a partial JSON or YAML
/// document deserializes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Tolerate failing attributes that carry no `safe`/`unsafe` annotation.
    pub unsafe_mode: bool,
    /// Name shown in diagnostics.
    pub source_name: String,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            unsafe_mode: false,
            source_name: "config.vox".to_string(),
        }
    }
}

/// Loads configuration text into a [`Tree`].
///
/// A load is all-or-nothing: the first fatal error aborts it and no tree is
/// returned. On success every declared attribute has been executed and the
/// reactive triggers between them are wired.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub options: LoadOptions,
    pub context: ResolutionContext,
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_options(mut self, options: LoadOptions) -> Self {
        self.options = options;
        self
    }

    /// Plugin and global classes available to the configuration.
    #[must_use]
    pub fn with_context(mut self, context: ResolutionContext) -> Self {
        self.context = context;
        self
    }

    /// Parses, resolves and executes `source`.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] pointing at the first offending line.
    pub fn load(&self, source: &str) -> Result<Tree, ConfigError> {
        let source = SourceFile::new(&self.options.source_name, source);
        let records = parse_lines(&source)?;
        let mut tree = Resolver::new(&self.context).resolve(&records, &source)?;
        log::debug!(
            "{}: {} lines, {} nodes",
            self.options.source_name,
            records.len(),
            tree.len()
        );
        tree.execute_all(self.options.unsafe_mode)
            .map_err(|(line, err)| ConfigError::new(err, line, &source))?;
        Ok(tree)
    }

    /// Reads a UTF-8 file and loads it. `\r\n` and lone `\r` line endings
    /// are normalised first. Diagnostics name the file unless
    /// [`LoadOptions::source_name`] was changed from its default.
    ///
    /// # Errors
    /// Returns [`LoadError::Io`] when the file cannot be read, otherwise any
    /// error of [`Config::load`].
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Tree, LoadError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let text = text.replace("\r\n", "\n").replace('\r', "\n");

        if self.options.source_name == LoadOptions::default().source_name {
            let mut options = self.options.clone();
            options.source_name = path.display().to_string();
            let config = Config {
                options,
                context: self.context.clone(),
            };
            return Ok(config.load(&text)?);
        }
        Ok(self.load(&text)?)
    }
}

/// Loads `source` with default options and no external classes.
///
/// # Errors
/// See [`Config::load`].
pub fn load(source: &str, source_name: &str) -> Result<Tree, ConfigError> {
    Config::new()
        .with_options(LoadOptions {
            source_name: source_name.to_string(),
            ..LoadOptions::default()
        })
        .load(source)
}
