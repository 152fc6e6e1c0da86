//! Compiler and reactive runtime for the Voxel tree-configuration language.
//!
//! ```text
//! <Panel(Box(base)) -> main>
//!     width: 200
//!     Label -> title
//!         text: 'Main panel'
//!         size: p.width / 2
//! ```
//!
//! [`Config::load`] turns text like the above into a [`Tree`]: it checks the
//! line grammar, resolves class declarations against local, plugin and global
//! classes, then executes every attribute. Attributes that reference other
//! nodes stay live: [`Tree::set_field`] recomputes everything that depends on
//! the written field.

pub mod analyzer;
pub mod api;
pub mod ast;
pub mod error;
mod evaluator;
pub mod grammar;
pub mod interp;
pub mod lexer;
pub mod node;
pub mod parser;
pub mod registry;
mod resolver;
mod serialization;
pub mod syntax;
pub mod utils;
pub mod value;

pub use api::{load, Config, LoadOptions};
pub use error::{ConfigError, ErrorKind, EvalError, LoadError, ResolveError, SyntaxError};
pub use node::{AttrState, Attribute, Callback, Node, NodeId, Tree, Trigger};
pub use registry::{ClassOrigin, ClassTable, ExternalClass, ResolutionContext};
pub use serialization::{Data, NodeSnapshot};
pub use value::Value;
