use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("module '{module}' imports '{name}' but no linked module named '{module}' exports it")]
    MissingImport { module: String, name: String },
    #[error("module name '{0}' was given more than once")]
    DuplicateModuleName(String),
    #[error("at least one module is required to link")]
    NoModules,
}
