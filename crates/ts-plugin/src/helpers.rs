//! The synthetic module supplying runtime helpers to emitted code.
//!
//! Helper emission is off in the compiler; instead every transpiled module
//! imports what it needs from [`HELPERS_ID`], which the plugin resolves and
//! loads itself.

/// Id of the helper module. The leading NUL keeps other plugins and source
/// maps away from it.
pub const HELPERS_ID: &str = "\0typescript-helpers";

/// Built-in helper implementations.
pub const HELPERS_SOURCE: &str = include_str!("typescript-helpers.js");

/// Helpers imported by every transpiled module.
pub const HELPER_NAMES: [&str; 8] = [
    "__assign",
    "__awaiter",
    "__extends",
    "__decorate",
    "__metadata",
    "__param",
    "__rest",
    "__generator",
];

/// The import statement appended to transpiled output.
pub fn helpers_import() -> String {
    format!(
        "\nimport {{ {} }} from '{}';",
        HELPER_NAMES.join(", "),
        HELPERS_ID
    )
}
