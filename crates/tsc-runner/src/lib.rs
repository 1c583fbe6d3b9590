//! node process runner exposing the project's TypeScript compiler.
//!
//! [`TscRunner`] starts `node` once, loads the `typescript` package the
//! project depends on and answers [`ts_service::TypeScript`] calls over a
//! JSON-lines protocol on stdin/stdout. Language services live in the same
//! process and receive only the files whose version changed.
//!
//! # Example
//!
//! ```ignore
//! use tsc_runner::TscRunner;
//! use ts_service::TypeScript;
//!
//! let runner = TscRunner::spawn("/path/to/project".into(), None)?;
//! println!("typescript {}", runner.version());
//! ```

mod protocol;
mod runner;
mod service;

pub use runner::{TscError, TscRunner};
