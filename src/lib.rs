//! Startup orchestration for the annotation sidebar.
//!
//! [`boot::Bootstrap`] resolves settings from the host document, starts the
//! optional diagnostics subsystems, selects an auth strategy, assembles the
//! component registry and route table, and attaches the application to its
//! anchor element. Navigation afterwards goes through
//! [`routes::Navigator`], which never builds a view before the route's
//! resolve gate has passed.

pub mod analytics;
pub mod auth;
pub mod boot;
pub mod cli;
pub mod command;
pub mod error;
pub mod host;
pub mod http;
pub mod livereload;
pub mod registry;
pub mod routes;
pub mod session;
pub mod settings;
pub mod streamer;
pub mod subsystems;

pub use boot::{Application, BootOptions, Bootstrap, Collaborators};
pub use error::{BootError, BootResult, GateError};
pub use settings::Settings;
