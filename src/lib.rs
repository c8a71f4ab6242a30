#![allow(clippy::uninlined_format_args)]

pub mod api;
pub mod app;
pub mod config;
pub mod data;
pub mod launch;
pub mod logging;
pub mod model;
pub mod pager;
pub mod resolver;
pub mod session;
pub mod storage;
pub mod text;
pub mod thread;
pub mod vote;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
