#[macro_use]
mod macros;
pub(crate) mod cache;
pub(crate) mod common;
pub(crate) mod cutils;
pub(crate) mod danger;
pub(crate) mod environ;
pub(crate) mod log;
pub(crate) mod parser;
pub(crate) mod policy;
pub(crate) mod rules;
pub(crate) mod system;

mod shell;

pub use shell::main as sudosh_main;
