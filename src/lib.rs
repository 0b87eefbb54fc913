pub mod chain;
pub mod codec;
pub mod config;
pub mod constants;
pub mod error;
pub mod flow;
pub mod locator;
pub mod logger;
pub mod query;
pub mod submit;
pub mod subquery;
#[cfg(test)]
mod testing;
pub mod validator;

pub use query::{Callback, CompiledQuery, ProtocolVersion, QueryAssembler, QueryRequest};
pub use subquery::{account, header, receipt, tx, Declaration};
