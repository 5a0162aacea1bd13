//! KX Draw - render named templates through a compiled renderer cache,
//! and export every render for client-side hydration.
mod cache;
mod compile;
mod config;
mod draw;
mod error;
pub mod hydrate;
mod instance;
mod log;
mod normalize;
mod partial;
mod region;
mod render;
mod store;
mod template;

#[cfg(test)]
mod fixture;

pub use cache::{CacheMap, RenderCache};
pub use compile::{compile, tree, Compiler, Handlebars, Program, Scope};
pub use config::{Builder, Config};
pub use draw::Draw;
pub use error::{Error, Result};
pub use instance::{InstanceId, InstanceStore};
pub use log::Diagnostic;
pub use normalize::normalize;
pub use partial::PartialRegistry;
pub use region::Region;
pub use render::{is_truthy, Renderer, PARTIAL_DEPTH_LIMIT};
pub use store::Store;
pub use template::TemplateStore;
