//! Scrawl engine: the configuration-driven interaction interpreter, the
//! browser capability interface and state persistence.
mod capability;
mod error;
mod interpreter;
mod loader;
mod persist;
mod static_dom;

pub use capability::{
    CapabilityError, DomRect, Driver, ElementId, LaunchOptions, NavigateOptions, Page,
    PageOptions, Session, TextFilter,
};
pub use error::ScrawlError;
pub use interpreter::Scrawler;
pub use loader::load_config;
pub use persist::write_state;
pub use static_dom::StaticDriver;
