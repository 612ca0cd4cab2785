use async_trait::async_trait;
use thiserror::Error;

use scrawl_core::{ClickOptions, EngineKind, ReadyState};

/// Opaque handle to a located element. Handles stay valid until the page
/// navigates or the document is otherwise replaced.
pub type ElementId = u64;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DomRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaunchOptions {
    pub headless: bool,
    pub slowdown_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageOptions {
    pub viewport: Option<[u32; 2]>,
    pub blocked_resources: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NavigateOptions {
    pub ready_on: Option<ReadyState>,
    pub timeout_ms: Option<u64>,
}

/// Text filters applied while locating elements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextFilter {
    pub has_text: Option<String>,
    pub has_not_text: Option<String>,
}

#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },
    #[error("invalid selector `{selector}`: {message}")]
    InvalidSelector { selector: String, message: String },
    #[error("timed out after {timeout_ms}ms waiting for `{selector}`")]
    Timeout { selector: String, timeout_ms: u64 },
    #[error("element {0} is no longer attached to the document")]
    Detached(ElementId),
    #[error("operation not supported by this driver: {0}")]
    Unsupported(&'static str),
    #[error("http error: {0}")]
    Http(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Entry point of the browser-automation collaborator.
#[async_trait(?Send)]
pub trait Driver {
    async fn launch(
        &self,
        engine: EngineKind,
        options: LaunchOptions,
    ) -> Result<Box<dyn Session>, CapabilityError>;
}

/// One browser context. The interpreter opens one page at a time and
/// closes the session on every exit path.
#[async_trait(?Send)]
pub trait Session {
    async fn open_page(&mut self, options: PageOptions) -> Result<Box<dyn Page>, CapabilityError>;
    /// Closes pages the site opened beyond the one driven by the
    /// interpreter.
    async fn close_extra_pages(&mut self) -> Result<(), CapabilityError>;
    async fn close(&mut self) -> Result<(), CapabilityError>;
}

/// The single active page handle, exclusively owned by the interpreter for
/// the duration of a page visit.
#[async_trait(?Send)]
pub trait Page {
    async fn navigate(
        &mut self,
        url: &str,
        options: NavigateOptions,
    ) -> Result<(), CapabilityError>;
    fn current_url(&self) -> String;

    /// Locates matches for `selector` under `scope` (the whole document
    /// when `None`), in document order.
    async fn locate(
        &mut self,
        scope: Option<ElementId>,
        selector: &str,
        filter: &TextFilter,
    ) -> Result<Vec<ElementId>, CapabilityError>;

    /// Blocks until `selector` has a match or the timeout elapses.
    async fn wait_for(
        &mut self,
        scope: Option<ElementId>,
        selector: &str,
        filter: &TextFilter,
        timeout_ms: u64,
    ) -> Result<(), CapabilityError>;

    async fn is_visible(&self, id: ElementId) -> Result<bool, CapabilityError>;
    async fn is_disabled(&self, id: ElementId) -> Result<bool, CapabilityError>;
    async fn bounding_rect(&self, id: ElementId) -> Result<DomRect, CapabilityError>;
    async fn scroll_into_view(&mut self, id: ElementId) -> Result<(), CapabilityError>;

    async fn click(&mut self, id: ElementId, options: &ClickOptions)
        -> Result<(), CapabilityError>;
    async fn dispatch_event(&mut self, id: ElementId, event: &str)
        -> Result<(), CapabilityError>;
    async fn mouse_move(&mut self, x: f64, y: f64) -> Result<(), CapabilityError>;
    async fn mouse_down(&mut self) -> Result<(), CapabilityError>;
    async fn mouse_up(&mut self) -> Result<(), CapabilityError>;

    /// Text content of the element, or of its 1-based `child` node.
    async fn text(&self, id: ElementId, child: Option<u32>)
        -> Result<Option<String>, CapabilityError>;
    /// Attribute value of the element, or of its 1-based `child` node.
    async fn attribute(
        &self,
        id: ElementId,
        name: &str,
        child: Option<u32>,
    ) -> Result<Option<String>, CapabilityError>;

    async fn screenshot(&mut self, path: &str, full_page: bool) -> Result<(), CapabilityError>;
    async fn close(&mut self) -> Result<(), CapabilityError>;
}
