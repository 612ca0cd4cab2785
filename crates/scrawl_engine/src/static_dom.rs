use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::capability::{
    CapabilityError, DomRect, Driver, ElementId, LaunchOptions, NavigateOptions, Page,
    PageOptions, Session, TextFilter,
};
use scrawl_core::{ClickOptions, EngineKind};

/// A capability implementation over static documents: pages are fetched
/// over HTTP (or seeded in memory) and parsed with `scraper`; no scripts
/// run. A URL may be seeded with an ordered list of snapshots, and
/// dispatching any action on an element advances the page to its next
/// snapshot, which is enough to model pagination and enable/disable flows.
///
/// Swipes are accepted (the mouse primitives are no-ops) and screenshots
/// are unsupported.
#[derive(Debug, Default, Clone)]
pub struct StaticDriver {
    documents: HashMap<String, Vec<String>>,
}

impl StaticDriver {
    /// HTTP-only driver: every navigation fetches the URL.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(documents: HashMap<String, Vec<String>>) -> Self {
        Self { documents }
    }

    /// Seeds one URL with successive document snapshots.
    pub fn seed(
        mut self,
        url: impl Into<String>,
        snapshots: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.documents
            .insert(url.into(), snapshots.into_iter().map(Into::into).collect());
        self
    }
}

#[async_trait(?Send)]
impl Driver for StaticDriver {
    async fn launch(
        &self,
        _engine: EngineKind,
        _options: LaunchOptions,
    ) -> Result<Box<dyn Session>, CapabilityError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| CapabilityError::Http(err.to_string()))?;
        Ok(Box::new(StaticSession {
            documents: Arc::new(self.documents.clone()),
            client,
        }))
    }
}

struct StaticSession {
    documents: Arc<HashMap<String, Vec<String>>>,
    client: reqwest::Client,
}

#[async_trait(?Send)]
impl Session for StaticSession {
    async fn open_page(&mut self, _options: PageOptions) -> Result<Box<dyn Page>, CapabilityError> {
        Ok(Box::new(StaticPage {
            documents: self.documents.clone(),
            client: self.client.clone(),
            url: String::new(),
            snapshots: Vec::new(),
            snapshot_index: 0,
            doc: None,
            elements: Vec::new(),
            generation: 0,
        }))
    }

    async fn close_extra_pages(&mut self) -> Result<(), CapabilityError> {
        // A static session never opens extra pages.
        Ok(())
    }

    async fn close(&mut self) -> Result<(), CapabilityError> {
        Ok(())
    }
}

struct StaticPage {
    documents: Arc<HashMap<String, Vec<String>>>,
    client: reqwest::Client,
    url: String,
    snapshots: Vec<String>,
    snapshot_index: usize,
    doc: Option<Html>,
    /// Registered element handles: (document generation, node id).
    elements: Vec<(u64, ego_tree::NodeId)>,
    generation: u64,
}

impl StaticPage {
    fn set_document(&mut self, html: &str) {
        self.doc = Some(Html::parse_document(html));
        self.generation += 1;
    }

    fn advance_snapshot(&mut self) {
        if self.snapshot_index + 1 < self.snapshots.len() {
            self.snapshot_index += 1;
            let html = self.snapshots[self.snapshot_index].clone();
            self.set_document(&html);
        }
    }

    fn register(&mut self, node_id: ego_tree::NodeId) -> ElementId {
        self.elements.push((self.generation, node_id));
        self.elements.len() as ElementId
    }

    fn element(&self, id: ElementId) -> Result<ElementRef<'_>, CapabilityError> {
        let index = (id as usize)
            .checked_sub(1)
            .ok_or(CapabilityError::Detached(id))?;
        let (generation, node_id) = *self
            .elements
            .get(index)
            .ok_or(CapabilityError::Detached(id))?;
        if generation != self.generation {
            return Err(CapabilityError::Detached(id));
        }
        let doc = self.doc.as_ref().ok_or(CapabilityError::Detached(id))?;
        doc.tree
            .get(node_id)
            .and_then(ElementRef::wrap)
            .ok_or(CapabilityError::Detached(id))
    }

    fn document(&self) -> Result<&Html, CapabilityError> {
        self.doc.as_ref().ok_or(CapabilityError::Navigation {
            url: self.url.clone(),
            message: "no document loaded".into(),
        })
    }

    fn matches(
        &self,
        scope: Option<ElementId>,
        selector: &str,
        filter: &TextFilter,
    ) -> Result<Vec<ego_tree::NodeId>, CapabilityError> {
        let parsed = Selector::parse(selector).map_err(|err| CapabilityError::InvalidSelector {
            selector: selector.to_string(),
            message: err.to_string(),
        })?;
        let matched: Vec<ElementRef<'_>> = match scope {
            Some(id) => self.element(id)?.select(&parsed).collect(),
            None => self.document()?.select(&parsed).collect(),
        };
        let mut node_ids = Vec::new();
        for element in matched {
            if let Some(needle) = &filter.has_text {
                if !element_text(element).contains(needle.as_str()) {
                    continue;
                }
            }
            if let Some(needle) = &filter.has_not_text {
                if element_text(element).contains(needle.as_str()) {
                    continue;
                }
            }
            node_ids.push(element.id());
        }
        Ok(node_ids)
    }
}

#[async_trait(?Send)]
impl Page for StaticPage {
    async fn navigate(
        &mut self,
        url: &str,
        options: NavigateOptions,
    ) -> Result<(), CapabilityError> {
        if let Some(snapshots) = self.documents.get(url).filter(|list| !list.is_empty()) {
            self.snapshots = snapshots.clone();
            self.snapshot_index = 0;
            let html = self.snapshots[0].clone();
            self.set_document(&html);
            self.url = url.to_string();
            return Ok(());
        }

        let parsed = Url::parse(url).map_err(|err| CapabilityError::Navigation {
            url: url.to_string(),
            message: err.to_string(),
        })?;
        let mut request = self.client.get(parsed);
        if let Some(ms) = options.timeout_ms {
            request = request.timeout(Duration::from_millis(ms));
        }
        let response = request
            .send()
            .await
            .map_err(|err| CapabilityError::Navigation {
                url: url.to_string(),
                message: err.to_string(),
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(CapabilityError::Navigation {
                url: url.to_string(),
                message: status.to_string(),
            });
        }
        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|err| CapabilityError::Navigation {
                url: url.to_string(),
                message: err.to_string(),
            })?;
        self.snapshots = vec![body.clone()];
        self.snapshot_index = 0;
        self.set_document(&body);
        self.url = final_url;
        Ok(())
    }

    fn current_url(&self) -> String {
        self.url.clone()
    }

    async fn locate(
        &mut self,
        scope: Option<ElementId>,
        selector: &str,
        filter: &TextFilter,
    ) -> Result<Vec<ElementId>, CapabilityError> {
        let node_ids = self.matches(scope, selector, filter)?;
        Ok(node_ids
            .into_iter()
            .map(|node_id| self.register(node_id))
            .collect())
    }

    async fn wait_for(
        &mut self,
        scope: Option<ElementId>,
        selector: &str,
        filter: &TextFilter,
        timeout_ms: u64,
    ) -> Result<(), CapabilityError> {
        // A static document never changes on its own; either the match is
        // already there or the wait can only time out.
        if self.matches(scope, selector, filter)?.is_empty() {
            return Err(CapabilityError::Timeout {
                selector: selector.to_string(),
                timeout_ms,
            });
        }
        Ok(())
    }

    async fn is_visible(&self, id: ElementId) -> Result<bool, CapabilityError> {
        Ok(self.element(id).is_ok())
    }

    async fn is_disabled(&self, id: ElementId) -> Result<bool, CapabilityError> {
        let element = self.element(id)?;
        let value = element.value();
        Ok(value.attr("disabled").is_some() || value.attr("aria-disabled") == Some("true"))
    }

    async fn bounding_rect(&self, id: ElementId) -> Result<DomRect, CapabilityError> {
        // No layout engine; report a degenerate rectangle at the origin.
        self.element(id)?;
        Ok(DomRect::default())
    }

    async fn scroll_into_view(&mut self, id: ElementId) -> Result<(), CapabilityError> {
        self.element(id)?;
        Ok(())
    }

    async fn click(
        &mut self,
        id: ElementId,
        _options: &ClickOptions,
    ) -> Result<(), CapabilityError> {
        self.element(id)?;
        self.advance_snapshot();
        Ok(())
    }

    async fn dispatch_event(&mut self, id: ElementId, _event: &str) -> Result<(), CapabilityError> {
        self.element(id)?;
        self.advance_snapshot();
        Ok(())
    }

    async fn mouse_move(&mut self, _x: f64, _y: f64) -> Result<(), CapabilityError> {
        Ok(())
    }

    async fn mouse_down(&mut self) -> Result<(), CapabilityError> {
        Ok(())
    }

    async fn mouse_up(&mut self) -> Result<(), CapabilityError> {
        Ok(())
    }

    async fn text(
        &self,
        id: ElementId,
        child: Option<u32>,
    ) -> Result<Option<String>, CapabilityError> {
        let element = self.element(id)?;
        Ok(match child {
            None => Some(element_text(element)),
            Some(nth) => nth_child(element, nth).map(node_text),
        })
    }

    async fn attribute(
        &self,
        id: ElementId,
        name: &str,
        child: Option<u32>,
    ) -> Result<Option<String>, CapabilityError> {
        let element = self.element(id)?;
        Ok(match child {
            None => element.value().attr(name).map(str::to_string),
            Some(nth) => nth_child(element, nth)
                .and_then(ElementRef::wrap)
                .and_then(|child| child.value().attr(name).map(str::to_string)),
        })
    }

    async fn screenshot(&mut self, _path: &str, _full_page: bool) -> Result<(), CapabilityError> {
        Err(CapabilityError::Unsupported("screenshot"))
    }

    async fn close(&mut self) -> Result<(), CapabilityError> {
        self.doc = None;
        self.elements.clear();
        Ok(())
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect()
}

fn nth_child(element: ElementRef<'_>, nth: u32) -> Option<NodeRef<'_, Node>> {
    // Child node indices are 1-based and count text nodes too.
    element.children().nth(nth.checked_sub(1)? as usize)
}

fn node_text(node: NodeRef<'_, Node>) -> String {
    let mut out = String::new();
    collect_text(node, &mut out);
    out
}

fn collect_text(node: NodeRef<'_, Node>, out: &mut String) {
    match node.value() {
        Node::Text(text) => out.push_str(text),
        _ => {
            for child in node.children() {
                collect_text(child, out);
            }
        }
    }
}
