use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time::sleep;

use crate::capability::{
    CapabilityError, Driver, ElementId, LaunchOptions, NavigateOptions, Page, PageOptions,
    Session, TextFilter,
};
use crate::error::ScrawlError;
use crate::persist;
use scrawl_core::{
    apply_utils, join, parse_value, resolve_range, scan_embedded_tokens, ActionDescriptor, Count,
    Ctx, DataHarvest, HarvestValue, LinkHarvest, LinkRecord, Max, NodeDescriptor, NodeEntry,
    PageLink, PageLinkSource, Probe, RepeatPolicy, RunState, ScrawlConfig, TokenKind, VAR_NODE,
};
use scrawl_logging::{scrawl_debug, scrawl_info, scrawl_warn};

/// The configuration-driven interaction engine. Walks the page/node
/// configuration tree, drives the browser capability, and accumulates
/// results into the run state.
///
/// A run is strictly sequential: one session, one page in flight, pages
/// and nodes in declared order. The session is released on every exit
/// path before an error is reported.
pub struct Scrawler {
    config: ScrawlConfig,
    driver: Box<dyn Driver>,
    state: RunState,
}

impl Scrawler {
    /// Validates the configuration; no browser resource is touched here.
    pub fn new(config: ScrawlConfig, driver: Box<dyn Driver>) -> Result<Self, ScrawlError> {
        config.validate()?;
        Ok(Self {
            config,
            driver,
            state: RunState::new(),
        })
    }

    /// Blocking entry point: drives the run to completion on a
    /// current-thread runtime.
    pub fn go(&mut self) -> Result<(), ScrawlError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.run())
    }

    /// Runs the whole configuration. The session is closed whether the
    /// run succeeds or fails.
    pub async fn run(&mut self) -> Result<(), ScrawlError> {
        let browser = self.config.browser.clone();
        let mut session = self
            .driver
            .launch(
                browser.engine,
                LaunchOptions {
                    headless: !browser.show,
                    slowdown_ms: browser.slowdown,
                },
            )
            .await?;
        let outcome = self.scrawl(session.as_mut()).await;
        if self.config.logging {
            scrawl_info!("closing browser");
        }
        let closed = session.close().await;
        outcome?;
        closed?;
        Ok(())
    }

    /// The scraped data tree.
    pub fn data(&self) -> &Value {
        self.state.data()
    }

    /// The harvested link registries.
    pub fn links(&self) -> &BTreeMap<String, Vec<LinkRecord>> {
        self.state.links()
    }

    /// Serializes the data tree to JSON or YAML at `path`.
    pub fn write_data(&self, path: impl AsRef<Path>) -> Result<PathBuf, ScrawlError> {
        if self.config.logging {
            scrawl_info!("outputting data to {}", path.as_ref().display());
        }
        persist::write_state(path.as_ref(), self.state.data())
    }

    /// Serializes the link registries to JSON or YAML at `path`.
    pub fn write_links(&self, path: impl AsRef<Path>) -> Result<PathBuf, ScrawlError> {
        if self.config.logging {
            scrawl_info!("outputting links to {}", path.as_ref().display());
        }
        persist::write_state(path.as_ref(), &self.state.links_value())
    }

    async fn scrawl(&mut self, session: &mut dyn Session) -> Result<(), ScrawlError> {
        let browser = self.config.browser.clone();
        let pages = self.config.scrawl.clone();
        let logging = self.config.logging;

        for page_cfg in &pages {
            let targets = self.resolve_page_targets(&page_cfg.link);
            for target in targets {
                let mut page = session
                    .open_page(PageOptions {
                        viewport: browser.viewport,
                        blocked_resources: browser.block.clone(),
                    })
                    .await?;
                if logging {
                    scrawl_info!("opening a new page: {}", target.url);
                }
                page.navigate(
                    &target.url,
                    NavigateOptions {
                        ready_on: browser.ready_on,
                        timeout_ms: browser.timeout,
                    },
                )
                .await?;
                self.state
                    .reset_vars_for_page(target.metadata, &page.current_url());

                match &page_cfg.repeat {
                    None => self.interact(page.as_mut(), &page_cfg.nodes).await?,
                    Some(RepeatPolicy::Times(times)) => {
                        for _ in 0..*times {
                            self.interact(page.as_mut(), &page_cfg.nodes).await?;
                        }
                    }
                    Some(RepeatPolicy::While(probe)) => {
                        while self.should_repeat(page.as_mut(), probe).await? {
                            self.interact(page.as_mut(), &page_cfg.nodes).await?;
                        }
                    }
                }

                if logging {
                    scrawl_info!("closing page: {}", target.url);
                }
                page.close().await?;
                session.close_extra_pages().await?;
            }
        }
        Ok(())
    }

    /// Resolves a page-link source into a concrete ordered target list.
    /// `$name` references read the current contents of that link registry,
    /// which is how one stage's harvested links become the next stage's
    /// page visits.
    fn resolve_page_targets(&self, link: &PageLink) -> Vec<LinkRecord> {
        let sources: Vec<&PageLinkSource> = match link {
            PageLink::One(source) => vec![source],
            PageLink::Many(sources) => sources.iter().collect(),
        };
        let mut targets = Vec::new();
        for source in sources {
            match source {
                PageLinkSource::Record(record) => targets.push(record.clone()),
                PageLinkSource::Url(url) => match url.strip_prefix('$') {
                    Some(name) => targets.extend(self.state.named_links(name).iter().cloned()),
                    None => targets.push(LinkRecord::bare(url.clone())),
                },
            }
        }
        targets
    }

    /// Either probe criterion being satisfied triggers another round.
    async fn should_repeat(
        &mut self,
        page: &mut dyn Page,
        probe: &Probe,
    ) -> Result<bool, ScrawlError> {
        let ids = page
            .locate(None, &probe.selector, &TextFilter::default())
            .await?;
        if let Some(expected) = probe.exists {
            if !ids.is_empty() == expected {
                return Ok(true);
            }
        }
        if let Some(expected) = probe.disabled {
            if let Some(first) = ids.first() {
                if page.is_disabled(*first).await? == expected {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Recursively interacts with a node list. An entry may be a list of
    /// alternatives, in which case the first descriptor yielding matches
    /// is used for that position.
    fn interact<'a>(
        &'a mut self,
        page: &'a mut dyn Page,
        nodes: &'a [NodeEntry],
    ) -> Pin<Box<dyn Future<Output = Result<(), ScrawlError>> + 'a>> {
        Box::pin(async move {
            for entry in nodes {
                let alternatives: &[NodeDescriptor] = match entry {
                    NodeEntry::One(node) => std::slice::from_ref(node),
                    NodeEntry::Alternatives(nodes) => nodes,
                };
                for node in alternatives {
                    let frame = self.state.frame_snapshot();
                    let label = node
                        .name
                        .clone()
                        .unwrap_or_else(|| node.selector.clone())
                        .replace(':', "-");
                    self.state.set_frame_node(&label);

                    let filter = TextFilter {
                        has_text: node.contains.clone(),
                        has_not_text: node.excludes.clone(),
                    };
                    scrawl_debug!("interacting with: {}", node.selector);

                    if let Some(timeout_ms) = node.wait {
                        page.wait_for(None, &node.selector, &filter, timeout_ms)
                            .await
                            .map_err(|err| match err {
                                CapabilityError::Timeout { .. } => ScrawlError::ElementTimeout {
                                    selector: node.selector.clone(),
                                    timeout_ms,
                                },
                                other => ScrawlError::Capability(other),
                            })?;
                    }

                    let ids = page.locate(None, &node.selector, &filter).await?;
                    if ids.is_empty() {
                        // Nothing matched; the next alternative gets a try.
                        self.state.restore_frame(frame);
                        continue;
                    }

                    let (start, stop, step) =
                        resolve_range(node.range.as_deref().unwrap_or(&[]), ids.len());
                    let start = start.min(ids.len());
                    let stop = stop.min(ids.len()).max(start);
                    let window = &ids[start..stop];
                    let selected: &[ElementId] = if node.all {
                        window
                    } else {
                        &window[..window.len().min(1)]
                    };
                    let step = step.max(1);

                    let mut index = 0;
                    while index < selected.len() {
                        let id = selected[index];
                        self.state.set_frame_nth(index);

                        if node.show {
                            page.scroll_into_view(id).await?;
                        }
                        self.run_actions(&mut *page, &node.actions, id).await?;
                        for harvest in &node.links {
                            self.harvest_links(&mut *page, harvest, id).await?;
                        }
                        for harvest in &node.data {
                            self.harvest_data(&mut *page, harvest, id, node.all).await?;
                        }
                        if !node.nodes.is_empty() {
                            self.interact(&mut *page, &node.nodes).await?;
                        }

                        index += step;
                    }

                    self.state.restore_frame(frame);
                    break;
                }
            }
            Ok(())
        })
    }

    async fn run_actions(
        &mut self,
        page: &mut dyn Page,
        actions: &[ActionDescriptor],
        id: ElementId,
    ) -> Result<(), ScrawlError> {
        for action in actions {
            // Evaluate the screenshot path before the action can detach
            // or mutate the element.
            let screenshot_path = match &action.screenshot {
                Some(expr) => Some(self.evaluate_template(page, expr, id).await?),
                None => None,
            };
            let count = match &action.count {
                Count::Literal(count) => u64::from(*count),
                Count::Expression(expr) => {
                    let rendered = self.evaluate_template(page, expr, id).await?;
                    rendered.trim().parse().map_err(|_| {
                        ScrawlError::Notation(format!(
                            "action count `{expr}` did not resolve to a number"
                        ))
                    })?
                }
            };
            let rect = page.bounding_rect(id).await?;
            let kind = action.kind.as_str();

            for _ in 0..count {
                if let Some(ms) = action.delay {
                    sleep(Duration::from_millis(ms)).await;
                }
                if !page.is_visible(id).await? {
                    scrawl_warn!(
                        "action may fail, node inaccessible or not visible: {}@{}",
                        self.state
                            .var(VAR_NODE)
                            .map(value_to_string)
                            .unwrap_or_default(),
                        kind
                    );
                }
                if action.dispatch && kind != "swipe_left" && kind != "swipe_right" {
                    page.dispatch_event(id, kind).await?;
                } else {
                    match kind {
                        "click" => page.click(id, &action.options).await?,
                        "swipe_left" | "swipe_right" => {
                            // Press at the horizontal center, drag to the
                            // left or right edge, release.
                            let start_x = rect.x + rect.width / 2.0;
                            let end_x = if kind == "swipe_left" {
                                0.0
                            } else {
                                rect.x + rect.width
                            };
                            let y = rect.y + rect.height / 2.0;
                            page.mouse_move(start_x, y).await?;
                            page.mouse_down().await?;
                            page.mouse_move(end_x, y).await?;
                            page.mouse_up().await?;
                        }
                        other => return Err(ScrawlError::UnsupportedAction(other.to_string())),
                    }
                }
                if let Some(ms) = action.wait {
                    sleep(Duration::from_millis(ms)).await;
                }
            }

            if let Some(path) = screenshot_path {
                page.screenshot(&path, true).await?;
            }
        }
        Ok(())
    }

    async fn harvest_links(
        &mut self,
        page: &mut dyn Page,
        harvest: &LinkHarvest,
        id: ElementId,
    ) -> Result<(), ScrawlError> {
        let url_value = self.evaluate_expr(page, &harvest.url, id).await?;
        // Metadata values evaluate exactly like the URL: token-free text is
        // attribute notation against the current element.
        let mut metadata = Map::new();
        for (key, expr) in &harvest.metadata {
            let value = self.evaluate_expr(page, expr, id).await?;
            metadata.insert(key.clone(), Value::String(value_to_string(&value)));
        }
        match url_value {
            // A list-valued URL expression fans out into one record per
            // entry, all sharing the same metadata.
            Value::Array(urls) => {
                for url in urls {
                    self.state.append_link(
                        &harvest.name,
                        LinkRecord {
                            url: value_to_string(&url),
                            metadata: metadata.clone(),
                        },
                    );
                }
            }
            other => self.state.append_link(
                &harvest.name,
                LinkRecord {
                    url: value_to_string(&other),
                    metadata,
                },
            ),
        }
        Ok(())
    }

    async fn harvest_data(
        &mut self,
        page: &mut dyn Page,
        harvest: &DataHarvest,
        id: ElementId,
        all: bool,
    ) -> Result<(), ScrawlError> {
        let value = match &harvest.value {
            HarvestValue::One(expr) => self.evaluate_expr(page, expr, id).await?,
            HarvestValue::Many(exprs) => {
                let mut items = Vec::new();
                for expr in exprs {
                    items.push(self.evaluate_expr(page, expr, id).await?);
                }
                Value::Array(items)
            }
            HarvestValue::Map(map) => {
                let mut object = Map::new();
                for (key, expr) in map {
                    object.insert(key.clone(), self.evaluate_expr(page, expr, id).await?);
                }
                Value::Object(object)
            }
        };

        // With `all`, every matched element contributes one list entry.
        let mut value = if all {
            Value::Array(vec![value])
        } else {
            value
        };
        // A single-element placeholder whose only entry is null means the
        // element had nothing to contribute.
        if let Value::Array(items) = &value {
            if items.len() == 1 && items[0].is_null() {
                value = Value::Array(Vec::new());
            }
        }

        let segments = self.state.resolve_scope(&harvest.scope, true)?;
        if self.config.logging {
            scrawl_info!("extracting data to {}", join(&segments));
        }
        self.state.merge_data(&segments, value);
        Ok(())
    }

    /// Evaluates an expression in attribute context: without embedded
    /// tokens the text itself is raw attribute notation; otherwise tokens
    /// are substituted and the result is a string.
    async fn evaluate_expr(
        &mut self,
        page: &mut dyn Page,
        text: &str,
        scope: ElementId,
    ) -> Result<Value, ScrawlError> {
        if scan_embedded_tokens(text).is_empty() {
            return self.attribute(page, text, scope).await;
        }
        Ok(Value::String(
            self.evaluate_template(page, text, scope).await?,
        ))
    }

    /// Substitutes every `$var{...}`/`$attr{...}` occurrence by span.
    /// Identical token texts resolve once and splice in lockstep.
    async fn evaluate_template(
        &mut self,
        page: &mut dyn Page,
        text: &str,
        scope: ElementId,
    ) -> Result<String, ScrawlError> {
        let tokens = scan_embedded_tokens(text);
        if tokens.is_empty() {
            return Ok(text.to_string());
        }
        let mut cache: HashMap<String, String> = HashMap::new();
        let mut out = String::new();
        let mut cursor = 0usize;
        for token in &tokens {
            out.push_str(&text[cursor..token.span.start]);
            let full = &text[token.span.clone()];
            let resolved = match cache.get(full) {
                Some(value) => value.clone(),
                None => {
                    let value = match token.kind {
                        TokenKind::Attr => {
                            value_to_string(&self.attribute(page, &token.inner, scope).await?)
                        }
                        TokenKind::Var => value_to_string(&self.resolve_var(&token.inner, full)?),
                    };
                    cache.insert(full.to_string(), value.clone());
                    value
                }
            };
            out.push_str(&resolved);
            cursor = token.span.end;
        }
        out.push_str(&text[cursor..]);
        Ok(out)
    }

    /// Extracts a property described by attribute notation against the
    /// current element (or the page, depending on the notation context).
    async fn attribute(
        &mut self,
        page: &mut dyn Page,
        notation_text: &str,
        scope: ElementId,
    ) -> Result<Value, ScrawlError> {
        let parsed = parse_value(notation_text);
        let Some(prop) = parsed.prop.clone() else {
            let context = parsed
                .selector
                .clone()
                .or_else(|| self.state.var(VAR_NODE).map(value_to_string))
                .unwrap_or_else(|| notation_text.to_string());
            return Err(ScrawlError::Notation(format!(
                "attribute to extract not defined at `{context}`"
            )));
        };

        let mut ids = match &parsed.selector {
            Some(selector) => match parsed.context() {
                Ctx::Parent => {
                    page.locate(Some(scope), selector, &TextFilter::default())
                        .await?
                }
                Ctx::Page => page.locate(None, selector, &TextFilter::default()).await?,
            },
            None => vec![scope],
        };

        if prop == "count" {
            // The pipeline may run through floats; the count itself is
            // always an integer.
            let counted = apply_utils(&parsed.utils, Value::from(ids.len() as u64))?;
            let number = match &counted {
                Value::Number(number) => number.as_f64(),
                Value::String(text) => text.trim().parse::<f64>().ok(),
                _ => None,
            };
            return match number {
                Some(number) => Ok(Value::from(number as i64)),
                None => Err(ScrawlError::Notation(format!(
                    "count pipeline at `{notation_text}` did not produce a number"
                ))),
            };
        }

        if parsed.cardinality() == Max::One {
            ids.truncate(1);
        }
        let mut values = Vec::new();
        for id in ids {
            let raw = match prop.as_str() {
                "text" => page.text(id, parsed.child_node).await?,
                "href" | "src" => page.attribute(id, &prop, parsed.child_node).await?,
                _ => None,
            };
            let mut value = raw.map(Value::String).unwrap_or(Value::Null);
            if !parsed.utils.is_empty() {
                value = apply_utils(&parsed.utils, value)?;
            }
            values.push(value);
        }

        let result = match parsed.cardinality() {
            Max::One => values
                .into_iter()
                .next()
                .unwrap_or_else(|| Value::String(String::new())),
            Max::All => Value::Array(values),
        };
        if let Some(var) = &parsed.var {
            self.state.set_var(var, result.clone());
        }
        Ok(result)
    }

    /// Resolves a `$var{...}` token body: a variable name plus an optional
    /// utility pipeline, nothing else.
    fn resolve_var(&self, name: &str, fallback: &str) -> Result<Value, ScrawlError> {
        let parsed = parse_value(name);
        if parsed.prop.is_none()
            || parsed.child_node.is_some()
            || parsed.ctx.is_some()
            || parsed.max.is_some()
            || parsed.selector.is_some()
        {
            return Err(ScrawlError::Notation(format!(
                "invalid $var{{...}} notation at `{name}`"
            )));
        }
        let prop = parsed.prop.as_deref().unwrap_or_default();
        match self.state.var(prop).cloned() {
            Some(value) => Ok(apply_utils(&parsed.utils, value)?),
            None => Ok(Value::String(fallback.to_string())),
        }
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
