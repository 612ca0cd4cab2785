use std::fmt;
use std::ops::Range;

/// Where a selector embedded in a notation expression is searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ctx {
    /// Search within the current element.
    Parent,
    /// Search the whole document.
    Page,
}

impl Ctx {
    fn keyword(self) -> &'static str {
        match self {
            Ctx::Parent => "parent",
            Ctx::Page => "page",
        }
    }
}

/// How many selector matches an extraction yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Max {
    One,
    All,
}

impl Max {
    fn keyword(self) -> &'static str {
        match self {
            Max::One => "one",
            Max::All => "all",
        }
    }
}

/// One named transform in a utility pipeline, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtilityCall {
    pub name: String,
    pub args: Vec<String>,
}

/// A parsed notation expression:
/// `prop[:child(n)] [@ [<ctx[.max]>] selector] [| util arg*]* [>> var]`.
///
/// All clauses are optional at this layer; `context()` and `cardinality()`
/// supply the grammar defaults. An unparseable input yields a descriptor
/// with `prop: None` and an empty pipeline rather than an error, so the
/// caller decides whether a missing property is fatal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedNotation {
    pub prop: Option<String>,
    pub child_node: Option<u32>,
    pub ctx: Option<Ctx>,
    pub max: Option<Max>,
    pub selector: Option<String>,
    pub utils: Vec<UtilityCall>,
    pub var: Option<String>,
}

impl ParsedNotation {
    /// Selector search context, defaulting to the current element.
    pub fn context(&self) -> Ctx {
        self.ctx.unwrap_or(Ctx::Parent)
    }

    /// Match cardinality, defaulting to the first match only.
    pub fn cardinality(&self) -> Max {
        self.max.unwrap_or(Max::One)
    }
}

impl fmt::Display for ParsedNotation {
    /// Canonical notation form. Parsing the output reproduces the
    /// descriptor exactly; unset clauses are omitted.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prop) = &self.prop {
            write!(f, "{prop}")?;
        }
        if let Some(child) = self.child_node {
            write!(f, ":child({child})")?;
        }
        if self.ctx.is_some() || self.max.is_some() || self.selector.is_some() {
            write!(f, " @ ")?;
            match (self.ctx, self.max) {
                (Some(ctx), Some(max)) => write!(f, "<{}.{}> ", ctx.keyword(), max.keyword())?,
                (Some(ctx), None) => write!(f, "<{}> ", ctx.keyword())?,
                (None, Some(max)) => write!(f, "<{}> ", max.keyword())?,
                (None, None) => {}
            }
            if let Some(selector) = &self.selector {
                write!(f, "{selector}")?;
            }
        }
        for util in &self.utils {
            write!(f, " | {}", util.name)?;
            for arg in &util.args {
                write!(f, " {arg}")?;
            }
        }
        if let Some(var) = &self.var {
            write!(f, " >> {var}")?;
        }
        Ok(())
    }
}

/// Parses a notation expression. Never fails: malformed input collapses to
/// the null descriptor.
pub fn parse_value(text: &str) -> ParsedNotation {
    try_parse(text).unwrap_or_default()
}

fn try_parse(text: &str) -> Option<ParsedNotation> {
    let (body, var) = match text.rsplit_once(">>") {
        Some((body, var)) => {
            let var = var.trim();
            if var.is_empty() || var.contains(char::is_whitespace) {
                return None;
            }
            (body, Some(var.to_string()))
        }
        None => (text, None),
    };

    let mut pieces = body.split('|');
    let head = pieces.next().unwrap_or("");
    let mut utils = Vec::new();
    for piece in pieces {
        utils.push(parse_utility_call(piece)?);
    }

    let (prop_part, selector_part) = match head.split_once('@') {
        Some((prop, selector)) => (prop, Some(selector)),
        None => (head, None),
    };
    let (prop, child_node) = parse_prop(prop_part)?;
    let (ctx, max, selector) = match selector_part {
        Some(clause) => parse_selector_clause(clause)?,
        None => (None, None, None),
    };

    Some(ParsedNotation {
        prop,
        child_node,
        ctx,
        max,
        selector,
        utils,
        var,
    })
}

fn parse_prop(text: &str) -> Option<(Option<String>, Option<u32>)> {
    let text = text.trim();
    if text.is_empty() {
        return Some((None, None));
    }
    match text.split_once(':') {
        Some((name, clause)) => {
            let name = name.trim();
            let index = clause
                .trim()
                .strip_prefix("child(")?
                .strip_suffix(')')?
                .trim()
                .parse::<u32>()
                .ok()?;
            if name.is_empty() {
                return None;
            }
            Some((Some(name.to_string()), Some(index)))
        }
        None => Some((Some(text.to_string()), None)),
    }
}

fn parse_selector_clause(text: &str) -> Option<(Option<Ctx>, Option<Max>, Option<String>)> {
    let mut rest = text.trim_start();
    let mut ctx = None;
    let mut max = None;

    if let Some(after) = rest.strip_prefix('<') {
        let (inner, tail) = after.split_once('>')?;
        for token in inner.split('.') {
            match token.trim() {
                "parent" if ctx.is_none() => ctx = Some(Ctx::Parent),
                "page" if ctx.is_none() => ctx = Some(Ctx::Page),
                "one" if max.is_none() => max = Some(Max::One),
                "all" if max.is_none() => max = Some(Max::All),
                _ => return None,
            }
        }
        rest = tail.trim_start();
    }

    let selector = rest.trim();
    let selector = if selector.is_empty() {
        None
    } else {
        Some(selector.to_string())
    };
    Some((ctx, max, selector))
}

fn parse_utility_call(text: &str) -> Option<UtilityCall> {
    let mut words = text.split_whitespace();
    let name = words.next()?.to_string();
    Some(UtilityCall {
        name,
        args: words.map(str::to_string).collect(),
    })
}

/// Kind of an embedded token in a free-form string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// `$var{...}`: a scope-variable lookup.
    Var,
    /// `$attr{...}`: an attribute extraction against the current element.
    Attr,
}

/// One `$var{...}` / `$attr{...}` occurrence located by byte span, so
/// substitution splices by position instead of textual replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedToken {
    pub span: Range<usize>,
    pub kind: TokenKind,
    pub inner: String,
}

/// Scans a free-form string for embedded tokens, in order of appearance.
/// Identical token texts are expected to be resolved once by the caller and
/// substituted in lockstep at every occurrence.
pub fn scan_embedded_tokens(text: &str) -> Vec<EmbeddedToken> {
    let mut tokens = Vec::new();
    let bytes = text.as_bytes();
    let mut pos = 0;

    while pos < bytes.len() {
        let Some(offset) = text[pos..].find('$') else {
            break;
        };
        let start = pos + offset;
        let rest = &text[start..];
        let kind = if rest.starts_with("$var{") {
            Some((TokenKind::Var, "$var{".len()))
        } else if rest.starts_with("$attr{") {
            Some((TokenKind::Attr, "$attr{".len()))
        } else {
            None
        };
        match kind {
            Some((kind, open)) => match rest[open..].find('}') {
                Some(close) => {
                    let end = start + open + close + 1;
                    tokens.push(EmbeddedToken {
                        span: start..end,
                        kind,
                        inner: rest[open..open + close].to_string(),
                    });
                    pos = end;
                }
                None => break,
            },
            None => pos = start + 1,
        }
    }

    tokens
}
