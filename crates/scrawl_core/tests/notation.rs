use std::sync::Once;

use pretty_assertions::assert_eq;
use scrawl_core::{parse_value, scan_embedded_tokens, Ctx, Max, TokenKind, UtilityCall};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(scrawl_logging::initialize_for_tests);
}

#[test]
fn bare_property_defaults_to_parent_and_one() {
    init_logging();
    let parsed = parse_value("text");

    assert_eq!(parsed.prop.as_deref(), Some("text"));
    assert_eq!(parsed.child_node, None);
    assert_eq!(parsed.selector, None);
    assert_eq!(parsed.context(), Ctx::Parent);
    assert_eq!(parsed.cardinality(), Max::One);
    assert!(parsed.utils.is_empty());
    assert_eq!(parsed.var, None);
}

#[test]
fn full_expression_parses_every_clause() {
    init_logging();
    let parsed = parse_value("href @ <page.all> a.item | clear_url_params | prepend https: >> found");

    assert_eq!(parsed.prop.as_deref(), Some("href"));
    assert_eq!(parsed.ctx, Some(Ctx::Page));
    assert_eq!(parsed.max, Some(Max::All));
    assert_eq!(parsed.selector.as_deref(), Some("a.item"));
    assert_eq!(
        parsed.utils,
        vec![
            UtilityCall {
                name: "clear_url_params".into(),
                args: vec![],
            },
            UtilityCall {
                name: "prepend".into(),
                args: vec!["https:".into()],
            },
        ]
    );
    assert_eq!(parsed.var.as_deref(), Some("found"));
}

#[test]
fn child_node_index_is_parsed() {
    init_logging();
    let parsed = parse_value("text:child(2)");

    assert_eq!(parsed.prop.as_deref(), Some("text"));
    assert_eq!(parsed.child_node, Some(2));
}

#[test]
fn single_keyword_token_sets_only_that_dimension() {
    init_logging();
    let parsed = parse_value("text @ <all> li");
    assert_eq!(parsed.ctx, None);
    assert_eq!(parsed.max, Some(Max::All));
    assert_eq!(parsed.cardinality(), Max::All);
    assert_eq!(parsed.context(), Ctx::Parent);

    let parsed = parse_value("text @ <page> h1");
    assert_eq!(parsed.ctx, Some(Ctx::Page));
    assert_eq!(parsed.max, None);
    assert_eq!(parsed.selector.as_deref(), Some("h1"));
}

#[test]
fn selector_without_context_token() {
    init_logging();
    let parsed = parse_value("text @ span.price");

    assert_eq!(parsed.ctx, None);
    assert_eq!(parsed.max, None);
    assert_eq!(parsed.selector.as_deref(), Some("span.price"));
}

#[test]
fn selector_clause_without_property() {
    init_logging();
    let parsed = parse_value("@ <page> div.next");

    assert_eq!(parsed.prop, None);
    assert_eq!(parsed.ctx, Some(Ctx::Page));
    assert_eq!(parsed.selector.as_deref(), Some("div.next"));
}

#[test]
fn malformed_input_collapses_to_null_descriptor() {
    init_logging();
    for text in ["text:child(x)", "text @ <sideways> p", "text >> two words"] {
        let parsed = parse_value(text);
        assert_eq!(parsed.prop, None, "input: {text}");
        assert!(parsed.utils.is_empty(), "input: {text}");
    }
}

#[test]
fn display_round_trips_through_parse() {
    init_logging();
    for text in [
        "text",
        "text:child(1)",
        "href @ <page.all> a | clear_url_params >> urls",
        "text @ <all> li.entry",
        "count @ <page> article | subtract 1",
    ] {
        let parsed = parse_value(text);
        let rendered = parsed.to_string();
        assert_eq!(parse_value(&rendered), parsed, "input: {text}");
    }
}

#[test]
fn embedded_tokens_are_found_with_spans() {
    init_logging();
    let text = "shots/$var{_nth}-$attr{text | slug}.png";
    let tokens = scan_embedded_tokens(text);

    assert_eq!(tokens.len(), 2);
    assert_eq!(tokens[0].kind, TokenKind::Var);
    assert_eq!(tokens[0].inner, "_nth");
    assert_eq!(&text[tokens[0].span.clone()], "$var{_nth}");
    assert_eq!(tokens[1].kind, TokenKind::Attr);
    assert_eq!(tokens[1].inner, "text | slug");
    assert_eq!(&text[tokens[1].span.clone()], "$attr{text | slug}");
}

#[test]
fn stray_dollar_and_unterminated_brace_yield_no_tokens() {
    init_logging();
    assert!(scan_embedded_tokens("cost: $12.50").is_empty());
    assert!(scan_embedded_tokens("$var{unclosed").is_empty());
    assert!(scan_embedded_tokens("no tokens here").is_empty());
}

#[test]
fn repeated_token_text_appears_per_occurrence() {
    init_logging();
    let tokens = scan_embedded_tokens("$var{a}/$var{a}");
    assert_eq!(tokens.len(), 2);
    assert_eq!(tokens[0].inner, tokens[1].inner);
    assert_ne!(tokens[0].span, tokens[1].span);
}
