use std::sync::Once;

use pretty_assertions::assert_eq;
use serde_json::{json, Map, Value};

use scrawl_core::{assign, get, resolve, split, KeypathError};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(scrawl_logging::initialize_for_tests);
}

fn no_vars() -> Map<String, Value> {
    Map::new()
}

#[test]
fn split_normalizes_brackets_and_collapses_delimiters() {
    init_logging();
    assert_eq!(split("a.b.c"), ["a", "b", "c"]);
    assert_eq!(split("a[0][1].b"), ["a", "0", "1", "b"]);
    assert_eq!(split("a..b"), ["a", "b"]);
    assert_eq!(split(""), Vec::<String>::new());
}

#[test]
fn split_keeps_predicate_bodies_intact() {
    init_logging();
    assert_eq!(
        split("items.*{name = a.b}.price"),
        ["items", "*{name = a.b}", "price"]
    );
}

#[test]
fn get_walks_objects_arrays_and_strings() {
    init_logging();
    let tree = json!({"pages": [{"title": "abc"}]});

    assert_eq!(get(&tree, "pages.0.title"), Some(json!("abc")));
    assert_eq!(get(&tree, "pages[0].title.1"), Some(json!("b")));
    assert_eq!(get(&tree, "pages.5.title"), None);
    assert_eq!(get(&tree, "missing"), None);
}

#[test]
fn assign_creates_intermediate_containers() {
    init_logging();
    let mut tree = json!({});
    assign(&mut tree, &split("a.b.0.c"), json!(1), false);

    assert_eq!(tree, json!({"a": {"b": [{"c": 1}]}}));
}

#[test]
fn assign_pads_arrays_with_nulls() {
    init_logging();
    let mut tree = json!({});
    assign(&mut tree, &split("list.2"), json!("x"), false);

    assert_eq!(tree, json!({"list": [null, null, "x"]}));
}

#[test]
fn merge_extends_arrays_and_concatenates_strings() {
    init_logging();
    let mut tree = json!({"items": [1], "label": "ab"});
    assign(&mut tree, &split("items"), json!([2, 3]), true);
    assign(&mut tree, &split("label"), json!("cd"), true);

    assert_eq!(tree, json!({"items": [1, 2, 3], "label": "abcd"}));
}

#[test]
fn merge_adds_numbers_and_unions_objects() {
    init_logging();
    let mut tree = json!({"total": 2, "meta": {"a": 1}});
    assign(&mut tree, &split("total"), json!(3), true);
    assign(&mut tree, &split("meta"), json!({"b": 2}), true);

    assert_eq!(get(&tree, "total"), Some(json!(5.0)));
    assert_eq!(get(&tree, "meta"), Some(json!({"a": 1, "b": 2})));
}

#[test]
fn merge_with_mismatched_types_overwrites() {
    init_logging();
    let mut tree = json!({"slot": [1, 2]});
    assign(&mut tree, &split("slot"), json!("text"), true);

    assert_eq!(tree, json!({"slot": "text"}));
}

#[test]
fn resolve_replaces_predicate_with_matching_array_index() {
    init_logging();
    let tree = json!({"products": [
        {"name": "chair", "price": 10},
        {"name": "table", "price": 40},
    ]});

    let segments = resolve(&tree, "products.*{name = table}.price", &no_vars(), true).unwrap();
    assert_eq!(segments, ["products", "1", "price"]);
}

#[test]
fn resolve_replaces_predicate_with_matching_object_key() {
    init_logging();
    let tree = json!({"sections": {
        "intro": {"order": 1},
        "body": {"order": 2},
    }});

    let segments = resolve(&tree, "sections.*{order = 2}", &no_vars(), true).unwrap();
    assert_eq!(segments, ["sections", "body"]);
}

#[test]
fn resolve_picks_the_first_satisfying_element() {
    init_logging();
    let tree = json!({"rows": [
        {"score": 5},
        {"score": 9},
        {"score": 9},
    ]});

    let segments = resolve(&tree, "rows.*{score >= 6}", &no_vars(), true).unwrap();
    assert_eq!(segments, ["rows", "1"]);
}

#[test]
fn resolve_compares_numbers_loosely_across_int_and_float() {
    init_logging();
    let tree = json!({"rows": [{"n": 2.0}]});

    let segments = resolve(&tree, "rows.*{n = 2}", &no_vars(), true).unwrap();
    assert_eq!(segments, ["rows", "0"]);
}

#[test]
fn resolve_reads_operand_from_vars() {
    init_logging();
    let tree = json!({"rows": [{"name": "a"}, {"name": "b"}]});
    let mut vars = Map::new();
    vars.insert("wanted".into(), json!("b"));

    let segments = resolve(&tree, "rows.*{name = $wanted}", &vars, true).unwrap();
    assert_eq!(segments, ["rows", "1"]);
}

#[test]
fn resolve_unknown_variable_is_an_error() {
    init_logging();
    let tree = json!({"rows": []});

    let err = resolve(&tree, "rows.*{name = $ghost}", &no_vars(), true).unwrap_err();
    assert_eq!(err, KeypathError::UnknownVariable("ghost".into()));
}

#[test]
fn strict_resolve_fails_on_unmatched_predicate() {
    init_logging();
    let tree = json!({"rows": [{"name": "a"}]});

    let err = resolve(&tree, "rows.*{name = z}", &no_vars(), true).unwrap_err();
    assert_eq!(
        err,
        KeypathError::UnmatchedPredicate {
            segment: "*{name = z}".into(),
            operand: "z".into(),
        }
    );
}

#[test]
fn strict_resolve_fails_on_non_collection() {
    init_logging();
    let tree = json!({"rows": "text"});

    let err = resolve(&tree, "rows.*{name = a}", &no_vars(), true).unwrap_err();
    assert_eq!(
        err,
        KeypathError::NotACollection {
            segment: "*{name = a}".into(),
        }
    );
}

#[test]
fn lenient_resolve_keeps_literal_predicate_text() {
    init_logging();
    let tree = json!({});

    let segments = resolve(&tree, "rows.*{name = a}.price", &no_vars(), false).unwrap();
    assert_eq!(segments, ["rows", "*{name = a}", "price"]);
}

#[test]
fn not_equals_operator_skips_matching_elements() {
    init_logging();
    let tree = json!({"rows": [{"name": "a"}, {"name": "b"}]});

    let segments = resolve(&tree, "rows.*{name != a}", &no_vars(), true).unwrap();
    assert_eq!(segments, ["rows", "1"]);
}
