//! Tests for the literal expression parser.

use super::*;

fn parse_ok(text: &str) -> Value {
    parse(text).unwrap().unwrap()
}

#[test]
fn test_blank_text_has_no_value() {
    assert!(parse("").unwrap().is_none());
    assert!(parse("  \n# just a comment\n\n").unwrap().is_none());
}

#[test]
fn test_mapping_with_nested_values() {
    let value = parse_ok(
        r#"
# header comment
{
    "defaults": {"remote": "origin"},
    "dependencies": [
        {"name": "a", "path": "../a"},
    ],
    "count": -3,
    "ratio": 1.5,
    "flags": (True, False, None),
}
"#,
    );

    let map = value.as_map().unwrap();
    assert_eq!(map.entries.len(), 5);
    assert_eq!(
        map.get("defaults").unwrap().as_map().unwrap().get("remote").unwrap().as_str(),
        Some("origin")
    );
    assert_eq!(map.get("dependencies").unwrap().as_seq().unwrap().len(), 1);
    assert_eq!(map.get("count").unwrap().node, Node::Int(-3));
    assert_eq!(map.get("ratio").unwrap().node, Node::Float(1.5));
    assert_eq!(
        map.get("flags").unwrap().to_json(),
        serde_json::json!([true, false, null])
    );
    assert!(map.trailing_comma.is_some());
}

#[test]
fn test_string_prefixes_and_quotes() {
    let cases = [
        (r#"'abc'"#, "abc", "'", false),
        (r#""abc""#, "abc", "\"", false),
        (r#"'''abc'''"#, "abc", "'''", false),
        (r#""""abc""""#, "abc", "\"\"\"", false),
        (r#"r'a\b'"#, r"a\b", "'", true),
        (r#"R"a\b""#, r"a\b", "\"", true),
        (r#"u'abc'"#, "abc", "'", false),
    ];

    for (text, expected, expected_quote, expected_raw) in cases {
        let value = parse_ok(text);
        match &value.node {
            Node::Str {
                value: s,
                pieces,
                quote,
                raw,
                content,
            } => {
                assert_eq!(s, expected, "value of {}", text);
                assert_eq!(*pieces, 1);
                assert_eq!(*quote, expected_quote, "quote of {}", text);
                assert_eq!(*raw, expected_raw, "raw flag of {}", text);
                assert_eq!(&text[content.start..content.end], if *raw { expected } else { "abc" });
            }
            other => panic!("expected a string for {}, got {:?}", text, other),
        }
        assert_eq!(value.span, Span::new(0, text.len()));
    }
}

#[test]
fn test_escapes_are_decoded() {
    let value = parse_ok(r#""tab\there \"quoted\" \x41é \\""#);
    assert_eq!(value.as_str(), Some("tab\there \"quoted\" Aé \\"));
}

#[test]
fn test_adjacent_strings_concatenate() {
    let value = parse_ok(r#"{"revision": "1234"  "5678"}"#);
    let revision = value.as_map().unwrap().get("revision").unwrap();
    assert_eq!(revision.as_str(), Some("12345678"));
    assert!(!revision.is_single_string_literal());
    assert!(matches!(revision.node, Node::Str { pieces: 2, .. }));
}

#[test]
fn test_map_spans_point_at_delimiters() {
    let text = "{'a': 'b' , }";
    let value = parse_ok(text);
    let map = value.as_map().unwrap();
    assert_eq!(&text[map.close..map.close + 1], "}");
    assert_eq!(map.trailing_comma, Some(10));
    assert_eq!(value.span, Span::new(0, text.len()));
}

#[test]
fn test_parenthesised_value_is_not_a_tuple() {
    assert_eq!(parse_ok("('x')").as_str(), Some("x"));
    assert_eq!(parse_ok("('x',)").as_seq().unwrap().len(), 1);
    assert_eq!(parse_ok("()").as_seq().unwrap().len(), 0);
}

#[test]
fn test_parenthesised_value_span_covers_parentheses() {
    let text = "{'path': ( 'a_dir' )}";
    let value = parse_ok(text);
    let path = value.as_map().unwrap().get("path").unwrap();
    assert_eq!(path.as_str(), Some("a_dir"));
    assert_eq!(&text[path.span.start..path.span.end], "( 'a_dir' )");
    assert!(path.is_single_string_literal());
}

#[test]
fn test_syntax_error_reports_position() {
    let err = parse("{\n  'a': 1\n  'c': 'd'\n}").unwrap_err();
    assert_eq!(err.to_string(), "syntax error at line 3, offset 3");

    let err = parse("{'a': 'unterminated}").unwrap_err();
    assert_eq!(err.to_string(), "syntax error at line 1, offset 7");

    let err = parse("{'a': 'b'").unwrap_err();
    assert!(err.to_string().starts_with("syntax error at line 1"));
}

#[test]
fn test_trailing_tokens_are_rejected() {
    let err = parse("{} {}").unwrap_err();
    assert_eq!(err.to_string(), "syntax error at line 1, offset 4");
}

#[test]
fn test_names_and_calls_are_illegal() {
    for text in ["{'a': open('x')}", "{'a': os}", "[-x]"] {
        let err = parse(text).unwrap_err();
        assert_eq!(
            err.to_string(),
            "illegal value used. (Do you have a function call in the file?)",
            "for {}",
            text
        );
    }
}

#[test]
fn test_non_string_keys_do_not_match() {
    let value = parse_ok("{1: 'one', 'two': 2}");
    let map = value.as_map().unwrap();
    assert!(map.get("1").is_none());
    assert_eq!(map.get("two").unwrap().node, Node::Int(2));
    assert_eq!(value.to_json(), serde_json::json!({"1": "one", "two": 2}));
}
