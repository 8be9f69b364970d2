//! End-to-end tests: compile expressions and run them against documents

#![allow(clippy::expect_used, clippy::panic)]

use serde_json::{Value, json};
use ypp_core::lexer::{TokenKind, tokenize};
use ypp_core::{Error, Node, NodeKind, TreeNode, compile, query, slice};

fn find(expression: &str, json: &Value) -> Vec<Node> {
    let doc = Node::document_from_json(json);
    query(expression, &doc)
        .expect("expression should compile")
        .into_iter()
        .cloned()
        .collect()
}

fn nodes(values: &[Value]) -> Vec<Node> {
    values.iter().map(Node::from_json).collect()
}

fn compile_error(expression: &str) -> Error {
    match compile(expression) {
        Ok(query) => panic!("{expression:?} compiled to {query:?}"),
        Err(e) => e,
    }
}

fn deployment() -> Value {
    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {"name": "web", "labels": {"app": "web", "tier": "frontend"}},
        "spec": {
            "replicas": 3,
            "template": {
                "spec": {
                    "containers": [
                        {
                            "name": "nginx",
                            "image": "nginx:1.25",
                            "ports": [{"containerPort": 80}, {"containerPort": 443}]
                        },
                        {
                            "name": "sidecar",
                            "image": "envoy:1.29",
                            "ports": [{"containerPort": 9901}]
                        }
                    ]
                }
            }
        }
    })
}

#[test]
fn top_level_key() {
    let doc = deployment();
    for key in ["apiVersion", "kind", "metadata", "spec"] {
        assert_eq!(find(&format!("$.{key}"), &doc), nodes(&[doc[key].clone()]));
    }
}

#[test]
fn root_returns_content_node() {
    let doc = deployment();
    let result = find("$", &doc);
    assert_eq!(result, nodes(&[doc]));
    assert_eq!(result[0].kind(), NodeKind::Mapping);
}

#[test]
fn container_images() {
    assert_eq!(
        find("$.spec.template.spec.containers[*].image", &deployment()),
        nodes(&[json!("nginx:1.25"), json!("envoy:1.29")])
    );
}

#[test]
fn rootless_expression() {
    assert_eq!(
        find("metadata.labels.tier", &deployment()),
        nodes(&[json!("frontend")])
    );
}

#[test]
fn bracket_child_with_dotted_chain() {
    assert_eq!(
        find("$['metadata.labels'].app", &deployment()),
        nodes(&[json!("web")])
    );
}

#[test]
fn recursive_descent_collects_in_document_order() {
    assert_eq!(
        find("$..containerPort", &deployment()),
        nodes(&[json!(80), json!(443), json!(9901)])
    );
    assert_eq!(
        find("$..name", &deployment()),
        nodes(&[json!("web"), json!("nginx"), json!("sidecar")])
    );
}

#[test]
fn filter_then_child() {
    assert_eq!(
        find(
            "$.spec.template.spec.containers[?(@.name == 'sidecar')].image",
            &deployment()
        ),
        nodes(&[json!("envoy:1.29")])
    );
}

#[test]
fn filter_with_nested_existential_comparison() {
    assert_eq!(
        find(
            "$..containers[?(@.ports[*].containerPort > 1000)].name",
            &deployment()
        ),
        nodes(&[json!("sidecar")])
    );
}

#[test]
fn filter_against_document_root() {
    let doc = json!({"max": 2, "jobs": [{"id": "a", "retries": 1}, {"id": "b", "retries": 5}]});
    assert_eq!(
        find("$.jobs[?(@.retries <= $.max)].id", &doc),
        nodes(&[json!("a")])
    );
}

#[test]
fn filter_regex_search_is_unanchored() {
    assert_eq!(
        find(
            "$..containers[?(@.image =~ /:1\\.2/)].name",
            &deployment()
        ),
        nodes(&[json!("nginx"), json!("sidecar")])
    );
    assert_eq!(
        find("$..containers[?(@.image =~ /^envoy/)].name", &deployment()),
        nodes(&[json!("sidecar")])
    );
}

#[test]
fn slices_on_sequences() {
    let doc = json!({"a": {"b": [10, 20, 30]}});
    assert_eq!(find("$.a.b[1:]", &doc), nodes(&[json!(20), json!(30)]));
    assert_eq!(find("$.a.b[::-1]", &doc), nodes(&[json!(30), json!(20), json!(10)]));
    assert_eq!(find("$.a.b[0,2,0]", &doc), nodes(&[json!(10), json!(30)]));
    assert!(find("$.a.b[:0]", &doc).is_empty());
    assert!(find("$.a.b[7]", &doc).is_empty());
}

#[test]
fn wildcard_over_mapping() {
    let doc = json!({"a": 1, "b": 2, "c": 3});
    assert_eq!(find("$.*", &doc), nodes(&[json!(1), json!(2), json!(3)]));
}

#[test]
fn results_borrow_from_the_tree() {
    let doc = Node::document_from_json(&json!({"a": [1, 2]}));
    let query = compile("$.a[1]").expect("expression should compile");
    let found = query.find(&doc);
    let expected = &doc.content()[0].content()[1].content()[1];
    assert!(std::ptr::eq(found[0], expected));
}

#[test]
fn query_runs_concurrently() {
    let query = compile("$..v").expect("expression should compile");
    let doc = Node::document_from_json(&json!({"x": {"v": 1}, "y": [{"v": 2}]}));
    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                let values: Vec<&str> = query.find(&doc).into_iter().map(TreeNode::value).collect();
                assert_eq!(values, vec!["1", "2"]);
            });
        }
    });
}

#[test]
fn lex_errors_surface_from_compile() {
    let err = compile_error("$.");
    assert!(matches!(err, Error::Lex(_)));
    assert!(err.to_string().starts_with("child name missing at position 2"));

    assert!(compile_error("$['a").to_string().starts_with("unmatched ['"));
    assert!(
        compile_error("$[1:2:3:4]")
            .to_string()
            .contains("too many colons")
    );
    assert!(
        compile_error("$[?(@.x>'a')]")
            .to_string()
            .contains("strings cannot be compared using >")
    );
    assert!(
        compile_error("$[?(@.x=~2)]")
            .to_string()
            .contains("regular expression does not start with /")
    );
}

#[test]
fn compile_errors_surface_from_compile() {
    let err = compile_error("$[?(())]");
    assert!(matches!(err, Error::Compile(_)));
}

#[test]
fn tokens_are_inspectable() {
    let kinds: Vec<TokenKind> = tokenize("$.a[0]")
        .expect("expression should lex")
        .iter()
        .map(|t| t.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            TokenKind::Root,
            TokenKind::DotChild,
            TokenKind::ArraySubscript,
            TokenKind::Identity,
            TokenKind::EndOfInput
        ]
    );
}

#[test]
fn slice_resolver_is_public() {
    assert_eq!(slice::resolve("1:3", 5).expect("valid subscript"), vec![1, 2]);
    assert_eq!(slice::resolve("*", 4).expect("valid subscript"), vec![0, 1, 2, 3]);
    assert_eq!(slice::resolve("-1", 5).expect("valid subscript"), vec![4]);
    assert_eq!(slice::resolve("-2:", 5).expect("valid subscript"), vec![3, 4]);
    assert_eq!(slice::resolve("2,0,2", 5).expect("valid subscript"), vec![2, 0]);
    assert!(slice::resolve("1:x", 5).is_err());
}

#[test]
fn deeply_nested_expressions_fail_to_compile() {
    for expression in [
        format!("${}", ".a".repeat(5000)),
        format!("$[?({}@.a{})]", "(".repeat(2000), ")".repeat(2000)),
    ] {
        let err = compile_error(&expression);
        assert!(matches!(err, Error::Compile(_)));
        assert!(err.to_string().starts_with("expression nested too deeply"));
    }
    assert!(compile(&format!("${}", ".a".repeat(100))).is_ok());
}
