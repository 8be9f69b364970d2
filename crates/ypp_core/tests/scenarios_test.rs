//! Table-driven query scenarios
//!
//! Each scenario names an expression, a document and either the expected
//! matches or a fragment of the expected compile error.

#![allow(clippy::expect_used)]

use serde::Deserialize;
use serde_json::Value;
use ypp_core::{Node, query};

#[derive(Debug, Deserialize)]
struct Scenario {
    name: String,
    path: String,
    #[serde(default)]
    document: Value,
    #[serde(default)]
    result: Option<Vec<Value>>,
    #[serde(default)]
    error: Option<String>,
}

const SCENARIOS: &str = r#"[
  {"name": "child of root", "path": "$.a", "document": {"a": 1, "b": 2}, "result": [1]},
  {"name": "missing child", "path": "$.z", "document": {"a": 1}, "result": []},
  {"name": "child of scalar", "path": "$.a.b", "document": {"a": 1}, "result": []},
  {"name": "nested slice", "path": "$.a.b[1:]", "document": {"a": {"b": [10, 20, 30]}}, "result": [20, 30]},
  {"name": "negative index", "path": "$.x[-1]", "document": {"x": ["p", "q", "r"]}, "result": ["r"]},
  {"name": "union keeps first occurrence", "path": "$.x[2,0,2]", "document": {"x": [0, 1, 2, 3, 4]}, "result": [2, 0]},
  {"name": "reverse slice", "path": "$.x[3:1:-1]", "document": {"x": [0, 1, 2, 3, 4]}, "result": [3, 2]},
  {"name": "empty end bound", "path": "$.x[:0]", "document": {"x": [0, 1]}, "result": []},
  {"name": "wildcard subscript", "path": "$.x[*].n", "document": {"x": [{"n": 1}, {"m": 2}, {"n": 3}]}, "result": [1, 3]},
  {"name": "wildcard children", "path": "$.*", "document": {"a": 1, "b": 2, "c": 3}, "result": [1, 2, 3]},
  {"name": "recursive descent", "path": "$..c", "document": {"a": {"c": 1}, "b": {"c": 2}}, "result": [1, 2]},
  {"name": "recursive descent then slice", "path": "$..x[0]", "document": {"x": [1, 2], "y": {"x": [3]}}, "result": [1, 3]},
  {"name": "bracket child", "path": "$['a b']", "document": {"a b": true}, "result": [true]},
  {"name": "bracket name with quotes and comma", "path": "$['a','b']", "document": {"a','b": 9, "a": 1, "b": 2}, "result": [9]},
  {"name": "bracket chain", "path": "$['a.b.c']", "document": {"a": {"b": {"c": "deep"}}}, "result": ["deep"]},
  {"name": "undotted start", "path": "a.b", "document": {"a": {"b": null}}, "result": [null]},
  {"name": "filter equality", "path": "$[?(@.k == 'v')].id", "document": [{"k": "v", "id": 1}, {"k": "w", "id": 2}], "result": [1]},
  {"name": "filter inequality", "path": "$[?(@.n != 2)].n", "document": [{"n": 1}, {"n": 2}, {"n": 3}], "result": [1, 3]},
  {"name": "filter float", "path": "$[?(@.n > 1.5)].n", "document": [{"n": 1}, {"n": 2}], "result": [2]},
  {"name": "filter negative literal", "path": "$[?(@.n < -1)].n", "document": [{"n": -5}, {"n": 0}], "result": [-5]},
  {"name": "filter existence", "path": "$[?(@.opt)].id", "document": [{"id": 1}, {"id": 2, "opt": false}], "result": [2]},
  {"name": "filter not", "path": "$[?(!@.opt)].id", "document": [{"id": 1}, {"id": 2, "opt": false}], "result": [1]},
  {"name": "filter and binds tighter", "path": "$[?(@.a == 1 || @.b == 1 && @.c == 1)].id", "document": [{"id": 1, "a": 1}, {"id": 2, "b": 1}, {"id": 3, "b": 1, "c": 1}], "result": [1, 3]},
  {"name": "filter parentheses", "path": "$[?((@.a == 1 || @.b == 1) && @.c == 1)].id", "document": [{"id": 1, "a": 1}, {"id": 2, "b": 1, "c": 1}], "result": [2]},
  {"name": "filter regex", "path": "$[?(@.s =~ /b+c/)].s", "document": [{"s": "abbc"}, {"s": "ac"}], "result": ["abbc"]},
  {"name": "filter on mapping values", "path": "$.m[?(@.on == 'yes')]", "document": {"m": {"x": {"on": "yes"}, "y": {"on": "no"}}}, "result": [{"on": "yes"}]},
  {"name": "filter root operand", "path": "$.v[?(@ == $.want)]", "document": {"want": 2, "v": [1, 2, 3]}, "result": [2]},
  {"name": "filter nested", "path": "$[?(@.kids[?(@ > 5)])].id", "document": [{"id": 1, "kids": [1, 2]}, {"id": 2, "kids": [9]}], "result": [2]},
  {"name": "filter whitespace", "path": "$[?( @.n   >=   2 )].n", "document": [{"n": 1}, {"n": 2}], "result": [2]},
  {"name": "empty child name", "path": "$.", "error": "child name missing"},
  {"name": "unmatched bracket quote", "path": "$['a", "error": "unmatched ['"},
  {"name": "unmatched subscript", "path": "$[0", "error": "unmatched ["},
  {"name": "empty subscript", "path": "$[]", "error": "subscript missing from []"},
  {"name": "too many colons", "path": "$[1:2:3:4]", "error": "too many colons"},
  {"name": "non-integer subscript", "path": "$[a]", "error": "non-integer value"},
  {"name": "empty filter", "path": "$[?()]", "error": "missing filter"},
  {"name": "unterminated filter", "path": "$[?(@.a", "error": "missing end of filter"},
  {"name": "ordered string comparison", "path": "$[?(@.x > 'a')]", "error": "strings cannot be compared using >"},
  {"name": "regex without delimiter", "path": "$[?(@.x =~ 2)]", "error": "regular expression does not start with /"},
  {"name": "invalid regex", "path": "$[?(@.x =~ /(/)]", "error": "invalid regular expression"},
  {"name": "literal regex subject", "path": "$[?('a' =~ /a/)]", "error": "literal cannot be matched using =~"},
  {"name": "leading operator", "path": "$[?(== 1)]", "error": "missing first operand for binary operator =="},
  {"name": "unmatched string", "path": "$[?(@.x == 'a)]", "error": "unmatched string delimiter '"}
]"#;

fn run(scenario: &Scenario) -> Result<(), String> {
    let doc = Node::document_from_json(&scenario.document);
    match (query(&scenario.path, &doc), &scenario.result, &scenario.error) {
        (Ok(found), Some(expected), None) => {
            let expected: Vec<Node> = expected.iter().map(Node::from_json).collect();
            let found: Vec<Node> = found.into_iter().cloned().collect();
            if found == expected {
                Ok(())
            } else {
                Err(format!("got {found:?}, expected {expected:?}"))
            }
        }
        (Err(e), None, Some(fragment)) => {
            if e.to_string().contains(fragment.as_str()) {
                Ok(())
            } else {
                Err(format!("error {e:?} does not mention {fragment:?}"))
            }
        }
        (Ok(found), _, _) => Err(format!("unexpected success: {found:?}")),
        (Err(e), _, _) => Err(format!("unexpected error: {e}")),
    }
}

#[test]
fn run_scenarios() {
    let scenarios: Vec<Scenario> =
        serde_json::from_str(SCENARIOS).expect("scenario table should parse");
    assert!(!scenarios.is_empty());

    let failures: Vec<String> = scenarios
        .iter()
        .filter_map(|s| {
            run(s)
                .err()
                .map(|reason| format!("[{}] {}: {reason}", s.name, s.path))
        })
        .collect();

    assert!(failures.is_empty(), "failed scenarios:\n{}", failures.join("\n"));
}
