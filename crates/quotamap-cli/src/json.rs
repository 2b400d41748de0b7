//! JSON <-> plain graph conversion for scenario values and reports.
//!
//! Arrays become sequences (integer keys from 1), objects become text-keyed
//! containers. On the way out a container with keys exactly `1..=n` is shown as
//! an array, and a container already on the current path prints as `"<cycle>"`.

use serde_json::{Map, Number, Value as Json};

use quotamap_core::plain::{PlainGraph, PlainValue};
use quotamap_core::value::Key;

pub fn to_plain(value: &Json) -> PlainGraph {
    match value {
        Json::Array(_) | Json::Object(_) => {
            let mut graph = PlainGraph::new();
            fill(&mut graph, 0, value);
            graph
        }
        scalar => PlainGraph::scalar(scalar_of(scalar)),
    }
}

fn scalar_of(value: &Json) -> PlainValue {
    match value {
        Json::Bool(b) => PlainValue::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => PlainValue::Integer(i),
            None => PlainValue::Number(n.as_f64().unwrap_or(0.0)),
        },
        Json::String(s) => PlainValue::Str(s.clone()),
        _ => PlainValue::Nil,
    }
}

fn plain_of(graph: &mut PlainGraph, value: &Json) -> PlainValue {
    match value {
        Json::Array(_) | Json::Object(_) => {
            let t = graph.add_table();
            fill(graph, t, value);
            PlainValue::Table(t)
        }
        scalar => scalar_of(scalar),
    }
}

fn fill(graph: &mut PlainGraph, table: usize, value: &Json) {
    match value {
        Json::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                let v = plain_of(graph, item);
                graph.push_entry(table, i as i64 + 1, v);
            }
        }
        Json::Object(map) => {
            for (k, item) in map {
                let v = plain_of(graph, item);
                graph.push_entry(table, k.as_str(), v);
            }
        }
        _ => {}
    }
}

pub fn to_json(graph: &PlainGraph) -> Json {
    render(graph, &graph.root, &mut Vec::new())
}

fn render(graph: &PlainGraph, value: &PlainValue, path: &mut Vec<usize>) -> Json {
    match value {
        PlainValue::Nil => Json::Null,
        PlainValue::Bool(b) => Json::Bool(*b),
        PlainValue::Integer(i) => Json::from(*i),
        PlainValue::Number(n) => Number::from_f64(*n).map(Json::Number).unwrap_or(Json::Null),
        PlainValue::Str(s) => Json::String(s.clone()),
        PlainValue::Opaque(o) => Json::String(format!("<{}>", o.kind.name())),
        PlainValue::Table(i) => {
            if path.contains(i) {
                return Json::String("<cycle>".to_string());
            }
            let Some(table) = graph.table(*i) else {
                return Json::Null;
            };
            path.push(*i);
            let is_seq = !table.is_empty()
                && table
                    .entries
                    .iter()
                    .enumerate()
                    .all(|(n, (k, _))| k.as_int() == Some(n as i64 + 1));
            let out = if is_seq {
                Json::Array(
                    table
                        .entries
                        .iter()
                        .map(|(_, v)| render(graph, v, path))
                        .collect(),
                )
            } else {
                let mut map = Map::new();
                for (k, v) in &table.entries {
                    let name = match k {
                        Key::Int(i) => i.to_string(),
                        Key::Str(s) => s.clone(),
                    };
                    map.insert(name, render(graph, v, path));
                }
                Json::Object(map)
            };
            path.pop();
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn arrays_and_objects_survive_the_trip() {
        let src = json!({"name": "cfg", "items": [1, 2.5, true], "nested": {"k": "v"}});
        let graph = to_plain(&src);
        assert_eq!(graph.tables.len(), 3);
        assert_eq!(to_json(&graph), src);
    }

    #[test]
    fn cycles_render_as_markers() {
        let mut graph = PlainGraph::new();
        graph.push_entry(0, "me", PlainValue::Table(0));
        assert_eq!(to_json(&graph), json!({"me": "<cycle>"}));
    }

    #[test]
    fn scalars_need_no_tables() {
        let graph = to_plain(&json!("abc"));
        assert!(graph.tables.is_empty());
        assert_eq!(to_json(&graph), json!("abc"));
    }
}
