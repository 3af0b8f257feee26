//! Tree -> JSON rendering, kept out of `bufr-codec` so the core crate stays
//! free of a `serde_json` dependency.

use bufr_codec::{DataNode, Message, Value};
use serde_json::{json, Map};

fn render_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Int(v) => json!(v),
        Value::Float(v) => json!(v),
        Value::Str(s) => json!(s),
        Value::Bytes(b) => json!(b),
        Value::None => serde_json::Value::Null,
    }
}

/// Render one [`DataNode`] (and its attributes/children) as a JSON object.
pub fn render_node(node: &DataNode) -> serde_json::Value {
    let mut attributes = Map::new();
    for (kind, attr) in &node.attributes {
        attributes.insert(kind.keyword().to_string(), render_node(attr));
    }

    json!({
        "id": node.descriptor.to_string(),
        "values": node.values.iter().map(render_value).collect::<Vec<_>>(),
        "attributes": attributes,
        "children": node.children.iter().map(render_node).collect::<Vec<_>>(),
    })
}

/// Render a whole decoded message as a JSON object.
pub fn render_message(message: &Message) -> serde_json::Value {
    json!({
        "edition": message.edition,
        "originating_centre": message.originating_centre,
        "master_table_version": message.master_table_version,
        "local_table_version": message.local_table_version,
        "compressed": message.compressed,
        "subsets": message.subsets.iter().map(render_node).collect::<Vec<_>>(),
    })
}
