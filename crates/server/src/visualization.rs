//! Visualization payload detection.
//!
//! Tools behind the model may emit a JSON object tagged with
//! `visualization_type` inside a response chunk. The object is forwarded to
//! clients separately as `canvas_expand` so they can hand it to a renderer.

use serde_json::Value;

pub const VISUALIZATION_KEY: &str = "visualization_type";

/// First JSON object in `chunk` carrying a `visualization_type` field.
pub fn extract_visualization(chunk: &str) -> Option<Value> {
    if !chunk.contains(VISUALIZATION_KEY) {
        return None;
    }

    chunk.match_indices('{').find_map(|(start, _)| {
        let mut values = serde_json::Deserializer::from_str(&chunk[start..]).into_iter::<Value>();
        match values.next() {
            Some(Ok(value)) if value.get(VISUALIZATION_KEY).is_some() => Some(value),
            _ => None,
        }
    })
}
