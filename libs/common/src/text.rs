//! Identifier helpers for MQTT topic segments.

/// Turn a display name into a topic-safe slug.
///
/// Mirrors the naming used in published discovery documents: spaces become
/// underscores, `/` becomes `OR` (so "Device On/Off" stays distinguishable
/// from "Device On Off"), punctuation that MQTT or Home Assistant dislikes
/// is dropped, and the result is lowercased.
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            ' ' => out.push('_'),
            '/' => out.push_str("OR"),
            '(' | ')' | ':' | '.' | '&' => {},
            other => out.push(other),
        }
    }
    out.to_lowercase()
}
