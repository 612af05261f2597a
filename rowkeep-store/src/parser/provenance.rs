//! Highlight-color provenance labels
//!
//! Data collectors mark spreadsheet cells with fill colors to say where a
//! value came from. A recognized color is carried into the stored value as a
//! `"value (LABEL)"` suffix so the provenance survives the trip out of the
//! spreadsheet format.

/// Recognized fill colors (canonical `RRGGBB`) and their labels
const PROVENANCE_COLORS: &[(&str, &str)] = &[
    ("FFFF00", "UNVERIFIED"),
    ("00FF00", "FIELD VERIFIED"),
    ("92D050", "FIELD VERIFIED"),
    ("FFC000", "ESTIMATED"),
    ("00B0F0", "COMMUNITY SOURCE"),
    ("FF0000", "DISPUTED"),
];

/// Normalize a color string to six upper-case hex digits
///
/// Accepts a leading `#`, alpha-prefixed ARGB (`FFRRGGBB`), three-digit
/// shorthand (`F00`) and any letter case. Returns `None` for anything else.
pub fn normalize_color(raw: &str) -> Option<String> {
    let hex = raw.trim().trim_start_matches('#');
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let rgb = match hex.len() {
        8 => hex[2..].to_string(),
        6 => hex.to_string(),
        3 => hex.chars().flat_map(|c| [c, c]).collect(),
        _ => return None,
    };
    Some(rgb.to_ascii_uppercase())
}

/// Provenance label for a raw fill color, if it is one of the recognized colors
pub fn label_for_color(raw: &str) -> Option<&'static str> {
    let rgb = normalize_color(raw)?;
    PROVENANCE_COLORS
        .iter()
        .find(|(color, _)| *color == rgb)
        .map(|(_, label)| *label)
}

/// Append the provenance label for `fill` to `value`
///
/// Empty values stay empty: a highlighted blank cell carries no data to tag.
pub fn tag_value(value: &str, fill: Option<&str>) -> String {
    match fill.and_then(label_for_color) {
        Some(label) if !value.is_empty() => format!("{} ({})", value, label),
        _ => value.to_string(),
    }
}
