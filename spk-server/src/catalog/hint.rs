//! Material type hints from product display names
//!
//! Printer firmware reports names such as "Bambu PLA Matte". When the
//! catalog knows no product by that name, the bare material token ("PLA")
//! still narrows the colour search.

/// Brand tokens that may prefix a display name. Longest first.
const BRAND_PREFIXES: &[&str] = &[
    "Bambu Lab",
    "BambuLab",
    "Bambu",
    "Polymaker",
    "Prusament",
    "Overture",
    "Elegoo",
    "Sunlu",
    "eSun",
];

/// Recognised material tokens, in canonical spelling
const MATERIAL_TOKENS: &[&str] = &[
    "PLA", "PLA-CF", "PLA-GF", "PETG", "PETG-CF", "PET", "PET-CF", "ABS", "ABS-GF", "ASA",
    "ASA-CF", "TPU", "PC", "PC-FR", "PA", "PA-CF", "PA6", "PA6-CF", "PA6-GF", "PAHT",
    "PAHT-CF", "PPA-CF", "PPS", "PPS-CF", "PVA", "BVOH", "HIPS",
];

/// Strip a known brand prefix. Returns the remainder and whether a prefix
/// was removed.
pub fn strip_brand_prefix(name: &str) -> (&str, bool) {
    let name = name.trim();
    for prefix in BRAND_PREFIXES {
        let Some(head) = name.get(..prefix.len()) else {
            continue;
        };
        if !head.eq_ignore_ascii_case(prefix) {
            continue;
        }
        let rest = &name[prefix.len()..];
        if rest.starts_with(char::is_whitespace) {
            return (rest.trim_start(), true);
        }
    }
    (name, false)
}

/// Canonical spelling of a material token, if recognised
pub fn recognize_material(token: &str) -> Option<&'static str> {
    MATERIAL_TOKENS
        .iter()
        .copied()
        .find(|m| m.eq_ignore_ascii_case(token))
}

/// Best guess at the material type named by `display_name`.
///
/// - "Bambu PLA Matte" → "PLA"
/// - "Bambu Support W" → "Support" (brand stripped, first token kept)
/// - "petg hf" → "PETG"
/// - anything else is returned unchanged
pub fn material_type_hint(display_name: &str) -> String {
    let (rest, stripped) = strip_brand_prefix(display_name);
    let first = rest.split_whitespace().next().unwrap_or("");

    if let Some(material) = recognize_material(first) {
        return material.to_string();
    }
    if stripped && !first.is_empty() {
        return first.to_string();
    }
    display_name.trim().to_string()
}
