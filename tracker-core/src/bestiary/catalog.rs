//! Static bestiary data: which files to look for, and how to present each
//! creature type.

use super::TypeInfo;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Files probed during discovery, most popular sourcebooks first.
pub const CANDIDATE_FILES: &[&str] = &[
    "bestiary-mm.json",
    "bestiary-mpmm.json",
    "bestiary-vgm.json",
    "bestiary-mtf.json",
    "bestiary-ftd.json",
    "bestiary-xmm.json",
    "bestiary-phb.json",
    "bestiary-xphb.json",
    "bestiary-cos.json",
    "bestiary-skt.json",
    "bestiary-toa.json",
    "bestiary-wdh.json",
    "bestiary-wdmm.json",
    "bestiary-idrotf.json",
    "bestiary-mot.json",
    "bestiary-erlw.json",
    "bestiary-ggr.json",
    "bestiary-egw.json",
    "bestiary-vrgr.json",
    "bestiary-tce.json",
    "bestiary-oota.json",
    "bestiary-pota.json",
    "bestiary-hotdq.json",
    "bestiary-rot.json",
    "bestiary-lmop.json",
    "bestiary-tftyp.json",
    "bestiary-bgg.json",
    "bestiary-xge.json",
];

/// Core files assumed present when discovery cannot reach the source at all.
pub const FALLBACK_FILES: &[&str] = &[
    "bestiary-mm.json",
    "bestiary-mpmm.json",
    "bestiary-vgm.json",
    "bestiary-mtf.json",
];

const UNKNOWN_DESCRIPTION: &str = "Various creatures";
const UNKNOWN_ICON: &str = "❓";

/// Presentation for a creature type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeStyle {
    pub description: &'static str,
    pub icon: &'static str,
}

static TYPE_STYLES: LazyLock<HashMap<&'static str, TypeStyle>> = LazyLock::new(build_type_styles);

fn build_type_styles() -> HashMap<&'static str, TypeStyle> {
    [
        ("Aberration", "Alien entities from beyond reality", "🐙"),
        ("Beast", "Natural animals and creatures", "🐺"),
        ("Celestial", "Angels and divine beings", "👼"),
        ("Construct", "Animated objects and golems", "🤖"),
        ("Dragon", "Ancient, powerful reptilian creatures", "🐉"),
        ("Elemental", "Beings of pure elemental force", "⚡"),
        ("Fey", "Magical creatures from the Feywild", "🧚"),
        ("Fiend", "Devils, demons, and evil outsiders", "👹"),
        ("Giant", "Large humanoid creatures", "🗿"),
        ("Humanoid", "People and human-like beings", "👤"),
        ("Monstrosity", "Unnatural creatures and hybrids", "👾"),
        ("Ooze", "Formless, gelatinous creatures", "🟢"),
        ("Plant", "Animated vegetation and plant life", "🌿"),
        ("Undead", "Creatures returned from death", "💀"),
    ]
    .into_iter()
    .map(|(label, description, icon)| (label, TypeStyle { description, icon }))
    .collect()
}

/// Look up the style for an index label such as `"Dragon"`.
pub fn type_style(label: &str) -> TypeStyle {
    TYPE_STYLES.get(label).copied().unwrap_or(TypeStyle {
        description: UNKNOWN_DESCRIPTION,
        icon: UNKNOWN_ICON,
    })
}

pub fn type_description(label: &str) -> &'static str {
    type_style(label).description
}

pub fn type_icon(label: &str) -> &'static str {
    type_style(label).icon
}

/// Filter index entries whose label or description contains `query`,
/// ignoring case. An empty query matches everything.
pub fn search_types<'a>(index: &'a [TypeInfo], query: &str) -> Vec<&'a TypeInfo> {
    let query = query.trim().to_lowercase();
    index
        .iter()
        .filter(|info| {
            query.is_empty()
                || info.label.to_lowercase().contains(&query)
                || type_description(&info.label)
                    .to_lowercase()
                    .contains(&query)
        })
        .collect()
}
