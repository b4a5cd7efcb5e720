//! Bestiary monster records.
//!
//! Source files are irregular: type, armor class, challenge rating, size and
//! alignment each come in several shapes. Every such field is an untagged
//! enum whose last variant is an `Other` catch-all, so an unexpected shape
//! is carried through as "unknown" instead of failing the whole record.

use crate::encounter::NewCombatant;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Placeholder shown for a type that cannot be displayed.
pub const UNSPECIFIED: &str = "Unspecified";

/// AC and HP used when a monster without usable stats joins an encounter.
pub const DEFAULT_COMBAT_STAT: i32 = 10;

// ============================================================================
// Creature type
// ============================================================================

/// The `type` field: `"beast"`, `{type: "fiend", tags: [...]}` or
/// `{type: {choose: [...]}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CreatureType {
    Name(String),
    Detailed {
        #[serde(rename = "type")]
        kind: TypeName,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tags: Vec<TypeTag>,
    },
    Other(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeName {
    Name(String),
    Choose { choose: Vec<String> },
    Other(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeTag {
    Name(String),
    Prefixed { tag: String, prefix: String },
    Other(Value),
}

impl TypeTag {
    fn display(&self) -> Option<String> {
        match self {
            TypeTag::Name(tag) => Some(tag.clone()),
            TypeTag::Prefixed { tag, prefix } => Some(format!("{prefix} {tag}")),
            TypeTag::Other(_) => None,
        }
    }
}

impl CreatureType {
    /// Index labels for this type. A choose structure yields one label per
    /// option; an unrecognized shape yields none.
    pub fn labels(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            CreatureType::Name(name) => vec![name.as_str()],
            CreatureType::Detailed { kind, .. } => match kind {
                TypeName::Name(name) => vec![name.as_str()],
                TypeName::Choose { choose } => choose.iter().map(String::as_str).collect(),
                TypeName::Other(_) => Vec::new(),
            },
            CreatureType::Other(_) => Vec::new(),
        };

        let mut labels: Vec<String> = Vec::with_capacity(raw.len());
        for label in raw.into_iter().filter_map(type_label) {
            if !labels.contains(&label) {
                labels.push(label);
            }
        }
        labels
    }

    /// Flat display string, e.g. `humanoid (goblinoid)`.
    pub fn display(&self) -> String {
        match self {
            CreatureType::Name(name) => name.clone(),
            CreatureType::Detailed { kind, tags } => {
                let base = match kind {
                    TypeName::Name(name) => name.clone(),
                    TypeName::Choose { choose } if !choose.is_empty() => choose.join(" or "),
                    _ => return UNSPECIFIED.to_string(),
                };
                let tags: Vec<String> = tags.iter().filter_map(TypeTag::display).collect();
                if tags.is_empty() {
                    base
                } else {
                    format!("{base} ({})", tags.join(", "))
                }
            }
            CreatureType::Other(_) => UNSPECIFIED.to_string(),
        }
    }
}

/// Normalize a raw type name into an index label: first letter upper case,
/// the rest lower case.
pub fn type_label(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let mut chars = raw.chars();
    let first = chars.next()?;
    Some(first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect())
}

// ============================================================================
// Armor class
// ============================================================================

/// The `ac` field: `15`, `[15]`, `[{ac: 15, from: [...]}]` or `{ac: 15}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArmorClassField {
    Flat(i32),
    List(Vec<ArmorClassEntry>),
    Single {
        ac: i32,
        #[serde(default)]
        from: Vec<String>,
    },
    Other(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArmorClassEntry {
    Flat(i32),
    Detailed {
        ac: i32,
        #[serde(default)]
        from: Vec<String>,
    },
    Other(Value),
}

/// Normalized armor class. `Unknown` is explicit, never a guessed number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArmorClass {
    Known { value: i32, from: Vec<String> },
    Unknown,
}

impl ArmorClassField {
    /// Only the first entry of a list is used.
    pub fn normalize(&self) -> ArmorClass {
        let known = |value: i32, from: &[String]| ArmorClass::Known {
            value,
            from: from.to_vec(),
        };
        match self {
            ArmorClassField::Flat(value) => known(*value, &[]),
            ArmorClassField::Single { ac, from } => known(*ac, from),
            ArmorClassField::List(entries) => match entries.first() {
                Some(ArmorClassEntry::Flat(value)) => known(*value, &[]),
                Some(ArmorClassEntry::Detailed { ac, from }) => known(*ac, from),
                _ => ArmorClass::Unknown,
            },
            ArmorClassField::Other(_) => ArmorClass::Unknown,
        }
    }
}

impl ArmorClass {
    pub fn value(&self) -> Option<i32> {
        match self {
            ArmorClass::Known { value, .. } => Some(*value),
            ArmorClass::Unknown => None,
        }
    }

    /// `15 (natural armor)`, `12` or `Unknown`.
    pub fn display(&self) -> String {
        match self {
            ArmorClass::Known { value, from } if !from.is_empty() => {
                format!("{value} ({})", from.join(", "))
            }
            ArmorClass::Known { value, .. } => value.to_string(),
            ArmorClass::Unknown => "Unknown".to_string(),
        }
    }
}

// ============================================================================
// Hit points, challenge rating
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HitPointsField {
    Detailed {
        #[serde(default, deserialize_with = "lenient_int")]
        average: Option<i32>,
        #[serde(default)]
        formula: Option<String>,
        #[serde(default)]
        special: Option<String>,
    },
    Other(Value),
}

impl HitPointsField {
    pub fn average(&self) -> Option<i32> {
        match self {
            HitPointsField::Detailed { average, .. } => *average,
            HitPointsField::Other(_) => None,
        }
    }

    /// `22 (5d8)`, a special note, or `Unknown`.
    pub fn display(&self) -> String {
        match self {
            HitPointsField::Detailed {
                average: Some(avg),
                formula: Some(formula),
                ..
            } => format!("{avg} ({formula})"),
            HitPointsField::Detailed {
                average: Some(avg), ..
            } => avg.to_string(),
            HitPointsField::Detailed {
                special: Some(special),
                ..
            } => special.clone(),
            _ => "Unknown".to_string(),
        }
    }
}

/// The `cr` field: `"1/4"` or `{cr: "10", lair: "11"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CrField {
    Text(String),
    Detailed {
        cr: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lair: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        coven: Option<String>,
    },
    Other(Value),
}

impl CrField {
    pub fn display(&self) -> String {
        match self {
            CrField::Text(cr) | CrField::Detailed { cr, .. } => cr.clone(),
            CrField::Other(_) => "?".to_string(),
        }
    }
}

// ============================================================================
// Size and alignment
// ============================================================================

/// A field that is either one entry or a list of entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListField {
    // Many first: a list would otherwise match `One(Other(..))`
    Many(Vec<ListEntry>),
    One(ListEntry),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListEntry {
    Text(String),
    Choose { choose: Vec<String> },
    Other(Value),
}

impl ListEntry {
    /// `"L"` stays as is, `{choose: ["L", "C"]}` becomes `"L or C"`.
    fn flatten(&self) -> String {
        match self {
            ListEntry::Text(text) => text.clone(),
            ListEntry::Choose { choose } => choose.join(" or "),
            ListEntry::Other(Value::Number(n)) => n.to_string(),
            ListEntry::Other(_) => UNSPECIFIED.to_string(),
        }
    }

    fn describe(&self, words: fn(&str) -> Option<&'static str>) -> String {
        let word = |code: &String| words(code).map(str::to_string).unwrap_or_else(|| code.clone());
        match self {
            ListEntry::Text(code) => word(code),
            ListEntry::Choose { choose } => {
                choose.iter().map(word).collect::<Vec<_>>().join(" or ")
            }
            other => other.flatten(),
        }
    }
}

impl ListField {
    pub fn entries(&self) -> &[ListEntry] {
        match self {
            ListField::One(entry) => std::slice::from_ref(entry),
            ListField::Many(entries) => entries,
        }
    }

    /// Replace every entry with its flat text form.
    fn flattened(&self) -> ListField {
        ListField::Many(
            self.entries()
                .iter()
                .map(|e| ListEntry::Text(e.flatten()))
                .collect(),
        )
    }

    fn describe(&self, words: fn(&str) -> Option<&'static str>, sep: &str) -> String {
        self.entries()
            .iter()
            .map(|e| e.describe(words))
            .collect::<Vec<_>>()
            .join(sep)
    }
}

fn size_word(code: &str) -> Option<&'static str> {
    Some(match code {
        "T" => "Tiny",
        "S" => "Small",
        "M" => "Medium",
        "L" => "Large",
        "H" => "Huge",
        "G" => "Gargantuan",
        _ => return None,
    })
}

fn alignment_word(code: &str) -> Option<&'static str> {
    Some(match code {
        "L" => "Lawful",
        "N" => "Neutral",
        "C" => "Chaotic",
        "G" => "Good",
        "E" => "Evil",
        _ => return None,
    })
}

// ============================================================================
// Monster
// ============================================================================

/// One read-only bestiary record.
///
/// Fields the tracker does not interpret (traits, actions, spellcasting) are
/// kept in `extra` so detail views can still show them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monster {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<ListField>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub creature_type: Option<CreatureType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<ListField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ac: Option<ArmorClassField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hp: Option<HitPointsField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<Value>,
    #[serde(rename = "str", default, deserialize_with = "lenient_int")]
    pub strength: Option<i32>,
    #[serde(rename = "dex", default, deserialize_with = "lenient_int")]
    pub dexterity: Option<i32>,
    #[serde(rename = "con", default, deserialize_with = "lenient_int")]
    pub constitution: Option<i32>,
    #[serde(rename = "int", default, deserialize_with = "lenient_int")]
    pub intelligence: Option<i32>,
    #[serde(rename = "wis", default, deserialize_with = "lenient_int")]
    pub wisdom: Option<i32>,
    #[serde(rename = "cha", default, deserialize_with = "lenient_int")]
    pub charisma: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cr: Option<CrField>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Monster {
    /// Index labels for this record; empty if the type is unclassifiable.
    pub fn type_labels(&self) -> Vec<String> {
        self.creature_type
            .as_ref()
            .map(CreatureType::labels)
            .unwrap_or_default()
    }

    /// Copy with type, alignment and size flattened to display strings.
    pub fn normalized(mut self) -> Self {
        self.creature_type = Some(CreatureType::Name(self.type_display()));
        self.alignment = self.alignment.as_ref().map(ListField::flattened);
        self.size = self.size.as_ref().map(ListField::flattened);
        self
    }

    pub fn type_display(&self) -> String {
        self.creature_type
            .as_ref()
            .map(CreatureType::display)
            .unwrap_or_else(|| UNSPECIFIED.to_string())
    }

    pub fn armor_class(&self) -> ArmorClass {
        self.ac
            .as_ref()
            .map(ArmorClassField::normalize)
            .unwrap_or(ArmorClass::Unknown)
    }

    pub fn ac_display(&self) -> String {
        self.armor_class().display()
    }

    pub fn hp_display(&self) -> String {
        self.hp
            .as_ref()
            .map(HitPointsField::display)
            .unwrap_or_else(|| "Unknown".to_string())
    }

    pub fn cr_display(&self) -> String {
        self.cr
            .as_ref()
            .map(CrField::display)
            .unwrap_or_else(|| "?".to_string())
    }

    /// `Large`, `Medium, Small`
    pub fn size_display(&self) -> String {
        self.size
            .as_ref()
            .map(|s| s.describe(size_word, ", "))
            .unwrap_or_default()
    }

    /// `Chaotic Evil`
    pub fn alignment_display(&self) -> String {
        self.alignment
            .as_ref()
            .map(|a| a.describe(alignment_word, " "))
            .unwrap_or_default()
    }

    /// `30 ft., fly 60 ft. (hover)`; walking speed first and unlabeled.
    pub fn speed_display(&self) -> String {
        let Some(Value::Object(speeds)) = &self.speed else {
            return "No speed data".to_string();
        };

        let mut parts = Vec::new();
        let walk = speeds.get("walk").map(|v| ("walk", v));
        let others = speeds
            .iter()
            .filter(|(mode, _)| mode.as_str() != "walk")
            .map(|(mode, v)| (mode.as_str(), v));

        for (mode, value) in walk.into_iter().chain(others) {
            let (feet, condition) = match value {
                Value::Number(n) => (n.as_i64(), None),
                Value::Object(detail) => (
                    detail.get("number").and_then(Value::as_i64),
                    detail.get("condition").and_then(Value::as_str),
                ),
                _ => (None, None),
            };
            let Some(feet) = feet.filter(|f| *f > 0) else {
                continue;
            };
            let label = if mode == "walk" {
                String::new()
            } else {
                format!("{mode} ")
            };
            match condition {
                Some(condition) => parts.push(format!("{label}{feet} ft. {condition}")),
                None => parts.push(format!("{label}{feet} ft.")),
            }
        }

        if parts.is_empty() {
            "No speed data".to_string()
        } else {
            parts.join(", ")
        }
    }

    /// Build an independent combatant from this record. Unknown AC or HP
    /// fall back to 10 so the combatant is always playable.
    pub fn to_new_combatant(&self) -> NewCombatant {
        let name = match self.name.trim() {
            "" => "Unknown Monster",
            name => name,
        };
        let ac = self
            .armor_class()
            .value()
            .filter(|ac| *ac >= 0)
            .unwrap_or(DEFAULT_COMBAT_STAT);
        let hp = self
            .hp
            .as_ref()
            .and_then(HitPointsField::average)
            .filter(|hp| *hp > 0)
            .unwrap_or(DEFAULT_COMBAT_STAT);
        NewCombatant::new(name, ac, hp)
    }
}

/// Ability modifier as shown on a stat block: `+2`, `-1`, `+0`.
pub fn ability_modifier(score: Option<i32>) -> String {
    let modifier = match score {
        Some(score) if score != 0 => (score - 10).div_euclid(2),
        _ => 0,
    };
    if modifier >= 0 {
        format!("+{modifier}")
    } else {
        modifier.to_string()
    }
}

/// Accept any integral JSON number, treat everything else as absent.
fn lenient_int<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .and_then(|v| v.as_i64())
        .and_then(|n| i32::try_from(n).ok()))
}
