//! Recurring visual entities and their versions.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Element category, in reference priority order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Category {
    /// People and creatures
    Character,
    /// Objects
    Prop,
    /// Places
    Location,
}

/// Structured reference to an element, optionally pinned to a version.
///
/// Parsed once from the `Name` or `Name (Version)` form models emit, so
/// lookups compare fields instead of re-parsing strings.
///
/// # Examples
///
/// ```
/// use adreel_core::ElementKey;
///
/// let key = ElementKey::parse("Maya  (Transformed)");
/// assert_eq!(key.base_name, "Maya");
/// assert_eq!(key.version_name.as_deref(), Some("Transformed"));
/// assert_eq!(key.to_string(), "Maya (Transformed)");
/// assert_eq!(ElementKey::parse("Old Pier").version_name, None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ElementKey {
    /// Element name
    pub base_name: String,
    /// Version name, if pinned
    pub version_name: Option<String>,
}

impl ElementKey {
    /// Parse `Name` or `Name (Version)`.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Some(stripped) = trimmed.strip_suffix(')')
            && let Some(open) = stripped.rfind('(')
        {
            let base = collapse_whitespace(&stripped[..open]);
            let version = collapse_whitespace(&stripped[open + 1..]);
            if !base.is_empty() && !version.is_empty() {
                return Self {
                    base_name: base,
                    version_name: Some(version),
                };
            }
        }
        Self {
            base_name: collapse_whitespace(trimmed),
            version_name: None,
        }
    }

    /// Key for an element's specific version.
    pub fn versioned(base_name: impl Into<String>, version_name: impl Into<String>) -> Self {
        Self {
            base_name: base_name.into(),
            version_name: Some(version_name.into()),
        }
    }
}

impl From<String> for ElementKey {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<ElementKey> for String {
    fn from(key: ElementKey) -> Self {
        key.to_string()
    }
}

impl std::fmt::Display for ElementKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.version_name {
            Some(version) => write!(f, "{} ({})", self.base_name, version),
            None => write!(f, "{}", self.base_name),
        }
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase, underscore-separated form of a name for use in keys.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_sep = true;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_sep = false;
        } else if !last_sep {
            slug.push('_');
            last_sep = true;
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("unnamed");
    }
    slug
}

/// Make keys unique, suffixing repeats with `_2`, `_3` and so on.
///
/// The first occurrence of a key keeps it unchanged.
///
/// # Examples
///
/// ```
/// use adreel_core::{disambiguate, slugify};
///
/// let keys = disambiguate(["Bold", "Bold!", "Calm"].iter().map(|s| slugify(s)));
/// assert_eq!(keys, vec!["bold", "bold_2", "calm"]);
/// ```
pub fn disambiguate<I>(keys: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut taken: HashSet<String> = HashSet::new();
    keys.into_iter()
        .map(|key| {
            if taken.insert(key.clone()) {
                return key;
            }
            let mut n = 2;
            loop {
                let candidate = format!("{}_{}", key, n);
                if taken.insert(candidate.clone()) {
                    return candidate;
                }
                n += 1;
            }
        })
        .collect()
}

/// A named state of an element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    /// Version name
    pub name: String,
    /// Scenes in which this version appears
    pub scenes: BTreeSet<u32>,
    /// Canonical description
    pub description: String,
    /// Prompt used to render the reference image
    pub image_prompt: String,
    /// Whether this is the element's original state
    #[serde(default)]
    pub is_original: bool,
    /// Version this one was derived from, looked up by name
    #[serde(default)]
    pub derived_from: Option<String>,
    /// Artifact key of the rendered reference image
    #[serde(default)]
    pub image: Option<String>,
}

/// A character, prop or location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniverseElement {
    /// Name, unique within a run
    pub name: String,
    /// Category
    pub category: Category,
    /// One or more versions
    pub versions: Vec<Version>,
}

impl UniverseElement {
    /// Union of scene numbers across all versions.
    pub fn scene_union(&self) -> BTreeSet<u32> {
        self.versions
            .iter()
            .flat_map(|v| v.scenes.iter().copied())
            .collect()
    }

    /// Only elements appearing in two or more scenes need a reference image.
    pub fn needs_reference(&self) -> bool {
        self.scene_union().len() >= 2
    }

    /// Find a version by name.
    pub fn version(&self, name: &str) -> Option<&Version> {
        self.versions.iter().find(|v| v.name == name)
    }

    /// Key-safe form of the element name.
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }
}

/// All recurring elements of a run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Universe {
    /// Elements in document order
    pub elements: Vec<UniverseElement>,
}

impl Universe {
    /// Find an element by key, preferring the given category.
    pub fn find(&self, key: &ElementKey, category: Category) -> Option<&UniverseElement> {
        self.elements
            .iter()
            .find(|e| e.category == category && e.name == key.base_name)
            .or_else(|| self.elements.iter().find(|e| e.name == key.base_name))
    }

    /// Find an element by exact name.
    pub fn find_mut(&mut self, name: &str) -> Option<&mut UniverseElement> {
        self.elements.iter_mut().find(|e| e.name == name)
    }

    /// Build from the document shape models are asked to emit.
    pub fn from_document(doc: UniverseDocument) -> Self {
        let mut elements = Vec::new();
        for raw in doc.characters {
            elements.push(raw.into_element(Category::Character));
        }
        for raw in doc.universe.props {
            elements.push(raw.into_element(Category::Prop));
        }
        for raw in doc.universe.locations {
            elements.push(raw.into_element(Category::Location));
        }
        Self { elements }
    }
}

/// The universe document emitted by the universe-generation prompt.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UniverseDocument {
    /// Props and locations
    #[serde(default)]
    pub universe: UniverseSection,
    /// Characters
    #[serde(default)]
    pub characters: Vec<RawElement>,
}

/// Non-character part of a universe document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UniverseSection {
    /// Locations
    #[serde(default)]
    pub locations: Vec<RawElement>,
    /// Props
    #[serde(default)]
    pub props: Vec<RawElement>,
}

/// One element as emitted by the model.
#[derive(Debug, Clone, Deserialize)]
pub struct RawElement {
    /// Element name
    pub name: String,
    /// Scenes the element appears in
    #[serde(default)]
    pub scenes_used: Vec<u32>,
    /// Whether `versions` is meaningful
    #[serde(default)]
    pub has_multiple_versions: bool,
    /// Versions when the element changes across scenes
    #[serde(default)]
    pub versions: Vec<RawVersion>,
    /// Single-version description
    #[serde(default)]
    pub description: String,
    /// Single-version image prompt
    #[serde(default)]
    pub image_generation_prompt: String,
}

/// One version as emitted by the model.
#[derive(Debug, Clone, Deserialize)]
pub struct RawVersion {
    /// Version name
    pub version_name: String,
    /// Scenes this version appears in
    #[serde(default)]
    pub scenes_used: Vec<u32>,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Image prompt
    #[serde(default)]
    pub image_generation_prompt: String,
    /// Whether this is the original state
    #[serde(default)]
    pub is_original: bool,
    /// Whether rendering should reference the original version's image
    #[serde(default)]
    pub references_original_version: bool,
}

impl RawElement {
    fn into_element(self, category: Category) -> UniverseElement {
        let versions = if self.has_multiple_versions && !self.versions.is_empty() {
            let original = self
                .versions
                .iter()
                .find(|v| v.is_original)
                .or_else(|| self.versions.first())
                .map(|v| v.version_name.trim().to_string());
            self.versions
                .into_iter()
                .map(|v| {
                    let name = v.version_name.trim().to_string();
                    let derived_from = if v.references_original_version && !v.is_original {
                        original.clone().filter(|o| *o != name)
                    } else {
                        None
                    };
                    Version {
                        name,
                        scenes: v.scenes_used.into_iter().collect(),
                        description: v.description,
                        image_prompt: v.image_generation_prompt,
                        is_original: v.is_original,
                        derived_from,
                        image: None,
                    }
                })
                .collect()
        } else {
            vec![Version {
                name: self.name.trim().to_string(),
                scenes: self.scenes_used.into_iter().collect(),
                description: self.description,
                image_prompt: self.image_generation_prompt,
                is_original: true,
                derived_from: None,
                image: None,
            }]
        };

        UniverseElement {
            name: self.name.trim().to_string(),
            category,
            versions,
        }
    }
}
