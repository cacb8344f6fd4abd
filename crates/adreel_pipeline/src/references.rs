//! Reference-image selection for visual continuity.
//!
//! Only elements that recur across scenes are worth a reference image; the
//! downstream models invent one-off elements fresh. Selected references are
//! ordered character, prop, location and capped, so characters are never
//! evicted in favour of scenery.

use adreel_core::{Category, ElementKey, ScenePlan, Universe, UniverseElement, Version};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use strum::IntoEnumIterator;

/// Hard input limit of the image and video services.
pub const MAX_REFERENCES: usize = 5;

/// One chosen reference image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedReference {
    /// Element name
    pub element: String,
    /// Element category
    pub category: Category,
    /// Resolved version name
    pub version: String,
    /// Unit key of the version's image under the reference-image stage
    pub image: String,
}

/// Picks reference images for a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceSelector {
    cap: usize,
}

impl Default for ReferenceSelector {
    fn default() -> Self {
        Self {
            cap: MAX_REFERENCES,
        }
    }
}

impl ReferenceSelector {
    /// Selector with a custom cap, clamped to `1..=MAX_REFERENCES`.
    pub fn with_cap(cap: usize) -> Self {
        if cap == 0 {
            tracing::warn!("Image service reports no reference slots, keeping one");
        }
        Self {
            cap: cap.clamp(1, MAX_REFERENCES),
        }
    }

    /// Maximum references per scene.
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Ordered, capped references for a scene.
    ///
    /// Walks the scene's declared usage in category priority order, keeps
    /// elements appearing in two or more scenes, resolves the version for
    /// the scene, and drops versions without an image.
    pub fn select(&self, scene: &ScenePlan, universe: &Universe) -> Vec<SelectedReference> {
        let mut candidates: Vec<SelectedReference> = Vec::new();
        let mut seen = HashSet::new();

        for category in Category::iter() {
            for key in scene.elements_used.of(category) {
                let Some(element) = universe.find(key, category) else {
                    tracing::debug!(element = %key, scene = scene.scene_number, "Element not in universe");
                    continue;
                };
                if !element.needs_reference() {
                    continue;
                }
                let Some(version) = resolve_version(element, key, scene.scene_number) else {
                    continue;
                };
                let Some(image) = version.image.clone() else {
                    tracing::debug!(
                        element = %element.name,
                        version = %version.name,
                        "Version has no reference image"
                    );
                    continue;
                };
                if !seen.insert(image.clone()) {
                    continue;
                }
                candidates.push(SelectedReference {
                    element: element.name.clone(),
                    category: element.category,
                    version: version.name.clone(),
                    image,
                });
            }
        }

        // The universe may file an element under a different category than the scene did
        candidates.sort_by_key(|c| c.category);
        candidates.truncate(self.cap);
        candidates
    }
}

/// Version of `element` to show in `scene`.
///
/// Resolution order:
/// 1. the version whose scene set contains the scene
/// 2. the version named by the key, if it exists
/// 3. the nearest preceding version by scene number
/// 4. the nearest following version by scene number
/// 5. the first version
pub fn resolve_version<'a>(
    element: &'a UniverseElement,
    key: &ElementKey,
    scene: u32,
) -> Option<&'a Version> {
    if let Some(version) = element.versions.iter().find(|v| v.scenes.contains(&scene)) {
        return Some(version);
    }

    if let Some(version) = key
        .version_name
        .as_deref()
        .and_then(|name| element.version(name))
    {
        return Some(version);
    }

    let preceding = element
        .versions
        .iter()
        .filter_map(|v| v.scenes.range(..scene).next_back().map(|s| (*s, v)))
        .max_by_key(|(s, _)| *s)
        .map(|(_, v)| v);
    if preceding.is_some() {
        return preceding;
    }

    let following = element
        .versions
        .iter()
        .filter_map(|v| v.scenes.range(scene + 1..).next().map(|s| (*s, v)))
        .min_by_key(|(s, _)| *s)
        .map(|(_, v)| v);

    following.or_else(|| element.versions.first())
}

#[cfg(test)]
mod tests {
    use super::*;
    use adreel_core::ElementUsage;
    use std::collections::BTreeSet;

    fn version(name: &str, scenes: &[u32], image: Option<&str>) -> Version {
        Version {
            name: name.to_string(),
            scenes: scenes.iter().copied().collect::<BTreeSet<_>>(),
            description: String::new(),
            image_prompt: String::new(),
            is_original: true,
            derived_from: None,
            image: image.map(str::to_string),
        }
    }

    fn element(name: &str, category: Category, versions: Vec<Version>) -> UniverseElement {
        UniverseElement {
            name: name.to_string(),
            category,
            versions,
        }
    }

    fn scene(number: u32, usage: ElementUsage) -> ScenePlan {
        ScenePlan {
            scene_number: number,
            duration_seconds: 6,
            video_summary: String::new(),
            audio_summary: String::new(),
            first_frame_image_prompt: String::new(),
            elements_used: usage,
            dialogue: None,
            visual_effect: None,
        }
    }

    fn keys(names: &[&str]) -> Vec<ElementKey> {
        names.iter().map(|n| ElementKey::parse(n)).collect()
    }

    #[test]
    fn test_single_scene_element_excluded() {
        let universe = Universe {
            elements: vec![element(
                "Lantern",
                Category::Prop,
                vec![version("Lantern", &[2], Some("prop/lantern/lantern.png"))],
            )],
        };
        let plan = scene(
            2,
            ElementUsage {
                props: keys(&["Lantern"]),
                ..Default::default()
            },
        );
        assert!(ReferenceSelector::default().select(&plan, &universe).is_empty());
    }

    #[test]
    fn test_cap_preserves_character_priority() {
        let mut elements = Vec::new();
        let mut usage = ElementUsage::default();
        for i in 0..4 {
            let name = format!("Place {}", i);
            elements.push(element(
                &name,
                Category::Location,
                vec![version(&name, &[1, 2], Some(&format!("location/{}.png", i)))],
            ));
            usage.locations.push(ElementKey::parse(&name));
        }
        for i in 0..3 {
            let name = format!("Hero {}", i);
            elements.push(element(
                &name,
                Category::Character,
                vec![version(&name, &[1, 3], Some(&format!("character/{}.png", i)))],
            ));
            usage.characters.push(ElementKey::parse(&name));
        }
        let universe = Universe { elements };

        let selected = ReferenceSelector::default().select(&scene(1, usage), &universe);
        assert_eq!(selected.len(), MAX_REFERENCES);
        assert!(selected[..3].iter().all(|r| r.category == Category::Character));
        assert!(selected[3..].iter().all(|r| r.category == Category::Location));
    }

    #[test]
    fn test_version_contains_scene() {
        let maya = element(
            "Maya",
            Category::Character,
            vec![
                version("Young", &[1, 2], Some("young.png")),
                version("Old", &[4, 5], Some("old.png")),
            ],
        );
        let key = ElementKey::parse("Maya");
        assert_eq!(resolve_version(&maya, &key, 5).unwrap().name, "Old");
        assert_eq!(resolve_version(&maya, &key, 1).unwrap().name, "Young");
    }

    #[test]
    fn test_listed_scene_beats_named_version() {
        let maya = element(
            "Maya",
            Category::Character,
            vec![
                version("Young", &[1, 2], None),
                version("Old", &[4, 5], None),
            ],
        );
        let key = ElementKey::parse("Maya (Old)");
        assert_eq!(resolve_version(&maya, &key, 1).unwrap().name, "Young");
        // Scene 3 is unlisted, so the named version applies before proximity
        assert_eq!(resolve_version(&maya, &key, 3).unwrap().name, "Old");
    }

    #[test]
    fn test_unlisted_scene_falls_back_to_preceding_then_following() {
        let maya = element(
            "Maya",
            Category::Character,
            vec![
                version("Young", &[2], None),
                version("Old", &[5, 6], None),
            ],
        );
        let key = ElementKey::parse("Maya");
        assert_eq!(resolve_version(&maya, &key, 3).unwrap().name, "Young");
        assert_eq!(resolve_version(&maya, &key, 7).unwrap().name, "Old");
        assert_eq!(resolve_version(&maya, &key, 1).unwrap().name, "Young");
    }

    #[test]
    fn test_missing_images_and_duplicates_skipped() {
        let universe = Universe {
            elements: vec![
                element(
                    "Maya",
                    Category::Character,
                    vec![version("Maya", &[1, 2], Some("maya.png"))],
                ),
                element(
                    "Pier",
                    Category::Location,
                    vec![version("Pier", &[1, 2], None)],
                ),
            ],
        };
        let plan = scene(
            1,
            ElementUsage {
                characters: keys(&["Maya", "Maya"]),
                locations: keys(&["Pier"]),
                ..Default::default()
            },
        );
        let selected = ReferenceSelector::default().select(&plan, &universe);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].image, "maya.png");
    }

    #[test]
    fn test_output_never_exceeds_cap() {
        let mut elements = Vec::new();
        let mut usage = ElementUsage::default();
        for i in 0..12 {
            let name = format!("Thing {}", i);
            elements.push(element(
                &name,
                Category::Prop,
                vec![version(&name, &[1, 2, 3], Some(&format!("{}.png", i)))],
            ));
            usage.props.push(ElementKey::parse(&name));
        }
        let universe = Universe { elements };
        for cap in 1..8 {
            let selected = ReferenceSelector::with_cap(cap).select(&scene(2, usage.clone()), &universe);
            assert!(selected.len() <= MAX_REFERENCES);
            assert!(selected.len() <= cap);
        }
    }

    #[test]
    fn test_zero_cap_keeps_lead_character() {
        let universe = Universe {
            elements: vec![
                element(
                    "Maya",
                    Category::Character,
                    vec![version("Maya", &[1, 2], Some("maya.png"))],
                ),
                element(
                    "Pier",
                    Category::Location,
                    vec![version("Pier", &[1, 2], Some("pier.png"))],
                ),
            ],
        };
        let usage = ElementUsage {
            characters: keys(&["Maya"]),
            locations: keys(&["Pier"]),
            ..Default::default()
        };
        let selector = ReferenceSelector::with_cap(0);
        assert_eq!(selector.cap(), 1);
        let selected = selector.select(&scene(1, usage), &universe);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].element, "Maya");
    }
}
