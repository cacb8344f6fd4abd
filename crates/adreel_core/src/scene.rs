//! Per-scene generation contracts.

use crate::{Category, ElementKey};
use serde::{Deserialize, Serialize};

/// Elements a scene declares, by category.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ElementUsage {
    /// Characters in the scene
    #[serde(default)]
    pub characters: Vec<ElementKey>,
    /// Props in the scene
    #[serde(default)]
    pub props: Vec<ElementKey>,
    /// Locations in the scene
    #[serde(default)]
    pub locations: Vec<ElementKey>,
}

impl ElementUsage {
    /// Declared keys for one category.
    pub fn of(&self, category: Category) -> &[ElementKey] {
        match category {
            Category::Character => &self.characters,
            Category::Prop => &self.props,
            Category::Location => &self.locations,
        }
    }
}

/// One scene's generation contract.
///
/// Field names follow the JSON emitted by the scene-prompt stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenePlan {
    /// 1-based, contiguous scene number
    pub scene_number: u32,
    /// Target clip length in seconds
    #[serde(default, deserialize_with = "whole_seconds")]
    pub duration_seconds: u32,
    /// What happens on screen
    pub video_summary: String,
    /// Music, ambience and sound design
    #[serde(default)]
    pub audio_summary: String,
    /// Prompt for the scene's opening frame
    pub first_frame_image_prompt: String,
    /// Elements the scene uses
    #[serde(default)]
    pub elements_used: ElementUsage,
    /// Spoken lines, if any
    #[serde(default)]
    pub dialogue: Option<String>,
    /// Visual effect notes, if any
    #[serde(default)]
    pub visual_effect: Option<String>,
}

impl ScenePlan {
    /// Unit key used for per-scene artifacts.
    pub fn unit_key(&self) -> String {
        format!("scene_{}", self.scene_number)
    }

    /// Prompt sent to the video service: summary, audio, dialogue and effects.
    pub fn video_prompt(&self) -> String {
        let mut prompt = self.video_summary.trim().to_string();
        if !self.audio_summary.trim().is_empty() {
            prompt.push_str("\n\nBackground music and sound: ");
            prompt.push_str(self.audio_summary.trim());
        }
        if let Some(dialogue) = self.dialogue.as_deref().filter(|d| !d.trim().is_empty()) {
            prompt.push_str("\n\nDialogue: ");
            prompt.push_str(dialogue.trim());
        }
        if let Some(effect) = self.visual_effect.as_deref().filter(|e| !e.trim().is_empty()) {
            prompt.push_str("\n\nVisual effects: ");
            prompt.push_str(effect.trim());
        }
        prompt
    }
}

// Models emit `6`, `6.0` or `5.5` interchangeably.
fn whole_seconds<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let seconds = f64::deserialize(deserializer)?;
    Ok(seconds.max(0.0).round() as u32)
}

/// The full ordered scene list for a run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScenePlanSet {
    /// Scenes ordered by scene number
    pub scenes: Vec<ScenePlan>,
}

impl ScenePlanSet {
    /// Returns the first gap or duplicate in scene numbering, if any.
    ///
    /// Numbering must be exactly `1..=n` after sorting.
    pub fn numbering_error(&self) -> Option<String> {
        let mut numbers: Vec<u32> = self.scenes.iter().map(|s| s.scene_number).collect();
        numbers.sort_unstable();
        for (index, number) in numbers.iter().enumerate() {
            let expected = index as u32 + 1;
            if *number != expected {
                return Some(format!(
                    "scene numbers must be contiguous from 1; expected {}, found {}",
                    expected, number
                ));
            }
        }
        None
    }

    /// Find a scene by number.
    pub fn scene(&self, number: u32) -> Option<&ScenePlan> {
        self.scenes.iter().find(|s| s.scene_number == number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(number: u32) -> ScenePlan {
        ScenePlan {
            scene_number: number,
            duration_seconds: 6,
            video_summary: "A watch ticks".into(),
            audio_summary: String::new(),
            first_frame_image_prompt: "Close-up of a watch".into(),
            elements_used: ElementUsage::default(),
            dialogue: None,
            visual_effect: None,
        }
    }

    #[test]
    fn test_numbering() {
        let ok = ScenePlanSet {
            scenes: vec![scene(2), scene(1), scene(3)],
        };
        assert!(ok.numbering_error().is_none());

        let gap = ScenePlanSet {
            scenes: vec![scene(1), scene(3)],
        };
        assert!(gap.numbering_error().is_some());
    }

    #[test]
    fn test_video_prompt_combines_sections() {
        let mut plan = scene(1);
        plan.audio_summary = "Soft piano".into();
        plan.dialogue = Some("Time is yours.".into());
        let prompt = plan.video_prompt();
        assert!(prompt.starts_with("A watch ticks"));
        assert!(prompt.contains("Soft piano"));
        assert!(prompt.contains("Dialogue: Time is yours."));
        assert!(!prompt.contains("Visual effects"));
    }

    #[test]
    fn test_fractional_duration_is_rounded() {
        let plan: ScenePlan = serde_json::from_str(
            r#"{"scene_number": 1, "duration_seconds": 5.6, "video_summary": "v",
                "first_frame_image_prompt": "f",
                "elements_used": {"characters": ["Maya (Young)"]}}"#,
        )
        .unwrap();
        assert_eq!(plan.duration_seconds, 6);
        assert_eq!(
            plan.elements_used.characters[0].version_name.as_deref(),
            Some("Young")
        );
    }
}
