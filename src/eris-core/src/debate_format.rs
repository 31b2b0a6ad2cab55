//! Debate format definitions and trait.
//!
//! A format is an ordered list of sections. Each section belongs to one
//! [`Phase`] and lists which side speaks in which order. The orchestrator
//! works on the flattened list of [`Turn`]s.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DebateError;
use crate::participant::Side;

/// Phases of a Public Forum round, in the order they occur.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Constructive,
    Crossfire,
    Rebuttal,
    FinalFocus,
}

impl Phase {
    pub const ALL: [Phase; 4] = [
        Phase::Constructive,
        Phase::Crossfire,
        Phase::Rebuttal,
        Phase::FinalFocus,
    ];

    /// The phase that follows this one, or `None` after final focus.
    pub fn next(&self) -> Option<Phase> {
        match self {
            Phase::Constructive => Some(Phase::Crossfire),
            Phase::Crossfire => Some(Phase::Rebuttal),
            Phase::Rebuttal => Some(Phase::FinalFocus),
            Phase::FinalFocus => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Phase::Constructive => "Constructive",
            Phase::Crossfire => "Crossfire",
            Phase::Rebuttal => "Rebuttal",
            Phase::FinalFocus => "Final Focus",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Constructive => "constructive",
            Phase::Crossfire => "crossfire",
            Phase::Rebuttal => "rebuttal",
            Phase::FinalFocus => "final_focus",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Phase {
    type Err = DebateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| DebateError::Validation(format!("unknown phase '{s}'")))
    }
}

/// Speaking time per turn, in seconds, for each phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PhaseTimings {
    pub constructive_secs: u32,
    /// Length of a single crossfire exchange; a crossfire has four.
    pub crossfire_secs: u32,
    pub rebuttal_secs: u32,
    pub final_focus_secs: u32,
}

impl Default for PhaseTimings {
    fn default() -> Self {
        Self {
            constructive_secs: 240,
            crossfire_secs: 45,
            rebuttal_secs: 240,
            final_focus_secs: 120,
        }
    }
}

/// A section within a debate (e.g. constructive speeches, crossfire).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateSection {
    pub phase: Phase,
    /// Name of the section (announced to participants).
    pub name: String,
    /// Description/instructions for this section.
    pub description: String,
    /// Which sides speak in this section, in order.
    pub speaker_order: Vec<Side>,
    /// Speaking time for each turn in this section.
    pub time_limit_secs: u32,
    /// Maximum response length hint for each speaker in this section.
    pub max_tokens: u32,
}

/// A single speaking slot, flattened out of the sections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub index: usize,
    pub section_index: usize,
    pub phase: Phase,
    pub side: Side,
    pub time_limit_secs: u32,
    pub max_tokens: u32,
}

/// Trait for defining debate formats.
pub trait DebateFormat: Send + Sync {
    /// Returns the name of this debate format.
    fn name(&self) -> &str;

    /// Returns the display name for the format.
    fn display_name(&self) -> &str;

    /// Returns all sections of the debate in order.
    fn sections(&self) -> Vec<DebateSection>;

    /// Maximum number of participants allowed.
    fn max_participants(&self) -> usize;

    /// Minimum number of participants required.
    fn min_participants(&self) -> usize;

    /// Get system prompt for a participant based on their side.
    fn system_prompt(&self, topic: &str, name: &str, side: Side, opponent_name: &str) -> String;

    /// Flatten the sections into individually indexed turns.
    fn turns(&self) -> Vec<Turn> {
        self.sections()
            .iter()
            .enumerate()
            .flat_map(|(section_index, section)| {
                section.speaker_order.iter().map(move |&side| (section_index, section, side))
            })
            .enumerate()
            .map(|(index, (section_index, section, side))| Turn {
                index,
                section_index,
                phase: section.phase,
                side,
                time_limit_secs: section.time_limit_secs,
                max_tokens: section.max_tokens,
            })
            .collect()
    }
}

/// Public Forum debate format.
///
/// Two sides, one speaker each:
/// - Constructive speeches (first speaker, then second)
/// - Crossfire (four alternating exchanges)
/// - Rebuttals
/// - Final focus
#[derive(Debug, Clone)]
pub struct PublicForumFormat {
    first_speaker: Side,
    timings: PhaseTimings,
}

impl PublicForumFormat {
    pub fn new(first_speaker: Side, timings: PhaseTimings) -> Self {
        Self {
            first_speaker,
            timings,
        }
    }

    pub fn first_speaker(&self) -> Side {
        self.first_speaker
    }
}

impl Default for PublicForumFormat {
    fn default() -> Self {
        Self::new(Side::Pro, PhaseTimings::default())
    }
}

impl DebateFormat for PublicForumFormat {
    fn name(&self) -> &str {
        "public_forum"
    }

    fn display_name(&self) -> &str {
        "Public Forum Debate"
    }

    fn sections(&self) -> Vec<DebateSection> {
        let first = self.first_speaker;
        let second = first.opponent();

        vec![
            DebateSection {
                phase: Phase::Constructive,
                name: "Constructive Speeches".to_string(),
                description: "Each side presents its case: framework, contentions and evidence."
                    .to_string(),
                speaker_order: vec![first, second],
                time_limit_secs: self.timings.constructive_secs,
                max_tokens: 600,
            },
            DebateSection {
                phase: Phase::Crossfire,
                name: "Crossfire".to_string(),
                description: "Speakers question each other directly. Ask or answer one pointed question per turn."
                    .to_string(),
                speaker_order: vec![first, second, first, second],
                time_limit_secs: self.timings.crossfire_secs,
                max_tokens: 180,
            },
            DebateSection {
                phase: Phase::Rebuttal,
                name: "Rebuttals".to_string(),
                description: "Each side attacks the opponent's case and defends its own."
                    .to_string(),
                speaker_order: vec![first, second],
                time_limit_secs: self.timings.rebuttal_secs,
                max_tokens: 600,
            },
            DebateSection {
                phase: Phase::FinalFocus,
                name: "Final Focus".to_string(),
                description: "Crystallize the round: the key voting issues and why your side wins them."
                    .to_string(),
                speaker_order: vec![first, second],
                time_limit_secs: self.timings.final_focus_secs,
                max_tokens: 350,
            },
        ]
    }

    fn max_participants(&self) -> usize {
        2
    }

    fn min_participants(&self) -> usize {
        2
    }

    fn system_prompt(&self, topic: &str, name: &str, side: Side, opponent_name: &str) -> String {
        format!(
            r#"You are {name}, a competitive Public Forum debater.

RESOLUTION: {topic}

You are on the {side} side, arguing {stance} the resolution. Your opponent is {opponent_name}.

Guidelines:
- Make clear claims, warrant them, and explain their impact
- Cite evidence by source and year when you use it
- Respond directly to your opponent's arguments
- Stay within the time you are given for each speech
- Do not break character or acknowledge being an AI

Speak as you would in a real round, addressing the judge."#,
            side = side.display_name(),
            stance = match side {
                Side::Pro => "IN FAVOR OF",
                Side::Con => "AGAINST",
            },
        )
    }
}

/// Get a debate format by name.
pub fn get_format(
    name: &str,
    first_speaker: Side,
    timings: PhaseTimings,
) -> Option<Box<dyn DebateFormat>> {
    match name.to_lowercase().replace(['-', ' '], "_").as_str() {
        "public_forum" | "pf" => Some(Box::new(PublicForumFormat::new(first_speaker, timings))),
        _ => None,
    }
}

/// List all available debate format names.
pub fn available_formats() -> Vec<&'static str> {
    vec!["public_forum"]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order() {
        let format = PublicForumFormat::default();
        let phases: Vec<Phase> = format.sections().iter().map(|s| s.phase).collect();
        assert_eq!(
            phases,
            vec![
                Phase::Constructive,
                Phase::Crossfire,
                Phase::Rebuttal,
                Phase::FinalFocus
            ]
        );
    }

    #[test]
    fn test_phase_next_chain() {
        let mut chain = vec![Phase::Constructive];
        while let Some(next) = chain.last().and_then(Phase::next) {
            chain.push(next);
        }
        assert_eq!(chain, Phase::ALL.to_vec());
    }

    #[test]
    fn test_turns_are_flattened_in_order() {
        let format = PublicForumFormat::default();
        let turns = format.turns();

        assert_eq!(turns.len(), 10);
        assert!(turns.iter().enumerate().all(|(i, t)| t.index == i));
        assert_eq!(turns[0].phase, Phase::Constructive);
        assert_eq!(turns[2].phase, Phase::Crossfire);
        assert_eq!(turns[5].phase, Phase::Crossfire);
        assert_eq!(turns[6].phase, Phase::Rebuttal);
        assert_eq!(turns[9].phase, Phase::FinalFocus);
        assert_eq!(turns[9].section_index, 3);
    }

    #[test]
    fn test_first_speaker_leads_every_section() {
        let format = PublicForumFormat::new(Side::Con, PhaseTimings::default());
        for section in format.sections() {
            assert_eq!(section.speaker_order[0], Side::Con);
            assert_eq!(section.speaker_order[1], Side::Pro);
        }
    }

    #[test]
    fn test_timings_apply_to_turns() {
        let timings = PhaseTimings {
            constructive_secs: 10,
            crossfire_secs: 5,
            rebuttal_secs: 8,
            final_focus_secs: 3,
        };
        let turns = PublicForumFormat::new(Side::Pro, timings).turns();
        assert_eq!(turns[0].time_limit_secs, 10);
        assert_eq!(turns[3].time_limit_secs, 5);
        assert_eq!(turns[7].time_limit_secs, 8);
        assert_eq!(turns[8].time_limit_secs, 3);
    }

    #[test]
    fn test_get_format() {
        let format = get_format("Public-Forum", Side::Pro, PhaseTimings::default());
        assert_eq!(format.unwrap().name(), "public_forum");
        assert!(get_format("pf", Side::Pro, PhaseTimings::default()).is_some());
        assert!(get_format("presidential", Side::Pro, PhaseTimings::default()).is_none());
    }

    #[test]
    fn test_phase_round_trips_through_str() {
        for phase in Phase::ALL {
            assert_eq!(phase.as_str().parse::<Phase>().unwrap(), phase);
        }
        assert!("summary".parse::<Phase>().is_err());
    }

    #[test]
    fn test_participant_limits() {
        let format = PublicForumFormat::default();
        assert_eq!(format.min_participants(), 2);
        assert_eq!(format.max_participants(), 2);
    }
}
