//! Eris Core Library
//!
//! Debate formats and orchestration, AI speech generation and judging,
//! voice, evidence search and the storage abstraction shared by the server
//! and the CLI.

pub mod config;
pub mod debate_format;
pub mod error;
pub mod feedback;
pub mod orchestrator;
pub mod participant;
pub mod realtime;
pub mod retry;
pub mod search;
pub mod session;
pub mod speech;
pub mod store;
pub mod voice;

pub use config::{Config, Secrets};
pub use debate_format::{DebateFormat, DebateSection, Phase, PhaseTimings, PublicForumFormat, Turn};
pub use error::DebateError;
pub use feedback::{FeedbackProvider, OpenAiJudge, SpeechFeedback, Verdict};
pub use orchestrator::{
    AdvanceReason, DebateEvent, DebateMessage, DebateOrchestrator, DebateSnapshot, DebateStatus,
    HumanSpeaker, Transition,
};
pub use participant::{Participant, ParticipantKind, Side};
pub use realtime::{EventHub, HubEvent, SequencedEvent};
pub use retry::RetryPolicy;
pub use search::{SearchHit, SearchResults, SearchService};
pub use session::{DebateSession, Document, Preferences, SessionStatus, Speech, UserProfile};
pub use speech::{OpenAiSpeechGenerator, SpeechGenerator, SpeechRequest};
pub use store::DebateStore;
pub use voice::{ElevenLabsClient, Transcript, VoiceService};
