//! Eris CLI - practice Public Forum debates in the terminal.
//!
//! Debate an AI opponent by typing your speeches, or watch two AIs debate
//! each other. Optionally ask a judge for feedback and a decision, and
//! export the round as a WAV file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use clap::{Parser, ValueEnum};
use colored::Colorize;
use eris_core::config::{Config, Secrets};
use eris_core::debate_format::{self, Turn};
use eris_core::orchestrator::HumanSpeaker;
use eris_core::voice::{
    ElevenLabsClient, VoiceService, combine_audio_segments, generate_output_filename, save_wav,
};
use eris_core::{
    DebateError, DebateEvent, DebateMessage, DebateOrchestrator, FeedbackProvider, OpenAiJudge,
    OpenAiSpeechGenerator, Participant, Side,
};
use tokio::io::{AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::Mutex;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

const RULE_WIDTH: usize = 70;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SideArg {
    Pro,
    Con,
}

impl From<SideArg> for Side {
    fn from(side: SideArg) -> Self {
        match side {
            SideArg::Pro => Side::Pro,
            SideArg::Con => Side::Con,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "eris",
    version,
    about = "Practice Public Forum debate against an AI",
    long_about = "Debate an AI opponent from the terminal, or watch two AIs debate, using OpenAI-compatible APIs."
)]
struct Cli {
    /// The resolution to debate
    #[arg(value_name = "TOPIC")]
    topic: String,

    /// The side you argue
    #[arg(short, long, value_enum, default_value = "pro")]
    side: SideArg,

    /// Your display name
    #[arg(long, default_value = "You", value_name = "NAME")]
    name: String,

    /// Model for the AI debater(s); defaults to the configured model
    #[arg(short, long, value_name = "MODEL")]
    model: Option<String>,

    /// Which side speaks first in every section
    #[arg(long, value_enum, default_value = "pro")]
    first: SideArg,

    /// Let the AI argue both sides
    #[arg(long)]
    ai_vs_ai: bool,

    /// Ask the judge for feedback on your speeches and a decision
    #[arg(short, long)]
    feedback: bool,

    /// Save the round as a WAV file (needs ELEVENLABS_API_KEY). Pass a
    /// directory or file path; defaults to a name derived from the topic.
    #[arg(long, value_name = "PATH", num_args = 0..=1, default_missing_value = "")]
    audio: Option<PathBuf>,

    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "eris.toml", value_name = "FILE")]
    config: PathBuf,
}

// ─── Human speaker ────────────────────────────────────────────────────────────

/// Reads the user's speeches from stdin. A speech ends at the first blank
/// line; a blank first line passes the turn.
struct StdinSpeaker {
    lines: Mutex<tokio::io::Lines<BufReader<Stdin>>>,
}

impl StdinSpeaker {
    fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }
}

#[async_trait]
impl HumanSpeaker for StdinSpeaker {
    async fn speak(
        &self,
        turn: &Turn,
        speaker: &Participant,
        _transcript: &[DebateMessage],
    ) -> Result<Option<String>, DebateError> {
        println!(
            "{}",
            format!(
                "  {}, you have {}s for your {}. End with an empty line; an empty first line passes.",
                speaker.name,
                turn.time_limit_secs,
                turn.phase.display_name()
            )
            .dimmed()
        );

        let mut lines = self.lines.lock().await;
        let mut speech = Vec::new();
        loop {
            let line = lines
                .next_line()
                .await
                .map_err(|e| DebateError::Validation(format!("failed to read stdin: {e}")))?;
            match line {
                Some(line) if !line.trim().is_empty() => speech.push(line),
                _ => break,
            }
        }

        if speech.is_empty() {
            Ok(None)
        } else {
            Ok(Some(speech.join("\n")))
        }
    }
}

// ─── Main ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    let secrets = Secrets::from_env();

    let api_base = secrets
        .openai_api_base
        .clone()
        .unwrap_or_else(|| config.openai.api_base.clone());
    let timeout = Duration::from_secs(config.openai.request_timeout_secs);
    let retry = config.retry.policy();
    let model = cli.model.clone().unwrap_or_else(|| config.openai.model.clone());

    let format = debate_format::get_format(
        &config.debate.format,
        cli.first.into(),
        config.debate.timings.clone(),
    )
    .with_context(|| {
        format!(
            "unknown debate format '{}'. Available formats: {}",
            config.debate.format,
            debate_format::available_formats().join(", ")
        )
    })?;
    let format_name = format.display_name().to_string();

    let user_side: Side = cli.side.into();
    let ai_side = user_side.opponent();
    let participants = vec![
        speaker_for(&cli, &config, user_side, &model),
        ai_participant(&config, &config.debate.ai_name, ai_side, &model, &cli.topic, &cli.name),
    ];

    print_header(&cli.topic, &format_name, &participants);

    let generator = OpenAiSpeechGenerator::new(&api_base, &secrets.openai_api_key, timeout, retry)?;
    let human = StdinSpeaker::new();

    let mut orchestrator = DebateOrchestrator::new(&cli.topic, participants.clone(), format)?
        .with_callback(console_callback());
    let transcript = orchestrator.run_with(&generator, &human).await?;

    println!();
    println!("{}", "═".repeat(RULE_WIDTH).bright_blue());
    println!("{}", "  Debate concluded.".bright_green().bold());
    println!("{}", "═".repeat(RULE_WIDTH).bright_blue());

    if cli.feedback {
        let judge = OpenAiJudge::new(
            &api_base,
            &secrets.openai_api_key,
            &config.openai.feedback_model,
            timeout,
            retry,
        )?;
        let judged_sides: Vec<Side> = if cli.ai_vs_ai { vec![] } else { vec![user_side] };
        print_judging(&judge, &cli.topic, &transcript, &judged_sides).await?;
    }

    if let Some(path) = &cli.audio {
        export_audio(&config, &secrets, &participants, &transcript, &cli.topic, path).await?;
    }

    Ok(())
}

/// The participant on the user's side: the user, or a second AI.
fn speaker_for(cli: &Cli, config: &Config, side: Side, model: &str) -> Participant {
    if cli.ai_vs_ai {
        let name = format!("{} ({})", config.debate.ai_name, side.display_name());
        ai_participant(config, &name, side, model, &cli.topic, &config.debate.ai_name)
    } else {
        Participant::human(&cli.name, side, uuid::Uuid::new_v4()).with_voice(config.get_voice(side))
    }
}

fn ai_participant(
    config: &Config,
    name: &str,
    side: Side,
    model: &str,
    topic: &str,
    opponent_name: &str,
) -> Participant {
    let ai = Participant::ai(name, side, model).with_voice(config.get_voice(side));
    match config.get_prompt(side, name, topic, opponent_name) {
        Some(prompt) => ai.with_system_prompt(prompt),
        None => ai,
    }
}

fn print_header(topic: &str, format_name: &str, participants: &[Participant]) {
    println!();
    println!("{}", "═".repeat(RULE_WIDTH).bright_blue());
    println!(
        "{}",
        format!("  {} - {}", "Eris".bold(), format_name)
            .bright_blue()
            .bold()
    );
    println!("{}", "═".repeat(RULE_WIDTH).bright_blue());
    println!();
    println!("{} {}", "Resolution:".bold(), topic.bright_white());
    println!();
    for p in participants {
        let kind = p.model().unwrap_or("human");
        println!(
            "  {} ({}) - {}",
            p.name.bright_cyan(),
            p.side.display_name().yellow(),
            kind.dimmed()
        );
    }
    println!();
    println!("{}", "─".repeat(RULE_WIDTH).dimmed());
}

async fn print_judging(
    judge: &dyn FeedbackProvider,
    topic: &str,
    transcript: &[DebateMessage],
    judged_sides: &[Side],
) -> anyhow::Result<()> {
    for message in transcript.iter().filter(|m| judged_sides.contains(&m.side)) {
        let feedback = judge.speech_feedback(topic, message).await?;
        println!();
        println!(
            "{} {}",
            format!("Feedback on your {}:", message.phase.display_name()).bold(),
            format!("{}/10", feedback.score).bright_yellow()
        );
        for strength in &feedback.strengths {
            println!("  {} {}", "+".green(), strength);
        }
        for improvement in &feedback.improvements {
            println!("  {} {}", "-".red(), improvement);
        }
        println!("  {}", textwrap(&feedback.summary, RULE_WIDTH - 4).dimmed());
    }

    if transcript.is_empty() {
        println!("{}", "No speeches were given; no decision.".yellow());
        return Ok(());
    }
    let verdict = judge.verdict(topic, transcript).await?;
    println!();
    println!(
        "{} {}",
        "Decision:".bold(),
        verdict.winner.display_name().bright_green().bold()
    );
    for line in textwrap(&verdict.reason, RULE_WIDTH - 2).lines() {
        println!("  {}", line);
    }
    Ok(())
}

async fn export_audio(
    config: &Config,
    secrets: &Secrets,
    participants: &[Participant],
    transcript: &[DebateMessage],
    topic: &str,
    path: &Path,
) -> anyhow::Result<()> {
    let Some(key) = &secrets.elevenlabs_api_key else {
        eprintln!(
            "{}",
            "Warning: ELEVENLABS_API_KEY not set; skipping audio export.".yellow()
        );
        return Ok(());
    };
    let voice: Arc<dyn VoiceService> = Arc::new(ElevenLabsClient::new(
        key.as_str(),
        config.elevenlabs.clone(),
        config.retry.policy(),
    )?);

    let mut segments = Vec::with_capacity(transcript.len());
    for message in transcript {
        let voice_id = participants
            .iter()
            .find(|p| p.side == message.side)
            .and_then(|p| p.voice_id.clone())
            .unwrap_or_else(|| config.get_voice(message.side).to_string());
        println!(
            "{}",
            format!("Synthesizing {} ({})...", message.speaker_name, message.section).dimmed()
        );
        segments.push(voice.synthesize(&message.content, &voice_id).await?);
    }

    let samples = combine_audio_segments(segments, 1.0, voice.sample_rate());
    let target = if path.as_os_str().is_empty() {
        PathBuf::from(generate_output_filename(topic))
    } else if path.is_dir() {
        path.join(generate_output_filename(topic))
    } else {
        path.to_path_buf()
    };
    save_wav(&target, &samples, voice.sample_rate())?;
    println!("{} {}", "Saved audio to".green(), target.display());
    Ok(())
}

/// Prints debate events to the console.
fn console_callback() -> Box<dyn Fn(DebateEvent) + Send + Sync> {
    Box::new(move |event| match event {
        DebateEvent::DebateStart { .. } => {}
        DebateEvent::SectionStart {
            name, description, ..
        } => {
            println!();
            println!("{}", "═".repeat(RULE_WIDTH).bright_magenta());
            println!(
                "{}",
                format!("  📢 MODERATOR: {}", name).bright_magenta().bold()
            );
            println!("  {}", description.dimmed());
            println!("{}", "═".repeat(RULE_WIDTH).bright_magenta());
            println!();
        }
        DebateEvent::SpeakerStart {
            name,
            side,
            time_limit_secs,
            ..
        } => {
            println!(
                "{} {} {} {}",
                "▶".bright_cyan(),
                name.bright_cyan().bold(),
                format!("({})", side).yellow(),
                format!("{}s", time_limit_secs).dimmed()
            );
        }
        DebateEvent::SpeakerMessage { content, .. } => {
            for line in textwrap(&content, RULE_WIDTH - 4).lines() {
                println!("  {}", line);
            }
            println!();
        }
        DebateEvent::TurnSkipped { name, .. } => {
            println!("  {}", format!("{} passed.", name).dimmed());
            println!();
        }
        DebateEvent::DebateEnd => {}
    })
}

/// Wrap text at word boundaries.
fn textwrap(text: &str, width: usize) -> String {
    let mut result = String::new();
    let mut line_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if line_len + word_len + 1 > width && line_len > 0 {
            result.push('\n');
            line_len = 0;
        }
        if line_len > 0 {
            result.push(' ');
            line_len += 1;
        }
        result.push_str(word);
        line_len += word_len;
    }

    result
}
