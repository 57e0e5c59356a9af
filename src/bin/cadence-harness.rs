// src/bin/cadence-harness.rs

use std::time::Duration;

use anyhow::{Context, Result};
use cadence::config::SessionManagerConfig;
use cadence::manager::SessionManager;
use cadence::models::Language;
use cadence::session::SessionParams;
use cadence::testutil::{FakeAsrModel, FakeSpeakerModel, FakeVad};
use clap::Parser;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    cadence::logging::init();
    let params = Params::parse();

    // No real model weights here: the harness exercises the session pipeline end to end
    // against fakes, not a transport or an ML backend.
    let manager = SessionManager::new(
        SessionManagerConfig::default(),
        Arc::new(FakeAsrModel::with_text(params.text.clone())),
        Arc::new(FakeSpeakerModel::always_new()),
        Arc::new(FakeVad::whole_buffer_as_speech()),
    )
    .context("invalid session configuration")?;

    let mut session = manager.open_session(SessionParams {
        language: params.language,
        sv: params.enable_speaker_verification,
    });

    let frame = synthetic_speech_frame(params.frame_ms, params.sample_rate);
    for _ in 0..params.frames {
        session
            .ingest(&frame)
            .context("ingest rejected a synthetic frame")?;
        tokio::time::sleep(Duration::from_millis(params.frame_ms)).await;
    }

    session.close(manager.shutdown_drain_deadline()).await;

    while let Some(result) = tokio_stream_next(&mut session).await {
        println!("{}", serde_json::to_string(&result)?);
    }

    Ok(())
}

/// `ResultStream` doesn't implement `next()` itself; poll it the way any `Stream` consumer
/// would, without pulling in `StreamExt` for a single call site.
async fn tokio_stream_next(
    session: &mut cadence::session::Session,
) -> Option<cadence::session::ResultFrame> {
    use futures_util::StreamExt;
    session.results().next().await
}

/// A fixed tone, loud enough to clear the speaker-verification energy floor, used to drive the
/// harness without decoding a real audio file.
fn synthetic_speech_frame(frame_ms: u64, sample_rate: u32) -> Vec<u8> {
    let n = (frame_ms as usize * sample_rate as usize) / 1000;
    let mut bytes = Vec::with_capacity(n * 2);
    for i in 0..n {
        let t = i as f32 / sample_rate as f32;
        let sample = (t * 220.0 * std::f32::consts::TAU).sin() * 8_000.0;
        bytes.extend_from_slice(&(sample as i16).to_le_bytes());
    }
    bytes
}

/// CLI parameters for the `cadence` pipeline demo.
#[derive(Parser, Debug)]
#[command(name = "cadence-harness")]
#[command(about = "Replays synthetic PCM frames through a cadence session and prints results")]
struct Params {
    /// Transcript text the fake ASR model should report for every segment.
    #[arg(short = 't', long = "text", default_value = "hello world")]
    pub text: String,

    /// Language hint for the session.
    #[arg(short = 'l', long = "language", value_enum, default_value = "en")]
    pub language: Language,

    /// Enable speaker verification and the `[speaker_id]:` prefix on emitted text.
    #[arg(long = "enable-speaker-verification", default_value_t = false)]
    pub enable_speaker_verification: bool,

    /// PCM sample rate of the synthetic frames.
    #[arg(long = "sample-rate", default_value_t = 16_000)]
    pub sample_rate: u32,

    /// Duration, in milliseconds, of each synthetic frame ingested.
    #[arg(long = "frame-ms", default_value_t = 300)]
    pub frame_ms: u64,

    /// Number of frames to replay before closing the session.
    #[arg(short = 'n', long = "frames", default_value_t = 20)]
    pub frames: u32,
}
