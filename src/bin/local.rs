//! Local microphone/speaker demo entry point (§6 CLI)
//!
//! Grounded on `examples/original_source/src/main_local.py`'s `main`: wires
//! all six stages to the local Source/Sink, injects the initial greeting
//! directly into SentQ (bypassing Responder/Transcriber, matching the
//! original putting the greeting straight onto `response_queue`), and waits
//! on CTRL-C to set `exit` and join every stage thread.

use std::sync::mpsc;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use duplex_voice::audio_io::AudioOutput;
use duplex_voice::conversation::Conversation;
use duplex_voice::flags::{ExitFlag, SpeakingFlag};
use duplex_voice::pipeline::{
    responder, segmenter, sink_local, source_local, synthesizer, transcriber,
};
use duplex_voice::types::Sentence;
use duplex_voice::vad::SileroVad;
use duplex_voice::Config;

#[derive(Parser)]
#[command(
    name = "duplex-local",
    about = "Local microphone/speaker demo for the speech-to-speech agent"
)]
struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, env = "DUPLEX_CONFIG", default_value = "./priv/config.json")]
    config: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,duplex_voice=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config).context("failed to load configuration")?;

    let (seg_tx, seg_rx) = mpsc::channel();
    let (utt_tx, utt_rx) = mpsc::channel();
    let (text_tx, text_rx) = mpsc::channel();
    let (sent_tx, sent_rx) = mpsc::channel();
    let (audio_tx, audio_rx) = mpsc::channel();

    let speaking = SpeakingFlag::new();
    let exit = ExitFlag::new();
    let conversation = Arc::new(Conversation::new());

    if !config.general.initial_greeting.trim().is_empty() {
        let _ = sent_tx.send(Sentence {
            text: config.general.initial_greeting.clone(),
        });
    }

    let mut handles = Vec::new();

    {
        let sample_rate = config.microphone.sample_rate;
        let exit = exit.clone();
        handles.push(std::thread::spawn(move || {
            if let Err(e) = source_local::run(sample_rate, seg_tx, &exit) {
                error!("source_local stage failed: {e}");
            }
        }));
    }

    {
        let model_path = config.segmenter.model_path.clone();
        let sample_rate = config.microphone.sample_rate;
        let speaking = speaking.clone();
        let exit = exit.clone();
        handles.push(std::thread::spawn(move || {
            let vad = match SileroVad::load(&model_path) {
                Ok(v) => v,
                Err(e) => {
                    error!("failed to load VAD model: {e}");
                    return;
                }
            };
            if let Err(e) = segmenter::run(vad, sample_rate, seg_rx, utt_tx, speaking, &exit) {
                error!("segmenter stage failed: {e}");
            }
        }));
    }

    {
        let cfg = config.transcriber.clone();
        let sample_rate = config.microphone.sample_rate;
        let exit = exit.clone();
        handles.push(std::thread::spawn(move || {
            let client = transcriber::GroqAsrClient::new(cfg.api_key.clone(), cfg.model.clone());
            transcriber::warm_up(&client, sample_rate, &cfg.language);
            transcriber::run(&client, &cfg.language, utt_rx, text_tx, &exit);
        }));
    }

    {
        let cfg = config.responder.clone();
        let conversation = conversation.clone();
        let speaking = speaking.clone();
        let exit = exit.clone();
        handles.push(std::thread::spawn(move || {
            let client = responder::AnthropicClient::new(cfg.api_key.clone());
            responder::warm_up(&client, &cfg.system_message, &cfg.model);
            responder::run(
                &client,
                &cfg.system_message,
                &cfg.model,
                cfg.max_tokens,
                &conversation,
                text_rx,
                sent_tx,
                &speaking,
                &exit,
            );
        }));
    }

    {
        let cfg = config.synthesizer.clone();
        let speaking = speaking.clone();
        let exit = exit.clone();
        handles.push(std::thread::spawn(move || {
            let client = match synthesizer::GoogleTtsClient::new(
                &cfg.credentials_path,
                cfg.voice_language_code.clone(),
                cfg.voice_name.clone(),
                cfg.voice_gender,
                cfg.sample_rate,
            ) {
                Ok(c) => c,
                Err(e) => {
                    error!("failed to construct TTS client: {e}");
                    return;
                }
            };
            synthesizer::warm_up(&client);
            synthesizer::run(&client, sent_rx, audio_tx, &speaking, &exit);
        }));
    }

    {
        let sample_rate = config.synthesizer.sample_rate;
        let speaking = speaking.clone();
        let exit = exit.clone();
        let conversation = conversation.clone();
        handles.push(std::thread::spawn(move || {
            let output = match AudioOutput::new(sample_rate) {
                Ok(o) => o,
                Err(e) => {
                    error!("failed to open audio output: {e}");
                    return;
                }
            };
            sink_local::run(&output, audio_rx, &speaking, &exit, &conversation);
        }));
    }

    info!("duplex-local: starting, press CTRL+C to exit");
    wait_for_ctrl_c_or_exit(&exit)?;
    info!("duplex-local: exiting");
    exit.set();

    for handle in handles {
        let _ = handle.join();
    }
    info!("duplex-local: done");
    Ok(())
}

/// Block the main thread until CTRL-C or until some stage sets `exit` on its
/// own (e.g. a transport-fatal error). A single-threaded runtime is enough:
/// every pipeline stage is a plain OS thread, this is the only async code in
/// the binary.
fn wait_for_ctrl_c_or_exit(exit: &ExitFlag) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start shutdown-watcher runtime")?;
    rt.block_on(async {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = poll_exit(exit) => {}
        }
    });
    Ok(())
}

async fn poll_exit(exit: &ExitFlag) {
    loop {
        if exit.is_set() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
}
