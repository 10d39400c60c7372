use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use voxloop::voice::{AudioCapture, PlaybackController, samples_to_wav};
use voxloop::{
    ChatClient, Config, MicListener, ResponseClient, Transcript, TranscriptionClient, VoiceLoop,
};

/// voxloop - hands-free voice conversation with an AI assistant
#[derive(Parser)]
#[command(name = "voxloop", version, about)]
struct Cli {
    /// Base URL of the transcription/response service
    #[arg(short, long, env = "VOXLOOP_SERVER")]
    server: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Send a text prompt over the text-submit path
    Ask {
        /// Prompt to send
        prompt: String,
        /// Stream the reply as it arrives
        #[arg(long)]
        stream: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,voxloop=info",
        1 => "info,voxloop=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(server) = cli.server {
        config.server_url = server;
    }

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::Ask { prompt, stream } => ask(&config, &prompt, stream).await,
        };
    }

    tracing::info!(server = %config.server_url, "starting voice mode");

    let transcript = Transcript::shared();
    let listener = MicListener::new(config.voice.clone());
    let transcriber = TranscriptionClient::new(config.server_url.clone());
    let responder = ResponseClient::new(config.server_url.clone());
    let player = PlaybackController::new(config.voice.playback.clone())?;

    let (voice_loop, switch) = VoiceLoop::new(
        listener,
        transcriber,
        responder,
        player,
        transcript.clone(),
        &config.voice,
    );

    // Ctrl-C is the voice-mode toggle: it triggers the cancellation sequence
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            switch.deactivate();
        }
    });

    tracing::info!("voice mode active - start talking (Ctrl-C to stop)");
    voice_loop.run().await;

    if let Ok(transcript) = transcript.lock() {
        tracing::info!(messages = transcript.len(), "session ended");
    }

    Ok(())
}

/// Test microphone input
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;

    for i in 0..duration * 4 {
        tokio::time::sleep(Duration::from_millis(250)).await;

        let level = capture.peak_level();

        // Visual meter on the 0-127 deviation scale
        let meter_len = (usize::from(level) * 50) / 127;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:5.2}s] level: {:3} | [{}]", (i + 1) as f64 * 0.25, level, meter);
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working.");
    println!("Levels at or above 5 count as speech; below 5 is silence.");

    Ok(())
}

/// Test speaker output with a sine wave
#[allow(clippy::future_not_send)]
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let mut playback = PlaybackController::new(voxloop::PlaybackTimings::default())?;

    // 2 seconds of 440Hz sine at the playback rate
    let sample_rate = 24000u32;
    let frequency = 440.0_f32;
    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..sample_rate * 2)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    let wav = samples_to_wav(&samples, sample_rate)?;

    let (_switch, mut active) = tokio::sync::watch::channel(true);
    let settled = playback.play(&wav, &mut active).await;

    println!("Playback settled: {settled:?}");
    println!("\n---");
    println!("If you heard the tone, your speakers are working.");

    Ok(())
}

/// Send a prompt over the text path, logging the exchange like the voice
/// loop does
async fn ask(config: &Config, prompt: &str, stream: bool) -> anyhow::Result<()> {
    let client = ChatClient::new(config.server_url.clone());
    let transcript = Transcript::shared();
    if let Ok(mut log) = transcript.lock() {
        log.push_user(prompt);
    }

    if stream {
        use std::io::Write as _;
        client
            .send_streaming(prompt, |chunk| {
                print!("{chunk}");
                let _ = std::io::stdout().flush();
                // grow a single bot reply in place as chunks arrive
                if let Ok(mut log) = transcript.lock() {
                    log.append_bot(chunk);
                }
            })
            .await?;
        println!();
    } else {
        let reply = client.send(prompt).await?;
        if let Ok(mut log) = transcript.lock() {
            log.push_bot(reply.as_str());
        }
        println!("{reply}");
    }

    if let Ok(log) = transcript.lock() {
        tracing::debug!(messages = log.len(), "text exchange logged");
    }

    Ok(())
}
