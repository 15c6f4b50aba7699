use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use log::{error, info, warn};
use reader_sync::{
    logging,
    progress::ProgressFile,
    segment::{AbbreviationClassifier, Segmenter},
    speech::{
        piper::{PiperCommand, PiperOptions},
        AudioOutput, PiperSynthesizer, VoiceLibrary,
    },
    Document, LogObserver, ReaderConfig, SessionBuilder, SessionHandle,
};

#[derive(Parser, Debug, PartialEq, Eq)]
#[command(name = "reader-sync")]
#[command(version, about = "Read a text file word by word, by timer or by voice", long_about = None)]
struct Args {
    /// Plain text file to read
    path: PathBuf,

    /// Follow speech sentence by sentence instead of autoscrolling
    #[arg(long)]
    speech: bool,
}

#[cfg(feature = "playback")]
fn audio_output() -> Arc<dyn AudioOutput> {
    Arc::new(reader_sync::speech::output::RodioOutput::new())
}

#[cfg(not(feature = "playback"))]
fn audio_output() -> Arc<dyn AudioOutput> {
    Arc::new(reader_sync::speech::SilentOutput::default())
}

fn build_session(config: &ReaderConfig, args: &Args) -> Result<SessionHandle> {
    let document = Document::from_path(&args.path)?;
    let segmenter = Segmenter::new(
        AbbreviationClassifier::default().with_abbreviations(config.extra_abbreviations.clone()),
        config.paragraphs,
    );

    let document_id = document.id().clone();
    let mut builder = SessionBuilder::new(document)
        .segmenter(segmenter)
        .words_per_minute(config.words_per_minute)
        .voice(config.voice.clone())
        .observer(LogObserver);

    if let Some(path) = &config.progress_file {
        let progress = ProgressFile::new(path);
        match progress.load(&document_id) {
            Ok(Some(position)) => builder = builder.resume_at(position),
            Ok(None) => {}
            Err(err) => warn!("Ignoring unreadable progress file: {err}"),
        }
        builder = builder.observer(progress);
    }

    if args.speech {
        let voices = Arc::new(VoiceLibrary::new(config.voices_dir.clone()));
        info!(
            "Found {} voices in {}",
            voices.list().len(),
            voices.base_dir().display()
        );
        let piper = PiperSynthesizer::new(
            PiperCommand::resolve(config.piper_command.as_deref(), &config.runtime_dir),
            voices,
            config.output_dir.clone(),
        )
        .with_options(PiperOptions {
            speaker: None,
            length_scale: config.length_scale,
        });
        builder = builder.speech(Arc::new(piper), audio_output());
    }

    Ok(builder.spawn())
}

async fn run(config: ReaderConfig, args: Args) -> Result<()> {
    let session = build_session(&config, &args)?;
    let status = if args.speech {
        session.set_speech(true).await?
    } else {
        session.set_autoscroll(true).await?
    };
    info!(
        "Reading {} from {} at {}",
        status.document_id, status.position, status.words_per_minute
    );

    let speech = args.speech;
    let finished = session
        .wait_for(|status| {
            if speech {
                !status.speech_enabled
            } else {
                status.at_end
            }
        })
        .await?;
    if let Some(err) = &finished.speech_error {
        error!("Speech stopped: {err}");
    }

    info!("Finished at {}", finished.position);
    session.shutdown().await?;
    Ok(())
}

fn main() {
    let args = Args::parse();
    let config = match ReaderConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to load configuration: {err:#}");
            std::process::exit(2);
        }
    };
    if let Err(err) = logging::init(&config.log_dir) {
        eprintln!("Failed to initialise logger: {err}");
    }
    info!("Starting reader-sync");

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("Failed to start runtime: {err}");
            std::process::exit(1);
        }
    };
    if let Err(err) = runtime.block_on(run(config, args)) {
        error!("reader-sync failed: {err:#}");
        std::process::exit(1);
    }
}
