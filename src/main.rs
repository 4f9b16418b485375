use std::error::Error;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};

use kaidan::audio::decoder::encode_bytes;
use kaidan::audio::{AudioBackend, CaptureBackend, MonotonicClock, PlaybackState, RodioBackend};
use kaidan::config::Config;
use kaidan::director::{Director, UiEvent};
use kaidan::settings::Intensity;

#[derive(Parser)]
#[command(name = "kaidan", version, about = "Procedural horror audio engine")]
struct Cli {
    /// Config file (defaults to ./kaidan.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Run every engine without opening an audio device
    #[arg(long, global = true)]
    silent: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Play a narration: a base64 payload file or a .wav file
    Play {
        file: PathBuf,
        /// Story fraction (0-1] where the scare should land; enables scares
        #[arg(long)]
        cue: Option<f64>,
        #[arg(long, value_enum)]
        intensity: Option<Intensity>,
        /// Run the soundscape underneath
        #[arg(long)]
        ambient: bool,
    },
    /// Run the ambient soundscape for a while
    Ambient {
        #[arg(long, default_value_t = 30.0)]
        seconds: f64,
    },
    /// Fire one jump scare
    Scare {
        #[arg(long, value_enum)]
        intensity: Option<Intensity>,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref());
    let interval = Duration::from_millis(config.frame_interval_ms.max(1));

    let backend: Rc<dyn AudioBackend> = if cli.silent {
        Rc::new(CaptureBackend::new())
    } else {
        Rc::new(RodioBackend)
    };
    let mut director = Director::new(&config, backend, Rc::new(MonotonicClock::new()), None)?;

    match cli.command {
        Command::Play {
            file,
            cue,
            intensity,
            ambient,
        } => {
            let payload = read_payload(&file)?;
            if let Some(i) = intensity {
                director.set_intensity(i);
            }
            if cue.is_some() {
                director.set_jump_scares_enabled(true);
            }
            if ambient {
                director.start_ambient();
            }
            director.load(&payload, cue)?;
            if director.playback_state() != PlaybackState::Playing {
                director.play(0.0);
            }
            run_frames(&mut director, interval, None, |e| *e == UiEvent::PlaybackFinished);
        }
        Command::Ambient { seconds } => {
            director.start_ambient();
            let deadline = Instant::now() + Duration::from_secs_f64(seconds.max(0.0));
            run_frames(&mut director, interval, Some(deadline), |_| false);
            director.stop_ambient();
        }
        Command::Scare { intensity } => {
            let intensity = intensity.unwrap_or(director.profile().intensity);
            director.trigger_scare(intensity);
            run_frames(&mut director, interval, None, |e| {
                matches!(e, UiEvent::ScareComplete(_))
            });
        }
    }
    Ok(())
}

/// `.wav` files are wrapped on the fly; anything else is read as base64 text.
fn read_payload(path: &Path) -> Result<String, Box<dyn Error>> {
    let is_wav = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"));
    if is_wav {
        Ok(encode_bytes(&std::fs::read(path)?))
    } else {
        Ok(std::fs::read_to_string(path)?)
    }
}

fn run_frames(
    director: &mut Director,
    interval: Duration,
    deadline: Option<Instant>,
    mut done: impl FnMut(&UiEvent) -> bool,
) {
    let events = director.events();
    loop {
        director.frame();
        let mut finished = false;
        for event in events.try_iter() {
            log::info!("{event:?}");
            finished |= done(&event);
        }
        if finished || deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        thread::sleep(interval);
    }
}
