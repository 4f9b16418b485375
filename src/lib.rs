//! kaidan: procedural horror audio for narrated ghost stories.
//!
//! Nothing here draws anything. The engines synthesize sound, track a
//! narration against its scare cue and hand [`director::UiEvent`]s to
//! whatever presentation layer sits on top.
//!
//! * [`audio::ambient`]: drone, wind and randomized creaks/whispers.
//! * [`audio::narration`]: decoded voice track with play/pause/stop and cue
//!   tracking.
//! * [`audio::jump_scare`]: intensity-scaled noise bursts.
//! * [`director`]: owns all of the above and drives them per frame.
//!
//! # Example
//! ```
//! use std::rc::Rc;
//! use kaidan::audio::{CaptureBackend, ManualClock};
//! use kaidan::config::Config;
//! use kaidan::director::{Director, UiEvent};
//! use kaidan::settings::Intensity;
//!
//! let clock = ManualClock::new();
//! let mut director = Director::new(
//!     &Config::default(),
//!     Rc::new(CaptureBackend::new()),
//!     Rc::new(clock.clone()),
//!     None,
//! )
//! .unwrap();
//! let events = director.events();
//!
//! director.trigger_scare(Intensity::Mild);
//! clock.advance(0.5);
//! director.frame();
//! assert_eq!(events.try_recv(), Ok(UiEvent::ScareTrigger(Intensity::Mild)));
//! assert!(matches!(events.try_recv(), Ok(UiEvent::ScareComplete(_))));
//! ```

pub mod audio;
pub mod config;
pub mod director;
pub mod error;
pub mod settings;

pub use config::Config;
pub use director::{Director, UiEvent};
pub use error::AudioError;
pub use settings::{Intensity, ListenerProfile};
