//! Audio playback demo
//!
//! Plays a music file with a fade-in and fires each sound effect in turn.
//!
//! ```text
//! audio_demo [config.toml|config.ron] <music> [sound...]
//! ```
//!
//! Without the `rodio` feature the headless backend is used, so the demo
//! exercises the full track lifecycle without producing output.

use std::path::Path;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use engine_resources::foundation::logging;
use engine_resources::prelude::*;

const FRAME: Duration = Duration::from_millis(16);
const SOUND_SPACING: Duration = Duration::from_millis(750);
const MUSIC_FADE_MS: u32 = 1000;

fn is_config_path(arg: &str) -> bool {
    matches!(
        Path::new(arg).extension().and_then(|e| e.to_str()),
        Some("toml" | "ron")
    )
}

fn usage() -> ! {
    eprintln!("usage: audio_demo [config.toml|config.ron] <music> [sound...]");
    std::process::exit(2);
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let config = match args.first() {
        Some(first) if is_config_path(first) => {
            let path = args.remove(0);
            log::info!("Loading configuration from {}", path);
            ResourceConfig::load_or_default(&path)
        }
        _ => ResourceConfig::default(),
    };
    if args.is_empty() {
        usage();
    }
    let music = args.remove(0);
    let sounds = args;

    log::info!("Starting audio demo ({:?} backend)", config.audio.backend);

    let device: Rc<dyn RenderDevice> = Rc::new(HeadlessRenderDevice::new());
    let mut resources = ResourceManager::new(&device, config)?;
    let mut player = AudioPlayer::new(&mut resources)?;

    for sound in &sounds {
        if resources.load_sound(sound).is_none() {
            log::warn!("Skipping {}: could not be loaded", sound);
        }
    }

    player.play_music(&mut resources, &music, -1, MUSIC_FADE_MS)?;

    let mut pending = sounds.iter();
    let mut next_sound = Instant::now() + SOUND_SPACING;
    let deadline = Instant::now() + SOUND_SPACING * (sounds.len() as u32 + 2);

    while Instant::now() < deadline {
        if Instant::now() >= next_sound {
            if let Some(sound) = pending.next() {
                if let Err(e) = player.play_sound(&mut resources, sound, None) {
                    log::warn!("Could not play {}: {}", sound, e);
                }
            }
            next_sound += SOUND_SPACING;
        }
        player.update(&mut resources);
        thread::sleep(FRAME);
    }

    for track in player.issued_tracks().to_vec() {
        player.release_sound(&mut resources, track)?;
    }

    player.stop_music(&mut resources, MUSIC_FADE_MS)?;
    let fade_end = Instant::now() + Duration::from_millis(u64::from(MUSIC_FADE_MS));
    while Instant::now() < fade_end {
        player.update(&mut resources);
        thread::sleep(FRAME);
    }

    log::info!(
        "Demo finished, {} of {} pooled tracks idle",
        resources.audio().pool_available(),
        resources.audio().pool_capacity()
    );
    Ok(())
}
