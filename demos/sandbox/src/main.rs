// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::{Context, Result};
use cadence_runtime::{App, AppConfig, Frame, PlatformSignal, Status};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const QUIT_AFTER: Duration = Duration::from_secs(5);
const HEARTBEAT: Duration = Duration::from_secs(1);

fn load_config() -> Result<AppConfig> {
    match std::env::args().nth(1) {
        Some(path) => AppConfig::from_file(&path).with_context(|| format!("failed to load config from {path}")),
        None => Ok(AppConfig::default()),
    }
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = load_config()?;
    let fps = config.fps;
    let app = App::new(config)?;

    app.set_property("sprite.w", 32)?;
    app.set_property("sprite.h", 32)?;

    app.register_event("refresh", |frame: &Frame| {
        log::debug!("Clearing frame {}.", frame.index);
        Status::Continue
    })?;

    let sprite_x = Arc::new(Mutex::new(0u64));
    let position = Arc::clone(&sprite_x);
    app.register_event("refresh", move |frame: &Frame| {
        let mut x = position.lock().unwrap_or_else(|e| e.into_inner());
        *x = (*x + 4) % 640;
        log::debug!("Sprite at x={} on frame {} ({:?}).", *x, frame.index, frame.elapsed);
        Status::Continue
    })?;

    app.register_event("present", |frame: &Frame| {
        log::trace!("Presented frame {}.", frame.index);
        Status::Success
    })?;

    app.start(fps)?;

    let signals = app.signal_sender();
    app.schedule(QUIT_AFTER, Duration::ZERO, move || match signals.send(PlatformSignal::Quit) {
        Ok(()) => Status::Success,
        Err(_) => Status::Error,
    })?;

    let mut beats = 0u32;
    app.create_event(HEARTBEAT, HEARTBEAT, move || {
        beats += 1;
        log::info!("Heartbeat {beats} on the main loop.");
        Status::Success
    })?;

    app.run()?;

    let x = *sprite_x.lock().unwrap_or_else(|e| e.into_inner());
    app.set_property("sprite.x", x)?;
    log::info!(
        "Sprite finished at {} ({}x{}).",
        app.property("sprite.x").unwrap_or_default(),
        app.property("sprite.w").unwrap_or_default(),
        app.property("sprite.h").unwrap_or_default()
    );
    app.shutdown()?;
    Ok(())
}
