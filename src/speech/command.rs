//! External TTS program integration.
//!
//! Each utterance spawns the configured program (e.g. `espeak-ng` or `say`)
//! with the text and parameters substituted into its argument list. The child
//! process is the in-flight utterance: cancelling kills it, and the engine
//! reports speaking while it is still running.

use super::{SpeechEngine, SpeechError};
use crate::config::CommandConfig;
use crate::types::{SpeechRequest, Voice};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Words per minute at rate 1.0, the `espeak` default
const BASE_WPM: f32 = 175.0;

/// Speech engine backed by an external program
pub struct CommandSpeechEngine {
    config: CommandConfig,
    child: Option<Child>,
}

impl CommandSpeechEngine {
    pub fn new(config: CommandConfig) -> Self {
        Self {
            config,
            child: None,
        }
    }

    pub fn program(&self) -> &str {
        &self.config.program
    }
}

impl SpeechEngine for CommandSpeechEngine {
    fn speak(&mut self, request: SpeechRequest) -> Result<(), SpeechError> {
        let args = expand_args(&self.config.args, &request);
        debug!("Running {} {:?}", self.config.program, args);

        let child = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        // A still-running previous child is dropped (and killed) here
        self.child = Some(child);
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                warn!("Failed to stop {}: {}", self.config.program, e);
            }
        }
    }

    fn speaking(&mut self) -> bool {
        let running = match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        };
        if !running {
            self.child = None;
        }
        running
    }

    fn voices(&self) -> Vec<Voice> {
        self.config.voices.clone()
    }
}

/// Substitute request values into argument templates.
///
/// An argument that expands to nothing is dropped, together with a directly
/// preceding flag (e.g. `-v {voice}` when no voice is selected).
pub fn expand_args(templates: &[String], request: &SpeechRequest) -> Vec<String> {
    let voice = request.voice.as_deref().unwrap_or("");
    let volume_pct = (request.volume * 100.0).round() as u32;
    let rate_wpm = (request.rate * BASE_WPM).round() as u32;

    let mut args: Vec<String> = Vec::with_capacity(templates.len());
    for template in templates {
        let arg = template
            .replace("{voice}", voice)
            .replace("{volume_pct}", &volume_pct.to_string())
            .replace("{volume}", &format!("{:.2}", request.volume))
            .replace("{rate_wpm}", &rate_wpm.to_string())
            .replace("{rate}", &format!("{:.2}", request.rate))
            .replace("{text}", &request.text);

        if arg.is_empty() {
            if args.last().is_some_and(|prev| prev.starts_with('-')) {
                args.pop();
            }
            continue;
        }
        args.push(arg);
    }
    args
}
