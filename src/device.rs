//! Microphone and audio output
//!
//! Recording and playback are delegated to external programs configured in
//! [`DeviceConfig`]. Arguments may contain the placeholders `{output}` (file
//! the recorder writes), `{input}` (file the player reads) and `{text}`
//! (text for the plain speech command).

use async_trait::async_trait;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::process::{Child, Command};

use crate::config::DeviceConfig;
use crate::error::{JournalError, Result};
use crate::ids::new_id;

/// Microphone permission state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// The user has not been asked yet
    Undetermined,
    /// Recording is allowed
    Granted,
    /// Recording was refused
    Denied,
}

/// Audio capture device
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Microphone: Send + Sync {
    /// Current permission state
    fn permission(&self) -> Permission;

    /// Ask for permission; returns whether it was granted
    async fn request_permission(&mut self) -> Result<bool>;

    /// Begin capturing
    async fn start(&mut self) -> Result<()>;

    /// Stop capturing and return the recorded file
    async fn stop(&mut self) -> Result<PathBuf>;

    /// Whether a capture is in progress
    fn is_recording(&self) -> bool;
}

/// Audio playback and plain speech
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Play an audio file to completion
    async fn play(&self, path: &Path) -> Result<()>;

    /// Speak `text` with the plain speech command
    async fn speak(&self, text: &str) -> Result<()>;
}

fn substitute(template: &[String], key: &str, value: &str) -> Vec<String> {
    template.iter().map(|arg| arg.replace(key, value)).collect()
}

fn build_command(argv: &[String]) -> Result<Command> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| JournalError::Config("Device command is empty".to_string()))?;
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    Ok(cmd)
}

async fn run_to_completion(argv: Vec<String>) -> Result<()> {
    tracing::debug!("Running device command: {:?}", argv);
    let output = build_command(&argv)?
        .output()
        .await
        .map_err(|e| JournalError::Device(format!("Failed to run {}: {}", argv[0], e)))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(JournalError::Device(format!(
            "{} exited with {}: {}",
            argv[0],
            output.status,
            stderr.trim()
        ))
        .into());
    }
    Ok(())
}

/// Microphone driven by an external recorder command
pub struct CommandMicrophone {
    config: DeviceConfig,
    permission: Permission,
    interactive: bool,
    child: Option<Child>,
    output: Option<PathBuf>,
    recorded: Vec<PathBuf>,
}

impl CommandMicrophone {
    /// Create a microphone from configuration
    ///
    /// When `interactive` is set and access has not been granted in the
    /// configuration, [`Microphone::request_permission`] asks on the
    /// terminal; otherwise the request is refused.
    pub fn new(config: DeviceConfig, interactive: bool) -> Self {
        let permission = if config.microphone_allowed {
            Permission::Granted
        } else {
            Permission::Undetermined
        };
        Self {
            config,
            permission,
            interactive,
            child: None,
            output: None,
            recorded: Vec::new(),
        }
    }
}

impl Drop for CommandMicrophone {
    fn drop(&mut self) {
        for path in self.recorded.drain(..) {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::debug!("Could not remove recording {}: {}", path.display(), e);
            }
        }
    }
}

#[async_trait]
impl Microphone for CommandMicrophone {
    fn permission(&self) -> Permission {
        self.permission
    }

    async fn request_permission(&mut self) -> Result<bool> {
        if self.permission == Permission::Undetermined {
            let granted = if self.interactive {
                tokio::task::spawn_blocking(|| {
                    eprint!("Allow microphone access? [y/N] ");
                    let _ = std::io::stderr().flush();
                    let mut answer = String::new();
                    std::io::stdin()
                        .read_line(&mut answer)
                        .map(|_| matches!(answer.trim(), "y" | "Y" | "yes"))
                        .unwrap_or(false)
                })
                .await
                .map_err(|e| JournalError::Device(format!("Permission prompt failed: {}", e)))?
            } else {
                false
            };
            self.permission = if granted {
                Permission::Granted
            } else {
                Permission::Denied
            };
        }
        Ok(self.permission == Permission::Granted)
    }

    async fn start(&mut self) -> Result<()> {
        if self.child.is_some() {
            return Err(JournalError::Device("Already recording".to_string()).into());
        }
        let output = std::env::temp_dir().join(format!(
            "journal-{}.{}",
            new_id(),
            self.config.record_extension
        ));
        let argv = substitute(
            &self.config.record_command,
            "{output}",
            &output.to_string_lossy(),
        );
        tracing::debug!("Starting recorder: {:?}", argv);

        let child = build_command(&argv)?
            .spawn()
            .map_err(|e| JournalError::Device(format!("Failed to start recorder: {}", e)))?;
        self.child = Some(child);
        self.output = Some(output);
        Ok(())
    }

    async fn stop(&mut self) -> Result<PathBuf> {
        let mut child = self
            .child
            .take()
            .ok_or_else(|| JournalError::Device("Not recording".to_string()))?;
        let output = self
            .output
            .take()
            .ok_or_else(|| JournalError::Device("Not recording".to_string()))?;

        if let Err(e) = child.start_kill() {
            tracing::debug!("Recorder already exited: {}", e);
        }
        let _ = child.wait().await;

        if !output.exists() {
            return Err(JournalError::Device(format!(
                "Recorder produced no file at {}",
                output.display()
            ))
            .into());
        }
        self.recorded.push(output.clone());
        Ok(output)
    }

    fn is_recording(&self) -> bool {
        self.child.is_some()
    }
}

/// Microphone that "records" an existing file
///
/// Lets the pipeline run on prerecorded audio.
pub struct FileMicrophone {
    path: PathBuf,
    recording: bool,
}

impl FileMicrophone {
    /// Microphone that yields `path` on every stop
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            recording: false,
        }
    }
}

#[async_trait]
impl Microphone for FileMicrophone {
    fn permission(&self) -> Permission {
        Permission::Granted
    }

    async fn request_permission(&mut self) -> Result<bool> {
        Ok(true)
    }

    async fn start(&mut self) -> Result<()> {
        self.recording = true;
        Ok(())
    }

    async fn stop(&mut self) -> Result<PathBuf> {
        if !self.recording {
            return Err(JournalError::Device("Not recording".to_string()).into());
        }
        self.recording = false;
        Ok(self.path.clone())
    }

    fn is_recording(&self) -> bool {
        self.recording
    }
}

/// Audio output driven by external player and speech commands
pub struct CommandAudioOutput {
    play_command: Vec<String>,
    speak_command: Vec<String>,
}

impl CommandAudioOutput {
    /// Create an output from configuration
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            play_command: config.play_command.clone(),
            speak_command: config.speak_command.clone(),
        }
    }
}

#[async_trait]
impl AudioOutput for CommandAudioOutput {
    async fn play(&self, path: &Path) -> Result<()> {
        run_to_completion(substitute(
            &self.play_command,
            "{input}",
            &path.to_string_lossy(),
        ))
        .await
    }

    async fn speak(&self, text: &str) -> Result<()> {
        run_to_completion(substitute(&self.speak_command, "{text}", text)).await
    }
}

/// Output that discards everything
#[derive(Debug, Default)]
pub struct SilentOutput {
    used: AtomicBool,
}

impl SilentOutput {
    /// Whether anything was sent to this output
    pub fn was_used(&self) -> bool {
        self.used.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AudioOutput for SilentOutput {
    async fn play(&self, path: &Path) -> Result<()> {
        tracing::debug!("Muted playback of {}", path.display());
        self.used.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn speak(&self, _text: &str) -> Result<()> {
        self.used.store(true, Ordering::Relaxed);
        Ok(())
    }
}
