//! Playback session controller
//!
//! At most one message plays at a time; playing another message stops the
//! current one first. Position is tracked on a 100ms tick and the session
//! ends on its own when the position reaches the message duration.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;

use crate::audio::AudioPlayer;
use crate::error::VoiceError;
use crate::message::{PlaybackStatus, VoiceMessage};

const POSITION_TICK: Duration = Duration::from_millis(100);
const UPDATE_CHANNEL_CAPACITY: usize = 64;
/// Tolerance when comparing the tracked position against a float duration.
const END_EPSILON_SECS: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackUpdate {
    Position { id: String, current_time: f64 },
    /// Reached the end; the controller is idle again.
    Finished { id: String },
}

/// Receiving side of a controller's updates.
///
/// Position updates are bounded and dropped when the reader falls behind.
/// `Finished` has its own unbounded channel so the tick task never waits on
/// the reader, and arrives after any positions still queued.
pub struct PlaybackUpdateReceiver {
    live: mpsc::Receiver<PlaybackUpdate>,
    finished: mpsc::UnboundedReceiver<PlaybackUpdate>,
}

impl PlaybackUpdateReceiver {
    pub async fn recv(&mut self) -> Option<PlaybackUpdate> {
        tokio::select! {
            biased;
            Some(update) = self.live.recv() => Some(update),
            Some(update) = self.finished.recv() => Some(update),
            else => None,
        }
    }

    pub fn try_recv(&mut self) -> Result<PlaybackUpdate, mpsc::error::TryRecvError> {
        match self.live.try_recv() {
            Ok(update) => Ok(update),
            Err(_) => self.finished.try_recv(),
        }
    }
}

enum Playback {
    Idle,
    /// Native `play` is in flight.
    Starting {
        session: u64,
        message: VoiceMessage,
        position: Duration,
        /// `pause_playback` arrived while `play` was in flight.
        pause_requested: bool,
    },
    Playing {
        session: u64,
        message: VoiceMessage,
        position: Duration,
        ticks: CancellationToken,
    },
    Paused {
        message: VoiceMessage,
        position: Duration,
    },
}

struct PlaybackInner {
    state: Playback,
    next_session: u64,
}

enum TickOutcome {
    Position(String, f64),
    Finished(String),
}

/// Coordinates at most one playing message.
pub struct PlaybackController<A: AudioPlayer> {
    player: Arc<A>,
    inner: Arc<Mutex<PlaybackInner>>,
    updates: mpsc::Sender<PlaybackUpdate>,
    finished: mpsc::UnboundedSender<PlaybackUpdate>,
}

impl<A: AudioPlayer> Clone for PlaybackController<A> {
    fn clone(&self) -> Self {
        Self {
            player: self.player.clone(),
            inner: self.inner.clone(),
            updates: self.updates.clone(),
            finished: self.finished.clone(),
        }
    }
}

fn seconds_to_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

impl<A: AudioPlayer> PlaybackController<A> {
    pub fn new(player: Arc<A>) -> (Self, PlaybackUpdateReceiver) {
        let (updates, live) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        let (finished, finished_rx) = mpsc::unbounded_channel();
        let controller = Self {
            player,
            inner: Arc::new(Mutex::new(PlaybackInner {
                state: Playback::Idle,
                next_session: 0,
            })),
            updates,
            finished,
        };
        let rx = PlaybackUpdateReceiver {
            live,
            finished: finished_rx,
        };
        (controller, rx)
    }

    /// Play `message`, superseding any other session.
    ///
    /// A paused session for the same message resumes from its position; a
    /// message that is already playing is left alone.
    pub async fn play_voice_message(&self, message: VoiceMessage) -> Result<(), VoiceError> {
        let (session, from, stop_previous) = {
            let mut inner = self.inner.lock().await;

            let mut resume_from = None;
            let mut stop_previous = false;
            match &inner.state {
                Playback::Idle => {}
                Playback::Playing {
                    message: current, ..
                } if current.id == message.id => {
                    log::debug!("Voice message {} is already playing", message.id);
                    return Ok(());
                }
                Playback::Playing {
                    message: current,
                    ticks,
                    ..
                } => {
                    log::info!("Stopping {} to play {}", current.id, message.id);
                    ticks.cancel();
                    stop_previous = true;
                }
                Playback::Paused {
                    message: current,
                    position,
                } if current.id == message.id => {
                    resume_from = Some(*position);
                }
                Playback::Paused { .. } => stop_previous = true,
                Playback::Starting { .. } => {}
            }

            inner.next_session += 1;
            let session = inner.next_session;
            let from = resume_from.unwrap_or(Duration::ZERO);
            inner.state = Playback::Starting {
                session,
                message: message.clone(),
                position: from,
                pause_requested: false,
            };
            (session, from, stop_previous)
        };

        if stop_previous {
            if let Err(e) = self.player.stop().await {
                log::warn!("Failed to stop previous playback: {}", e);
            }
        }

        let result = self.player.play(&message.uri, from.as_secs_f64()).await;

        let mut inner = self.inner.lock().await;
        let pause_requested = match inner.state {
            Playback::Starting {
                session: s,
                pause_requested,
                ..
            } if s == session => Some(pause_requested),
            _ => None,
        };
        let Some(pause_requested) = pause_requested else {
            let silence = matches!(inner.state, Playback::Idle);
            drop(inner);
            log::info!("Playback of {} superseded before it started", message.id);
            if silence && result.is_ok() {
                if let Err(e) = self.player.stop().await {
                    log::warn!("Failed to stop late playback: {}", e);
                }
            }
            return Err(VoiceError::Cancelled);
        };

        if let Err(e) = result {
            inner.state = Playback::Idle;
            log::error!("Failed to play {}: {}", message.id, e);
            return Err(e.into());
        }

        if pause_requested {
            inner.state = Playback::Paused {
                message: message.clone(),
                position: from,
            };
            drop(inner);
            log::info!("Paused {} as soon as it started", message.id);
            if let Err(e) = self.player.pause().await {
                log::error!("Failed to pause playback: {}", e);
                self.reset().await;
                return Err(e.into());
            }
            return Ok(());
        }

        let ticks = CancellationToken::new();
        inner.state = Playback::Playing {
            session,
            message: message.clone(),
            position: from,
            ticks: ticks.clone(),
        };
        drop(inner);

        self.spawn_position_tick(session, ticks);
        log::info!(
            "Playing {} from {:.1}s of {:.1}s",
            message.id,
            from.as_secs_f64(),
            message.duration
        );
        Ok(())
    }

    /// Pause the playing message, keeping its position. A pause while `play`
    /// is still in flight takes effect as soon as playback starts. No-op
    /// when idle or already paused.
    pub async fn pause_playback(&self) -> Result<(), VoiceError> {
        {
            let mut inner = self.inner.lock().await;
            let state = std::mem::replace(&mut inner.state, Playback::Idle);
            match state {
                Playback::Playing {
                    message,
                    position,
                    ticks,
                    ..
                } => {
                    ticks.cancel();
                    log::info!("Paused {} at {:.1}s", message.id, position.as_secs_f64());
                    inner.state = Playback::Paused { message, position };
                }
                Playback::Starting {
                    session,
                    message,
                    position,
                    ..
                } => {
                    log::info!("Pause of {} requested before playback started", message.id);
                    inner.state = Playback::Starting {
                        session,
                        message,
                        position,
                        pause_requested: true,
                    };
                    return Ok(());
                }
                other => {
                    inner.state = other;
                    return Ok(());
                }
            }
        }

        if let Err(e) = self.player.pause().await {
            log::error!("Failed to pause playback: {}", e);
            self.reset().await;
            return Err(e.into());
        }
        Ok(())
    }

    /// End the current session, if any.
    pub async fn stop_playback(&self) -> Result<(), VoiceError> {
        let previous = {
            let mut inner = self.inner.lock().await;
            std::mem::replace(&mut inner.state, Playback::Idle)
        };

        match previous {
            Playback::Idle => Ok(()),
            // The in-flight play notices and silences itself.
            Playback::Starting { message, .. } => {
                log::info!("Stopped {} before playback started", message.id);
                Ok(())
            }
            Playback::Playing { message, ticks, .. } => {
                ticks.cancel();
                log::info!("Stopped {}", message.id);
                self.player.stop().await.map_err(VoiceError::from)
            }
            Playback::Paused { message, .. } => {
                log::info!("Stopped paused {}", message.id);
                self.player.stop().await.map_err(VoiceError::from)
            }
        }
    }

    /// Move the playing or paused session to `position` seconds.
    /// Callers clamp to `[0, duration]`; negative or non-finite values seek to 0.
    pub async fn seek_to(&self, position: f64) -> Result<(), VoiceError> {
        let target = seconds_to_duration(position);
        {
            let mut inner = self.inner.lock().await;
            match &mut inner.state {
                Playback::Playing { position, .. } | Playback::Paused { position, .. } => {
                    *position = target;
                }
                _ => {
                    log::debug!("seek_to ignored: nothing is playing");
                    return Ok(());
                }
            }
        }

        if let Err(e) = self.player.seek(target.as_secs_f64()).await {
            log::error!("Failed to seek: {}", e);
            self.reset().await;
            return Err(e.into());
        }
        Ok(())
    }

    pub async fn playback_status(&self) -> PlaybackStatus {
        let inner = self.inner.lock().await;
        match &inner.state {
            Playback::Playing {
                message, position, ..
            } => PlaybackStatus {
                is_playing: true,
                player_id: Some(message.id.clone()),
                current_time: position.as_secs_f64(),
            },
            Playback::Paused { message, position } => PlaybackStatus {
                is_playing: false,
                player_id: Some(message.id.clone()),
                current_time: position.as_secs_f64(),
            },
            _ => PlaybackStatus::default(),
        }
    }

    /// Copy of `message` with the transient playback fields filled in.
    pub async fn annotate(&self, message: &VoiceMessage) -> VoiceMessage {
        let status = self.playback_status().await;
        let owned = status.player_id.as_deref() == Some(message.id.as_str());
        VoiceMessage {
            is_playing: Some(owned && status.is_playing),
            current_time: Some(if owned { status.current_time } else { 0.0 }),
            ..message.clone()
        }
    }

    pub async fn shutdown(&self) {
        if let Err(e) = self.stop_playback().await {
            log::warn!("Failed to stop playback on shutdown: {}", e);
        }
    }

    /// Force the controller idle after a native failure.
    async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        if let Playback::Playing { ticks, .. } = &inner.state {
            ticks.cancel();
        }
        inner.state = Playback::Idle;
    }

    async fn advance(&self, session: u64) -> Option<TickOutcome> {
        let mut inner = self.inner.lock().await;
        let Playback::Playing {
            session: s,
            message,
            position,
            ticks,
        } = &mut inner.state
        else {
            return None;
        };
        if *s != session {
            return None;
        }

        *position += POSITION_TICK;
        if message.duration.is_nan()
            || position.as_secs_f64() + END_EPSILON_SECS >= message.duration
        {
            ticks.cancel();
            let id = message.id.clone();
            inner.state = Playback::Idle;
            return Some(TickOutcome::Finished(id));
        }
        Some(TickOutcome::Position(
            message.id.clone(),
            position.as_secs_f64(),
        ))
    }

    fn spawn_position_tick(&self, session: u64, ticks: CancellationToken) {
        let controller = self.clone();
        tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + POSITION_TICK, POSITION_TICK);
            loop {
                tokio::select! {
                    biased;
                    _ = ticks.cancelled() => break,
                    _ = interval.tick() => {
                        match controller.advance(session).await {
                            Some(TickOutcome::Position(id, current_time)) => {
                                let _ = controller
                                    .updates
                                    .try_send(PlaybackUpdate::Position { id, current_time });
                            }
                            Some(TickOutcome::Finished(id)) => {
                                log::info!("Playback of {} finished", id);
                                if let Err(e) = controller.player.stop().await {
                                    log::warn!("Failed to release player: {}", e);
                                }
                                let _ = controller.finished.send(PlaybackUpdate::Finished { id });
                                break;
                            }
                            None => break,
                        }
                    }
                }
            }
        });
    }
}
