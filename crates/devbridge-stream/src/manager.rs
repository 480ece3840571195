//! Connection manager actor
//!
//! [`SseConnectionManager`] is a handle to a background task that owns the
//! [`Machine`] and performs its effects: health checks, the event stream,
//! the heartbeat, and the retry/cooldown timers. Every spawned task reports
//! back through one input channel, so the machine sees a single ordered
//! sequence of inputs.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::SseConfig;
use crate::error::{ConnectionFailure, SseError, SurfacedError};
use crate::health::{check_health, health_url};
use crate::sse::{SseDecoder, SseEvent};
use crate::state::{ConnectionState, Effect, Input, Machine, RetryState};

const EVENT_BUFFER: usize = 256;

/// Liveness probe run on every heartbeat tick while connected
#[async_trait]
pub trait HeartbeatProbe: Send + Sync {
    async fn beat(&self, event_url: &Url) -> Result<(), SseError>;
}

/// Heartbeat that polls the server's health endpoint
pub struct HealthHeartbeat {
    client: reqwest::Client,
    health_url: Option<Url>,
    timeout: Duration,
}

impl HealthHeartbeat {
    pub fn new(client: reqwest::Client, config: &SseConfig) -> Self {
        Self {
            client,
            health_url: config.health_url.clone(),
            timeout: config.heartbeat_timeout,
        }
    }
}

#[async_trait]
impl HeartbeatProbe for HealthHeartbeat {
    async fn beat(&self, event_url: &Url) -> Result<(), SseError> {
        let url = match &self.health_url {
            Some(url) => url.clone(),
            None => health_url(event_url)?,
        };
        check_health(&self.client, &url, self.timeout).await?;
        Ok(())
    }
}

/// Receiving ends handed out by [`SseConnectionManager::spawn`]
pub struct SseChannels {
    pub events: mpsc::Receiver<SseEvent>,
    pub errors: mpsc::UnboundedReceiver<SurfacedError>,
}

enum Command {
    Connect(Url),
    Reconnect,
    Disconnect,
    ClearError(oneshot::Sender<bool>),
    Shutdown,
}

pub struct SseConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    retry: watch::Receiver<RetryState>,
    task: JoinHandle<()>,
}

impl SseConnectionManager {
    /// Start the manager with the health endpoint as heartbeat
    pub fn spawn(config: SseConfig) -> (Self, SseChannels) {
        let client = reqwest::Client::new();
        let probe = Arc::new(HealthHeartbeat::new(client.clone(), &config));
        Self::spawn_with_probe(config, client, probe)
    }

    pub fn spawn_with_probe(
        config: SseConfig,
        client: reqwest::Client,
        probe: Arc<dyn HeartbeatProbe>,
    ) -> (Self, SseChannels) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (retry_tx, retry_rx) = watch::channel(RetryState::default());

        let driver = Driver {
            machine: Machine::new(&config),
            config,
            client,
            probe,
            inputs: inputs_tx,
            events: events_tx,
            errors: errors_tx,
            state: state_tx,
            retry: retry_tx,
            io: None,
            heartbeat: None,
            timer: None,
        };
        let task = tokio::spawn(driver.run(commands_rx, inputs_rx));

        (
            Self {
                commands: commands_tx,
                state: state_rx,
                retry: retry_rx,
                task,
            },
            SseChannels {
                events: events_rx,
                errors: errors_rx,
            },
        )
    }

    /// Connect to an event URL, replacing any current connection
    pub fn connect(&self, url: &str) -> Result<(), SseError> {
        let parsed = Url::parse(url).map_err(|e| SseError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SseError::InvalidUrl {
                url: url.to_string(),
                reason: "expected an http or https URL".to_string(),
            });
        }
        self.send(Command::Connect(parsed))
    }

    /// Reset the retry budget and connect again to the last URL
    pub fn reconnect(&self) -> Result<(), SseError> {
        self.send(Command::Reconnect)
    }

    pub fn disconnect(&self) -> Result<(), SseError> {
        self.send(Command::Disconnect)
    }

    /// Leave the failed state; returns false if the manager had not failed
    pub async fn clear_error(&self) -> Result<bool, SseError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::ClearError(reply_tx))?;
        reply_rx.await.map_err(|_| SseError::Closed)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn retry_state(&self) -> RetryState {
        *self.retry.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Disconnect and stop the background task
    pub async fn shutdown(self) {
        if self.commands.send(Command::Shutdown).is_ok() {
            if let Err(e) = self.task.await {
                warn!("Connection manager task ended abnormally: {}", e);
            }
        }
    }

    fn send(&self, command: Command) -> Result<(), SseError> {
        self.commands.send(command).map_err(|_| SseError::Closed)
    }
}

struct Driver {
    machine: Machine,
    config: SseConfig,
    client: reqwest::Client,
    probe: Arc<dyn HeartbeatProbe>,
    inputs: mpsc::UnboundedSender<Input>,
    events: mpsc::Sender<SseEvent>,
    errors: mpsc::UnboundedSender<SurfacedError>,
    state: watch::Sender<ConnectionState>,
    retry: watch::Sender<RetryState>,
    /// Health check or event stream of the current attempt
    io: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
    timer: Option<JoinHandle<()>>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut inputs: mpsc::UnboundedReceiver<Input>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Connect(url)) => {
                        info!("Connecting to event stream at {}", url);
                        self.handle(Input::Connect { url });
                    }
                    Some(Command::Reconnect) => self.handle(Input::Reconnect),
                    Some(Command::Disconnect) => self.handle(Input::Disconnect),
                    Some(Command::ClearError(reply)) => {
                        let failed = self.machine.state() == ConnectionState::Failed;
                        self.handle(Input::ClearError);
                        let _ = reply.send(failed);
                    }
                    Some(Command::Shutdown) | None => break,
                },
                Some(input) = inputs.recv() => self.handle(input),
            }
        }

        self.handle(Input::Disconnect);
        debug!("Connection manager stopped");
    }

    fn handle(&mut self, input: Input) {
        let effects = self.machine.transition(input, Instant::now());

        // Observers see the new state before any surfaced error
        let retry = self.machine.retry();
        self.retry.send_if_modified(|current| {
            let changed = *current != retry;
            *current = retry;
            changed
        });
        let state = self.machine.state();
        self.state.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });

        for effect in effects {
            self.perform(effect);
        }
    }

    fn perform(&mut self, effect: Effect) {
        match effect {
            Effect::CheckHealth { attempt, url } => {
                let health = match &self.config.health_url {
                    Some(url) => Ok(url.clone()),
                    None => health_url(&url),
                };
                let health = match health {
                    Ok(health) => health,
                    Err(e) => {
                        let _ = self.inputs.send(Input::HealthChecked {
                            attempt,
                            result: Err(e.into()),
                        });
                        return;
                    }
                };
                let client = self.client.clone();
                let timeout = self.config.health_check_timeout;
                let inputs = self.inputs.clone();
                replace(
                    &mut self.io,
                    tokio::spawn(async move {
                        let result = check_health(&client, &health, timeout)
                            .await
                            .map(|status| {
                                debug!("Server healthy (version {:?})", status.version);
                            })
                            .map_err(ConnectionFailure::from);
                        let _ = inputs.send(Input::HealthChecked { attempt, result });
                    }),
                );
            }
            Effect::OpenStream { attempt, url } => {
                let stream = EventStream {
                    client: self.client.clone(),
                    url,
                    attempt,
                    open_timeout: self.config.open_timeout,
                    inputs: self.inputs.clone(),
                    events: self.events.clone(),
                };
                replace(&mut self.io, tokio::spawn(stream.run()));
            }
            Effect::CloseStream => abort(&mut self.io),
            Effect::StartHeartbeat { attempt } => {
                let Some(url) = self.machine.url().cloned() else {
                    return;
                };
                info!("✅ Event stream connected to {}", url);
                if !self.config.heartbeat {
                    return;
                }
                let heartbeat = Heartbeat {
                    probe: self.probe.clone(),
                    url,
                    attempt,
                    interval: self.config.heartbeat_interval,
                    timeout: self.config.heartbeat_timeout,
                    inputs: self.inputs.clone(),
                };
                replace(&mut self.heartbeat, tokio::spawn(heartbeat.run()));
            }
            Effect::StopHeartbeat => abort(&mut self.heartbeat),
            Effect::CancelTimers => abort(&mut self.timer),
            Effect::ScheduleRetry { timer, delay } => {
                info!("Reconnecting in {:?}", delay);
                self.schedule(delay, Input::RetryTimerFired { timer });
            }
            Effect::ScheduleCooldown { timer, delay } => {
                self.schedule(delay, Input::CooldownExpired { timer });
            }
            Effect::Surface(surfaced) => {
                error!("❌ {}", surfaced);
                let _ = self.errors.send(surfaced);
            }
        }
    }

    fn schedule(&mut self, delay: Duration, input: Input) {
        let inputs = self.inputs.clone();
        replace(
            &mut self.timer,
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = inputs.send(input);
            }),
        );
    }
}

fn replace(slot: &mut Option<JoinHandle<()>>, task: JoinHandle<()>) {
    if let Some(old) = slot.replace(task) {
        old.abort();
    }
}

fn abort(slot: &mut Option<JoinHandle<()>>) {
    if let Some(task) = slot.take() {
        task.abort();
    }
}

struct EventStream {
    client: reqwest::Client,
    url: Url,
    attempt: u64,
    open_timeout: Duration,
    inputs: mpsc::UnboundedSender<Input>,
    events: mpsc::Sender<SseEvent>,
}

impl EventStream {
    async fn run(self) {
        let error = match self.read().await {
            Ok(()) => SseError::StreamEnded,
            Err(e) => e,
        };
        debug!("Event stream closed: {}", error);
        let _ = self.inputs.send(Input::StreamFailed {
            attempt: self.attempt,
            failure: error.into(),
        });
    }

    async fn read(&self) -> Result<(), SseError> {
        let request = self
            .client
            .get(self.url.clone())
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send();
        let response = tokio::time::timeout(self.open_timeout, request)
            .await
            .map_err(|_| SseError::Timeout {
                what: "Opening the event stream",
                after: self.open_timeout,
            })??;

        let status = response.status();
        if !status.is_success() {
            return Err(SseError::Status {
                status: status.as_u16(),
            });
        }
        let _ = self.inputs.send(Input::Opened {
            attempt: self.attempt,
        });

        let mut decoder = SseDecoder::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            for event in decoder.push(&chunk?) {
                if self.events.send(event).await.is_err() {
                    debug!("Event receiver dropped, discarding event");
                }
            }
        }
        Ok(())
    }
}

struct Heartbeat {
    probe: Arc<dyn HeartbeatProbe>,
    url: Url,
    attempt: u64,
    interval: Duration,
    timeout: Duration,
    inputs: mpsc::UnboundedSender<Input>,
}

impl Heartbeat {
    async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let reason = match tokio::time::timeout(self.timeout, self.probe.beat(&self.url)).await
            {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("no answer within {:?}", self.timeout),
            };
            warn!("💔 Heartbeat missed: {}", reason);
            let _ = self.inputs.send(Input::HeartbeatMissed {
                attempt: self.attempt,
            });
            return;
        }
    }
}
