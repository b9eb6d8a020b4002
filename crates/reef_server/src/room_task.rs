//! Per-room tokio task.
//!
//! Each room is owned by exactly one task. Messages arrive on a bounded
//! mpsc inbox and are applied between ticks, so commands and ticks never
//! interleave. State is published two ways: a broadcast channel of
//! [`RoomEvent`]s for joined clients, and a watch channel holding the
//! latest [`RoomListing`] for the directory.

use std::sync::Arc;
use std::time::Duration;

use reef_core::agents::{EntityId, Role};
use reef_core::error::GameError;
use reef_core::minerals::Mineral;
use reef_core::simulation::{Command, GameOver, Room};
use reef_core::snapshot::{RegionListing, RoomSnapshot};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};

use crate::directory::{RoomDirectory, RoomListing, ROOM_NAME};
use crate::error::{ServerError, ServerResult};

/// Pending messages per room before senders wait.
pub const INBOX_CAPACITY: usize = 256;

/// Broadcast events buffered per subscriber before it lags.
pub const EVENT_CAPACITY: usize = 64;

/// Events broadcast to joined clients.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// Full state after a tick.
    Snapshot(Arc<RoomSnapshot>),
    /// The match ended.
    GameOver(GameOver),
}

/// Reply to a successful join.
#[derive(Debug)]
pub struct JoinAck {
    /// Agent attached to the session.
    pub agent_id: EntityId,
    /// Participant or observer.
    pub role: Role,
    /// Room events from now on.
    pub events: broadcast::Receiver<RoomEvent>,
}

/// Messages accepted by a room task.
#[derive(Debug)]
pub enum RoomMessage {
    /// Attach a session.
    Join {
        /// Session id.
        session: String,
        /// Where to send the result.
        reply: oneshot::Sender<Result<JoinAck, GameError>>,
    },
    /// Detach a session.
    Leave {
        /// Session id.
        session: String,
    },
    /// Command for the session's agent.
    Command {
        /// Session id.
        session: String,
        /// The command.
        command: Command,
    },
    /// Request the mineral listing.
    Minerals {
        /// Where to send it.
        reply: oneshot::Sender<Vec<Mineral>>,
    },
    /// Request the region listing.
    Regions {
        /// Where to send it.
        reply: oneshot::Sender<RegionListing>,
    },
}

/// Cheap, cloneable access to a running room.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    id: Arc<str>,
    inbox: mpsc::Sender<RoomMessage>,
    listing: watch::Receiver<RoomListing>,
}

impl RoomHandle {
    /// Room id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Latest published listing.
    #[must_use]
    pub fn listing(&self) -> RoomListing {
        self.listing.borrow().clone()
    }

    /// Returns true once the room task has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inbox.is_closed()
    }

    /// Attach a session to the room.
    pub async fn join(&self, session: &str) -> ServerResult<JoinAck> {
        let (reply, response) = oneshot::channel();
        self.send(RoomMessage::Join {
            session: session.to_string(),
            reply,
        })
        .await?;
        let joined = response.await.map_err(|_| self.closed())?;
        Ok(joined?)
    }

    /// Detach a session.
    pub async fn leave(&self, session: &str) -> ServerResult<()> {
        self.send(RoomMessage::Leave {
            session: session.to_string(),
        })
        .await
    }

    /// Queue a command for the session's agent.
    pub async fn command(&self, session: &str, command: Command) -> ServerResult<()> {
        self.send(RoomMessage::Command {
            session: session.to_string(),
            command,
        })
        .await
    }

    /// Current minerals.
    pub async fn minerals(&self) -> ServerResult<Vec<Mineral>> {
        let (reply, response) = oneshot::channel();
        self.send(RoomMessage::Minerals { reply }).await?;
        response.await.map_err(|_| self.closed())
    }

    /// Region definitions and assignments.
    pub async fn regions(&self) -> ServerResult<RegionListing> {
        let (reply, response) = oneshot::channel();
        self.send(RoomMessage::Regions { reply }).await?;
        response.await.map_err(|_| self.closed())
    }

    async fn send(&self, message: RoomMessage) -> ServerResult<()> {
        self.inbox.send(message).await.map_err(|_| self.closed())
    }

    fn closed(&self) -> ServerError {
        ServerError::RoomClosed(self.id.to_string())
    }
}

/// Register `room` in `directory` and start its task on `runtime`.
///
/// The task unregisters itself when it stops: after the match ends, when
/// every handle is dropped, or, with an `empty_grace`, when the last client
/// leaves or the room has had no clients for that long.
pub fn spawn_room(
    id: impl Into<String>,
    room: Room,
    empty_grace: Option<Duration>,
    directory: &Arc<RoomDirectory>,
    runtime: &Handle,
) -> RoomHandle {
    let id: String = id.into();
    let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);
    let (listing_tx, listing_rx) = watch::channel(listing_of(&id, &room));
    let (events, _) = broadcast::channel(EVENT_CAPACITY);

    let handle = RoomHandle {
        id: Arc::from(id.as_str()),
        inbox: inbox_tx,
        listing: listing_rx,
    };
    directory.insert(handle.clone());

    let task = RoomTask {
        id,
        room,
        inbox: inbox_rx,
        events,
        listing: listing_tx,
        empty_grace,
        empty_since: Instant::now(),
        directory: Arc::clone(directory),
    };
    runtime.spawn(task.run());
    handle
}

fn listing_of(id: &str, room: &Room) -> RoomListing {
    RoomListing {
        room_id: id.to_string(),
        name: ROOM_NAME.to_string(),
        clients: room.client_count(),
        max_clients: room.config().max_clients,
        metadata: room.metadata().clone(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Dispose,
}

enum Wake {
    Tick,
    Message(Option<RoomMessage>),
}

struct RoomTask {
    id: String,
    room: Room,
    inbox: mpsc::Receiver<RoomMessage>,
    events: broadcast::Sender<RoomEvent>,
    listing: watch::Sender<RoomListing>,
    empty_grace: Option<Duration>,
    /// Start of the current stretch without clients.
    empty_since: Instant,
    directory: Arc<RoomDirectory>,
}

impl RoomTask {
    async fn run(mut self) {
        let period = Duration::from_millis(u64::from(self.room.config().tick_interval_ms.max(1)));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(room_id = %self.id, period_ms = period.as_millis() as u64, "Room task started");

        loop {
            let wake = tokio::select! {
                _ = interval.tick() => Wake::Tick,
                message = self.inbox.recv() => Wake::Message(message),
            };
            let flow = match wake {
                Wake::Tick => self.on_tick(),
                Wake::Message(Some(message)) => self.on_message(message),
                Wake::Message(None) => Flow::Dispose,
            };
            if flow == Flow::Dispose {
                break;
            }
        }

        self.directory.remove(&self.id);
        tracing::info!(
            room_id = %self.id,
            tick = self.room.get_tick(),
            outcome = ?self.room.outcome(),
            "Room disposed"
        );
    }

    fn on_tick(&mut self) -> Flow {
        let events = self.room.tick();

        if self.events.receiver_count() > 0 {
            let _ = self
                .events
                .send(RoomEvent::Snapshot(Arc::new(self.room.snapshot())));
        }

        if let Some(over) = events.game_over {
            let _ = self.events.send(RoomEvent::GameOver(over));
            self.publish_listing();
            return Flow::Dispose;
        }

        if self.room.client_count() > 0 {
            self.empty_since = Instant::now();
        } else if let Some(grace) = self.empty_grace {
            if self.empty_since.elapsed() >= grace {
                tracing::info!(room_id = %self.id, grace_ms = grace.as_millis() as u64, "No clients joined in time");
                return Flow::Dispose;
            }
        }
        Flow::Continue
    }

    fn on_message(&mut self, message: RoomMessage) -> Flow {
        match message {
            RoomMessage::Join { session, reply } => {
                let joined = self.room.join(&session).map(|agent_id| JoinAck {
                    agent_id,
                    role: self.room.agent(agent_id).map_or(Role::Observer, |a| a.role),
                    events: self.events.subscribe(),
                });
                self.publish_listing();
                if reply.send(joined).is_err() {
                    tracing::debug!(room_id = %self.id, %session, "Joiner went away; detaching");
                    self.room.leave(&session);
                    self.publish_listing();
                }
            }
            RoomMessage::Leave { session } => {
                self.room.leave(&session);
                self.publish_listing();
                if self.empty_grace.is_some() && self.room.client_count() == 0 {
                    tracing::info!(room_id = %self.id, "Last client left");
                    return Flow::Dispose;
                }
            }
            RoomMessage::Command { session, command } => {
                self.room.apply_session_command(&session, command);
            }
            RoomMessage::Minerals { reply } => {
                let _ = reply.send(self.room.minerals().to_vec());
            }
            RoomMessage::Regions { reply } => {
                let _ = reply.send(self.room.region_listing());
            }
        }
        Flow::Continue
    }

    fn publish_listing(&self) {
        self.listing.send_replace(listing_of(&self.id, &self.room));
    }
}
