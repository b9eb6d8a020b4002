//! TCP front end.
//!
//! One task per connection reads [`ClientRequest`] lines and writes
//! [`ServerEvent`] lines. A connection joins at most one room at a time;
//! while joined, the room's broadcast events are forwarded as they arrive.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::directory::RoomDirectory;
use crate::error::ServerResult;
use crate::factory::ServerRoomFactory;
use crate::maps::MapCatalog;
use crate::matchmaking::{Matchmaker, RoomFactory};
use crate::protocol::{ClientRequest, ServerEvent};
use crate::room_task::{RoomEvent, RoomHandle};
use crate::ServerConfig;

/// Longest request line accepted; longer lines drop the connection.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Everything connections share.
pub struct ServerState {
    /// Matchmaking queue.
    pub matchmaker: Arc<Matchmaker>,
    /// Creates rooms for matched batches.
    pub factory: Arc<dyn RoomFactory>,
    /// Running rooms.
    pub directory: Arc<RoomDirectory>,
    next_session: AtomicU64,
}

impl ServerState {
    /// Assemble shared state from parts.
    pub fn new(
        matchmaker: Arc<Matchmaker>,
        factory: Arc<dyn RoomFactory>,
        directory: Arc<RoomDirectory>,
    ) -> Self {
        Self {
            matchmaker,
            factory,
            directory,
            next_session: AtomicU64::new(1),
        }
    }

    /// Build the production state for a config: scan maps, create the
    /// directory, matchmaker and room factory.
    pub fn from_config(config: ServerConfig, runtime: Handle, seed: u64) -> Self {
        let catalog = MapCatalog::scan(&config.maps_dir);
        let directory = Arc::new(RoomDirectory::new());
        let matchmaker = Arc::new(Matchmaker::new(
            config.batch_size,
            config.max_tickets,
            catalog.clone(),
        ));
        let factory = Arc::new(ServerRoomFactory::new(
            Arc::new(config),
            catalog,
            Arc::clone(&directory),
            runtime,
            seed,
        ));
        Self::new(matchmaker, factory, directory)
    }

    /// Issue a ticket and schedule a batch pass on a blocking thread.
    pub fn matchmake(self: &Arc<Self>) -> String {
        let ticket = self.matchmaker.enqueue();
        let state = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            state.matchmaker.process_queue(state.factory.as_ref());
        });
        ticket
    }

    fn next_session_id(&self) -> String {
        format!("session-{}", self.next_session.fetch_add(1, Ordering::Relaxed))
    }
}

/// Bind and serve until the listener fails.
pub async fn serve(config: ServerConfig, seed: u64) -> ServerResult<()> {
    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Listening");
    let state = Arc::new(ServerState::from_config(config, Handle::current(), seed));
    accept_loop(listener, state).await
}

/// Accept connections on an already bound listener.
pub async fn accept_loop(listener: TcpListener, state: Arc<ServerState>) -> ServerResult<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer, state).await {
                tracing::debug!(%peer, "Connection ended with error: {e}");
            }
        });
    }
}

struct Membership {
    room: RoomHandle,
    events: broadcast::Receiver<RoomEvent>,
}

enum Input {
    Line(Option<String>),
    Event(Result<RoomEvent, RecvError>),
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<ServerState>,
) -> ServerResult<()> {
    let session = state.next_session_id();
    tracing::info!(%peer, %session, "Client connected");

    let (reader, mut writer) = stream.into_split();
    let mut lines = LineReader::new(BufReader::new(reader), MAX_LINE_BYTES);
    let mut connection = Connection {
        session,
        state,
        membership: None,
    };

    let result = loop {
        let input = tokio::select! {
            line = lines.next_line() => match line {
                Ok(line) => Input::Line(line),
                Err(e) => break Err(e.into()),
            },
            event = next_event(&mut connection.membership) => Input::Event(event),
        };

        let replies = match input {
            Input::Line(None) => break Ok(()),
            Input::Line(Some(line)) if line.trim().is_empty() => continue,
            Input::Line(Some(line)) => connection.handle_line(&line).await,
            Input::Event(event) => connection.forward(event),
        };
        if let Err(e) = write_events(&mut writer, &replies).await {
            break Err(e);
        }
    };

    connection.leave_room().await;
    tracing::info!(%peer, session = %connection.session, "Client disconnected");
    result
}

/// Newline-delimited reader with a length cap.
///
/// A partial line is kept in `pending`, so `next_line` may be dropped by
/// `select!` and called again without losing bytes.
struct LineReader<R> {
    reader: R,
    pending: Vec<u8>,
    max_len: usize,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    fn new(reader: R, max_len: usize) -> Self {
        Self {
            reader,
            pending: Vec::new(),
            max_len,
        }
    }

    /// Next line without its `\n` or `\r\n`; `None` at end of stream.
    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                return decode_line(std::mem::take(&mut self.pending)).map(Some);
            }

            let newline = available.iter().position(|&b| b == b'\n');
            let used = newline.map_or(available.len(), |i| i + 1);
            let content = self.pending.len() + used - usize::from(newline.is_some());
            if content > self.max_len {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("request line longer than {} bytes", self.max_len),
                ));
            }
            self.pending.extend_from_slice(&available[..used]);
            self.reader.consume(used);

            if newline.is_some() {
                let mut line = std::mem::take(&mut self.pending);
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return decode_line(line).map(Some);
            }
        }
    }
}

fn decode_line(bytes: Vec<u8>) -> std::io::Result<String> {
    String::from_utf8(bytes).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

async fn next_event(membership: &mut Option<Membership>) -> Result<RoomEvent, RecvError> {
    match membership {
        Some(m) => m.events.recv().await,
        None => std::future::pending().await,
    }
}

async fn write_events<W: AsyncWrite + Unpin>(writer: &mut W, events: &[ServerEvent]) -> ServerResult<()> {
    for event in events {
        let mut line = serde_json::to_string(event).map_err(std::io::Error::other)?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
    }
    writer.flush().await?;
    Ok(())
}

struct Connection {
    session: String,
    state: Arc<ServerState>,
    membership: Option<Membership>,
}

impl Connection {
    async fn handle_line(&mut self, line: &str) -> Vec<ServerEvent> {
        match serde_json::from_str::<ClientRequest>(line) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => {
                tracing::debug!(session = %self.session, "Malformed request: {e}");
                vec![ServerEvent::error(format!("malformed request: {e}"))]
            }
        }
    }

    async fn handle_request(&mut self, request: ClientRequest) -> Vec<ServerEvent> {
        if let Some(command) = request.room_command() {
            let Some(room) = self.current_room() else {
                return vec![ServerEvent::error("not in a room")];
            };
            return match room.command(&self.session, command).await {
                Ok(()) => Vec::new(),
                Err(e) => self.drop_membership(&e.to_string()),
            };
        }

        match request {
            ClientRequest::Matchmake => vec![ServerEvent::Ticket {
                ticket: self.state.matchmake(),
            }],
            ClientRequest::TicketStatus { ticket } => match self.state.matchmaker.status(&ticket) {
                Some(status) => vec![ServerEvent::TicketStatus { ticket, status }],
                None => vec![ServerEvent::TicketNotFound { ticket }],
            },
            ClientRequest::ListRooms => vec![ServerEvent::Rooms {
                rooms: self.state.directory.list(),
            }],
            ClientRequest::Join { room_id } => self.join(room_id).await,
            ClientRequest::Leave => match self.leave_room().await {
                Some(room_id) => vec![ServerEvent::Left { room_id }],
                None => vec![ServerEvent::error("not in a room")],
            },
            ClientRequest::GetMinerals => match self.current_room() {
                Some(room) => match room.minerals().await {
                    Ok(minerals) => vec![ServerEvent::Minerals { minerals }],
                    Err(e) => self.drop_membership(&e.to_string()),
                },
                None => vec![ServerEvent::error("not in a room")],
            },
            ClientRequest::GetRegions => match self.current_room() {
                Some(room) => match room.regions().await {
                    Ok(regions) => vec![ServerEvent::Regions(regions)],
                    Err(e) => self.drop_membership(&e.to_string()),
                },
                None => vec![ServerEvent::error("not in a room")],
            },
            ClientRequest::Move(_) | ClientRequest::Stop | ClientRequest::Eliminate { .. } => {
                Vec::new()
            }
        }
    }

    async fn join(&mut self, room_id: String) -> Vec<ServerEvent> {
        let Some(room) = self.state.directory.get(&room_id) else {
            return vec![ServerEvent::error(format!("room not found: {room_id}"))];
        };

        let mut replies = Vec::new();
        if let Some(left) = self.leave_room().await {
            replies.push(ServerEvent::Left { room_id: left });
        }

        match room.join(&self.session).await {
            Ok(ack) => {
                tracing::debug!(session = %self.session, %room_id, agent = ack.agent_id, "Joined room");
                replies.push(ServerEvent::Joined {
                    room_id,
                    agent_id: ack.agent_id,
                    role: ack.role,
                });
                self.membership = Some(Membership {
                    room,
                    events: ack.events,
                });
            }
            Err(e) => replies.push(ServerEvent::error(e.to_string())),
        }
        replies
    }

    fn current_room(&self) -> Option<RoomHandle> {
        self.membership.as_ref().map(|m| m.room.clone())
    }

    /// Leave the current room, if any, and return its id.
    async fn leave_room(&mut self) -> Option<String> {
        let membership = self.membership.take()?;
        let room_id = membership.room.id().to_string();
        if let Err(e) = membership.room.leave(&self.session).await {
            tracing::debug!(session = %self.session, "Leave after room closed: {e}");
        }
        Some(room_id)
    }

    fn drop_membership(&mut self, reason: &str) -> Vec<ServerEvent> {
        tracing::debug!(session = %self.session, reason, "Room unavailable");
        match self.membership.take() {
            Some(m) => vec![ServerEvent::RoomClosed {
                room_id: m.room.id().to_string(),
            }],
            None => Vec::new(),
        }
    }

    fn forward(&mut self, event: Result<RoomEvent, RecvError>) -> Vec<ServerEvent> {
        match event {
            Ok(RoomEvent::Snapshot(snapshot)) => vec![ServerEvent::State((*snapshot).clone())],
            Ok(RoomEvent::GameOver(over)) => vec![ServerEvent::GameOver {
                winner: over.winner,
                reason: over.reason,
            }],
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(session = %self.session, skipped, "Client lagging; snapshots dropped");
                Vec::new()
            }
            Err(RecvError::Closed) => self.drop_membership("room closed"),
        }
    }
}
