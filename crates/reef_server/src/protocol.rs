//! JSON-lines wire protocol.
//!
//! Clients and the server exchange one JSON object per line over TCP.
//!
//! **Client → server:** [`ClientRequest`], tagged by `cmd`
//! **Server → client:** [`ServerEvent`], tagged by `type`
//!
//! # Example Session
//!
//! ```text
//! -> {"cmd":"matchmake"}
//! <- {"type":"ticket","ticket":"9f0c..."}
//! -> {"cmd":"ticket_status","ticket":"9f0c..."}
//! <- {"type":"ticket_status","ticket":"9f0c...","status":"ready","room_id":"room-1"}
//! -> {"cmd":"join","room_id":"room-1"}
//! <- {"type":"joined","room_id":"room-1","agent_id":3,"role":"participant"}
//! <- {"type":"state","tick":12,"phase":"active",...}
//! -> {"cmd":"move","q":4,"r":2}
//! -> {"cmd":"eliminate","target_id":5}
//! <- {"type":"game_over","winner":"red","reason":"team_eliminated"}
//! ```

use reef_core::agents::{EntityId, Role, Team};
use reef_core::hex::{Hex, Offset};
use reef_core::minerals::Mineral;
use reef_core::simulation::{Command, MoveTarget, WinReason};
use reef_core::snapshot::{RegionListing, RoomSnapshot};
use serde::{Deserialize, Serialize};

use crate::directory::RoomListing;
use crate::matchmaking::TicketStatus;

// ============================================================================
// Input (client -> server)
// ============================================================================

/// Destination of a move request, in either coordinate system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MoveRequest {
    /// Axial coordinates.
    Axial {
        /// Axial q.
        q: i32,
        /// Axial r.
        r: i32,
    },
    /// Odd-r offset coordinates.
    Offset {
        /// Column.
        col: i32,
        /// Row.
        row: i32,
    },
}

impl From<MoveRequest> for MoveTarget {
    fn from(request: MoveRequest) -> Self {
        match request {
            MoveRequest::Axial { q, r } => Self::Axial(Hex::new(q, r)),
            MoveRequest::Offset { col, row } => Self::Offset(Offset::new(col, row)),
        }
    }
}

/// Requests a client can send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Take a matchmaking ticket.
    Matchmake,
    /// Poll a ticket.
    TicketStatus {
        /// Ticket id.
        ticket: String,
    },
    /// List active rooms.
    ListRooms,
    /// Join a room, leaving the current one first.
    Join {
        /// Room to join.
        room_id: String,
    },
    /// Leave the current room.
    Leave,
    /// Walk the controlled agent to a cell.
    Move(MoveRequest),
    /// Stop the controlled agent.
    Stop,
    /// Eliminate a nearby gatherer.
    #[serde(alias = "kill")]
    Eliminate {
        /// Agent to eliminate.
        target_id: EntityId,
    },
    /// Request the mineral listing.
    GetMinerals,
    /// Request the region listing.
    GetRegions,
}

impl ClientRequest {
    /// The room command this request maps to, if it is one.
    #[must_use]
    pub fn room_command(&self) -> Option<Command> {
        match *self {
            Self::Move(target) => Some(Command::Move(target.into())),
            Self::Stop => Some(Command::Stop),
            Self::Eliminate { target_id } => Some(Command::Eliminate { target: target_id }),
            _ => None,
        }
    }
}

// ============================================================================
// Output (server -> client)
// ============================================================================

/// Messages sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A ticket was issued.
    Ticket {
        /// Ticket id.
        ticket: String,
    },
    /// Current state of a ticket.
    TicketStatus {
        /// Ticket id.
        ticket: String,
        /// Its status.
        #[serde(flatten)]
        status: TicketStatus,
    },
    /// The ticket is unknown.
    TicketNotFound {
        /// Ticket id.
        ticket: String,
    },
    /// Active rooms.
    Rooms {
        /// One entry per room.
        rooms: Vec<RoomListing>,
    },
    /// Joined a room.
    Joined {
        /// Room joined.
        room_id: String,
        /// Agent now controlled (or observed through).
        agent_id: EntityId,
        /// Participant or observer.
        role: Role,
    },
    /// Left a room.
    Left {
        /// Room left.
        room_id: String,
    },
    /// Full room state after a tick.
    State(RoomSnapshot),
    /// The match ended. Sent once.
    GameOver {
        /// Winning team.
        winner: Team,
        /// Why it won.
        reason: WinReason,
    },
    /// Mineral listing.
    Minerals {
        /// All minerals in ID order.
        minerals: Vec<Mineral>,
    },
    /// Region listing.
    Regions(RegionListing),
    /// The joined room shut down.
    RoomClosed {
        /// Room that closed.
        room_id: String,
    },
    /// The request could not be handled.
    Error {
        /// Description.
        message: String,
    },
}

impl ServerEvent {
    /// Shorthand for [`ServerEvent::Error`].
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
