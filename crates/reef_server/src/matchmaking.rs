//! Batched matchmaking.
//!
//! Clients take a ticket and poll it. Whenever at least `batch_size`
//! tickets are queued, one batch pass creates exactly one room for the
//! oldest `batch_size` of them.
//!
//! # Concurrency
//!
//! [`Matchmaker::enqueue`] never blocks on room creation. The batch pass
//! ([`Matchmaker::process_queue`]) is single-flight: a call made while
//! another pass is running returns immediately, and the running pass
//! picks up its tickets before it exits.

use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reef_core::error::Result;
use serde::{Deserialize, Serialize};

use crate::maps::MapCatalog;

/// Random bytes per ticket id (hex-encoded to twice as many chars).
pub const TICKET_BYTES: usize = 12;

/// Creates rooms for completed batches.
pub trait RoomFactory: Send + Sync {
    /// Create one room on the given map and return its id.
    ///
    /// # Errors
    ///
    /// Any error fails every ticket of the batch.
    fn create_room(&self, map_path: Option<&str>) -> Result<String>;
}

/// State of a matchmaking ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TicketStatus {
    /// Waiting for a full batch.
    Queued,
    /// A room was created for this ticket's batch.
    Ready {
        /// Room to join.
        room_id: String,
    },
    /// Room creation failed for this ticket's batch.
    Error {
        /// Failure description.
        message: String,
    },
}

impl TicketStatus {
    /// Returns true once the ticket will not change again.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        !matches!(self, Self::Queued)
    }
}

#[derive(Debug, Default)]
struct Tickets {
    queue: VecDeque<String>,
    table: HashMap<String, TicketStatus>,
    finished: VecDeque<String>,
}

/// The admission queue and ticket table.
#[derive(Debug)]
pub struct Matchmaker {
    batch_size: usize,
    max_tickets: usize,
    catalog: MapCatalog,
    tickets: Mutex<Tickets>,
    rng: Mutex<StdRng>,
    processing: AtomicBool,
}

impl Matchmaker {
    /// Create a matchmaker with an entropy-seeded RNG.
    #[must_use]
    pub fn new(batch_size: usize, max_tickets: usize, catalog: MapCatalog) -> Self {
        Self::with_rng(batch_size, max_tickets, catalog, StdRng::from_entropy())
    }

    /// Create a matchmaker with a given RNG (for reproducible tests).
    #[must_use]
    pub fn with_rng(batch_size: usize, max_tickets: usize, catalog: MapCatalog, rng: StdRng) -> Self {
        Self {
            batch_size: batch_size.max(1),
            max_tickets: max_tickets.max(1),
            catalog,
            tickets: Mutex::new(Tickets::default()),
            rng: Mutex::new(rng),
            processing: AtomicBool::new(false),
        }
    }

    /// Tickets per room.
    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Issue a new queued ticket.
    ///
    /// The caller is expected to schedule [`process_queue`](Self::process_queue)
    /// afterwards.
    pub fn enqueue(&self) -> String {
        let ticket = self.new_ticket_id();
        let mut tickets = self.lock_tickets();
        tickets.table.insert(ticket.clone(), TicketStatus::Queued);
        tickets.queue.push_back(ticket.clone());
        self.evict(&mut tickets);
        tracing::debug!(%ticket, queued = tickets.queue.len(), "Ticket queued");
        ticket
    }

    fn new_ticket_id(&self) -> String {
        let bytes: [u8; TICKET_BYTES] = self.lock_rng().gen();
        bytes.iter().fold(String::with_capacity(TICKET_BYTES * 2), |mut out, b| {
            let _ = write!(out, "{b:02x}");
            out
        })
    }

    /// Current state of a ticket, or `None` if it is unknown (or evicted).
    #[must_use]
    pub fn status(&self, ticket: &str) -> Option<TicketStatus> {
        self.lock_tickets().table.get(ticket).cloned()
    }

    /// Tickets waiting for a batch.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.lock_tickets().queue.len()
    }

    /// Tickets in the table (queued and finished).
    #[must_use]
    pub fn ticket_count(&self) -> usize {
        self.lock_tickets().table.len()
    }

    /// Form as many full batches as are queued.
    ///
    /// Returns the number of batches this call formed; 0 if another pass
    /// was already running.
    pub fn process_queue(&self, factory: &dyn RoomFactory) -> usize {
        let mut formed = 0;
        loop {
            if self.processing.swap(true, Ordering::AcqRel) {
                return formed;
            }
            let flag = ProcessingFlag(&self.processing);
            while let Some(batch) = self.take_batch() {
                self.run_batch(&batch, factory);
                formed += 1;
            }
            drop(flag);

            // A ticket enqueued between the last check and releasing the
            // flag would otherwise wait for the next enqueue.
            if self.queued() < self.batch_size {
                return formed;
            }
        }
    }

    fn take_batch(&self) -> Option<Vec<String>> {
        let mut tickets = self.lock_tickets();
        if tickets.queue.len() < self.batch_size {
            return None;
        }
        Some(tickets.queue.drain(..self.batch_size).collect())
    }

    fn run_batch(&self, batch: &[String], factory: &dyn RoomFactory) {
        let map = {
            let mut rng = self.lock_rng();
            self.catalog.pick(&mut *rng).map(str::to_string)
        };
        tracing::info!(tickets = batch.len(), map = ?map, "Creating room for batch");

        let created = panic::catch_unwind(AssertUnwindSafe(|| factory.create_room(map.as_deref())));
        let status = match created {
            Ok(Ok(room_id)) => {
                tracing::info!(%room_id, "Batch ready");
                TicketStatus::Ready { room_id }
            }
            Ok(Err(e)) => {
                tracing::error!("Room creation failed for batch: {e}");
                TicketStatus::Error {
                    message: e.to_string(),
                }
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!("Room creation panicked for batch: {message}");
                TicketStatus::Error {
                    message: format!("room creation panicked: {message}"),
                }
            }
        };

        let mut tickets = self.lock_tickets();
        for ticket in batch {
            tickets.table.insert(ticket.clone(), status.clone());
            tickets.finished.push_back(ticket.clone());
        }
        self.evict(&mut tickets);
    }

    fn evict(&self, tickets: &mut Tickets) {
        let mut evicted = 0;
        while tickets.table.len() > self.max_tickets {
            let Some(oldest) = tickets.finished.pop_front() else {
                break;
            };
            tickets.table.remove(&oldest);
            evicted += 1;
        }
        if evicted > 0 {
            tracing::debug!(evicted, remaining = tickets.table.len(), "Evicted finished tickets");
        }
    }

    fn lock_tickets(&self) -> MutexGuard<'_, Tickets> {
        self.tickets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the single-flight flag when the pass ends, including by unwinding.
struct ProcessingFlag<'a>(&'a AtomicBool);

impl Drop for ProcessingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
