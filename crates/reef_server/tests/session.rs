//! Full client sessions over TCP: matchmake, join, command, listings.

use std::sync::Arc;
use std::time::Duration;

use reef_core::config::RoomConfig;
use reef_server::network::{accept_loop, ServerState, MAX_LINE_BYTES};
use reef_server::protocol::ServerEvent;
use reef_server::ServerConfig;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::time::timeout;

struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: std::net::SocketAddr) -> Self {
        let (reader, writer) = TcpStream::connect(addr).await.unwrap().into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    async fn send(&mut self, json: &str) {
        self.writer.write_all(json.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }

    async fn recv(&mut self) -> ServerEvent {
        let line = timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("timed out waiting for server")
            .unwrap()
            .expect("server closed connection");
        serde_json::from_str(&line).unwrap()
    }

    /// Receive until `pick` returns a value, skipping state broadcasts.
    async fn recv_until<T>(&mut self, mut pick: impl FnMut(ServerEvent) -> Option<T>) -> T {
        loop {
            if let Some(found) = pick(self.recv().await) {
                return found;
            }
        }
    }
}

async fn start_server(batch_size: usize) -> std::net::SocketAddr {
    let dir = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        maps_dir: dir.path().join("none"),
        batch_size,
        room: RoomConfig {
            tick_interval_ms: 20,
            agent_count: 2,
            ..RoomConfig::default()
        },
        ..ServerConfig::default()
    };
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(ServerState::from_config(config, Handle::current(), 17));
    tokio::spawn(accept_loop(listener, state));
    addr
}

async fn matched_room(client: &mut Client) -> String {
    client.send(r#"{"cmd":"matchmake"}"#).await;
    let ServerEvent::Ticket { ticket } = client.recv().await else {
        panic!("expected a ticket");
    };

    for _ in 0..100 {
        client
            .send(&format!(r#"{{"cmd":"ticket_status","ticket":"{ticket}"}}"#))
            .await;
        match client.recv().await {
            ServerEvent::TicketStatus { status, .. } => {
                if let reef_server::matchmaking::TicketStatus::Ready { room_id } = status {
                    return room_id;
                }
            }
            other => panic!("unexpected {other:?}"),
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("ticket never became ready");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn matchmake_join_and_play() {
    let addr = start_server(1).await;
    let mut client = Client::connect(addr).await;

    let room_id = matched_room(&mut client).await;

    client.send(r#"{"cmd":"list_rooms"}"#).await;
    let rooms = client
        .recv_until(|event| match event {
            ServerEvent::Rooms { rooms } => Some(rooms),
            _ => None,
        })
        .await;
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].room_id, room_id);
    assert_eq!(rooms[0].clients, 0);

    client
        .send(&format!(r#"{{"cmd":"join","room_id":"{room_id}"}}"#))
        .await;
    let agent_id = client
        .recv_until(|event| match event {
            ServerEvent::Joined { agent_id, .. } => Some(agent_id),
            _ => None,
        })
        .await;

    client.send(r#"{"cmd":"move","col":4,"row":6}"#).await;
    let moving = client
        .recv_until(|event| match event {
            ServerEvent::State(snapshot) => snapshot
                .agent(agent_id)
                .filter(|a| a.state == reef_core::agents::AgentState::Moving)
                .map(|_| snapshot.tick),
            _ => None,
        })
        .await;
    assert!(moving > 0);

    client.send(r#"{"cmd":"get_minerals"}"#).await;
    let minerals = client
        .recv_until(|event| match event {
            ServerEvent::Minerals { minerals } => Some(minerals),
            _ => None,
        })
        .await;
    // No maps configured: the room runs on the open fallback grid.
    assert!(minerals.is_empty());

    client.send(r#"{"cmd":"leave"}"#).await;
    let left = client
        .recv_until(|event| match event {
            ServerEvent::Left { room_id } => Some(room_id),
            _ => None,
        })
        .await;
    assert_eq!(left, room_id);
}

#[tokio::test]
async fn bad_requests_get_errors() {
    let addr = start_server(8).await;
    let mut client = Client::connect(addr).await;

    client.send("{not json").await;
    assert!(matches!(client.recv().await, ServerEvent::Error { .. }));

    client.send(r#"{"cmd":"stop"}"#).await;
    assert!(matches!(client.recv().await, ServerEvent::Error { .. }));

    client
        .send(r#"{"cmd":"ticket_status","ticket":"feedfacefeedfacefeedface"}"#)
        .await;
    assert!(matches!(client.recv().await, ServerEvent::TicketNotFound { .. }));

    client.send(r#"{"cmd":"join","room_id":"room-404"}"#).await;
    assert!(matches!(client.recv().await, ServerEvent::Error { .. }));

    client.send(r#"{"cmd":"matchmake"}"#).await;
    let ServerEvent::Ticket { ticket } = client.recv().await else {
        panic!("expected a ticket");
    };
    client
        .send(&format!(r#"{{"cmd":"ticket_status","ticket":"{ticket}"}}"#))
        .await;
    match client.recv().await {
        ServerEvent::TicketStatus { status, .. } => {
            assert_eq!(status, reef_server::matchmaking::TicketStatus::Queued);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn oversized_request_drops_connection() {
    let addr = start_server(8).await;
    let mut client = Client::connect(addr).await;

    let flood = vec![b'x'; MAX_LINE_BYTES + 1];
    // The server may hang up before the whole flood is written.
    let _ = client.writer.write_all(&flood).await;
    let _ = client.writer.write_all(b"\n").await;

    let after = timeout(Duration::from_secs(5), client.lines.next_line())
        .await
        .expect("server kept the connection open");
    assert!(matches!(after, Ok(None) | Err(_)));
}
