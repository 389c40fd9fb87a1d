//! IPC client implementation

use kiosk_api::{Command, Event, Request, Response, ResponseResult};
use std::collections::VecDeque;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};

use crate::{IpcError, IpcResult};

/// One line from the service: a response to a request, or a feed event
enum Incoming {
    Response(Response),
    Event(Event),
}

async fn read_incoming(reader: &mut BufReader<OwnedReadHalf>) -> IpcResult<Incoming> {
    let mut line = String::new();
    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(IpcError::ConnectionClosed);
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let value: serde_json::Value = serde_json::from_str(trimmed)?;
        return if value.get("request_id").is_some() {
            Ok(Incoming::Response(serde_json::from_value(value)?))
        } else if value.get("payload").is_some() {
            Ok(Incoming::Event(serde_json::from_value(value)?))
        } else {
            Err(IpcError::InvalidMessage(trimmed.to_string()))
        };
    }
}

/// IPC Client for connecting to kioskd
pub struct IpcClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    next_request_id: u64,
    /// Events that arrived while waiting for a response
    pending_events: VecDeque<Event>,
}

impl IpcClient {
    /// Connect to kioskd
    pub async fn connect(socket_path: impl AsRef<Path>) -> IpcResult<Self> {
        let stream = UnixStream::connect(socket_path).await?;
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            next_request_id: 1,
            pending_events: VecDeque::new(),
        })
    }

    /// Send a command and wait for its response
    pub async fn send(&mut self, command: Command) -> IpcResult<Response> {
        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let request = Request::new(request_id, command);
        let mut json = serde_json::to_string(&request)?;
        json.push('\n');

        self.writer.write_all(json.as_bytes()).await?;

        loop {
            match read_incoming(&mut self.reader).await? {
                Incoming::Response(response) if response.request_id == request_id => {
                    return Ok(response);
                }
                Incoming::Response(response) => {
                    return Err(IpcError::InvalidMessage(format!(
                        "Expected response {}, got {}",
                        request_id, response.request_id
                    )));
                }
                Incoming::Event(event) => self.pending_events.push_back(event),
            }
        }
    }

    /// Subscribe to the live record feed and consume this client
    pub async fn subscribe(mut self) -> IpcResult<EventStream> {
        let response = self.send(Command::SubscribeRecords).await?;

        if let ResponseResult::Err(e) = response.result {
            return Err(IpcError::ServerError(e.message));
        }

        Ok(self.into_event_stream())
    }

    /// Turn the connection into an event stream, keeping buffered events
    pub fn into_event_stream(self) -> EventStream {
        EventStream {
            reader: self.reader,
            pending: self.pending_events,
        }
    }
}

/// Stream of feed events from kioskd
pub struct EventStream {
    reader: BufReader<OwnedReadHalf>,
    pending: VecDeque<Event>,
}

impl EventStream {
    /// Wait for the next event
    pub async fn next(&mut self) -> IpcResult<Event> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(event);
        }

        loop {
            match read_incoming(&mut self.reader).await? {
                Incoming::Event(event) => return Ok(event),
                // Late responses carry nothing for a subscriber
                Incoming::Response(_) => continue,
            }
        }
    }
}
