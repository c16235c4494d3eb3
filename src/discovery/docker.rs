use std::collections::{HashMap, VecDeque};
use std::os::unix::fs::FileTypeExt;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use futures_util::Stream;
use http_body_util::{BodyExt, Empty};
use hyper::body::{Buf, Bytes, Incoming};
use hyper::{Method, Request, Response, Uri};
use hyper_util::client::legacy::Client;
use hyperlocal::{UnixClientExt, UnixConnector};
use serde::Deserialize;

use crate::container::ContainerID;

use super::{ContainerEvent, ContainerStatus, Error, Result, namespaced_labels};

pub const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// `{"type":["container"]}`, url encoded.
const CONTAINER_EVENTS_FILTER: &str = "%7B%22type%22%3A%5B%22container%22%5D%7D";

#[derive(Debug, Deserialize)]
struct ContainerSummary {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Labels")]
    labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "Type", default)]
    kind: String,
    #[serde(rename = "Action", default)]
    action: String,
    status: Option<String>,
    #[serde(rename = "Actor", default)]
    actor: Actor,
}

#[derive(Debug, Default, Deserialize)]
struct Actor {
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(rename = "Attributes")]
    attributes: Option<HashMap<String, String>>,
}

impl RawEvent {
    /// Maps `start` and `die` of containers, everything else is dropped.
    fn into_container_event(self) -> Result<Option<ContainerEvent>> {
        if self.kind != "container" {
            return Ok(None);
        }
        let action = match self.status {
            Some(status) if self.action.is_empty() => status,
            _ => self.action,
        };
        let status = match action.as_str() {
            "start" => ContainerStatus::Started,
            "die" => ContainerStatus::Stopped,
            _ => return Ok(None),
        };
        Ok(Some(ContainerEvent {
            status,
            container_id: ContainerID::new(self.actor.id)?,
            labels: namespaced_labels(self.actor.attributes.unwrap_or_default()),
        }))
    }
}

/// Client for the lifecycle events of a Docker Engine.
#[derive(Debug, Clone)]
pub struct DockerEventStream {
    socket: PathBuf,
    client: Client<UnixConnector, Empty<Bytes>>,
}

impl DockerEventStream {
    /// Creates a client for the engine listening on `socket`.
    ///
    /// No request is made, but the socket has to exist.
    pub fn new(socket: impl Into<PathBuf>) -> Result<Self> {
        let socket = socket.into();
        match std::fs::metadata(&socket) {
            Ok(metadata) if metadata.file_type().is_socket() => {}
            Ok(_) => return Err(Error::NotASocket(socket)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::SocketNotFound(socket));
            }
            Err(source) => return Err(Error::SocketMetadata { path: socket, source }),
        }
        Ok(Self {
            socket,
            client: Client::unix(),
        })
    }

    fn uri(&self, path: &str) -> Uri {
        hyperlocal::Uri::new(&self.socket, path).into()
    }

    async fn get(&self, path: &str) -> Result<Response<Incoming>> {
        let req = Request::builder()
            .method(Method::GET)
            .uri(self.uri(path))
            .body(Empty::<Bytes>::new())
            .map_err(|source| Error::Request {
                path: path.to_owned(),
                source,
            })?;
        let res = self
            .client
            .request(req)
            .await
            .map_err(|source| Error::Http {
                path: path.to_owned(),
                source,
            })?;

        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }
        let body = res.collect().await?.to_bytes();
        Err(Error::Status {
            path: path.to_owned(),
            status,
            message: String::from_utf8_lossy(&body).trim().to_owned(),
        })
    }

    /// Returns a `Started` event for every running container.
    pub async fn running_containers(&self) -> Result<Vec<ContainerEvent>> {
        let buf = self
            .get("/containers/json")
            .await?
            .collect()
            .await?
            .aggregate();
        let summaries: Vec<ContainerSummary> = serde_json::from_reader(buf.reader())?;
        summaries
            .into_iter()
            .map(|summary| -> Result<ContainerEvent> {
                Ok(ContainerEvent {
                    status: ContainerStatus::Started,
                    container_id: ContainerID::new(summary.id)?,
                    labels: namespaced_labels(summary.labels.unwrap_or_default()),
                })
            })
            .collect()
    }

    async fn subscribe(&self, since: u64, until: Option<u64>) -> Result<Incoming> {
        let mut path = format!("/events?since={since}&filters={CONTAINER_EVENTS_FILTER}");
        if let Some(until) = until {
            // the engine's window excludes events of the `until` second itself
            path.push_str(&format!("&until={}", until + 1));
        }
        log::debug!("Subscribing to docker events: {}", path);
        Ok(self.get(&path).await?.into_body())
    }

    /// Streams container lifecycle events between `since` and `until` (unix seconds).
    ///
    /// Without `since` the window starts now and the stream first yields a
    /// `Started` event for every running container. Without `until` the
    /// stream never ends. Nothing is requested before the stream is polled.
    /// After an error the stream ends; call this again to start over.
    pub fn events(
        &self,
        since: Option<u64>,
        until: Option<u64>,
    ) -> impl Stream<Item = Result<ContainerEvent>> + Send + 'static {
        let feed = EventFeed {
            docker: self.clone(),
            since,
            until,
            pending: VecDeque::new(),
            body: None,
            buf: Vec::new(),
            done: false,
        };
        futures_util::stream::unfold(feed, |mut feed| async move {
            let item = feed.next().await?;
            Some((item, feed))
        })
    }
}

struct EventFeed {
    docker: DockerEventStream,
    since: Option<u64>,
    until: Option<u64>,
    pending: VecDeque<ContainerEvent>,
    body: Option<Incoming>,
    buf: Vec<u8>,
    done: bool,
}

impl EventFeed {
    async fn next(&mut self) -> Option<Result<ContainerEvent>> {
        if self.done && self.pending.is_empty() {
            return None;
        }
        match self.advance().await {
            Ok(event) => event.map(Ok),
            Err(err) => {
                self.done = true;
                self.pending.clear();
                Some(Err(err))
            }
        }
    }

    async fn advance(&mut self) -> Result<Option<ContainerEvent>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            if self.done {
                return Ok(None);
            }

            if self.body.is_none() {
                match self.since {
                    Some(since) => {
                        self.body = Some(self.docker.subscribe(since, self.until).await?);
                    }
                    None => {
                        self.since = Some(unix_now());
                        let running = self.docker.running_containers().await?;
                        log::debug!("Found {} running containers", running.len());
                        self.pending.extend(running);
                    }
                }
                continue;
            }

            let frame = match self.body.as_mut() {
                Some(body) => body.frame().await,
                None => continue,
            };
            match frame {
                Some(frame) => {
                    if let Ok(data) = frame?.into_data() {
                        self.buf.extend_from_slice(&data);
                        self.decode(false)?;
                    }
                }
                None => {
                    // the engine closes the feed once `until` has passed
                    self.body = None;
                    self.done = true;
                    self.decode(true)?;
                }
            }
        }
    }

    /// Decodes all complete lines of the buffer, and the remainder at `eof`.
    fn decode(&mut self, eof: bool) -> Result<()> {
        while let Some(end) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=end).collect();
            self.push_line(&line)?;
        }
        if eof && !self.buf.is_empty() {
            let rest = std::mem::take(&mut self.buf);
            self.push_line(&rest)?;
        }
        Ok(())
    }

    fn push_line(&mut self, line: &[u8]) -> Result<()> {
        let line = line.trim_ascii();
        if line.is_empty() {
            return Ok(());
        }
        let raw: RawEvent = serde_json::from_slice(line)?;
        if let Some(event) = raw.into_container_event()? {
            self.pending.push_back(event);
        }
        Ok(())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
