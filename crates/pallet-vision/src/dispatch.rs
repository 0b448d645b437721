//! Delivery of coordinate records to the robot side.
//!
//! A [`CoordinateSink`] takes one record at a time. Sinks report failures
//! but never retry on their own; the pipeline logs the failure and moves on
//! to the next frame. Wrap a slow sink in [`BackgroundSink`] to keep frame
//! processing off the network path.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::mpsc::{sync_channel, SyncSender, TrySendError};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, warn};

use crate::coordinate::CorrectedCoordinate;

#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("unsupported endpoint url `{0}` (expected http://host[:port][/path])")]
    InvalidUrl(String),
    #[error("could not resolve `{0}`")]
    Unresolved(String),
    #[error("endpoint rejected the record: `{0}`")]
    Status(String),
    #[error("dispatch queue is full, record dropped")]
    QueueFull,
    #[error("dispatch worker has stopped")]
    Disconnected,
}

/// Destination for corrected coordinates.
pub trait CoordinateSink {
    fn dispatch(&mut self, record: &CorrectedCoordinate) -> Result<(), DispatchError>;
}

impl<S: CoordinateSink + ?Sized> CoordinateSink for Box<S> {
    fn dispatch(&mut self, record: &CorrectedCoordinate) -> Result<(), DispatchError> {
        (**self).dispatch(record)
    }
}

impl<S: CoordinateSink + ?Sized> CoordinateSink for &mut S {
    fn dispatch(&mut self, record: &CorrectedCoordinate) -> Result<(), DispatchError> {
        (**self).dispatch(record)
    }
}

/// Collects records in memory.
impl CoordinateSink for Vec<CorrectedCoordinate> {
    fn dispatch(&mut self, record: &CorrectedCoordinate) -> Result<(), DispatchError> {
        self.push(record.clone());
        Ok(())
    }
}

/// Discards every record.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl CoordinateSink for NullSink {
    fn dispatch(&mut self, _record: &CorrectedCoordinate) -> Result<(), DispatchError> {
        Ok(())
    }
}

/// One JSON object per line.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl JsonLinesSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> CoordinateSink for JsonLinesSink<W> {
    fn dispatch(&mut self, record: &CorrectedCoordinate) -> Result<(), DispatchError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct HttpEndpoint {
    host: String,
    port: u16,
    path: String,
}

impl HttpEndpoint {
    fn parse(url: &str) -> Result<Self, DispatchError> {
        let invalid = || DispatchError::InvalidUrl(url.to_string());
        let rest = url.strip_prefix("http://").ok_or_else(invalid)?;
        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, "/"),
        };
        let (host, port) = match authority.rsplit_once(':') {
            Some((h, p)) => (h, p.parse::<u16>().map_err(|_| invalid())?),
            None => (authority, 80),
        };
        if host.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }
}

/// POSTs each record as a JSON body to a plain-HTTP endpoint.
///
/// One connection per record; any non-2xx status is a failure.
#[derive(Clone, Debug)]
pub struct HttpJsonSink {
    endpoint: HttpEndpoint,
    timeout: Duration,
}

impl HttpJsonSink {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, DispatchError> {
        Ok(Self {
            endpoint: HttpEndpoint::parse(url)?,
            timeout,
        })
    }

    fn post(&self, body: &[u8]) -> Result<(), DispatchError> {
        let HttpEndpoint { host, port, path } = &self.endpoint;
        let authority = format!("{host}:{port}");
        let mut stream = connect(&authority, self.timeout)?;

        write!(
            stream,
            "POST {path} HTTP/1.1\r\nHost: {authority}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )?;
        stream.write_all(body)?;
        stream.flush()?;

        let mut status_line = String::new();
        BufReader::new(stream).read_line(&mut status_line)?;
        let code = status_line
            .split_whitespace()
            .nth(1)
            .and_then(|c| c.parse::<u16>().ok());
        match code {
            Some(c) if (200..300).contains(&c) => Ok(()),
            _ => Err(DispatchError::Status(status_line.trim().to_string())),
        }
    }
}

impl CoordinateSink for HttpJsonSink {
    fn dispatch(&mut self, record: &CorrectedCoordinate) -> Result<(), DispatchError> {
        let body = serde_json::to_vec(record)?;
        self.post(&body)?;
        debug!("posted record to {}", self.endpoint.host);
        Ok(())
    }
}

/// Writes `{X x, Y y, Z z}` commands to a motion controller over TCP.
///
/// The connection is opened on first use and dropped after a write error,
/// so the next record reconnects.
#[derive(Debug)]
pub struct RobotSocketSink {
    address: String,
    default_z_mm: Option<f64>,
    timeout: Duration,
    stream: Option<TcpStream>,
}

impl RobotSocketSink {
    /// `default_z_mm` replaces the record's `z` when set.
    pub fn new(address: impl Into<String>, default_z_mm: Option<f64>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            default_z_mm,
            timeout,
            stream: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn send(&mut self, command: &str) -> Result<(), DispatchError> {
        if self.stream.is_none() {
            self.stream = Some(connect(&self.address, self.timeout)?);
        }
        let stream = self.stream.as_mut().ok_or(DispatchError::Disconnected)?;
        stream.write_all(command.as_bytes())?;
        stream.flush()?;
        Ok(())
    }
}

impl CoordinateSink for RobotSocketSink {
    fn dispatch(&mut self, record: &CorrectedCoordinate) -> Result<(), DispatchError> {
        let command = record.robot_command(self.default_z_mm);
        if let Err(e) = self.send(&command) {
            self.stream = None;
            return Err(e);
        }
        debug!("sent {command} to {}", self.address);
        Ok(())
    }
}

fn connect(address: &str, timeout: Duration) -> Result<TcpStream, DispatchError> {
    let addr = address
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| DispatchError::Unresolved(address.to_string()))?;
    let stream = TcpStream::connect_timeout(&addr, timeout)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    Ok(stream)
}

/// Runs an inner sink on a worker thread behind a bounded queue.
///
/// `dispatch` never blocks: a full queue drops the record with
/// [`DispatchError::QueueFull`]. Failures of the inner sink are logged by
/// the worker. Dropping the sink drains the queue and joins the worker.
pub struct BackgroundSink {
    tx: Option<SyncSender<CorrectedCoordinate>>,
    worker: Option<JoinHandle<()>>,
}

impl BackgroundSink {
    pub fn spawn<S>(mut inner: S, capacity: usize) -> Self
    where
        S: CoordinateSink + Send + 'static,
    {
        let (tx, rx) = sync_channel::<CorrectedCoordinate>(capacity.max(1));
        let worker = std::thread::spawn(move || {
            for record in rx {
                if let Err(e) = inner.dispatch(&record) {
                    warn!("background dispatch failed: {e}");
                }
            }
        });
        Self {
            tx: Some(tx),
            worker: Some(worker),
        }
    }
}

impl CoordinateSink for BackgroundSink {
    fn dispatch(&mut self, record: &CorrectedCoordinate) -> Result<(), DispatchError> {
        let tx = self.tx.as_ref().ok_or(DispatchError::Disconnected)?;
        tx.try_send(record.clone()).map_err(|e| match e {
            TrySendError::Full(_) => DispatchError::QueueFull,
            TrySendError::Disconnected(_) => DispatchError::Disconnected,
        })
    }
}

impl Drop for BackgroundSink {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("background dispatch worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};

    fn record() -> CorrectedCoordinate {
        CorrectedCoordinate::new(666.7, 333.3, 1000.0, 240.0, 80.0)
    }

    /// Accept one connection, read until `terminator`, optionally reply.
    fn one_shot_server(
        terminator: &'static [u8],
        reply: Option<&'static str>,
    ) -> (String, std::thread::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handle = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 512];
            while !received.windows(terminator.len()).any(|w| w == terminator) {
                let n = conn.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
            }
            if let Some(reply) = reply {
                conn.write_all(reply.as_bytes()).unwrap();
            }
            received
        });
        (addr, handle)
    }

    #[test]
    fn json_lines_one_object_per_line() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.dispatch(&record()).unwrap();
        sink.dispatch(&record()).unwrap();
        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: CorrectedCoordinate = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed, record());
    }

    #[test]
    fn parses_http_urls() {
        let e = HttpEndpoint::parse("http://robot.local:8080/api/coords").unwrap();
        assert_eq!(e.host, "robot.local");
        assert_eq!(e.port, 8080);
        assert_eq!(e.path, "/api/coords");

        let e = HttpEndpoint::parse("http://10.0.0.5").unwrap();
        assert_eq!((e.port, e.path.as_str()), (80, "/"));

        assert!(HttpEndpoint::parse("https://robot.local/api").is_err());
        assert!(HttpEndpoint::parse("http://:80/x").is_err());
        assert!(HttpEndpoint::parse("http://host:notaport/").is_err());
    }

    #[test]
    fn http_sink_posts_json_body() {
        let (addr, server) = one_shot_server(
            br#""units":"mm"}"#,
            Some("HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n"),
        );
        let mut sink =
            HttpJsonSink::new(&format!("http://{addr}/coords"), Duration::from_secs(5)).unwrap();
        sink.dispatch(&record()).unwrap();

        let request = String::from_utf8(server.join().unwrap()).unwrap();
        assert!(request.starts_with("POST /coords HTTP/1.1\r\n"));
        assert!(request.contains("Content-Type: application/json"));
        assert!(request.ends_with(&serde_json::to_string(&record()).unwrap()));
    }

    #[test]
    fn http_sink_reports_error_status() {
        let (addr, server) = one_shot_server(
            br#""units":"mm"}"#,
            Some("HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\n\r\n"),
        );
        let mut sink = HttpJsonSink::new(&format!("http://{addr}/"), Duration::from_secs(5)).unwrap();
        let err = sink.dispatch(&record()).unwrap_err();
        assert!(matches!(err, DispatchError::Status(ref s) if s.contains("503")));
        server.join().unwrap();
    }

    #[test]
    fn robot_sink_sends_command_and_keeps_connection() {
        let (addr, server) = one_shot_server(b"Z 250.00}", None);
        let mut sink = RobotSocketSink::new(addr, Some(250.0), Duration::from_secs(5));
        assert!(!sink.is_connected());
        sink.dispatch(&record()).unwrap();
        assert!(sink.is_connected());

        let received = String::from_utf8(server.join().unwrap()).unwrap();
        assert_eq!(received, "{X 666.70, Y 333.30, Z 250.00}");
    }

    #[test]
    fn robot_sink_unreachable_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let mut sink = RobotSocketSink::new(addr, None, Duration::from_millis(500));
        assert!(sink.dispatch(&record()).is_err());
        assert!(!sink.is_connected());
    }

    struct SharedSink(Arc<Mutex<Vec<CorrectedCoordinate>>>);

    impl CoordinateSink for SharedSink {
        fn dispatch(&mut self, record: &CorrectedCoordinate) -> Result<(), DispatchError> {
            self.0.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    struct FailingSink;

    impl CoordinateSink for FailingSink {
        fn dispatch(&mut self, _record: &CorrectedCoordinate) -> Result<(), DispatchError> {
            Err(DispatchError::Disconnected)
        }
    }

    #[test]
    fn background_sink_delivers_everything_before_drop_returns() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let mut sink = BackgroundSink::spawn(SharedSink(seen.clone()), 16);
            for _ in 0..5 {
                sink.dispatch(&record()).unwrap();
            }
        }
        assert_eq!(seen.lock().unwrap().len(), 5);
    }

    #[test]
    fn robot_sink_reconnects_after_peer_drops_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = std::thread::spawn(move || {
            let read_command = |conn: &mut TcpStream| {
                let mut received = Vec::new();
                let mut buf = [0u8; 128];
                while !received.ends_with(b"}") {
                    let n = conn.read(&mut buf).unwrap();
                    if n == 0 {
                        break;
                    }
                    received.extend_from_slice(&buf[..n]);
                }
                String::from_utf8(received).unwrap()
            };
            let (mut first, _) = listener.accept().unwrap();
            let first_command = read_command(&mut first);
            drop(first);
            let (mut second, _) = listener.accept().unwrap();
            (first_command, read_command(&mut second))
        });

        let mut sink = RobotSocketSink::new(addr, None, Duration::from_secs(5));
        sink.dispatch(&record()).unwrap();

        // Writes into the closed connection eventually fail and drop it.
        let mut failed = false;
        for _ in 0..200 {
            std::thread::sleep(Duration::from_millis(10));
            if sink.dispatch(&record()).is_err() {
                failed = true;
                break;
            }
        }
        assert!(failed, "writes to a closed peer never failed");
        assert!(!sink.is_connected());

        let next = CorrectedCoordinate::new(10.0, 20.0, 30.0, 0.0, 0.0);
        sink.dispatch(&next).unwrap();
        assert!(sink.is_connected());

        let (first, second) = server.join().unwrap();
        assert_eq!(first, record().robot_command(None));
        assert_eq!(second, "{X 10.00, Y 20.00, Z 30.00}");
    }

    struct GatedSink {
        gate: std::sync::mpsc::Receiver<()>,
        seen: Arc<Mutex<Vec<CorrectedCoordinate>>>,
    }

    impl CoordinateSink for GatedSink {
        fn dispatch(&mut self, record: &CorrectedCoordinate) -> Result<(), DispatchError> {
            // Blocks until the gate sender is dropped.
            let _ = self.gate.recv();
            self.seen.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    #[test]
    fn background_sink_drops_records_when_queue_is_full() {
        let (release, gate) = std::sync::mpsc::channel::<()>();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut sink = BackgroundSink::spawn(
            GatedSink {
                gate,
                seen: seen.clone(),
            },
            1,
        );

        // One record can sit in the blocked worker and one in the queue.
        let results: Vec<_> = (0..4).map(|_| sink.dispatch(&record())).collect();
        let accepted = results.iter().filter(|r| r.is_ok()).count();
        assert!((1..=2).contains(&accepted), "accepted {accepted}");
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, DispatchError::QueueFull)));
        assert!(results.iter().any(|r| r.is_err()));

        drop(release);
        drop(sink);
        assert_eq!(seen.lock().unwrap().len(), accepted);
    }

    #[test]
    fn background_sink_swallows_inner_failures() {
        let mut sink = BackgroundSink::spawn(FailingSink, 4);
        assert!(sink.dispatch(&record()).is_ok());
    }
}
