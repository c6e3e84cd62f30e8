//! A client that prints what the engine sends it as JSON lines.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

use nodal_engine::{Client, ClientId, Notification};
use parking_lot::Mutex;
use serde_json::json;

/// Writes one JSON object per response or notification to stdout and
/// counts responses so the caller knows when a script has finished.
pub struct JsonClient {
    id: ClientId,
    ok: AtomicUsize,
    failed: AtomicUsize,
    out: Mutex<Box<dyn Write + Send>>,
}

impl JsonClient {
    /// A client printing to stdout.
    pub fn stdout(id: ClientId) -> Self {
        Self::new(id, Box::new(std::io::stdout()))
    }

    /// A client printing to `out`.
    pub fn new(id: ClientId, out: Box<dyn Write + Send>) -> Self {
        Self {
            id,
            ok: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            out: Mutex::new(out),
        }
    }

    /// Responses received so far.
    pub fn responses(&self) -> usize {
        self.ok.load(Ordering::Acquire) + self.failed.load(Ordering::Acquire)
    }

    /// Error responses received so far.
    pub fn failures(&self) -> usize {
        self.failed.load(Ordering::Acquire)
    }

    fn emit(&self, value: &serde_json::Value) {
        let mut out = self.out.lock();
        if let Err(err) = writeln!(out, "{value}").and_then(|()| out.flush()) {
            tracing::warn!("client {}: failed to write output: {err}", self.id);
        }
    }
}

impl Client for JsonClient {
    fn id(&self) -> ClientId {
        self.id
    }

    fn respond_ok(&self, id: i32) {
        self.emit(&json!({ "response": "ok", "id": id }));
        self.ok.fetch_add(1, Ordering::AcqRel);
    }

    fn respond_error(&self, id: i32, message: &str) {
        self.emit(&json!({ "response": "error", "id": id, "message": message }));
        self.failed.fetch_add(1, Ordering::AcqRel);
    }

    fn notify(&self, notification: &Notification) {
        match serde_json::to_value(notification) {
            Ok(value) => self.emit(&value),
            Err(err) => tracing::warn!("client {}: unserializable notification: {err}", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use nodal_core::Path;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn prints_one_line_per_message() {
        let buffer = Buffer::default();
        let client = JsonClient::new(3, Box::new(buffer.clone()));

        client.respond_ok(1);
        client.respond_error(2, "resolution error: no object at /x");
        client.notify(&Notification::Delete {
            path: Path::new("/main").unwrap(),
        });

        assert_eq!(client.responses(), 2);
        assert_eq!(client.failures(), 1);

        let text = String::from_utf8(buffer.0.lock().clone()).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], json!({ "response": "ok", "id": 1 }));
        assert_eq!(lines[1]["message"], "resolution error: no object at /x");
        assert_eq!(lines[2], json!({ "event": "delete", "path": "/main" }));
    }
}
