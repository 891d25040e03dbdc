//! Console adapters: stdout delivery and the stdin request loop.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout},
    sync::Mutex,
};
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use gim_core::{
    domain::UserId,
    message::{actions, Message, Request},
    ports::DeliveryChannel,
    router::Router,
    store::MemoryStore,
    Error,
};

/// Writes every delivery to stdout as one JSON line: `{"to": uid, "message": {...}}`.
pub struct ConsoleDelivery {
    out: Mutex<Stdout>,
}

impl ConsoleDelivery {
    pub fn new() -> Self {
        Self {
            out: Mutex::new(tokio::io::stdout()),
        }
    }
}

impl Default for ConsoleDelivery {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliveryChannel for ConsoleDelivery {
    async fn deliver(&self, uid: UserId, message: &Message) {
        let line = json!({ "to": uid, "message": message }).to_string();
        let mut out = self.out.lock().await;
        let written = async {
            out.write_all(line.as_bytes()).await?;
            out.write_all(b"\n").await?;
            out.flush().await
        }
        .await;
        if let Err(e) = written {
            warn!(%uid, error = %e, "console delivery failed");
        }
    }
}

/// Read newline-delimited JSON requests from stdin until EOF.
pub async fn serve_stdin(
    router: Arc<Router>,
    store: Arc<MemoryStore>,
    delivery: Arc<dyn DeliveryChannel>,
) -> anyhow::Result<()> {
    serve_lines(BufReader::new(tokio::io::stdin()), router, store, delivery).await
}

/// Dispatch each request line on its own task. Returns once the input is
/// exhausted and every dispatched request has finished.
pub async fn serve_lines<R>(
    input: R,
    router: Arc<Router>,
    store: Arc<MemoryStore>,
    delivery: Arc<dyn DeliveryChannel>,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let tracker = TaskTracker::new();

    let read = loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let req: Request = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "skipping malformed request line");
                continue;
            }
        };

        // A user that talks to the console exists.
        store.register_user(req.uid).await;

        let router = router.clone();
        let delivery = delivery.clone();
        tracker.spawn(async move {
            handle(&router, delivery.as_ref(), req).await;
        });
    };

    tracker.close();
    debug!(in_flight = tracker.len(), "input closed, waiting for requests");
    tracker.wait().await;
    Ok(read?)
}

async fn handle(router: &Router, delivery: &dyn DeliveryChannel, req: Request) {
    let outcome = router.dispatch_request(&req).await;
    let reply = match outcome {
        Ok(()) => return,
        Err(Error::NoRouteMatches) => Message::new(
            req.seq,
            actions::NOT_FOUND,
            format!("unknown action {:?}", req.action),
        ),
        Err(e) => Message::new(req.seq, actions::FAILED, e.to_string()),
    };
    delivery.deliver(req.uid, &reply).await;
}
