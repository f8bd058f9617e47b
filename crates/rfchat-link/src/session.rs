//! Session pump: owns the connected stream
//!
//! One task holds the stream for the whole session. It delivers every read
//! chunk to the observer as text and writes queued outbound bytes in order.
//! End of stream or a read error is reported once as a lost session; an
//! explicit cancel closes the stream without any report.

use std::convert::Infallible;
use std::io;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt, WriteHalf};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::manager::Command;
use crate::observer::LinkObserver;
use crate::transport::BoxedStream;
use crate::types::{AttemptId, PeerHandle};
use crate::worker::{CancelSignal, Worker};

pub(crate) struct Session {
    peer: PeerHandle,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    worker: Worker,
}

impl Session {
    pub(crate) fn spawn(
        id: AttemptId,
        stream: BoxedStream,
        peer: PeerHandle,
        observer: Arc<dyn LinkObserver>,
        commands: mpsc::UnboundedSender<Command>,
        read_buffer_size: usize,
    ) -> Self {
        let (outbound, queued) = mpsc::unbounded_channel();
        let worker = Worker::spawn(id, move |cancel| {
            pump(id, stream, observer, commands, queued, read_buffer_size, cancel)
        });
        Self {
            peer,
            outbound,
            worker,
        }
    }

    pub(crate) fn id(&self) -> AttemptId {
        self.worker.id()
    }

    pub(crate) fn peer(&self) -> &PeerHandle {
        &self.peer
    }

    /// Queue bytes for the peer; false once the pump has exited
    pub(crate) fn write(&self, bytes: Vec<u8>) -> bool {
        self.outbound.send(bytes).is_ok()
    }

    /// Close the stream and wait for the pump to exit
    pub(crate) async fn cancel(self) {
        self.worker.cancel().await
    }
}

async fn pump(
    id: AttemptId,
    stream: BoxedStream,
    observer: Arc<dyn LinkObserver>,
    commands: mpsc::UnboundedSender<Command>,
    mut queued: mpsc::UnboundedReceiver<Vec<u8>>,
    read_buffer_size: usize,
    mut cancel: CancelSignal,
) {
    debug!("BEGIN session {}", id);
    // Reads keep flowing while a write waits on a full peer buffer
    let (mut reader, mut writer) = tokio::io::split(stream);

    let read_loop = async {
        let mut buffer = vec![0u8; read_buffer_size];
        loop {
            match reader.read(&mut buffer).await {
                Ok(0) => return "stream closed by peer".to_string(),
                Ok(n) => observer.on_message(&String::from_utf8_lossy(&buffer[..n])),
                Err(e) => return e.to_string(),
            }
        }
    };

    let write_loop = async {
        while let Some(bytes) = queued.recv().await {
            if let Err(e) = write_chunk(&mut writer, &bytes).await {
                // A failed write is not a lost session; the reader decides that
                warn!("Write of {} bytes on session {} failed: {}", bytes.len(), id, e);
            }
        }
        // The outbound queue only closes with the session handle
        std::future::pending::<Infallible>().await
    };

    let reason = tokio::select! {
        _ = &mut cancel => {
            debug!("Session {} cancelled", id);
            return;
        }
        reason = read_loop => reason,
        never = write_loop => match never {},
    };

    debug!("Session {} lost: {}", id, reason);
    let _ = commands.send(Command::SessionLost { session: id });
}

async fn write_chunk(writer: &mut WriteHalf<BoxedStream>, bytes: &[u8]) -> io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await
}
