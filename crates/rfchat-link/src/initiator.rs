//! Transport initiator: actively opens an outbound connection

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::manager::Command;
use crate::transport::Transport;
use crate::types::{AttemptId, PeerHandle, ServiceId};
use crate::worker::{CancelSignal, Worker};

/// Spawn a single connect attempt to `peer`
pub(crate) fn spawn_initiator(
    id: AttemptId,
    transport: Arc<dyn Transport>,
    service: ServiceId,
    peer: PeerHandle,
    commands: mpsc::UnboundedSender<Command>,
) -> Worker {
    Worker::spawn(id, move |cancel| {
        connect_once(id, transport, service, peer, commands, cancel)
    })
}

async fn connect_once(
    id: AttemptId,
    transport: Arc<dyn Transport>,
    service: ServiceId,
    peer: PeerHandle,
    commands: mpsc::UnboundedSender<Command>,
    mut cancel: CancelSignal,
) {
    info!("BEGIN connect {} to {}", id, peer);

    let attempt = async {
        // Inquiry scans slow down connection setup
        transport.pause_discovery().await;
        transport.connect(&peer, &service).await
    };

    let result = tokio::select! {
        _ = &mut cancel => {
            debug!("Connect {} to {} cancelled", id, peer);
            return;
        }
        result = attempt => result,
    };

    match result {
        Ok(stream) => {
            let _ = commands.send(Command::Initiated {
                initiator: id,
                stream,
                peer,
            });
        }
        Err(e) => {
            warn!("Connect {} to {} failed: {}", id, peer, e);
            transport.resume_discovery().await;
            let _ = commands.send(Command::InitiationFailed { initiator: id });
        }
    }
}
