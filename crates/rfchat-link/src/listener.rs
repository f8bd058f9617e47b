//! Transport listener: passively accepts inbound peers

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error};

use crate::manager::Command;
use crate::transport::Transport;
use crate::types::{AttemptId, LinkState, ServiceId};
use crate::worker::{CancelSignal, Worker};

/// Spawn an accept loop on `service`
///
/// Every accepted stream is offered to the coordinator while the link is
/// `Listening` or `Connecting`, and closed right away otherwise. The loop ends
/// silently when cancelled or when the listening resource fails.
pub(crate) fn spawn_listener(
    id: AttemptId,
    transport: Arc<dyn Transport>,
    service: ServiceId,
    state: watch::Receiver<LinkState>,
    commands: mpsc::UnboundedSender<Command>,
) -> Worker {
    Worker::spawn(id, move |cancel| {
        accept_loop(id, transport, service, state, commands, cancel)
    })
}

async fn accept_loop(
    id: AttemptId,
    transport: Arc<dyn Transport>,
    service: ServiceId,
    state: watch::Receiver<LinkState>,
    commands: mpsc::UnboundedSender<Command>,
    mut cancel: CancelSignal,
) {
    let mut listener = tokio::select! {
        _ = &mut cancel => return,
        opened = transport.listen(&service) => match opened {
            Ok(listener) => listener,
            Err(e) => {
                error!("Listener {} could not open {}: {}", id, service, e);
                let _ = commands.send(Command::ListenerClosed { listener: id });
                return;
            }
        },
    };
    debug!("BEGIN accept loop {} on {}", id, service);

    while !state.borrow().is_connected() {
        tokio::select! {
            _ = &mut cancel => {
                debug!("Listener {} cancelled", id);
                return;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let current = *state.borrow();
                    if current.accepts_handoff() {
                        let offer = Command::Accepted { listener: id, stream, peer };
                        if commands.send(offer).is_err() {
                            return;
                        }
                    } else {
                        debug!("Closing unwanted connection from {} while {}", peer, current);
                        drop(stream);
                    }
                }
                Err(e) => {
                    debug!("Accept loop {} ended: {}", id, e);
                    break;
                }
            },
        }
    }

    debug!("END accept loop {}", id);
    let _ = commands.send(Command::ListenerClosed { listener: id });
}
