//! Background connection task.

use std::collections::BTreeMap;
use std::sync::Arc;

use chimonca_wire::{StompCommand, StompFrame};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, instrument, trace, warn};

use super::{ChannelConfig, ChannelError, ChannelEvent, ConnectionState, Connector, Transport};

/// Requests from the client handle to the task.
#[derive(Debug)]
pub(super) enum Command {
    Subscribe {
        id: String,
        destination: String,
        events: mpsc::UnboundedSender<ChannelEvent>,
        ready: oneshot::Sender<()>,
    },
    Unsubscribe {
        id: String,
    },
    Send {
        destination: String,
        body: String,
    },
    Disconnect,
}

struct Route {
    destination: String,
    events: mpsc::UnboundedSender<ChannelEvent>,
}

type Routes = BTreeMap<String, Route>;

enum Exit {
    Shutdown,
    Broken(String),
}

enum Step {
    Incoming(Option<Result<String, ChannelError>>),
    Command(Option<Command>),
}

fn notify_all(routes: &Routes, event: &ChannelEvent) {
    for route in routes.values() {
        let _ = route.events.send(event.clone());
    }
}

#[instrument(skip_all, fields(host = %config.host))]
pub(super) async fn run(
    connector: Arc<dyn Connector>,
    config: ChannelConfig,
    mut commands: mpsc::UnboundedReceiver<Command>,
    state: Arc<watch::Sender<ConnectionState>>,
) {
    let mut routes = Routes::new();
    let mut broken = false;

    loop {
        state.send_replace(ConnectionState::Connecting);
        match open(connector.as_ref(), &config).await {
            Ok(mut transport) => match resubscribe(transport.as_mut(), &routes).await {
                Ok(()) => {
                    state.send_replace(ConnectionState::Connected);
                    info!(subscriptions = routes.len(), "Channel connected");
                    if broken {
                        notify_all(&routes, &ChannelEvent::Restored);
                        broken = false;
                    }
                    match pump(transport.as_mut(), &mut commands, &mut routes).await {
                        Exit::Shutdown => {
                            let _ = transport.send(StompFrame::disconnect().encode()).await;
                            transport.close().await;
                            break;
                        }
                        Exit::Broken(reason) => {
                            warn!(reason = %reason, "Channel broken");
                            transport.close().await;
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Resubscribe failed");
                    transport.close().await;
                }
            },
            Err(e) => warn!(error = %e, "Channel connect failed"),
        }

        state.send_replace(ConnectionState::Disconnected);
        if !broken {
            notify_all(&routes, &ChannelEvent::Broken);
            broken = true;
        }
        debug!(delay_ms = config.reconnect_delay.as_millis() as u64, "Scheduling reconnect");
        if !backoff(&config, &mut commands, &mut routes).await {
            break;
        }
    }

    state.send_replace(ConnectionState::Closed);
    info!("Channel task stopped");
}

/// Opens a transport and completes the STOMP handshake.
async fn open(
    connector: &dyn Connector,
    config: &ChannelConfig,
) -> Result<Box<dyn Transport>, ChannelError> {
    let mut transport = connector.connect().await?;
    let connect = StompFrame::connect(
        &config.host,
        config
            .connect_headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.clone())),
    );
    transport.send(connect.encode()).await?;

    match tokio::time::timeout(config.handshake_timeout, await_connected(transport.as_mut())).await
    {
        Ok(Ok(())) => Ok(transport),
        Ok(Err(e)) => {
            transport.close().await;
            Err(e)
        }
        Err(_) => {
            transport.close().await;
            Err(ChannelError::Protocol("no CONNECTED frame in time".into()))
        }
    }
}

async fn await_connected(transport: &mut dyn Transport) -> Result<(), ChannelError> {
    loop {
        let text = match transport.recv().await {
            Some(Ok(text)) => text,
            Some(Err(e)) => return Err(e),
            None => return Err(ChannelError::Transport("closed during handshake".into())),
        };
        let frame = match StompFrame::decode(&text) {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(e) => return Err(ChannelError::Protocol(e.to_string())),
        };
        return match frame.command {
            StompCommand::Connected => {
                debug!(version = ?frame.header("version"), "STOMP handshake complete");
                Ok(())
            }
            StompCommand::Error => Err(ChannelError::Broker(error_message(&frame))),
            other => Err(ChannelError::Protocol(format!(
                "expected CONNECTED, got {}",
                other.as_ref()
            ))),
        };
    }
}

fn error_message(frame: &StompFrame) -> String {
    frame
        .header("message")
        .map(str::to_owned)
        .unwrap_or_else(|| frame.body.clone())
}

async fn resubscribe(transport: &mut dyn Transport, routes: &Routes) -> Result<(), ChannelError> {
    for (id, route) in routes {
        transport
            .send(StompFrame::subscribe(id, &route.destination).encode())
            .await?;
    }
    Ok(())
}

/// Runs the connected phase until shutdown or link loss.
async fn pump(
    transport: &mut dyn Transport,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    routes: &mut Routes,
) -> Exit {
    loop {
        let step = tokio::select! {
            incoming = transport.recv() => Step::Incoming(incoming),
            command = commands.recv() => Step::Command(command),
        };

        match step {
            Step::Incoming(None) => return Exit::Broken("closed by peer".into()),
            Step::Incoming(Some(Err(e))) => return Exit::Broken(e.to_string()),
            Step::Incoming(Some(Ok(text))) => {
                if let Some(reason) = handle_incoming(&text, routes) {
                    return Exit::Broken(reason);
                }
            }
            Step::Command(None) | Step::Command(Some(Command::Disconnect)) => {
                return Exit::Shutdown;
            }
            Step::Command(Some(Command::Subscribe {
                id,
                destination,
                events,
                ready,
            })) => {
                let frame = StompFrame::subscribe(&id, &destination);
                routes.insert(id, Route { destination, events });
                let sent = transport.send(frame.encode()).await;
                let _ = ready.send(());
                if let Err(e) = sent {
                    return Exit::Broken(e.to_string());
                }
            }
            Step::Command(Some(Command::Unsubscribe { id })) => {
                if routes.remove(&id).is_none() {
                    continue;
                }
                if let Err(e) = transport.send(StompFrame::unsubscribe(&id).encode()).await {
                    return Exit::Broken(e.to_string());
                }
            }
            Step::Command(Some(Command::Send { destination, body })) => {
                if let Err(e) = transport.send(StompFrame::send(&destination, body).encode()).await {
                    return Exit::Broken(e.to_string());
                }
            }
        }
    }
}

/// Routes one inbound frame. Returns a reason when the link must be dropped.
fn handle_incoming(text: &str, routes: &Routes) -> Option<String> {
    let frame = match StompFrame::decode(text) {
        Ok(Some(frame)) => frame,
        Ok(None) => {
            trace!("Heart-beat");
            return None;
        }
        Err(e) => {
            warn!(error = %e, "Dropping undecodable frame");
            return None;
        }
    };

    match frame.command {
        StompCommand::Message => {
            let destination = frame.header("destination").unwrap_or_default().to_owned();
            let route = frame
                .header("subscription")
                .and_then(|id| routes.get(id))
                .or_else(|| routes.values().find(|r| r.destination == destination));
            match route {
                Some(route) => {
                    let _ = route.events.send(ChannelEvent::Message {
                        destination,
                        body: frame.body,
                    });
                }
                None => debug!(destination = %destination, "Message for unknown subscription"),
            }
            None
        }
        StompCommand::Error => Some(format!("broker error: {}", error_message(&frame))),
        other => {
            debug!(command = other.as_ref(), "Ignoring frame");
            None
        }
    }
}

/// Waits out the reconnect delay while keeping the subscription table current.
/// Returns `false` when the client asked to shut down.
async fn backoff(
    config: &ChannelConfig,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    routes: &mut Routes,
) -> bool {
    let sleep = tokio::time::sleep(config.reconnect_delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            () = &mut sleep => return true,
            command = commands.recv() => match command {
                None | Some(Command::Disconnect) => return false,
                Some(Command::Subscribe { id, destination, events, ready }) => {
                    let _ = events.send(ChannelEvent::Broken);
                    routes.insert(id, Route { destination, events });
                    let _ = ready.send(());
                }
                Some(Command::Unsubscribe { id }) => {
                    routes.remove(&id);
                }
                Some(Command::Send { destination, .. }) => {
                    warn!(destination = %destination, "Dropping send while disconnected");
                }
            },
        }
    }
}
