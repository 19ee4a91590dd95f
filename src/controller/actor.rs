//! MachineActor - one task per state machine
//!
//! The actor owns the write side of its machine's `watch` channel and
//! processes requests sequentially, so the response of the last issued
//! request is always the last one applied. A gateway call that never
//! resolves blocks this machine only.

use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, warn};

use super::commands::Machine;
use super::{ControllerError, Notification};
use crate::gateway::CommandGateway;

type Reply<S> = oneshot::Sender<Result<S, ControllerError>>;

pub(crate) struct Request<M: Machine> {
    command: M::Command,
    response: Reply<M::State>,
}

// Manual Debug: the oneshot sender is not interesting
impl<M: Machine> fmt::Debug for Request<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("command", &self.command)
            .finish()
    }
}

pub(crate) struct MachineActor<M: Machine> {
    machine: M,
    gateway: Arc<dyn CommandGateway>,
    state_tx: watch::Sender<M::State>,
    notifications: broadcast::Sender<Notification>,
}

impl<M: Machine> MachineActor<M> {
    /// Spawn the actor with the machine at its default state
    pub(crate) fn spawn(
        machine: M,
        gateway: Arc<dyn CommandGateway>,
        notifications: broadcast::Sender<Notification>,
    ) -> MachineHandle<M> {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(M::State::default());

        let actor = Self {
            machine,
            gateway,
            state_tx,
            notifications,
        };
        tokio::spawn(actor.run(request_rx));

        MachineHandle {
            request_tx,
            state_rx,
        }
    }

    async fn run(self, mut request_rx: mpsc::UnboundedReceiver<Request<M>>) {
        debug!("{} actor started", M::COMPONENT);
        while let Some(request) = request_rx.recv().await {
            let result = self.apply(request.command).await;
            // Caller may have gone away; the state is applied regardless
            let _ = request.response.send(result);
        }
        debug!("{} actor stopped", M::COMPONENT);
    }

    async fn apply(&self, command: M::Command) -> Result<M::State, ControllerError> {
        self.machine.check(&command)?;

        let label = format!("{:?}", command);
        match self.machine.dispatch(self.gateway.as_ref(), command).await {
            Ok(state) => {
                debug!("{} {} -> {:?}", M::COMPONENT, label, state);
                self.state_tx.send_replace(state.clone());
                Ok(state)
            }
            Err(source) => {
                warn!("{} {} failed, resetting to default: {}", M::COMPONENT, label, source);
                self.state_tx.send_replace(M::State::default());
                let _ = self
                    .notifications
                    .send(Notification::failure(M::COMPONENT, &source));
                Err(ControllerError::Gateway {
                    component: M::COMPONENT,
                    source,
                })
            }
        }
    }
}

/// Sending side of a [`MachineActor`]
pub(crate) struct MachineHandle<M: Machine> {
    request_tx: mpsc::UnboundedSender<Request<M>>,
    state_rx: watch::Receiver<M::State>,
}

impl<M: Machine> Clone for MachineHandle<M> {
    fn clone(&self) -> Self {
        Self {
            request_tx: self.request_tx.clone(),
            state_rx: self.state_rx.clone(),
        }
    }
}

impl<M: Machine> MachineHandle<M> {
    /// Queue a command and wait for its result
    pub(crate) async fn request(&self, command: M::Command) -> Result<M::State, ControllerError> {
        let (response_tx, response_rx) = oneshot::channel();
        let request = Request {
            command,
            response: response_tx,
        };

        if self.request_tx.send(request).is_err() {
            return Err(ControllerError::ActorGone(M::COMPONENT));
        }

        response_rx
            .await
            .unwrap_or(Err(ControllerError::ActorGone(M::COMPONENT)))
    }

    pub(crate) fn current(&self) -> M::State {
        self.state_rx.borrow().clone()
    }

    pub(crate) fn watch(&self) -> watch::Receiver<M::State> {
        self.state_rx.clone()
    }
}
