use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::address::Address;
use crate::collaborator::Clock;
use crate::engine::{MembershipEngine, NodeState};

/// What the outside world can observe of a running node.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NodeView {
    pub state: NodeState,
    pub heartbeat: i64,
    pub members: Vec<Address>,
}

impl NodeView {
    fn of(engine: &MembershipEngine) -> Self {
        Self {
            state: engine.state(),
            heartbeat: engine.heartbeat(),
            members: engine.members(),
        }
    }
}

#[derive(Debug)]
pub struct NodeHandle {
    address: Address,
    view: watch::Receiver<NodeView>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<MembershipEngine>,
}

impl NodeHandle {
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn view(&self) -> NodeView {
        self.view.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<NodeView> {
        self.view.clone()
    }

    /// Stops invoking the engine and hands it back. A stopped node looks
    /// crashed to its peers.
    pub async fn stop(mut self) -> anyhow::Result<MembershipEngine> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let engine = self.task.await?;
        Ok(engine)
    }
}

/// Runs `engine` on its own task. Inbound frames and round ticks are
/// serialized through one loop so the engine is never entered concurrently.
///
/// A node that is still joining resends its join request every `t_fail`
/// rounds.
pub fn spawn_node(
    mut engine: MembershipEngine,
    mut inbox: UnboundedReceiver<Bytes>,
    clock: Arc<dyn Clock>,
    rendezvous: Address,
) -> NodeHandle {
    let address = engine.address();
    let (stop_tx, mut stop_rx) = oneshot::channel();
    engine.initialize();
    if let Err(error) = engine.join(rendezvous, clock.now()) {
        warn!("{} join failed: {:#}", address, error);
    }
    let (view_tx, view_rx) = watch::channel(NodeView::of(&engine));
    let retry_every = engine.config().t_fail.max(1) as u64;
    let tick_interval = engine.config().tick_interval();
    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut waiting_rounds = 0u64;
        loop {
            tokio::select! {
                biased;
                _ = &mut stop_rx => {
                    debug!("{} stopped", address);
                    break;
                }
                Some(bytes) = inbox.recv() => {
                    engine.on_message(&bytes, clock.now());
                }
                _ = interval.tick() => {
                    let now = clock.now();
                    if engine.is_in_group() {
                        engine.on_tick(now);
                    } else {
                        waiting_rounds += 1;
                        if waiting_rounds % retry_every == 0 {
                            debug!("{} still joining after {} rounds, retry", address, waiting_rounds);
                            if let Err(error) = engine.join(rendezvous, now) {
                                warn!("{} join retry failed: {:#}", address, error);
                            }
                        }
                    }
                    view_tx.send_replace(NodeView::of(&engine));
                }
            }
        }
        engine
    });
    NodeHandle {
        address,
        view: view_rx,
        stop: Some(stop_tx),
        task,
    }
}
