//! One queue and one worker task per user in front of the engine.
//!
//! Events for a user are handled strictly in arrival order; different users'
//! workers run concurrently. A worker retires after sitting idle. If the same
//! user sends again while it is still draining, the replacement waits for the
//! retiring worker before touching its own queue.

use protocol::{Event, OutboundAction};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::engine::FlowEngine;
use crate::ports::{CheckInRepository, OutboundPort, Responder};

const QUEUE_DEPTH: usize = 32;
const DEFAULT_WORKER_IDLE: Duration = Duration::from_secs(300);

enum Entry {
    Running { generation: u64, tx: mpsc::Sender<Event>, task: JoinHandle<()> },
    Retiring { generation: u64, task: JoinHandle<()> },
}

type Workers = Arc<Mutex<HashMap<String, Entry>>>;

fn lock(workers: &Workers) -> MutexGuard<'_, HashMap<String, Entry>> {
    workers.lock().unwrap_or_else(|p| p.into_inner())
}

pub struct Dispatcher<R, S, O, P> {
    engine: Arc<FlowEngine<R, S, O>>,
    outbound: Arc<P>,
    workers: Workers,
    generation: AtomicU64,
    worker_idle: Duration,
}

impl<R, S, O, P> Dispatcher<R, S, O, P>
where
    R: CheckInRepository + 'static,
    S: Responder + 'static,
    O: OutboundPort + 'static,
    P: OutboundPort + 'static,
{
    pub fn new(engine: Arc<FlowEngine<R, S, O>>, outbound: P) -> Self {
        Self {
            engine,
            outbound: Arc::new(outbound),
            workers: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
            worker_idle: DEFAULT_WORKER_IDLE,
        }
    }

    pub fn with_worker_idle(mut self, idle: Duration) -> Self {
        self.worker_idle = idle;
        self
    }

    pub fn engine(&self) -> &Arc<FlowEngine<R, S, O>> {
        &self.engine
    }

    /// Users with a worker accepting events right now.
    pub fn active_workers(&self) -> usize {
        lock(&self.workers)
            .values()
            .filter(|e| matches!(e, Entry::Running { .. }))
            .count()
    }

    /// Queue `event` on its user's worker.
    pub async fn dispatch(&self, event: Event) {
        let mut event = event;
        loop {
            let tx = self.sender(&event.user_id);
            match tx.send(event).await {
                Ok(()) => return,
                // The worker retired between lookup and send.
                Err(mpsc::error::SendError(returned)) => event = returned,
            }
        }
    }

    fn sender(&self, user_id: &str) -> mpsc::Sender<Event> {
        let mut workers = lock(&self.workers);
        if let Some(Entry::Running { tx, .. }) = workers.get(user_id) {
            if !tx.is_closed() {
                return tx.clone();
            }
        }
        let previous = match workers.remove(user_id) {
            Some(Entry::Running { task, .. }) | Some(Entry::Retiring { task, .. }) => Some(task),
            None => None,
        };

        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let worker = UserWorker {
            user_id: user_id.to_string(),
            generation,
            engine: self.engine.clone(),
            outbound: self.outbound.clone(),
            workers: self.workers.clone(),
            idle: self.worker_idle,
        };
        let task = tokio::spawn(worker.run(rx, previous));
        debug!(user_id, generation, "spawned user worker");
        workers.insert(user_id.to_string(), Entry::Running { generation, tx: tx.clone(), task });
        tx
    }

    /// Close every queue and wait for the workers to drain.
    pub async fn shutdown(&self) {
        let entries: Vec<Entry> = lock(&self.workers).drain().map(|(_, e)| e).collect();
        for entry in entries {
            let task = match entry {
                Entry::Running { tx, task, .. } => {
                    drop(tx);
                    task
                }
                Entry::Retiring { task, .. } => task,
            };
            if let Err(e) = task.await {
                warn!("user worker failed: {}", e);
            }
        }
    }
}

struct UserWorker<R, S, O, P> {
    user_id: String,
    generation: u64,
    engine: Arc<FlowEngine<R, S, O>>,
    outbound: Arc<P>,
    workers: Workers,
    idle: Duration,
}

impl<R, S, O, P> UserWorker<R, S, O, P>
where
    R: CheckInRepository,
    S: Responder,
    O: OutboundPort + 'static,
    P: OutboundPort,
{
    async fn run(self, mut rx: mpsc::Receiver<Event>, previous: Option<JoinHandle<()>>) {
        if let Some(previous) = previous {
            if let Err(e) = previous.await {
                warn!(user_id = %self.user_id, "previous worker failed: {}", e);
            }
        }

        loop {
            match tokio::time::timeout(self.idle, rx.recv()).await {
                Ok(Some(event)) => self.process(event).await,
                Ok(None) => return,
                Err(_) => break,
            }
        }

        self.retire();
        rx.close();
        while let Some(event) = rx.recv().await {
            self.process(event).await;
        }
        self.forget();
        debug!(user_id = %self.user_id, generation = self.generation, "user worker exited");
    }

    /// Swap our running entry for a retiring one so a replacement waits on us.
    fn retire(&self) {
        let mut map = lock(&self.workers);
        let ours = matches!(map.get(&self.user_id), Some(Entry::Running { generation, .. }) if *generation == self.generation);
        if !ours {
            return;
        }
        if let Some(Entry::Running { task, .. }) = map.remove(&self.user_id) {
            map.insert(self.user_id.clone(), Entry::Retiring { generation: self.generation, task });
        }
    }

    fn forget(&self) {
        let mut map = lock(&self.workers);
        let ours = matches!(map.get(&self.user_id), Some(Entry::Retiring { generation, .. }) if *generation == self.generation);
        if ours {
            map.remove(&self.user_id);
        }
    }

    async fn process(&self, event: Event) {
        let action = match self.engine.handle_event(&event).await {
            Ok(handled) => {
                if let Some(signal) = handled.signal {
                    debug!(user_id = %event.user_id, ?signal, "flow signal");
                }
                handled.action
            }
            Err(e) => {
                warn!(user_id = %event.user_id, "event handling failed: {}", e);
                OutboundAction::rejection(e.user_message())
            }
        };
        if let Err(e) = self.outbound.send(&event.user_id, action).await {
            warn!(user_id = %event.user_id, "failed to deliver action: {}", e);
        }
    }
}
