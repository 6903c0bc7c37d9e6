//! ## TTL queue
//!
//! A FIFO queue whose items expire a fixed time after they were first inserted, whether they are
//! sitting in the queue or have been taken out and are held by someone else.
//!
//! ## Overview
//! - Every queue is owned by one manager task. All inserts, receives and purges go through it as
//!   [Command]s, so a purge can never race an insert.
//! - The first insert of an item gives it an identity and starts a timer for that identity.
//!   When the timer fires the manager drops every copy of the identity still in the queue and
//!   remembers it as dead. Inserting a dead item again does nothing.
//! - [TtlQueue] handles are cheap to clone. The manager stops when the last handle is dropped.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

/// A value together with its time to live.
///
/// The identity is set by the queue on first insertion. Items taken out of the queue keep it, so
/// putting them back does not restart their clock.
#[derive(Debug, Clone)]
pub struct TtlItem<T> {
    pub value: T,
    pub ttl: Duration,
    id: Option<u64>,
}

impl<T> TtlItem<T> {
    pub fn new(value: T, ttl: Duration) -> Self {
        TtlItem { value, ttl, id: None }
    }

    /// Identity given by the queue, `None` before the first insert.
    pub fn id(&self) -> Option<u64> {
        self.id
    }
}

enum Command<T> {
    Insert(TtlItem<T>),
    /// Puts an item handed to a receiver that went away back at the front.
    Requeue(TtlItem<T>),
    Recv(oneshot::Sender<TtlItem<T>>),
    Drain(oneshot::Sender<Vec<TtlItem<T>>>),
    Len(oneshot::Sender<usize>),
}

/// Handle to a TTL queue.
#[derive(Debug)]
pub struct TtlQueue<T> {
    cmd_tx: mpsc::UnboundedSender<Command<T>>,
}

impl<T> Clone for TtlQueue<T> {
    fn clone(&self) -> Self {
        TtlQueue { cmd_tx: self.cmd_tx.clone() }
    }
}

impl<T: Send + 'static> TtlQueue<T> {
    /// Creates a queue and spawns its manager task.
    ///
    /// # Notes
    /// Must be called from inside a tokio runtime.
    pub fn new() -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(manage(cmd_rx));
        TtlQueue { cmd_tx }
    }

    /// Inserts an item at the back of the queue.
    ///
    /// A new item gets an identity and starts expiring now. An item that was already inserted once
    /// keeps its identity, and is silently dropped if that identity has expired.
    pub fn insert(&self, item: TtlItem<T>) {
        let _ = self.cmd_tx.send(Command::Insert(item));
    }

    /// Takes the oldest live item, waiting until one is available.
    ///
    /// Returns `None` only if the manager task is gone.
    ///
    /// # Notes
    /// Cancel safe: an item handed over after the future was dropped goes back to the front.
    pub async fn recv(&self) -> Option<TtlItem<T>> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx.send(Command::Recv(tx)).ok()?;
        let mut pending = PendingRecv { rx, requeue: self.cmd_tx.clone(), done: false };
        pending.wait().await
    }

    /// Removes and returns every live item in the queue, oldest first, one per identity.
    pub async fn drain(&self) -> Vec<TtlItem<T>> {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Drain(tx)).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Number of items waiting in the queue.
    pub async fn len(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Len(tx)).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

impl<T: Send + 'static> Default for TtlQueue<T> {
    fn default() -> Self {
        TtlQueue::new()
    }
}

struct PendingRecv<T> {
    rx: oneshot::Receiver<TtlItem<T>>,
    requeue: mpsc::UnboundedSender<Command<T>>,
    done: bool,
}

impl<T> PendingRecv<T> {
    async fn wait(&mut self) -> Option<TtlItem<T>> {
        let res = (&mut self.rx).await;
        self.done = true;
        res.ok()
    }
}

impl<T> Drop for PendingRecv<T> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        self.rx.close();
        if let Ok(item) = self.rx.try_recv() {
            let _ = self.requeue.send(Command::Requeue(item));
        }
    }
}

struct Manager<T> {
    next_id: u64,
    alive: HashSet<u64>,
    queue: VecDeque<TtlItem<T>>,
    waiters: VecDeque<oneshot::Sender<TtlItem<T>>>,
    expired_tx: mpsc::UnboundedSender<u64>,
}

async fn manage<T: Send + 'static>(mut cmd_rx: mpsc::UnboundedReceiver<Command<T>>) {
    let (expired_tx, mut expired_rx) = mpsc::unbounded_channel();
    let mut m = Manager {
        next_id: 0,
        alive: HashSet::new(),
        queue: VecDeque::new(),
        waiters: VecDeque::new(),
        expired_tx,
    };

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(cmd) => m.handle(cmd),
                    None => break,
                }
            }
            Some(id) = expired_rx.recv() => m.purge(id),
        }
    }
}

impl<T: Send + 'static> Manager<T> {
    fn handle(&mut self, cmd: Command<T>) {
        match cmd {
            Command::Insert(mut item) => {
                let id = match item.id {
                    Some(id) => id,
                    None => {
                        self.next_id += 1;
                        let id = self.next_id;
                        item.id = Some(id);
                        self.alive.insert(id);
                        self.doom(id, item.ttl);
                        id
                    }
                };
                if self.alive.contains(&id) {
                    self.offer(item, false);
                }
            }
            Command::Requeue(item) => {
                if item.id.is_some_and(|id| self.alive.contains(&id)) {
                    self.offer(item, true);
                }
            }
            Command::Recv(waiter) => match self.queue.pop_front() {
                Some(item) => {
                    if let Err(item) = waiter.send(item) {
                        self.queue.push_front(item);
                    }
                }
                None => {
                    // receivers that were cancelled before anything arrived
                    self.waiters.retain(|w| !w.is_closed());
                    self.waiters.push_back(waiter);
                }
            },
            Command::Drain(reply) => {
                let mut seen = HashSet::new();
                let items: Vec<_> = self
                    .queue
                    .drain(..)
                    .filter(|item| item.id.map_or(true, |id| seen.insert(id)))
                    .collect();
                if let Err(items) = reply.send(items) {
                    self.queue.extend(items);
                }
            }
            Command::Len(reply) => {
                let _ = reply.send(self.queue.len());
            }
        }
    }

    /// Hands the item to the first waiting receiver, or queues it.
    fn offer(&mut self, mut item: TtlItem<T>, front: bool) {
        while let Some(waiter) = self.waiters.pop_front() {
            match waiter.send(item) {
                Ok(()) => return,
                Err(back) => item = back,
            }
        }
        if front {
            self.queue.push_front(item);
        } else {
            self.queue.push_back(item);
        }
    }

    fn purge(&mut self, id: u64) {
        self.alive.remove(&id);
        self.queue.retain(|item| item.id != Some(id));
    }

    fn doom(&self, id: u64, ttl: Duration) {
        let expired_tx = self.expired_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let _ = expired_tx.send(id);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, timeout};

    const MS: Duration = Duration::from_millis(1);

    #[tokio::test]
    async fn items_come_out_in_insertion_order() {
        let q = TtlQueue::new();
        for v in 1..=3 {
            q.insert(TtlItem::new(v, Duration::from_secs(5)));
        }
        for v in 1..=3 {
            assert_eq!(q.recv().await.unwrap().value, v);
        }
    }

    #[tokio::test]
    async fn expired_items_are_purged_from_queue() {
        let q = TtlQueue::new();
        q.insert(TtlItem::new(1, 40 * MS));
        q.insert(TtlItem::new(2, 20 * MS));
        q.insert(TtlItem::new(3, 50 * MS));

        sleep(30 * MS).await;
        assert_eq!(q.recv().await.unwrap().value, 1);
        assert_eq!(q.recv().await.unwrap().value, 3);
    }

    #[tokio::test]
    async fn item_decays_while_held_outside() {
        let q = TtlQueue::new();
        q.insert(TtlItem::new(42, 20 * MS));

        sleep(5 * MS).await;
        let item = q.recv().await.unwrap();
        assert!(item.id().is_some());

        sleep(30 * MS).await;
        q.insert(item);

        assert!(timeout(20 * MS, q.recv()).await.is_err());
        assert_eq!(q.len().await, 0);
    }

    #[tokio::test]
    async fn reinserted_live_item_keeps_its_clock() {
        let q = TtlQueue::new();
        q.insert(TtlItem::new("x", 40 * MS));

        let item = q.recv().await.unwrap();
        sleep(20 * MS).await;
        q.insert(item);
        assert_eq!(q.len().await, 1);

        sleep(30 * MS).await;
        assert_eq!(q.len().await, 0);
    }

    #[tokio::test]
    async fn recv_waits_for_insert() {
        let q = TtlQueue::new();
        let q2 = q.clone();
        let waiter = tokio::spawn(async move { q2.recv().await.map(|i| i.value) });

        sleep(5 * MS).await;
        q.insert(TtlItem::new(7, Duration::from_secs(1)));
        assert_eq!(timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap(), Some(7));
    }

    #[tokio::test]
    async fn cancelled_recv_does_not_lose_items() {
        let q = TtlQueue::new();
        assert!(timeout(5 * MS, q.recv()).await.is_err());

        q.insert(TtlItem::new(1, Duration::from_secs(1)));
        q.insert(TtlItem::new(2, Duration::from_secs(1)));
        assert_eq!(q.recv().await.unwrap().value, 1);
        assert_eq!(q.recv().await.unwrap().value, 2);
    }

    #[tokio::test]
    async fn cancelled_waiters_do_not_pile_up() {
        let (expired_tx, _expired_rx) = mpsc::unbounded_channel();
        let mut m: Manager<u32> = Manager {
            next_id: 0,
            alive: HashSet::new(),
            queue: VecDeque::new(),
            waiters: VecDeque::new(),
            expired_tx,
        };
        for _ in 0..1000 {
            let (tx, rx) = oneshot::channel();
            m.handle(Command::Recv(tx));
            drop(rx);
        }
        assert_eq!(m.waiters.len(), 1);

        let (tx, mut rx) = oneshot::channel();
        m.handle(Command::Recv(tx));
        m.handle(Command::Insert(TtlItem::new(9, Duration::from_secs(1))));
        assert_eq!(rx.try_recv().unwrap().value, 9);
        assert!(m.queue.is_empty());
    }

    #[tokio::test]
    async fn drain_is_duplicate_free() {
        let q = TtlQueue::new();
        q.insert(TtlItem::new('a', Duration::from_secs(1)));
        q.insert(TtlItem::new('b', Duration::from_secs(1)));
        let a = q.recv().await.unwrap();
        q.insert(a.clone());
        q.insert(a);

        let drained: Vec<char> = q.drain().await.into_iter().map(|i| i.value).collect();
        assert_eq!(drained, vec!['b', 'a']);
        assert_eq!(q.len().await, 0);
    }
}
