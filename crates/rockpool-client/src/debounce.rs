//! Per-key debouncing with cancel/reschedule semantics.
//!
//! Each key owns an independent slot, so one busy identity cannot starve
//! another. A slot keeps only the most recent value; when its timer
//! expires the value is delivered on the flush channel. In guarantee mode
//! the timer armed by the first value is never rescheduled, so a slot
//! flushes no later than one window after its first event even under
//! continuous arrival.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// A per-key trailing debouncer.
#[derive(Debug)]
pub struct Debouncer<K, V> {
    window: Duration,
    guarantee: bool,
    inner: Arc<Inner<K, V>>,
}

#[derive(Debug)]
struct Inner<K, V> {
    slots: Mutex<HashMap<K, Slot<V>>>,
    sink: mpsc::UnboundedSender<(K, V)>,
}

#[derive(Debug)]
struct Slot<V> {
    latest: V,
    generation: u64,
    timer: JoinHandle<()>,
}

impl<K, V> Debouncer<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Send + 'static,
{
    /// Create a debouncer and the channel its flushes arrive on.
    pub fn new(window: Duration, guarantee: bool) -> (Self, mpsc::UnboundedReceiver<(K, V)>) {
        let (sink, flushed) = mpsc::unbounded_channel();
        (
            Self {
                window,
                guarantee,
                inner: Arc::new(Inner {
                    slots: Mutex::new(HashMap::new()),
                    sink,
                }),
            },
            flushed,
        )
    }

    /// Record a value for `key`, replacing any value already waiting.
    ///
    /// Without guarantee the slot's timer is cancelled and rescheduled, so
    /// the flush happens one window after the *last* value. With guarantee
    /// the first timer keeps running.
    pub fn push(&self, key: K, value: V) {
        let mut slots = self.inner.slots.lock();
        match slots.get_mut(&key) {
            Some(slot) => {
                slot.latest = value;
                if !self.guarantee {
                    slot.timer.abort();
                    slot.generation += 1;
                    slot.timer = self.schedule(key, slot.generation);
                }
            }
            None => {
                let timer = self.schedule(key.clone(), 0);
                slots.insert(
                    key,
                    Slot {
                        latest: value,
                        generation: 0,
                        timer,
                    },
                );
            }
        }
    }

    /// Cancel the slot for `key`, dropping its waiting value.
    pub fn cancel(&self, key: &K) {
        if let Some(slot) = self.inner.slots.lock().remove(key) {
            slot.timer.abort();
        }
    }

    /// Flush every waiting slot immediately.
    pub fn flush_all(&self) {
        let drained: Vec<(K, Slot<V>)> = self.inner.slots.lock().drain().collect();
        for (key, slot) in drained {
            slot.timer.abort();
            let _ = self.inner.sink.send((key, slot.latest));
        }
    }

    /// Number of keys currently waiting to flush.
    pub fn pending_len(&self) -> usize {
        self.inner.slots.lock().len()
    }

    fn schedule(&self, key: K, generation: u64) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let window = self.window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let flushed = {
                let mut slots = inner.slots.lock();
                match slots.get(&key) {
                    Some(slot) if slot.generation == generation => slots.remove(&key),
                    _ => None,
                }
            };
            if let Some(slot) = flushed {
                trace!("debounce slot flushed");
                let _ = inner.sink.send((key, slot.latest));
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{advance, sleep};

    const WINDOW: Duration = Duration::from_millis(20);

    #[tokio::test(start_paused = true)]
    async fn coalesces_a_burst_to_the_last_value() {
        let (debouncer, mut flushed) = Debouncer::new(WINDOW, false);
        for n in 1..=5 {
            debouncer.push("k", n);
            advance(Duration::from_millis(1)).await;
        }

        let (key, value) = flushed.recv().await.unwrap();
        assert_eq!(key, "k");
        assert_eq!(value, 5);
        assert!(flushed.try_recv().is_err());
        assert_eq!(debouncer.pending_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_debounce_independently() {
        let (debouncer, mut flushed) = Debouncer::new(WINDOW, false);
        debouncer.push("a", 1);
        debouncer.push("b", 2);

        let mut seen = vec![flushed.recv().await.unwrap(), flushed.recv().await.unwrap()];
        seen.sort();
        assert_eq!(seen, vec![("a", 1), ("b", 2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn reschedule_delays_the_flush() {
        let (debouncer, mut flushed) = Debouncer::new(WINDOW, false);
        debouncer.push("k", 1);

        // keep pushing before the window elapses; the flush keeps moving
        for n in 2..=4 {
            advance(WINDOW / 2).await;
            debouncer.push("k", n);
            assert!(flushed.try_recv().is_err());
        }

        advance(WINDOW).await;
        // let the timer task run
        sleep(Duration::from_millis(1)).await;
        assert_eq!(flushed.try_recv().unwrap(), ("k", 4));
    }

    #[tokio::test(start_paused = true)]
    async fn guarantee_flushes_under_continuous_arrival() {
        let (debouncer, mut flushed) = Debouncer::new(WINDOW, true);
        debouncer.push("k", 0);

        // events keep arriving faster than the window forever; without the
        // guarantee this would starve
        for n in 1..=3 {
            advance(WINDOW / 4).await;
            debouncer.push("k", n);
        }
        advance(WINDOW).await;
        sleep(Duration::from_millis(1)).await;

        let (_, value) = flushed.try_recv().unwrap();
        // the flush carries the most recent value at expiry
        assert_eq!(value, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_the_waiting_value() {
        let (debouncer, mut flushed) = Debouncer::new(WINDOW, false);
        debouncer.push("k", 1);
        debouncer.cancel(&"k");

        advance(WINDOW * 2).await;
        sleep(Duration::from_millis(1)).await;
        assert!(flushed.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn flush_all_delivers_without_waiting() {
        let (debouncer, mut flushed) = Debouncer::new(WINDOW, false);
        debouncer.push("a", 1);
        debouncer.push("b", 2);
        debouncer.flush_all();

        let mut seen = vec![flushed.recv().await.unwrap(), flushed.recv().await.unwrap()];
        seen.sort();
        assert_eq!(seen, vec![("a", 1), ("b", 2)]);
    }
}
