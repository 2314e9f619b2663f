use std::{
    collections::BTreeSet,
    future::Future,
    pin::Pin,
    sync::{Condvar, LazyLock, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll, Waker},
    time::{Duration, Instant},
};

use futures::{
    future::{select, Either},
    pin_mut,
};
use parse_display::Display;
use slabmap::SlabMap;


static TIMERS: LazyLock<Timers> = LazyLock::new(|| Timers {
    queue: Mutex::new(TimerQueue {
        deadlines: BTreeSet::new(),
        entries: SlabMap::new(),
        is_worker_running: false,
    }),
    condvar: Condvar::new(),
});

struct Timers {
    queue: Mutex<TimerQueue>,
    condvar: Condvar,
}
impl Timers {
    fn lock(&self) -> MutexGuard<'_, TimerQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_worker(&self) {
        let mut wakers = Vec::new();
        let mut queue = self.lock();
        loop {
            let now = Instant::now();
            while let Some(&(deadline, key)) = queue.deadlines.first() {
                if deadline > now {
                    break;
                }
                queue.deadlines.pop_first();
                if let Some(entry) = queue.entries.get_mut(key) {
                    entry.is_fired = true;
                    wakers.extend(entry.waker.take());
                }
            }
            if !wakers.is_empty() {
                drop(queue);
                for waker in wakers.drain(..) {
                    waker.wake();
                }
                queue = self.lock();
                continue;
            }
            queue = match queue.deadlines.first() {
                Some(&(deadline, _)) => {
                    let timeout = deadline.saturating_duration_since(now);
                    self.condvar
                        .wait_timeout(queue, timeout)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .condvar
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }
}

struct TimerQueue {
    deadlines: BTreeSet<(Instant, usize)>,
    entries: SlabMap<TimerEntry>,
    is_worker_running: bool,
}
impl TimerQueue {
    fn insert(&mut self, deadline: Instant, waker: &Waker) -> usize {
        if !self.is_worker_running {
            self.is_worker_running = true;
            std::thread::spawn(|| TIMERS.run_worker());
        }
        let key = self.entries.insert(TimerEntry {
            deadline,
            waker: Some(waker.clone()),
            is_fired: false,
        });
        let is_first = self
            .deadlines
            .first()
            .map_or(true, |&(first, _)| deadline < first);
        self.deadlines.insert((deadline, key));
        if is_first {
            TIMERS.condvar.notify_one();
        }
        key
    }

    fn remove(&mut self, key: usize) {
        if let Some(entry) = self.entries.remove(key) {
            self.deadlines.remove(&(entry.deadline, key));
        }
    }
}

struct TimerEntry {
    deadline: Instant,
    waker: Option<Waker>,
    is_fired: bool,
}

/// Future completing at a given instant.
///
/// The deadline is registered with the background timer thread on the first poll,
/// so an unpolled `Sleep` costs nothing.
#[must_use = "futures do nothing unless polled"]
pub struct Sleep {
    deadline: Option<Instant>,
    key: Option<usize>,
}

impl Sleep {
    /// `None` if the deadline is too far away to be represented. Such a `Sleep` never completes.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

impl Future for Sleep {
    type Output = ();
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        let Some(deadline) = this.deadline else {
            return Poll::Pending;
        };
        if Instant::now() >= deadline {
            if let Some(key) = this.key.take() {
                TIMERS.lock().remove(key);
            }
            return Poll::Ready(());
        }
        let mut queue = TIMERS.lock();
        let Some(key) = this.key else {
            this.key = Some(queue.insert(deadline, cx.waker()));
            return Poll::Pending;
        };
        let Some(entry) = queue.entries.get_mut(key) else {
            this.key = Some(queue.insert(deadline, cx.waker()));
            return Poll::Pending;
        };
        if entry.is_fired {
            queue.remove(key);
            this.key = None;
            return Poll::Ready(());
        }
        if !entry
            .waker
            .as_ref()
            .is_some_and(|waker| waker.will_wake(cx.waker()))
        {
            entry.waker = Some(cx.waker().clone());
        }
        Poll::Pending
    }
}
impl Drop for Sleep {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            TIMERS.lock().remove(key);
        }
    }
}

/// Completes after `duration`. Never completes if `duration` reaches past the range of [`Instant`].
pub fn sleep(duration: Duration) -> Sleep {
    Sleep {
        deadline: Instant::now().checked_add(duration),
        key: None,
    }
}
pub fn sleep_until(deadline: Instant) -> Sleep {
    Sleep {
        deadline: Some(deadline),
        key: None,
    }
}

/// The condition awaited by [`wait_condition`](crate::Store::wait_condition) did not hold in time.
#[derive(Debug, Display, PartialEq, Eq, Clone, Copy)]
#[display("timeout")]
pub struct TimeoutError {
    duration: Duration,
}
impl TimeoutError {
    fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// The duration that elapsed before giving up.
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl std::error::Error for TimeoutError {}

/// Races `fut` against a timer.
///
/// If `fut` is ready on its first poll, the result is returned without touching the timer.
pub async fn with_timeout_async<T>(
    fut: impl Future<Output = T>,
    duration: Duration,
) -> Result<T, TimeoutError> {
    let timeout = sleep(duration);
    pin_mut!(fut);
    match select(fut, timeout).await {
        Either::Left((value, _)) => Ok(value),
        Either::Right((_, _)) => Err(TimeoutError::new(duration)),
    }
}
