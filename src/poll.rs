use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollPhase {
    Idle,
    Collecting,
    Rendering,
    Persisting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    Hardware,
    Processes,
    Software,
    Servers,
}

impl ViewKind {
    pub const ALL: [ViewKind; 4] = [
        ViewKind::Hardware,
        ViewKind::Processes,
        ViewKind::Software,
        ViewKind::Servers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hardware => "hardware",
            Self::Processes => "processes",
            Self::Software => "software",
            Self::Servers => "servers",
        }
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown view '{s}'"))
    }
}

/// Lets a running cycle report which phase it is in.
pub struct PhaseReporter {
    tx: watch::Sender<PollPhase>,
}

impl PhaseReporter {
    pub fn set(&self, phase: PollPhase) {
        self.tx.send_replace(phase);
    }

    #[cfg(test)]
    pub(crate) fn for_test(tx: watch::Sender<PollPhase>) -> Self {
        Self { tx }
    }
}

/// One collect/render/persist pass of a view. A pass always runs to completion.
pub trait ViewCycle: Send + 'static {
    fn run<'a>(
        &'a mut self,
        phase: &'a PhaseReporter,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

/// Handle for requesting an immediate pass of a view.
#[derive(Debug, Clone)]
pub struct RefreshTrigger {
    tx: mpsc::Sender<()>,
    phase: watch::Receiver<PollPhase>,
}

impl RefreshTrigger {
    /// Queues a pass unless one is already running or queued. Returns whether it was accepted.
    pub fn request(&self) -> bool {
        if *self.phase.borrow() != PollPhase::Idle {
            return false;
        }
        self.tx.try_send(()).is_ok()
    }

    #[cfg(test)]
    pub fn phase(&self) -> PollPhase {
        *self.phase.borrow()
    }
}

pub struct PollHandle {
    pub kind: ViewKind,
    pub trigger: RefreshTrigger,
    pub task: JoinHandle<()>,
}

/// Spawns the poll loop of one view.
///
/// The first pass starts immediately, then one per `period`. Ticks that fire while a pass is
/// running are skipped, and a refresh restarts the period. `shutdown` is honoured between passes.
pub fn spawn_view<C: ViewCycle>(
    kind: ViewKind,
    period: Duration,
    mut cycle: C,
    mut shutdown: watch::Receiver<bool>,
) -> PollHandle {
    let (refresh_tx, mut refresh_rx) = mpsc::channel::<()>(1);
    let (phase_tx, phase_rx) = watch::channel(PollPhase::Idle);
    let reporter = PhaseReporter { tx: phase_tx };

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(view = %kind, period = %humantime::format_duration(period), "запуск цикла опроса");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
                Some(()) = refresh_rx.recv() => {
                    debug!(view = %kind, "внеочередное обновление");
                    ticker.reset();
                }
            }

            reporter.set(PollPhase::Collecting);
            cycle.run(&reporter).await;
            // a refresh accepted right before the pass started is already served by it
            while refresh_rx.try_recv().is_ok() {}
            reporter.set(PollPhase::Idle);
        }

        info!(view = %kind, "цикл опроса остановлен");
    });

    PollHandle {
        kind,
        trigger: RefreshTrigger {
            tx: refresh_tx,
            phase: phase_rx,
        },
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Notify;

    #[derive(Clone, Default)]
    struct Counters {
        runs: Arc<AtomicUsize>,
        active: Arc<AtomicUsize>,
        max_active: Arc<AtomicUsize>,
    }

    struct CountingCycle {
        counters: Counters,
        hold: Option<Arc<Notify>>,
    }

    impl ViewCycle for CountingCycle {
        fn run<'a>(
            &'a mut self,
            phase: &'a PhaseReporter,
        ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
            Box::pin(async move {
                let active = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
                self.counters.max_active.fetch_max(active, Ordering::SeqCst);
                if let Some(hold) = &self.hold {
                    hold.notified().await;
                }
                phase.set(PollPhase::Rendering);
                self.counters.runs.fetch_add(1, Ordering::SeqCst);
                self.counters.active.fetch_sub(1, Ordering::SeqCst);
            })
        }
    }

    async fn wait_for(counter: &AtomicUsize, at_least: usize) {
        for _ in 0..200 {
            if counter.load(Ordering::SeqCst) >= at_least {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("счётчик не достиг {at_least}");
    }

    async fn wait_idle(trigger: &RefreshTrigger) {
        for _ in 0..200 {
            if trigger.phase() == PollPhase::Idle {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("цикл не вернулся в Idle");
    }

    #[tokio::test]
    async fn first_pass_runs_immediately_and_refresh_runs_another() {
        let counters = Counters::default();
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = spawn_view(
            ViewKind::Hardware,
            Duration::from_secs(3600),
            CountingCycle {
                counters: counters.clone(),
                hold: None,
            },
            stop_rx,
        );

        wait_for(&counters.runs, 1).await;
        wait_idle(&handle.trigger).await;
        assert!(handle.trigger.request());
        wait_for(&counters.runs, 2).await;

        stop_tx.send(true).unwrap();
        handle.task.await.unwrap();
        assert_eq!(counters.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn refresh_during_a_pass_is_debounced() {
        let counters = Counters::default();
        let hold = Arc::new(Notify::new());
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = spawn_view(
            ViewKind::Processes,
            Duration::from_secs(3600),
            CountingCycle {
                counters: counters.clone(),
                hold: Some(hold.clone()),
            },
            stop_rx,
        );

        wait_for(&counters.active, 1).await;
        assert_eq!(handle.trigger.phase(), PollPhase::Collecting);
        assert!(!handle.trigger.request());
        assert!(!handle.trigger.request());

        hold.notify_one();
        wait_for(&counters.runs, 1).await;
        wait_idle(&handle.trigger).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(counters.runs.load(Ordering::SeqCst), 1);

        stop_tx.send(true).unwrap();
        handle.task.await.unwrap();
    }

    #[tokio::test]
    async fn stop_waits_for_the_running_pass() {
        let counters = Counters::default();
        let hold = Arc::new(Notify::new());
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = spawn_view(
            ViewKind::Software,
            Duration::from_millis(10),
            CountingCycle {
                counters: counters.clone(),
                hold: Some(hold.clone()),
            },
            stop_rx,
        );

        wait_for(&counters.active, 1).await;
        stop_tx.send(true).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!handle.task.is_finished());

        hold.notify_one();
        handle.task.await.unwrap();
        assert_eq!(counters.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn passes_never_overlap() {
        let counters = Counters::default();
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = spawn_view(
            ViewKind::Servers,
            Duration::from_millis(1),
            CountingCycle {
                counters: counters.clone(),
                hold: None,
            },
            stop_rx,
        );
        for _ in 0..20 {
            handle.trigger.request();
            tokio::task::yield_now().await;
        }
        wait_for(&counters.runs, 5).await;
        stop_tx.send(true).unwrap();
        handle.task.await.unwrap();
        assert_eq!(counters.max_active.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn view_names_parse() {
        assert_eq!("servers".parse::<ViewKind>(), Ok(ViewKind::Servers));
        assert!("printers".parse::<ViewKind>().is_err());
    }
}
