use crate::collectors::checks::collect_server_checks;
use crate::collectors::processes::collect_processes;
use crate::collectors::software::collect_installed_software;
use crate::collectors::system::{collect_hardware, read_memory_layout};
use crate::collectors::{CollectError, InstalledSoftware, MemoryLayout};
use crate::context::AgentContext;
use crate::metrics::now_unix;
use crate::poll::{spawn_view, PhaseReporter, PollHandle, PollPhase, ViewCycle, ViewKind};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use sysinfo::{System, SystemExt};
use tokio::sync::watch;
use tracing::{debug, error, warn};

type CycleFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

pub struct HardwareCycle {
    ctx: Arc<AgentContext>,
    system: System,
    memory_layout: Option<MemoryLayout>,
}

impl HardwareCycle {
    pub fn new(ctx: Arc<AgentContext>) -> Self {
        Self {
            ctx,
            system: System::new_all(),
            memory_layout: None,
        }
    }

    async fn pass(&mut self, phase: &PhaseReporter) {
        if self.memory_layout.is_none() {
            let layout = tokio::task::spawn_blocking(read_memory_layout)
                .await
                .unwrap_or_default();
            self.memory_layout = Some(layout);
        }
        let layout = self.memory_layout.clone().unwrap_or_default();

        let (snapshot, errors) = collect_hardware(&mut self.system, &layout);
        for (collector, err) in &errors {
            warn!(collector, error = %err, "сбор данных об оборудовании завершился с ошибкой");
            self.ctx.metrics.inc_collect_error(collector);
        }
        let adapters = match &snapshot.network {
            Some(counters) => self.ctx.rates.lock().await.observe(counters, Instant::now()),
            None => Vec::new(),
        };

        phase.set(PollPhase::Rendering);
        let rendered = {
            let mut guard = self.ctx.state.write().await;
            guard.update_hardware(now_unix(), snapshot.clone(), &adapters);
            guard.clone()
        };
        self.ctx.metrics.update_from_state(&rendered);

        if let Some(writer) = self.ctx.active_writer() {
            phase.set(PollPhase::Persisting);
            let report = writer.write_hardware(&snapshot, &adapters).await;
            for (table, rows) in &report.written {
                self.ctx.metrics.add_rows_persisted(table, *rows);
            }
            for (table, rows) in &report.failed {
                self.ctx.metrics.add_persist_errors(table, *rows);
            }
            debug!(rows = report.total_written(), "снимок оборудования сохранён");
        }
    }
}

impl ViewCycle for HardwareCycle {
    fn run<'a>(&'a mut self, phase: &'a PhaseReporter) -> CycleFuture<'a> {
        Box::pin(self.pass(phase))
    }
}

pub struct ProcessesCycle {
    ctx: Arc<AgentContext>,
    system: System,
}

impl ProcessesCycle {
    pub fn new(ctx: Arc<AgentContext>) -> Self {
        let mut system = System::new();
        system.refresh_users_list();
        Self { ctx, system }
    }

    async fn pass(&mut self, phase: &PhaseReporter) {
        let processes = match collect_processes(&mut self.system) {
            Ok(list) => Some(list),
            Err(err) => {
                warn!(error = %err, "не удалось получить список процессов");
                self.ctx.metrics.inc_collect_error("processes");
                None
            }
        };

        phase.set(PollPhase::Rendering);
        let rendered = {
            let mut guard = self.ctx.state.write().await;
            guard.update_processes(now_unix(), processes);
            guard.clone()
        };
        self.ctx.metrics.update_from_state(&rendered);
    }
}

impl ViewCycle for ProcessesCycle {
    fn run<'a>(&'a mut self, phase: &'a PhaseReporter) -> CycleFuture<'a> {
        Box::pin(self.pass(phase))
    }
}

pub struct SoftwareCycle {
    ctx: Arc<AgentContext>,
}

impl SoftwareCycle {
    pub fn new(ctx: Arc<AgentContext>) -> Self {
        Self { ctx }
    }

    async fn enumerate(&self) -> Result<Vec<InstalledSoftware>, CollectError> {
        let mut cache = self.ctx.software_cache.lock().await;
        if let Some(items) = cache.fresh(Instant::now()) {
            debug!(count = items.len(), "список программ взят из кэша");
            return Ok(items.to_vec());
        }
        let items = tokio::task::spawn_blocking(collect_installed_software)
            .await
            .map_err(|err| CollectError::Command {
                command: "software enumeration".to_string(),
                message: err.to_string(),
            })??;
        cache.store(items.clone(), Instant::now());
        Ok(items)
    }

    async fn pass(&mut self, phase: &PhaseReporter) {
        let software = match self.enumerate().await {
            Ok(items) => Some(items),
            Err(err) => {
                warn!(error = %err, "не удалось получить список установленных программ");
                self.ctx.metrics.inc_collect_error("software");
                None
            }
        };

        phase.set(PollPhase::Rendering);
        let rendered = {
            let mut guard = self.ctx.state.write().await;
            guard.update_software(now_unix(), software.clone());
            guard.clone()
        };
        self.ctx.metrics.update_from_state(&rendered);

        let (Some(writer), Some(items)) = (self.ctx.active_writer(), software) else {
            return;
        };
        let Some(computer_id) = writer.cached_computer_id().await else {
            debug!("компьютер ещё не определён, программы будут сохранены позже");
            return;
        };
        phase.set(PollPhase::Persisting);
        match writer.write_software(computer_id, &items).await {
            Ok(added) => {
                self.ctx.metrics.add_rows_persisted("software", added as u64);
                if added > 0 {
                    debug!(added, "новые программы сохранены");
                }
            }
            Err(err) => {
                error!(error = %err, table = "software", "не удалось сохранить программы");
                self.ctx.metrics.add_persist_errors("software", 1);
            }
        }
    }
}

impl ViewCycle for SoftwareCycle {
    fn run<'a>(&'a mut self, phase: &'a PhaseReporter) -> CycleFuture<'a> {
        Box::pin(self.pass(phase))
    }
}

pub struct ServersCycle {
    ctx: Arc<AgentContext>,
}

impl ServersCycle {
    pub fn new(ctx: Arc<AgentContext>) -> Self {
        Self { ctx }
    }

    async fn pass(&mut self, phase: &PhaseReporter) {
        let cfg = &self.ctx.config;
        let (results, errors) =
            collect_server_checks(&self.ctx.client, &cfg.http_checks, &cfg.tcp_checks).await;
        for _ in 0..errors {
            self.ctx.metrics.inc_collect_error("checks");
        }

        phase.set(PollPhase::Rendering);
        let rendered = {
            let mut guard = self.ctx.state.write().await;
            guard.update_checks(now_unix(), results);
            guard.clone()
        };
        self.ctx.metrics.update_from_state(&rendered);
    }
}

impl ViewCycle for ServersCycle {
    fn run<'a>(&'a mut self, phase: &'a PhaseReporter) -> CycleFuture<'a> {
        Box::pin(self.pass(phase))
    }
}

/// Counts completed passes of the wrapped cycle.
struct Counted<C> {
    kind: ViewKind,
    ctx: Arc<AgentContext>,
    inner: C,
}

impl<C: ViewCycle> ViewCycle for Counted<C> {
    fn run<'a>(&'a mut self, phase: &'a PhaseReporter) -> CycleFuture<'a> {
        Box::pin(async move {
            self.inner.run(phase).await;
            self.ctx.metrics.inc_poll_cycle(self.kind.as_str());
        })
    }
}

fn spawn_counted<C: ViewCycle>(
    kind: ViewKind,
    period: Duration,
    ctx: &Arc<AgentContext>,
    inner: C,
    shutdown: watch::Receiver<bool>,
) -> PollHandle {
    let cycle = Counted {
        kind,
        ctx: ctx.clone(),
        inner,
    };
    spawn_view(kind, period, cycle, shutdown)
}

/// Starts one poll loop per view with the configured periods.
pub fn spawn_all(ctx: &Arc<AgentContext>, shutdown: watch::Receiver<bool>) -> Vec<PollHandle> {
    let agent = &ctx.config.agent;
    vec![
        spawn_counted(
            ViewKind::Hardware,
            Duration::from_secs(agent.hardware_interval_secs),
            ctx,
            HardwareCycle::new(ctx.clone()),
            shutdown.clone(),
        ),
        spawn_counted(
            ViewKind::Processes,
            Duration::from_secs(agent.processes_interval_secs),
            ctx,
            ProcessesCycle::new(ctx.clone()),
            shutdown.clone(),
        ),
        spawn_counted(
            ViewKind::Software,
            Duration::from_secs(agent.software_interval_secs),
            ctx,
            SoftwareCycle::new(ctx.clone()),
            shutdown.clone(),
        ),
        spawn_counted(
            ViewKind::Servers,
            Duration::from_secs(agent.servers_interval_secs),
            ctx,
            ServersCycle::new(ctx.clone()),
            shutdown,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, TcpCheckConfig};
    use crate::metrics::Metrics;
    use crate::state::State;
    use tokio::net::TcpListener;
    use tokio::sync::RwLock;

    #[tokio::test]
    async fn servers_pass_renders_check_results() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut config = Config::default();
        config.http_checks.clear();
        config.tcp_checks = vec![TcpCheckConfig {
            name: "local".to_string(),
            host: "127.0.0.1".to_string(),
            port,
            timeout_ms: 1_000,
        }];
        let state = Arc::new(RwLock::new(State::new(0)));
        let ctx = AgentContext::new(
            config,
            state.clone(),
            Metrics::new().expect("инициализация метрик"),
            None,
            false,
        );

        let (phase_tx, phase_rx) = watch::channel(PollPhase::Collecting);
        let reporter = PhaseReporter::for_test(phase_tx);
        ServersCycle::new(ctx).run(&reporter).await;

        assert_eq!(*phase_rx.borrow(), PollPhase::Rendering);
        let guard = state.read().await;
        assert_eq!(guard.checks.tcp.len(), 1);
        assert!(guard.checks.tcp[0].up);
        assert!(guard.last_collect_at(ViewKind::Servers).is_some());
    }

    #[tokio::test]
    async fn processes_pass_lists_the_current_process() {
        let state = Arc::new(RwLock::new(State::new(0)));
        let ctx = AgentContext::new(
            Config::default(),
            state.clone(),
            Metrics::new().expect("инициализация метрик"),
            None,
            false,
        );
        let (phase_tx, _phase_rx) = watch::channel(PollPhase::Collecting);
        let reporter = PhaseReporter::for_test(phase_tx);
        ProcessesCycle::new(ctx).run(&reporter).await;

        let pid = std::process::id();
        let guard = state.read().await;
        let processes = guard.processes.as_ref().expect("список процессов");
        assert!(processes.iter().any(|p| p.pid == pid));
    }
}
