//! 출력 서비스 -- 라우터를 소유하는 단일 소비자와 주기 체크포인트
//!
//! [`OutputService`]는 core의 [`Pipeline`](logroute_core::pipeline::Pipeline) trait을 구현하여
//! `logroute-daemon`에서 생명주기(start/stop/health_check)로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! producers -> OutputHandle -> mpsc -> consumer (spawn_blocking, Router 소유)
//!                                ^
//! interval task -----------------+  Checkpoint(Time), FlushDuplicates
//! ```
//!
//! 라우터와 목적지는 소비자 태스크 하나만 접근하므로 잠금이 없습니다.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use logroute_core::error::{LogrouteError, PipelineError};
use logroute_core::pipeline::{HealthStatus, MessageSink, Pipeline, TracingSink};
use logroute_core::types::Message;

use crate::checkpoint::CheckpointReason;
use crate::config::OutputConfig;
use crate::error::OutputError;
use crate::module::{ModuleSource, load_module_sources};
use crate::router::{DestinationFailure, Router, now_secs};

/// 소비자 태스크로 보내는 명령
#[derive(Debug)]
pub enum OutputCommand {
    /// 메시지 라우팅
    Route(Message),
    /// 모든 목적지 체크포인트
    Checkpoint(CheckpointReason),
    /// 모듈 트리 재로딩
    Reload(Vec<ModuleSource>),
    /// 지연된 중복 요약 기록
    FlushDuplicates,
    /// 목적지를 닫고 소비자 종료
    Shutdown,
}

/// 출력 서비스로 명령을 보내는 핸들. 복제해서 여러 생산자가 사용할 수 있습니다.
#[derive(Debug, Clone)]
pub struct OutputHandle {
    tx: mpsc::Sender<OutputCommand>,
}

impl OutputHandle {
    /// 명령을 보냅니다. 큐가 가득 차면 대기합니다.
    pub async fn send(&self, command: OutputCommand) -> Result<(), OutputError> {
        self.tx
            .send(command)
            .await
            .map_err(|e| OutputError::Channel(format!("output service closed: {e}")))
    }

    /// 메시지를 라우팅 큐에 넣습니다.
    pub async fn route(&self, msg: Message) -> Result<(), OutputError> {
        self.send(OutputCommand::Route(msg)).await
    }

    /// 대기 없이 메시지를 넣습니다. 큐가 가득 차면 에러입니다.
    pub fn try_route(&self, msg: Message) -> Result<(), OutputError> {
        self.tx
            .try_send(OutputCommand::Route(msg))
            .map_err(|e| OutputError::Channel(e.to_string()))
    }

    /// 체크포인트를 요청합니다.
    pub async fn checkpoint(&self, reason: CheckpointReason) -> Result<(), OutputError> {
        self.send(OutputCommand::Checkpoint(reason)).await
    }

    /// 크래시 보고 체크포인트를 요청합니다.
    pub async fn crash(&self) -> Result<(), OutputError> {
        self.checkpoint(CheckpointReason::Crash).await
    }

    /// 모듈 재로딩을 요청합니다.
    pub async fn reload(&self, sources: Vec<ModuleSource>) -> Result<(), OutputError> {
        self.send(OutputCommand::Reload(sources)).await
    }
}

/// 소비자 태스크가 갱신하는 통계
#[derive(Debug, Default)]
pub struct ServiceStats {
    routed: AtomicU64,
    action_failures: AtomicU64,
    rotations: AtomicU64,
    failures: Mutex<Vec<DestinationFailure>>,
    modules: AtomicUsize,
}

impl ServiceStats {
    /// 라우팅된 메시지 수
    pub fn routed(&self) -> u64 {
        self.routed.load(Ordering::Relaxed)
    }

    /// 실패한 액션 수
    pub fn action_failures(&self) -> u64 {
        self.action_failures.load(Ordering::Relaxed)
    }

    /// 수행된 로테이션 수
    pub fn rotations(&self) -> u64 {
        self.rotations.load(Ordering::Relaxed)
    }

    /// 실패 기록이 있는 목적지 수
    pub fn failing_destinations(&self) -> usize {
        self.failures.lock().map_or(0, |f| f.len())
    }

    /// 실패 기록이 있는 목적지와 그 횟수
    pub fn destination_failures(&self) -> Vec<DestinationFailure> {
        self.failures.lock().map(|f| f.clone()).unwrap_or_default()
    }

    /// 로드된 모듈 수
    pub fn modules(&self) -> usize {
        self.modules.load(Ordering::Relaxed)
    }

    fn observe(&self, router: &Router) {
        let failures = router.destination_failures();
        if let Ok(mut slot) = self.failures.lock() {
            *slot = failures;
        }
        self.modules.store(router.modules().len(), Ordering::Relaxed);
    }
}

/// 서비스 실행 상태
#[derive(Debug, Clone, PartialEq, Eq)]
enum ServiceState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 출력 서비스
///
/// # 사용 예시
/// ```ignore
/// use logroute_output::{OutputService, OutputServiceBuilder};
///
/// let (mut service, handle) = OutputServiceBuilder::new()
///     .config(config)
///     .build()?;
///
/// service.start().await?;
/// handle.route(message).await?;
/// ```
pub struct OutputService {
    config: OutputConfig,
    state: ServiceState,
    /// 소비자 시작 전, 그리고 정지 후 돌려받은 라우터
    router: Option<Router>,
    rx: Option<mpsc::Receiver<OutputCommand>>,
    tx: mpsc::Sender<OutputCommand>,
    consumer: Option<JoinHandle<Router>>,
    tasks: Vec<JoinHandle<()>>,
    stats: Arc<ServiceStats>,
}

impl OutputService {
    /// 현재 상태를 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            ServiceState::Initialized => "initialized",
            ServiceState::Running => "running",
            ServiceState::Stopped => "stopped",
        }
    }

    /// 서비스 통계
    pub fn stats(&self) -> &ServiceStats {
        &self.stats
    }

    /// 새 명령 핸들을 반환합니다.
    pub fn handle(&self) -> OutputHandle {
        OutputHandle {
            tx: self.tx.clone(),
        }
    }

    /// 실행 중이 아닐 때의 라우터 (시작 전 또는 정지 후)
    pub fn router(&self) -> Option<&Router> {
        self.router.as_ref()
    }

    /// 엔진 설정
    pub fn config(&self) -> &OutputConfig {
        &self.config
    }
}

/// 명령을 처리하다가 `Shutdown` 또는 채널 종료 시 목적지를 닫고 라우터를 돌려줍니다.
fn run_consumer(
    mut router: Router,
    mut rx: mpsc::Receiver<OutputCommand>,
    stats: Arc<ServiceStats>,
) -> Router {
    // 이전 실행에서 남은 현재 파일을 보관하고 시작한다
    let rolled = router.checkpoint_all(CheckpointReason::Force);
    stats.rotations.fetch_add(rolled as u64, Ordering::Relaxed);
    if rolled > 0 {
        tracing::info!(rolled, "archived files left by previous run");
    }
    stats.observe(&router);
    while let Some(command) = rx.blocking_recv() {
        match command {
            OutputCommand::Route(msg) => {
                let outcome = router.route(&msg);
                stats.routed.fetch_add(1, Ordering::Relaxed);
                if !outcome.failures.is_empty() {
                    stats
                        .action_failures
                        .fetch_add(outcome.failures.len() as u64, Ordering::Relaxed);
                }
            }
            OutputCommand::Checkpoint(reason) => {
                let rolled = router.checkpoint_all(reason);
                stats.rotations.fetch_add(rolled as u64, Ordering::Relaxed);
                if rolled > 0 {
                    tracing::debug!(reason = %reason, rolled, "checkpoint complete");
                }
            }
            OutputCommand::Reload(sources) => {
                let errors = router.reload(sources);
                for e in &errors {
                    tracing::warn!(error = %e, "module kept previous configuration");
                }
            }
            OutputCommand::FlushDuplicates => router.flush_duplicates(now_secs()),
            OutputCommand::Shutdown => break,
        }
        stats.observe(&router);
    }

    router.shutdown(now_secs());
    stats.observe(&router);
    tracing::info!(routed = stats.routed(), "output consumer finished");
    router
}

impl Pipeline for OutputService {
    async fn start(&mut self) -> Result<(), LogrouteError> {
        if self.state == ServiceState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        let (Some(router), Some(rx)) = (self.router.take(), self.rx.take()) else {
            return Err(PipelineError::InitFailed("output service cannot be restarted".to_owned()).into());
        };

        tracing::info!(
            modules = router.modules().len(),
            destinations = router.registry().len(),
            "starting output service"
        );

        let stats = Arc::clone(&self.stats);
        self.consumer = Some(tokio::task::spawn_blocking(move || {
            run_consumer(router, rx, stats)
        }));

        let tx = self.tx.clone();
        let period = Duration::from_secs(self.config.checkpoint_interval_secs);
        self.tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // 첫 tick은 즉시 완료
            interval.tick().await;
            loop {
                interval.tick().await;
                if tx
                    .send(OutputCommand::Checkpoint(CheckpointReason::Time))
                    .await
                    .is_err()
                    || tx.send(OutputCommand::FlushDuplicates).await.is_err()
                {
                    break;
                }
            }
        }));

        self.state = ServiceState::Running;
        tracing::info!("output service started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), LogrouteError> {
        if self.state != ServiceState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        tracing::info!("stopping output service");

        for task in self.tasks.drain(..) {
            task.abort();
        }

        self.tx
            .send(OutputCommand::Shutdown)
            .await
            .map_err(|e| PipelineError::ChannelSend(e.to_string()))?;

        if let Some(consumer) = self.consumer.take() {
            let router = consumer
                .await
                .map_err(|e| PipelineError::InitFailed(format!("output consumer failed: {e}")))?;
            self.router = Some(router);
        }

        self.state = ServiceState::Stopped;
        tracing::info!("output service stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            ServiceState::Running => {
                let failing = self.stats.failing_destinations();
                if failing > 0 {
                    HealthStatus::Degraded(format!("{failing} destinations reporting failures"))
                } else {
                    HealthStatus::Healthy
                }
            }
            ServiceState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            ServiceState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 출력 서비스 빌더
///
/// 모듈 원문을 지정하지 않으면 설정된 디렉토리에서 읽습니다.
pub struct OutputServiceBuilder {
    config: OutputConfig,
    sources: Option<Vec<ModuleSource>>,
    sink: Option<Box<dyn MessageSink>>,
}

impl OutputServiceBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: OutputConfig::default(),
            sources: None,
            sink: None,
        }
    }

    /// 엔진 설정을 지정합니다.
    pub fn config(mut self, config: OutputConfig) -> Self {
        self.config = config;
        self
    }

    /// 모듈 원문을 직접 지정합니다.
    pub fn modules(mut self, sources: Vec<ModuleSource>) -> Self {
        self.sources = Some(sources);
        self
    }

    /// 외부 액션 싱크를 지정합니다. 기본값은 [`TracingSink`]입니다.
    pub fn sink(mut self, sink: Box<dyn MessageSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// 서비스를 빌드합니다.
    ///
    /// # Returns
    /// - `OutputService`: 서비스 인스턴스
    /// - `OutputHandle`: 명령 핸들
    pub fn build(self) -> Result<(OutputService, OutputHandle), OutputError> {
        self.config.validate()?;

        let sources = match self.sources {
            Some(sources) => sources,
            None => load_module_sources(&self.config),
        };
        let sink = self.sink.unwrap_or_else(|| Box::new(TracingSink));
        let router = Router::new(self.config.clone(), sources, sink);

        let (tx, rx) = mpsc::channel(self.config.queue_capacity);
        let handle = OutputHandle { tx: tx.clone() };

        let service = OutputService {
            config: self.config,
            state: ServiceState::Initialized,
            router: Some(router),
            rx: Some(rx),
            tx,
            consumer: None,
            tasks: Vec::new(),
            stats: Arc::new(ServiceStats::default()),
        };

        Ok((service, handle))
    }
}

impl Default for OutputServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
