//! 라우터 -- 메시지를 모듈 규칙에 따라 평가하고 액션을 수행
//!
//! [`Router`]는 설정, 모듈 트리(모듈 + 목적지 레지스트리), 외부 액션 싱크를
//! 소유하는 명시적 컨텍스트 객체입니다. 전역 상태는 없습니다.
//!
//! # 평가 규칙
//! - 모듈은 순서대로, 비활성 모듈은 건너뜀
//! - 각 모듈은 메시지 작업 복사본을 사용 (`set`/`unset`은 복사본만 변경)
//! - `ignore`: 이 모듈 중단, `skip`: 이 모듈 중단 (기본 처리 유지),
//!   `claim`: 이 모듈과 이후 모든 모듈 중단
//! - 액션 실패는 격리되어 [`RouteOutcome`]과 메트릭에 기록되고 평가는 계속됩니다.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use logroute_core::metrics as m;
use logroute_core::pipeline::MessageSink;
use logroute_core::types::{
    KEY_LEVEL, KEY_MESSAGE, KEY_READ_GID, KEY_READ_UID, KEY_SENDER, Level, Message, MessageSource,
};

use crate::checkpoint::CheckpointReason;
use crate::config::OutputConfig;
use crate::destination::DestinationRegistry;
use crate::error::OutputError;
use crate::module::{Module, ModuleSource, PARAM_ENABLE};
use crate::rule::{ActionKind, Rule};

/// 목적지 실패 진단 알림 이름
pub const FAILURE_NOTIFICATION: &str = "logroute.destination.failure";

/// 첫 실패 이후 이 횟수마다 진단 알림을 다시 보냅니다.
const FAILURE_NOTIFY_INTERVAL: u64 = 100;

/// 모듈 목록과 그 목적지 레지스트리. 재로딩 시 통째로 교체됩니다.
#[derive(Debug, Default)]
pub struct OutputTree {
    registry: DestinationRegistry,
    modules: Vec<Module>,
}

impl OutputTree {
    /// 원문 목록으로 트리를 만듭니다.
    ///
    /// 파싱에 실패한 모듈은 `fallback` 트리에 같은 이름의 모듈이 있으면 그 원문으로
    /// 다시 파싱하고, 없으면 제외합니다. 실패 목록을 함께 반환합니다.
    pub fn build(
        config: &OutputConfig,
        sources: Vec<ModuleSource>,
        fallback: Option<&OutputTree>,
        now: i64,
    ) -> (Self, Vec<OutputError>) {
        let mut tree = Self::default();
        let mut errors = Vec::new();

        for source in sources {
            let name = source.name.clone();
            match Module::parse(source, config, &mut tree.registry, now) {
                Ok(module) => tree.modules.push(module),
                Err(e) => {
                    tracing::error!(module = %name, error = %e, "module rejected");
                    errors.push(e);

                    let previous = fallback
                        .and_then(|old| old.modules.iter().find(|m| m.name == name))
                        .map(|m| m.source().clone());
                    if let Some(previous) = previous {
                        match Module::parse(previous, config, &mut tree.registry, now) {
                            Ok(module) => {
                                tracing::warn!(module = %name, "keeping previous module configuration");
                                tree.modules.push(module);
                            }
                            Err(e) => {
                                tracing::error!(module = %name, error = %e, "previous module configuration rejected");
                            }
                        }
                    }
                }
            }
        }

        metrics::gauge!(m::OUTPUT_MODULES_LOADED).set(tree.modules.len() as f64);
        (tree, errors)
    }

    /// 모듈 목록
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// 목적지 레지스트리
    pub fn registry(&self) -> &DestinationRegistry {
        &self.registry
    }

    /// 모든 목적지에 체크포인트를 수행합니다. 로테이션된 목적지 수를 반환합니다.
    pub fn checkpoint_all_at(&mut self, reason: CheckpointReason, now: i64) -> usize {
        let mut rolled = 0;
        for (_, dest) in self.registry.iter_mut() {
            match dest.checkpoint(reason, now) {
                Ok(true) => rolled += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        path = %dest.spec().path.display(),
                        reason = %reason,
                        error = %e,
                        "checkpoint failed"
                    );
                }
            }
        }
        rolled
    }

    /// 모든 목적지를 닫습니다.
    pub fn shutdown(&mut self, now: i64) {
        self.registry.shutdown(now);
    }
}

/// 실패 기록이 있는 목적지
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DestinationFailure {
    /// 목적지 경로
    pub path: String,
    /// 누적 실패 횟수
    pub fails: u64,
}

/// 실패한 액션 기록
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionFailure {
    /// 모듈 이름
    pub module: String,
    /// 액션
    pub action: ActionKind,
    /// 에러 메시지
    pub error: String,
}

impl fmt::Display for ActionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.module, self.action.keyword(), self.error)
    }
}

/// 메시지 1건의 라우팅 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteOutcome {
    /// 목적지에 전달된 레코드 수 (중복 요약 포함)
    pub delivered: usize,
    /// 매칭된 규칙 수
    pub matched_rules: usize,
    /// 메시지를 claim한 모듈
    pub claimed_by: Option<String>,
    /// ignore로 평가를 중단한 모듈
    pub ignored_by: Vec<String>,
    /// claim 없이 모든 모듈을 통과했는지
    pub reached_default: bool,
    /// 실패한 액션
    pub failures: Vec<ActionFailure>,
}

/// 모듈 평가 종료 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModuleExit {
    Completed,
    Ignored,
    Skipped,
    Claimed,
}

/// 라우팅 컨텍스트
pub struct Router {
    config: OutputConfig,
    tree: OutputTree,
    sink: Box<dyn MessageSink>,
    params: BTreeMap<String, String>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("modules", &self.tree.modules.len())
            .field("destinations", &self.tree.registry.len())
            .field("params", &self.params)
            .finish()
    }
}

/// 현재 시각 (Unix 초)
pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

impl Router {
    /// 원문 목록으로 라우터를 생성합니다. 거부된 모듈은 로그만 남기고 제외합니다.
    pub fn new(
        config: OutputConfig,
        sources: Vec<ModuleSource>,
        sink: Box<dyn MessageSink>,
    ) -> Self {
        let (tree, _) = OutputTree::build(&config, sources, None, now_secs());
        Self {
            config,
            tree,
            sink,
            params: BTreeMap::new(),
        }
    }

    /// 엔진 설정
    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    /// 현재 모듈 트리
    pub fn tree(&self) -> &OutputTree {
        &self.tree
    }

    /// 모듈 목록
    pub fn modules(&self) -> &[Module] {
        &self.tree.modules
    }

    /// 목적지 레지스트리
    pub fn registry(&self) -> &DestinationRegistry {
        &self.tree.registry
    }

    /// 쿼리 있는 `set-param`으로 설정된 프로세스 파라미터
    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// 현재 시각으로 메시지를 라우팅합니다.
    pub fn route(&mut self, msg: &Message) -> RouteOutcome {
        self.route_at(msg, now_secs())
    }

    /// 주어진 시각으로 메시지를 라우팅합니다.
    pub fn route_at(&mut self, msg: &Message, now: i64) -> RouteOutcome {
        let started = Instant::now();
        let mut outcome = RouteOutcome::default();
        let max_dup = self.config.max_dup_time_secs;

        let Self {
            tree, sink, params, ..
        } = self;
        let OutputTree { registry, modules } = tree;

        for module in modules.iter_mut() {
            if !module.enabled {
                continue;
            }

            let mut working = msg.clone();
            let mut deferred = Vec::new();
            let mut exit = ModuleExit::Completed;
            let mut matched = false;

            for rule in &module.rules {
                let Some(query) = &rule.query else {
                    continue;
                };
                if !query.matches(&working) {
                    continue;
                }
                matched = true;
                outcome.matched_rules += 1;
                metrics::counter!(m::OUTPUT_RULE_MATCHES_TOTAL, m::LABEL_MODULE => module.name.clone())
                    .increment(1);

                match rule.action {
                    ActionKind::Ignore => exit = ModuleExit::Ignored,
                    ActionKind::Skip => exit = ModuleExit::Skipped,
                    ActionKind::Claim => exit = ModuleExit::Claimed,
                    ActionKind::SetParam => {
                        let value = rule.args[1..].join(" ");
                        deferred.push((rule.args[0].clone(), value));
                    }
                    _ => {
                        let result = apply_action(
                            rule,
                            &mut working,
                            registry,
                            &mut **sink,
                            now,
                            max_dup,
                        );
                        match result {
                            Ok(delivered) => outcome.delivered += delivered,
                            Err(e) => {
                                metrics::counter!(
                                    m::OUTPUT_ACTION_FAILURES_TOTAL,
                                    m::LABEL_ACTION => rule.action.label()
                                )
                                .increment(1);
                                tracing::warn!(
                                    module = %module.name,
                                    action = rule.action.label(),
                                    error = %e,
                                    "action failed"
                                );
                                outcome.failures.push(ActionFailure {
                                    module: module.name.clone(),
                                    action: rule.action,
                                    error: e.to_string(),
                                });
                            }
                        }
                    }
                }

                if exit != ModuleExit::Completed {
                    break;
                }
            }

            for (param, value) in deferred {
                if param.eq_ignore_ascii_case(PARAM_ENABLE) {
                    module.enabled = value.trim() != "0";
                    tracing::info!(module = %module.name, enabled = module.enabled, "module toggled");
                } else {
                    params.insert(param, value);
                }
            }

            match exit {
                ModuleExit::Ignored => outcome.ignored_by.push(module.name.clone()),
                ModuleExit::Skipped => module.has_logged = true,
                ModuleExit::Completed if matched => module.has_logged = true,
                ModuleExit::Completed => {}
                ModuleExit::Claimed => {
                    module.has_logged = true;
                    outcome.claimed_by = Some(module.name.clone());
                    break;
                }
            }
        }

        outcome.reached_default = outcome.claimed_by.is_none();
        metrics::counter!(m::OUTPUT_MESSAGES_ROUTED_TOTAL).increment(1);
        if outcome.claimed_by.is_some() {
            metrics::counter!(m::OUTPUT_MESSAGES_CLAIMED_TOTAL).increment(1);
        }
        metrics::histogram!(m::OUTPUT_ROUTE_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        outcome
    }

    /// 모든 목적지에 체크포인트를 수행합니다. 로테이션된 목적지 수를 반환합니다.
    pub fn checkpoint_all(&mut self, reason: CheckpointReason) -> usize {
        self.checkpoint_all_at(reason, now_secs())
    }

    /// 주어진 시각으로 모든 목적지에 체크포인트를 수행합니다.
    pub fn checkpoint_all_at(&mut self, reason: CheckpointReason, now: i64) -> usize {
        self.tree.checkpoint_all_at(reason, now)
    }

    /// 지연이 지난 중복 요약을 기록합니다.
    pub fn flush_duplicates(&mut self, now: i64) {
        let max_dup = self.config.max_dup_time_secs;
        for (_, dest) in self.tree.registry.iter_mut() {
            if let Err(e) = dest.flush_duplicates(now, max_dup) {
                tracing::warn!(path = %dest.spec().path.display(), error = %e, "duplicate flush failed");
            }
        }
    }

    /// 새 모듈 트리를 만들어 교체합니다.
    ///
    /// 이전 트리의 목적지는 강제 체크포인트 후 닫힙니다. 거부된 모듈은 이전 원문으로
    /// 유지되며, 거부 목록을 반환합니다.
    pub fn reload(&mut self, sources: Vec<ModuleSource>) -> Vec<OutputError> {
        self.reload_at(sources, now_secs())
    }

    /// 주어진 시각으로 재로딩합니다.
    pub fn reload_at(&mut self, sources: Vec<ModuleSource>, now: i64) -> Vec<OutputError> {
        let (tree, errors) = OutputTree::build(&self.config, sources, Some(&self.tree), now);
        let mut old = std::mem::replace(&mut self.tree, tree);
        let rolled = old.checkpoint_all_at(CheckpointReason::Force, now);
        old.shutdown(now);
        tracing::info!(
            modules = self.tree.modules.len(),
            destinations = self.tree.registry.len(),
            rejected = errors.len(),
            rolled,
            "output configuration reloaded"
        );
        errors
    }

    /// 중복 요약을 기록하고 모든 목적지를 닫습니다.
    ///
    /// 종료 시에는 강제 체크포인트를 하지 않습니다. 다음 시작 시 강제 체크포인트가
    /// 남은 파일을 보관합니다.
    pub fn shutdown(&mut self, now: i64) {
        self.tree.shutdown(now);
    }

    /// 실패 횟수가 있는 목적지 수
    pub fn failing_destinations(&self) -> usize {
        self.tree
            .registry
            .iter()
            .filter(|(_, d)| d.fails() > 0)
            .count()
    }

    /// 실패 횟수가 있는 목적지와 그 횟수
    pub fn destination_failures(&self) -> Vec<DestinationFailure> {
        self.tree
            .registry
            .iter()
            .filter(|(_, d)| d.fails() > 0)
            .map(|(_, d)| DestinationFailure {
                path: d.spec().path.display().to_string(),
                fails: d.fails(),
            })
            .collect()
    }

    /// 모든 모듈의 규칙과 목적지 속성을 출력합니다.
    pub fn describe(&self) -> String {
        self.tree
            .modules
            .iter()
            .map(|module| module.describe(&self.tree.registry))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn access_id(arg: Option<&String>) -> Option<u32> {
    arg.and_then(|a| a.parse::<i64>().ok())
        .and_then(|v| u32::try_from(v).ok())
}

/// 흐름 제어와 파라미터 이외의 액션을 수행합니다. 전달된 레코드 수를 반환합니다.
fn apply_action(
    rule: &Rule,
    working: &mut Message,
    registry: &mut DestinationRegistry,
    sink: &mut dyn MessageSink,
    now: i64,
    max_dup: u64,
) -> Result<usize, OutputError> {
    let external = |e: logroute_core::LogrouteError| OutputError::Channel(e.to_string());

    match rule.action {
        ActionKind::SetKey => working.set(rule.args[0].clone(), rule.args[1].clone()),
        ActionKind::UnsetKey => working.unset(&rule.args[0]),
        ActionKind::Access => {
            let uid = access_id(rule.args.first());
            let gid = access_id(rule.args.get(1));
            match uid {
                Some(uid) => working.set(KEY_READ_UID, uid.to_string()),
                None => working.unset(KEY_READ_UID),
            }
            match gid {
                Some(gid) => working.set(KEY_READ_GID, gid.to_string()),
                None => working.unset(KEY_READ_GID),
            }
            sink.access(uid, gid, working).map_err(external)?;
        }
        ActionKind::Notify => sink.notify(&rule.args[0], working).map_err(external)?,
        ActionKind::Broadcast => {
            let text = if rule.args.is_empty() {
                working.get(KEY_MESSAGE).unwrap_or_default().to_owned()
            } else {
                rule.args.join(" ")
            };
            sink.broadcast(&text, working).map_err(external)?;
        }
        ActionKind::Forward => sink.forward(&rule.args[0], working).map_err(external)?,
        ActionKind::Control => sink
            .control(&rule.args.join(" "), working)
            .map_err(external)?,
        action if action.writes() => {
            let id = rule
                .destination
                .ok_or_else(|| OutputError::State("write rule without a destination".into()))?;
            let dest = registry
                .get_mut(id)
                .ok_or_else(|| OutputError::State(format!("destination {id:?} is not registered")))?;
            let record = dest.spec().format.format_record(working, now);
            let before = dest.fails();
            let result = dest.deliver(&record, now, max_dup);
            let fails = dest.fails();
            let crossed = before / FAILURE_NOTIFY_INTERVAL != fails / FAILURE_NOTIFY_INTERVAL;
            if fails > before && (before == 0 || crossed) {
                let path = dest.spec().path.display().to_string();
                notify_failure(sink, &path, fails);
            }
            let written = result?;
            // 병합된 기록은 전달로 세고, 삼켜진 soft 실패는 세지 않는다
            return Ok(usize::from(written > 0 || fails == before));
        }
        _ => {}
    }
    Ok(0)
}

/// 지속적으로 실패하는 목적지를 싱크에 알립니다. 알림 실패는 로그만 남깁니다.
fn notify_failure(sink: &mut dyn MessageSink, path: &str, fails: u64) {
    let diagnostic = Message::new(MessageSource::Internal)
        .with(KEY_SENDER, "logroute")
        .with(KEY_LEVEL, (Level::Error as i32).to_string())
        .with(KEY_MESSAGE, format!("destination {path} has failed {fails} times"));
    if let Err(e) = sink.notify(FAILURE_NOTIFICATION, &diagnostic) {
        tracing::warn!(path, fails, error = %e, "failure notification not delivered");
    }
}
