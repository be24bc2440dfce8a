//! 출력 모듈 -- 이름 있는 규칙 목록
//!
//! 모듈은 파일 하나에서 파싱되며, 첫 번째 잘못된 라인에서 모듈 전체가 거부됩니다.
//! 거부된 모듈이 등록한 목적지 참조는 모두 반환됩니다.
//!
//! # 모듈 탐색 순서
//! 1. 주 모듈 (`main_config`)
//! 2. 로컬 모듈 디렉토리 (`local = true`)
//! 3. 시스템 모듈 디렉토리 (이미 읽은 이름은 건너뜀)

use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

use crate::config::OutputConfig;
use crate::destination::DestinationRegistry;
use crate::error::OutputError;
use crate::rule::{ActionKind, ParseContext, Rule, parse_line};

/// 모듈 활성화 파라미터 이름
pub const PARAM_ENABLE: &str = "enable";

/// 파싱 전 모듈 원문
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSource {
    /// 모듈 이름
    pub name: String,
    /// 규칙 텍스트
    pub text: String,
    /// 로컬 디렉토리에서 읽었는지 여부
    pub local: bool,
}

impl ModuleSource {
    /// 새 원문을 생성합니다.
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            local: false,
        }
    }
}

/// 파싱된 출력 모듈
#[derive(Debug)]
pub struct Module {
    /// 모듈 이름
    pub name: String,
    /// 활성 여부
    pub enabled: bool,
    /// 로컬 모듈 여부
    pub local: bool,
    /// 기본 처리 대상 메시지를 받은 적이 있는지
    pub has_logged: bool,
    /// 규칙 (파일 순서)
    pub rules: Vec<Rule>,
    /// 모듈 지시어로 설정된 파라미터
    pub params: BTreeMap<String, String>,
    source: ModuleSource,
}

impl Module {
    /// 원문을 파싱합니다. 실패하면 이 모듈이 얻은 목적지 참조를 모두 반환합니다.
    pub fn parse(
        source: ModuleSource,
        config: &OutputConfig,
        registry: &mut DestinationRegistry,
        now: i64,
    ) -> Result<Self, OutputError> {
        let mut module = Self {
            name: source.name.clone(),
            enabled: true,
            local: source.local,
            has_logged: false,
            rules: Vec::new(),
            params: BTreeMap::new(),
            source,
        };

        let text = module.source.text.clone();
        for (index, line) in text.lines().enumerate() {
            let result = {
                let mut ctx = ParseContext {
                    config,
                    module: &module.name,
                    registry: &mut *registry,
                };
                parse_line(&mut ctx, line)
            };
            let outcome = result.and_then(|rule| match rule {
                Some(rule) => module.apply_directive(&rule).map(|()| Some(rule)),
                None => Ok(None),
            });

            match outcome {
                Ok(Some(rule)) => module.rules.push(rule),
                Ok(None) => {}
                Err(e) => {
                    let reason = match e {
                        OutputError::Config { context, reason } => format!("{context}: {reason}"),
                        other => other.to_string(),
                    };
                    module.release(registry, now);
                    return Err(OutputError::config(
                        format!("{} line {}", module.name, index + 1),
                        reason,
                    ));
                }
            }
        }

        Ok(module)
    }

    /// 모듈 지시어를 적용합니다.
    fn apply_directive(&mut self, rule: &Rule) -> Result<(), OutputError> {
        if !rule.is_directive() {
            return Ok(());
        }
        let Some(param) = rule.args.first() else {
            return Ok(());
        };
        match rule.action {
            ActionKind::SetParam => {
                let value = rule.args[1..].join(" ");
                if param.eq_ignore_ascii_case(PARAM_ENABLE) {
                    self.enabled = value.trim() != "0";
                }
                self.params.insert(param.clone(), value);
            }
            ActionKind::ConfigureFile => {
                let path = configure_value(rule);
                let contents = fs::read_to_string(&path).map_err(|e| {
                    OutputError::config("configure", format!("cannot read {path}: {e}"))
                })?;
                self.params.insert(param.clone(), contents);
            }
            ActionKind::ConfigurePlist | ActionKind::ConfigureProfile => {
                self.params.insert(param.clone(), configure_value(rule));
            }
            _ => {}
        }
        Ok(())
    }

    /// 파싱 원문
    pub fn source(&self) -> &ModuleSource {
        &self.source
    }

    /// 규칙이 가진 목적지 참조를 모두 반환합니다.
    pub fn release(&mut self, registry: &mut DestinationRegistry, now: i64) {
        for rule in &mut self.rules {
            if let Some(id) = rule.destination.take() {
                if let Err(e) = registry.release(id, now) {
                    tracing::error!(module = %self.name, error = %e, "destination release failed");
                }
            }
        }
    }

    /// 규칙과 목적지 속성을 사람이 읽는 형태로 출력합니다.
    pub fn describe(&self, registry: &DestinationRegistry) -> String {
        let mut out = String::new();
        let mut flags = Vec::new();
        flags.push(if self.enabled { "enabled" } else { "disabled" });
        if self.local {
            flags.push("local");
        }
        let _ = writeln!(out, "module: {} [{}]", self.name, flags.join(" "));
        for (key, value) in &self.params {
            let _ = writeln!(out, "  param {key}: {value}");
        }
        for rule in &self.rules {
            let _ = writeln!(out, "  {rule}");
            if let Some(dest) = rule.destination.and_then(|id| registry.get(id)) {
                out.push_str(&dest.spec().describe(dest.refcount()));
            }
        }
        out
    }
}

/// `[File x]` 형태 옵션 텍스트에서 값을 꺼냅니다.
fn configure_value(rule: &Rule) -> String {
    let inner = rule
        .options
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']');
    crate::rule::lexer::group_words(inner)
        .ok()
        .and_then(|w| w.get(1).cloned())
        .unwrap_or_default()
}

fn read_dir_sources(dir: &Path, local: bool, seen: &mut HashSet<String>) -> Vec<ModuleSource> {
    let entries = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) => {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(dir = %dir.display(), error = %e, "cannot read module directory");
            }
            return Vec::new();
        }
    };

    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|n| !n.starts_with('.'))
        .collect();
    names.sort();

    let mut out = Vec::new();
    for name in names {
        if seen.contains(&name) {
            continue;
        }
        match fs::read_to_string(dir.join(&name)) {
            Ok(text) => {
                seen.insert(name.clone());
                out.push(ModuleSource { name, text, local });
            }
            Err(e) => {
                tracing::warn!(module = %name, error = %e, "cannot read module file");
            }
        }
    }
    out
}

/// 설정된 위치에서 모듈 원문을 모두 읽습니다. 주 모듈이 항상 첫 번째입니다.
pub fn load_module_sources(config: &OutputConfig) -> Vec<ModuleSource> {
    let mut seen = HashSet::new();
    let mut sources = Vec::new();

    match fs::read_to_string(&config.main_config) {
        Ok(text) => {
            seen.insert(config.primary_module.clone());
            sources.push(ModuleSource::new(config.primary_module.clone(), text));
        }
        Err(e) => {
            tracing::warn!(
                path = %config.main_config.display(),
                error = %e,
                "primary module configuration not readable"
            );
        }
    }

    sources.extend(read_dir_sources(&config.local_module_dir, true, &mut seen));
    sources.extend(read_dir_sources(&config.module_dir, false, &mut seen));

    // 주 모듈은 디렉토리에서 읽었더라도 맨 앞
    if let Some(pos) = sources.iter().position(|s| s.name == config.primary_module) {
        let primary = sources.remove(pos);
        sources.insert(0, primary);
    }
    sources
}
