//! 출력 모듈 설정
//!
//! [`OutputConfig`]는 core의 [`OutputConfig`](logroute_core::config::OutputConfig)를
//! 기반으로 출력 엔진 전용 설정을 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use logroute_core::config::LogrouteConfig;
//! use logroute_output::config::OutputConfig;
//!
//! let core_config = LogrouteConfig::default();
//! let config = OutputConfig::from_core(&core_config.output);
//! ```

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::OutputError;

/// 출력 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// 상대 경로 목적지의 기준 디렉토리
    pub log_root: PathBuf,
    /// 주 모듈 규칙 파일
    pub main_config: PathBuf,
    /// 시스템 모듈 디렉토리
    pub module_dir: PathBuf,
    /// 로컬 모듈 디렉토리
    pub local_module_dir: PathBuf,
    /// 주 모듈 이름
    pub primary_module: String,
    /// 기본 보존 기간 (일)
    pub default_ttl_days: u32,
    /// 시간 기반 체크포인트 주기 (초)
    pub checkpoint_interval_secs: u64,
    /// 중복 메시지 요약 최대 지연 (초)
    pub max_dup_time_secs: u64,
    /// 초당 최대 메시지 수 (수집기로 전달만 함)
    pub mps_limit: u32,
    /// 출력 큐 용량
    pub queue_capacity: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_core(&logroute_core::config::OutputConfig::default())
    }
}

impl OutputConfig {
    /// core의 `OutputConfig`에서 엔진 설정을 생성합니다.
    pub fn from_core(core: &logroute_core::config::OutputConfig) -> Self {
        Self {
            log_root: PathBuf::from(&core.log_root),
            main_config: PathBuf::from(&core.main_config),
            module_dir: PathBuf::from(&core.module_dir),
            local_module_dir: PathBuf::from(&core.local_module_dir),
            primary_module: core.primary_module.clone(),
            default_ttl_days: core.default_ttl_days,
            checkpoint_interval_secs: core.checkpoint_interval_secs,
            max_dup_time_secs: core.max_dup_time_secs,
            mps_limit: core.mps_limit,
            queue_capacity: core.queue_capacity,
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), OutputError> {
        const MAX_QUEUE_CAPACITY: usize = 10_000_000;

        if !self.log_root.is_absolute() {
            return Err(OutputError::config("log_root", "must be an absolute path"));
        }
        if self
            .log_root
            .components()
            .any(|c| c == Component::ParentDir)
        {
            return Err(OutputError::config(
                "log_root",
                "must not contain '..' components",
            ));
        }
        if self.primary_module.is_empty() {
            return Err(OutputError::config("primary_module", "must not be empty"));
        }
        if self.queue_capacity == 0 || self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(OutputError::config(
                "queue_capacity",
                format!("must be 1-{MAX_QUEUE_CAPACITY}"),
            ));
        }
        if self.checkpoint_interval_secs == 0 {
            return Err(OutputError::config(
                "checkpoint_interval_secs",
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    /// 모듈 이름에 대한 기본 로그 디렉토리.
    ///
    /// 주 모듈은 `log_root` 바로 아래, 그 외 모듈은 `log_root/module/<name>` 입니다.
    pub fn module_root(&self, module: &str) -> PathBuf {
        if module == self.primary_module {
            self.log_root.clone()
        } else {
            self.log_root.join("module").join(module)
        }
    }

    /// 경로가 표준 로그 루트 아래에 있는지 확인합니다.
    pub fn is_standard_dir(&self, path: &Path) -> bool {
        path.starts_with(&self.log_root) || path.starts_with("/Library/Logs")
    }
}

/// 출력 설정 빌더
#[derive(Default)]
pub struct OutputConfigBuilder {
    config: OutputConfig,
}

impl OutputConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 로그 루트 디렉토리를 설정합니다.
    pub fn log_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.log_root = root.into();
        self
    }

    /// 주 모듈 규칙 파일을 설정합니다.
    pub fn main_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.main_config = path.into();
        self
    }

    /// 시스템 모듈 디렉토리를 설정합니다.
    pub fn module_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.module_dir = dir.into();
        self
    }

    /// 로컬 모듈 디렉토리를 설정합니다.
    pub fn local_module_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.local_module_dir = dir.into();
        self
    }

    /// 주 모듈 이름을 설정합니다.
    pub fn primary_module(mut self, name: impl Into<String>) -> Self {
        self.config.primary_module = name.into();
        self
    }

    /// 기본 보존 기간(일)을 설정합니다.
    pub fn default_ttl_days(mut self, days: u32) -> Self {
        self.config.default_ttl_days = days;
        self
    }

    /// 시간 체크포인트 주기(초)를 설정합니다.
    pub fn checkpoint_interval_secs(mut self, secs: u64) -> Self {
        self.config.checkpoint_interval_secs = secs;
        self
    }

    /// 중복 요약 최대 지연(초)을 설정합니다.
    pub fn max_dup_time_secs(mut self, secs: u64) -> Self {
        self.config.max_dup_time_secs = secs;
        self
    }

    /// 큐 용량을 설정합니다.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// 설정을 검증하고 `OutputConfig`를 생성합니다.
    pub fn build(self) -> Result<OutputConfig, OutputError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
