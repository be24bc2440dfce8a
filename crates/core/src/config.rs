//! 설정 관리 -- logroute.toml 파싱 및 런타임 설정
//!
//! [`LogrouteConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`LOGROUTE_OUTPUT_LOG_ROOT=/srv/log` 형식)
//! 3. 설정 파일 (`logroute.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), logroute_core::error::LogrouteError> {
//! use logroute_core::config::LogrouteConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = LogrouteConfig::load("logroute.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = LogrouteConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, LogrouteError};

/// logroute 통합 설정
///
/// `logroute.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogrouteConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 출력 모듈 설정
    #[serde(default)]
    pub output: OutputConfig,
    /// 메트릭 노출 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl LogrouteConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LogrouteError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, LogrouteError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LogrouteError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                LogrouteError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, LogrouteError> {
        toml::from_str(toml_str).map_err(|e| {
            LogrouteError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `LOGROUTE_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "LOGROUTE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LOGROUTE_GENERAL_LOG_FORMAT");

        // Output
        override_string(&mut self.output.log_root, "LOGROUTE_OUTPUT_LOG_ROOT");
        override_string(&mut self.output.main_config, "LOGROUTE_OUTPUT_MAIN_CONFIG");
        override_string(&mut self.output.module_dir, "LOGROUTE_OUTPUT_MODULE_DIR");
        override_string(
            &mut self.output.local_module_dir,
            "LOGROUTE_OUTPUT_LOCAL_MODULE_DIR",
        );
        override_string(
            &mut self.output.primary_module,
            "LOGROUTE_OUTPUT_PRIMARY_MODULE",
        );
        override_u32(
            &mut self.output.default_ttl_days,
            "LOGROUTE_OUTPUT_DEFAULT_TTL_DAYS",
        );
        override_u64(
            &mut self.output.checkpoint_interval_secs,
            "LOGROUTE_OUTPUT_CHECKPOINT_INTERVAL_SECS",
        );
        override_u64(
            &mut self.output.max_dup_time_secs,
            "LOGROUTE_OUTPUT_MAX_DUP_TIME_SECS",
        );
        override_u32(&mut self.output.mps_limit, "LOGROUTE_OUTPUT_MPS_LIMIT");
        override_usize(
            &mut self.output.queue_capacity,
            "LOGROUTE_OUTPUT_QUEUE_CAPACITY",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "LOGROUTE_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "LOGROUTE_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "LOGROUTE_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LogrouteError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if !Path::new(&self.output.log_root).is_absolute() {
            return Err(invalid("output.log_root", "must be an absolute path".to_owned()));
        }

        if self.output.primary_module.is_empty() {
            return Err(invalid(
                "output.primary_module",
                "must not be empty".to_owned(),
            ));
        }

        if self.output.queue_capacity == 0 {
            return Err(invalid(
                "output.queue_capacity",
                "must be greater than 0".to_owned(),
            ));
        }

        if self.output.checkpoint_interval_secs == 0 {
            return Err(invalid(
                "output.checkpoint_interval_secs",
                "must be greater than 0".to_owned(),
            ));
        }

        if self.metrics.enabled && self.metrics.endpoint != "/metrics" {
            return Err(invalid(
                "metrics.endpoint",
                "only '/metrics' is supported".to_owned(),
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> LogrouteError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 출력 모듈 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// 상대 경로 목적지의 기준 디렉토리
    pub log_root: String,
    /// 주 모듈의 규칙 파일
    pub main_config: String,
    /// 시스템 모듈 디렉토리
    pub module_dir: String,
    /// 로컬 모듈 디렉토리 (시스템 디렉토리보다 먼저 읽음)
    pub local_module_dir: String,
    /// 주 모듈 이름. broadcast/forward 규칙은 이 모듈에서만 허용됩니다.
    pub primary_module: String,
    /// 기본 보존 기간 (일)
    pub default_ttl_days: u32,
    /// 시간 기반 체크포인트 주기 (초)
    pub checkpoint_interval_secs: u64,
    /// 중복 메시지 요약을 강제로 기록하기까지의 최대 대기 (초)
    pub max_dup_time_secs: u64,
    /// 초당 최대 메시지 수 (수집기가 적용)
    pub mps_limit: u32,
    /// 출력 큐 용량
    pub queue_capacity: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            log_root: "/var/log".to_owned(),
            main_config: "/etc/asl.conf".to_owned(),
            module_dir: "/etc/asl".to_owned(),
            local_module_dir: "/usr/local/etc/asl".to_owned(),
            primary_module: "com.apple.asl".to_owned(),
            default_ttl_days: 7,
            checkpoint_interval_secs: 60,
            max_dup_time_secs: 30,
            mps_limit: 500,
            queue_capacity: 10_000,
        }
    }
}

/// 메트릭 노출 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus 엔드포인트 활성화 여부
    pub enabled: bool,
    /// 바인드 주소
    pub listen_addr: String,
    /// 포트
    pub port: u16,
    /// 스크레이프 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9102,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
