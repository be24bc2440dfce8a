//! 출력 모듈 에러 타입
//!
//! [`OutputError`]는 규칙 파싱, 목적지 I/O, 보존 정책, 생명주기 위반 등
//! 출력 모듈 내부의 모든 에러를 표현합니다.
//! `From<OutputError> for LogrouteError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use logroute_core::error::{ConfigError, LogrouteError, PipelineError};

/// 출력 모듈 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// 잘못된 규칙 또는 목적지 설정. 해당 모듈 로딩만 중단됩니다.
    #[error("config error: {context}: {reason}")]
    Config {
        /// 문제가 된 모듈 또는 설정 위치
        context: String,
        /// 에러 사유
        reason: String,
    },

    /// 목적지 열기/쓰기/로테이션 실패
    #[error("destination io error: {path}: {reason}")]
    DestinationIo {
        /// 목적지 경로
        path: String,
        /// 에러 사유
        reason: String,
    },

    /// 아카이브 목록 조회 또는 삭제 실패
    #[error("retention error: {path}: {reason}")]
    Retention {
        /// 아카이브 디렉토리 또는 파일 경로
        path: String,
        /// 에러 사유
        reason: String,
    },

    /// 목적지 생명주기 위반 (해제된 목적지 사용, 이중 해제 등)
    #[error("state error: {0}")]
    State(String),

    /// 서비스 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl OutputError {
    /// 설정 에러를 생성합니다.
    pub fn config(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            context: context.into(),
            reason: reason.into(),
        }
    }

    /// 목적지 I/O 에러를 생성합니다.
    pub fn destination_io(path: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::DestinationIo {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    /// 생명주기 위반 여부. soft-write 설정과 관계없이 항상 전파됩니다.
    pub fn is_state(&self) -> bool {
        matches!(self, Self::State(_))
    }
}

impl From<OutputError> for LogrouteError {
    fn from(err: OutputError) -> Self {
        match err {
            OutputError::Config { context, reason } => {
                LogrouteError::Config(ConfigError::InvalidValue {
                    field: context,
                    reason,
                })
            }
            OutputError::Channel(reason) => {
                LogrouteError::Pipeline(PipelineError::ChannelSend(reason))
            }
            OutputError::Io(e) => LogrouteError::Io(e),
            other => LogrouteError::Output(other.to_string()),
        }
    }
}
