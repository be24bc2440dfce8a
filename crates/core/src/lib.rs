//! logroute 공통 크레이트
//!
//! 모든 logroute 크레이트가 공유하는 타입, 에러, 설정, trait을 정의합니다.
//!
//! - [`config`]: `logroute.toml` 파싱 및 환경변수 오버라이드
//! - [`error`]: 최상위 에러 타입
//! - [`types`]: 구조화된 로그 메시지와 레벨
//! - [`pipeline`]: 모듈 생명주기 및 외부 액션 확장 포인트
//! - [`metrics`]: 메트릭 이름 상수

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod types;

// --- 주요 타입 re-export ---
// 각 모듈의 핵심 타입을 크레이트 루트에서 바로 사용할 수 있도록 합니다.

// 에러
pub use error::{ConfigError, LogrouteError, PipelineError};

// 설정
pub use config::LogrouteConfig;

// 파이프라인 trait
pub use pipeline::{HealthStatus, MessageSink, Pipeline, TracingSink};

// 도메인 타입
pub use types::{Level, Message, MessageSource};
