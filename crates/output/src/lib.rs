#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`query`]: 메시지 매칭 질의 (키/연산자/값 절의 논리곱)
//! - [`rule`]: 규칙 라인 토크나이저, 파서, 목적지 옵션
//! - [`module`]: 이름 있는 규칙 목록과 모듈 탐색
//! - [`destination`]: 목적지 속성, 파일 생성/권한, 아카이브 이름, 레지스트리
//! - [`checkpoint`]: 로테이션 정책, 아카이브, 압축, 보존 정책
//! - [`format`]: 텍스트/레코드 출력 형식과 중복 요약
//! - [`router`]: 모듈 평가와 액션 수행
//! - [`service`]: 단일 소비자 서비스 (Pipeline trait 구현)
//! - [`config`]: 엔진 설정 (core 설정 확장)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! OutputHandle -> mpsc -> Router -> Module rules -> Destination -> file / archive
//!                           |                          |
//!                      MessageSink               checkpoint + retention
//! ```

pub mod checkpoint;
pub mod config;
pub mod destination;
pub mod error;
pub mod format;
pub mod module;
pub mod query;
pub mod router;
pub mod rule;
pub mod service;

// --- 주요 타입 re-export ---

// 서비스
pub use service::{OutputCommand, OutputHandle, OutputService, OutputServiceBuilder};

// 라우터
pub use router::{
    ActionFailure, DestinationFailure, FAILURE_NOTIFICATION, OutputTree, RouteOutcome, Router,
};

// 설정
pub use config::{OutputConfig, OutputConfigBuilder};

// 에러
pub use error::OutputError;

// 규칙
pub use module::{Module, ModuleSource, load_module_sources};
pub use query::{Clause, Query, QueryOp};
pub use rule::{ActionKind, Rule};

// 목적지
pub use checkpoint::CheckpointReason;
pub use destination::{
    Destination, DestinationId, DestinationKind, DestinationRegistry, DestinationSpec,
    TimestampStyle,
};
pub use format::OutputFormat;
