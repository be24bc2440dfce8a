//! 파이프라인 trait -- 모듈 확장 포인트 정의

use std::fmt;

use serde::Serialize;

use crate::error::LogrouteError;
use crate::types::Message;

/// 모듈 건강 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 동작하지만 일부 기능 저하
    Degraded(String),
    /// 동작 불가
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 여부
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 동작 불가 여부
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// 데몬이 관리하는 모듈의 생명주기 trait
#[allow(async_fn_in_trait)]
pub trait Pipeline {
    /// 모듈을 시작합니다.
    async fn start(&mut self) -> Result<(), LogrouteError>;

    /// 모듈을 정지합니다. 남은 작업을 정리한 뒤 반환합니다.
    async fn stop(&mut self) -> Result<(), LogrouteError>;

    /// 현재 건강 상태를 반환합니다.
    async fn health_check(&self) -> HealthStatus;
}

/// 파일이 아닌 외부 부수효과 액션의 수행자
///
/// 알림 전파, 터미널 브로드캐스트, 원격 전달, 접근 제어, 제어 명령은
/// 출력 엔진 바깥의 협력자가 수행합니다. 이 trait을 구현하여 연결합니다.
pub trait MessageSink: Send {
    /// 프로세스 간 알림을 게시합니다 (`notify` 액션).
    fn notify(&mut self, name: &str, msg: &Message) -> Result<(), LogrouteError>;

    /// 로그인 터미널에 메시지를 브로드캐스트합니다 (`broadcast` 액션).
    fn broadcast(&mut self, text: &str, msg: &Message) -> Result<(), LogrouteError>;

    /// 원격 수집기로 메시지를 전달합니다 (`forward` 액션).
    fn forward(&mut self, target: &str, msg: &Message) -> Result<(), LogrouteError>;

    /// 메시지 읽기 권한이 제한되었음을 알립니다 (`access` 액션).
    fn access(
        &mut self,
        uid: Option<u32>,
        gid: Option<u32>,
        msg: &Message,
    ) -> Result<(), LogrouteError>;

    /// 제어 명령을 전달합니다 (`control` 액션).
    fn control(&mut self, command: &str, msg: &Message) -> Result<(), LogrouteError>;
}

/// 부수효과를 tracing 로그로만 남기는 기본 구현
#[derive(Debug, Default)]
pub struct TracingSink;

impl MessageSink for TracingSink {
    fn notify(&mut self, name: &str, msg: &Message) -> Result<(), LogrouteError> {
        tracing::debug!(notification = name, source = %msg.source, "notify");
        Ok(())
    }

    fn broadcast(&mut self, text: &str, msg: &Message) -> Result<(), LogrouteError> {
        tracing::info!(text, record = %msg, "broadcast");
        Ok(())
    }

    fn forward(&mut self, target: &str, msg: &Message) -> Result<(), LogrouteError> {
        tracing::debug!(forward_target = target, record = %msg, "forward");
        Ok(())
    }

    fn access(
        &mut self,
        uid: Option<u32>,
        gid: Option<u32>,
        msg: &Message,
    ) -> Result<(), LogrouteError> {
        tracing::trace!(?uid, ?gid, source = %msg.source, "access");
        Ok(())
    }

    fn control(&mut self, command: &str, msg: &Message) -> Result<(), LogrouteError> {
        tracing::debug!(command, source = %msg.source, "control");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_status_predicates() {
        assert!(HealthStatus::Healthy.is_healthy());
        assert!(HealthStatus::Unhealthy("x".to_owned()).is_unhealthy());
        assert!(!HealthStatus::Degraded("y".to_owned()).is_unhealthy());
    }

    #[test]
    fn health_status_display() {
        let s = HealthStatus::Degraded("3 failing destinations".to_owned());
        assert_eq!(s.to_string(), "degraded: 3 failing destinations");
    }

    #[test]
    fn tracing_sink_never_fails() {
        let mut sink = TracingSink;
        let msg = Message::default();
        assert!(sink.notify("com.example.note", &msg).is_ok());
        assert!(sink.forward("loghost:514", &msg).is_ok());
    }
}
