//! 도메인 타입 -- 시스템 전역에서 사용되는 공통 타입
//!
//! 리스너가 파싱한 구조화 로그 메시지([`Message`])와 그 출처([`MessageSource`]),
//! syslog 레벨([`Level`])을 정의합니다.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// --- 표준 메시지 키 ---

/// 메시지 시각 (epoch 초)
pub const KEY_TIME: &str = "Time";
/// 호스트명
pub const KEY_HOST: &str = "Host";
/// 송신 프로세스명
pub const KEY_SENDER: &str = "Sender";
/// 송신 프로세스 ID
pub const KEY_PID: &str = "PID";
/// 송신 사용자 ID
pub const KEY_UID: &str = "UID";
/// 송신 그룹 ID
pub const KEY_GID: &str = "GID";
/// 레벨 (0-7)
pub const KEY_LEVEL: &str = "Level";
/// syslog 퍼실리티
pub const KEY_FACILITY: &str = "Facility";
/// 메시지 본문
pub const KEY_MESSAGE: &str = "Message";
/// 읽기 허용 사용자
pub const KEY_READ_UID: &str = "ReadUID";
/// 읽기 허용 그룹
pub const KEY_READ_GID: &str = "ReadGID";

/// 메시지 출처
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSource {
    /// 데몬 내부 생성
    #[default]
    Internal,
    /// 로컬 데이터그램 소켓
    LocalSocket,
    /// UDP 리스너
    Udp,
    /// 커널 로그
    Kernel,
    /// 다른 데몬이 중계한 메시지
    Relayed,
    /// launchd 출력
    Launchd,
}

impl fmt::Display for MessageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Internal => "internal",
            Self::LocalSocket => "local",
            Self::Udp => "udp",
            Self::Kernel => "kernel",
            Self::Relayed => "relayed",
            Self::Launchd => "launchd",
        };
        f.write_str(name)
    }
}

/// syslog 레벨
///
/// 숫자가 작을수록 심각합니다 (`Emergency = 0`, `Debug = 7`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Level {
    Emergency = 0,
    Alert = 1,
    Critical = 2,
    Error = 3,
    Warning = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

impl Level {
    /// 레벨 이름 또는 숫자 문자열을 파싱합니다. 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        if let Ok(n) = s.parse::<u8>() {
            return Self::from_number(n);
        }
        match s.to_ascii_lowercase().as_str() {
            "emergency" | "emerg" | "panic" => Some(Self::Emergency),
            "alert" => Some(Self::Alert),
            "critical" | "crit" => Some(Self::Critical),
            "error" | "err" => Some(Self::Error),
            "warning" | "warn" => Some(Self::Warning),
            "notice" => Some(Self::Notice),
            "info" | "informational" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            _ => None,
        }
    }

    /// 숫자 레벨에서 변환합니다.
    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            0 => Some(Self::Emergency),
            1 => Some(Self::Alert),
            2 => Some(Self::Critical),
            3 => Some(Self::Error),
            4 => Some(Self::Warning),
            5 => Some(Self::Notice),
            6 => Some(Self::Info),
            7 => Some(Self::Debug),
            _ => None,
        }
    }

    /// 숫자 레벨
    pub fn as_number(self) -> u8 {
        self as u8
    }

    /// 출력 형식에 쓰이는 레벨 이름
    pub fn name(self) -> &'static str {
        match self {
            Self::Emergency => "Emergency",
            Self::Alert => "Alert",
            Self::Critical => "Critical",
            Self::Error => "Error",
            Self::Warning => "Warning",
            Self::Notice => "Notice",
            Self::Info => "Info",
            Self::Debug => "Debug",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 구조화 로그 메시지
///
/// 순서가 있는 문자열 key/value 목록입니다. 중복 키를 허용하며,
/// 조회 시에는 먼저 나온 값이 우선합니다 (first-wins).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// key/value 필드 (삽입 순서 유지)
    pub fields: Vec<(String, String)>,
    /// 메시지 출처
    pub source: MessageSource,
}

impl Message {
    /// 빈 메시지를 생성합니다.
    pub fn new(source: MessageSource) -> Self {
        Self {
            fields: Vec::new(),
            source,
        }
    }

    /// 필드를 추가한 메시지를 반환합니다 (빌더 스타일).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    /// 키에 해당하는 첫 번째 값을 반환합니다.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// 키가 존재하는지 확인합니다.
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.iter().any(|(k, _)| k == key)
    }

    /// 키의 첫 번째 값을 교체하거나, 없으면 추가합니다.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.fields.push((key, value)),
        }
    }

    /// 키의 모든 값을 제거합니다.
    pub fn unset(&mut self, key: &str) {
        self.fields.retain(|(k, _)| k != key);
    }

    /// 메시지 레벨 (숫자 또는 이름)
    pub fn level(&self) -> Option<Level> {
        self.get(KEY_LEVEL).and_then(Level::from_str_loose)
    }

    /// 메시지 시각 (epoch 초). `Time` 키가 없거나 잘못된 경우 `None`.
    pub fn time_secs(&self) -> Option<i64> {
        self.get(KEY_TIME).and_then(|t| t.trim().parse::<i64>().ok())
    }

    /// `Time` 키가 없으면 현재 시각을 채웁니다.
    pub fn stamp_if_missing(&mut self) {
        if self.contains_key(KEY_TIME) {
            return;
        }
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.fields.push((KEY_TIME.to_owned(), now.to_string()));
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.source,
            self.get(KEY_SENDER).unwrap_or("-"),
            self.get(KEY_MESSAGE).unwrap_or(""),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_is_first_wins() {
        let msg = Message::new(MessageSource::Udp)
            .with("Sender", "first")
            .with("Sender", "second");
        assert_eq!(msg.get("Sender"), Some("first"));
    }

    #[test]
    fn set_replaces_first_value() {
        let mut msg = Message::default().with("Host", "a").with("Host", "b");
        msg.set("Host", "c");
        assert_eq!(msg.fields[0].1, "c");
        assert_eq!(msg.fields[1].1, "b");
    }

    #[test]
    fn unset_removes_all_values() {
        let mut msg = Message::default().with("X", "1").with("Y", "2").with("X", "3");
        msg.unset("X");
        assert!(!msg.contains_key("X"));
        assert_eq!(msg.fields.len(), 1);
    }

    #[test]
    fn level_accepts_names_and_numbers() {
        assert_eq!(Level::from_str_loose("Notice"), Some(Level::Notice));
        assert_eq!(Level::from_str_loose("3"), Some(Level::Error));
        assert_eq!(Level::from_str_loose("crit"), Some(Level::Critical));
        assert_eq!(Level::from_str_loose("9"), None);
        assert_eq!(Level::from_str_loose("loud"), None);
    }

    #[test]
    fn level_ordering_is_numeric() {
        assert!(Level::Emergency < Level::Debug);
        assert_eq!(Level::Notice.as_number(), 5);
    }

    #[test]
    fn stamp_if_missing_adds_time_once() {
        let mut msg = Message::default();
        msg.stamp_if_missing();
        assert!(msg.time_secs().is_some());
        msg.stamp_if_missing();
        assert_eq!(msg.fields.len(), 1);
    }

    #[test]
    fn display_shows_sender_and_message() {
        let msg = Message::new(MessageSource::Kernel)
            .with("Sender", "kernel")
            .with("Message", "panic averted");
        assert_eq!(msg.to_string(), "[kernel] kernel: panic averted");
    }
}
