//! 레코드 텍스트 형식
//!
//! 목적지에 기록되는 한 줄 레코드를 만듭니다.
//!
//! - `std`: `Mmm dd hh:mm:ss host sender[pid] <Level>: message`
//! - `bsd`: `std`에서 레벨 제외
//! - `msg`: 메시지 본문만
//! - `raw` / `asl`: `[Key value]` 목록 (시각은 초 단위)
//! - 사용자 템플릿: `$Key`, `$(Key)`, `$((Time)(utc|lcl|sec))`, `$((Level)(str|raw))`
//!
//! 메시지 안의 개행은 `\n\t`로 바뀌어 레코드가 항상 한 줄로 시작합니다.

use std::fmt;

use chrono::{DateTime, Local, TimeZone, Utc};

use logroute_core::types::{
    KEY_HOST, KEY_LEVEL, KEY_MESSAGE, KEY_PID, KEY_SENDER, KEY_TIME, Message,
};

/// 중복 비교에서 제외되는 레코드 앞부분 (시각 필드 `Mmm dd hh:mm:ss `)
pub const DEDUP_PREFIX_LEN: usize = 16;

/// 목적지 출력 형식
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum OutputFormat {
    /// 표준 syslog 형식 + 레벨
    #[default]
    Std,
    /// 표준 syslog 형식
    Bsd,
    /// 메시지 본문
    Msg,
    /// 모든 키/값
    Raw,
    /// 모든 키/값 (레코드 파일용)
    Asl,
    /// `$Key` 템플릿
    Custom(String),
}

impl OutputFormat {
    /// 형식 이름 또는 템플릿을 해석합니다.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "std" => Self::Std,
            "bsd" => Self::Bsd,
            "msg" => Self::Msg,
            "raw" => Self::Raw,
            "asl" => Self::Asl,
            _ => Self::Custom(s.to_owned()),
        }
    }

    /// `std`, `bsd`, `msg` 중 하나인지 여부
    pub fn is_std_bsd_msg(&self) -> bool {
        matches!(self, Self::Std | Self::Bsd | Self::Msg)
    }

    /// 중복 메시지 요약이 가능한 형식인지 여부
    pub fn coalesces(&self) -> bool {
        matches!(self, Self::Std | Self::Bsd)
    }

    /// 메시지를 레코드 한 줄로 만듭니다. `now`는 메시지에 `Time`이 없을 때 사용됩니다.
    pub fn format_record(&self, msg: &Message, now: i64) -> String {
        let time = msg.time_secs().unwrap_or(now);
        let mut out = match self {
            Self::Std | Self::Bsd => {
                let mut line = format!(
                    "{} {} {}",
                    syslog_time(time),
                    msg.get(KEY_HOST).unwrap_or("localhost"),
                    msg.get(KEY_SENDER).unwrap_or("unknown"),
                );
                if let Some(pid) = msg.get(KEY_PID) {
                    line.push_str(&format!("[{pid}]"));
                }
                if *self == Self::Std {
                    let level = msg
                        .level()
                        .map(|l| l.name().to_owned())
                        .unwrap_or_else(|| msg.get(KEY_LEVEL).unwrap_or("Notice").to_owned());
                    line.push_str(&format!(" <{level}>"));
                }
                line.push_str(": ");
                line.push_str(msg.get(KEY_MESSAGE).unwrap_or(""));
                line
            }
            Self::Msg => msg.get(KEY_MESSAGE).unwrap_or("").to_owned(),
            Self::Raw | Self::Asl => key_value_record(msg, time),
            Self::Custom(template) => expand_template(template, msg, time),
        };
        out = out.replace('\n', "\n\t");
        out.push('\n');
        out
    }

    /// 중복 비교 키. 시각 필드를 제외한 레코드입니다.
    pub fn dedup_key(record: &str) -> &str {
        record.get(DEDUP_PREFIX_LEN..).unwrap_or(record)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Std => f.write_str("std"),
            Self::Bsd => f.write_str("bsd"),
            Self::Msg => f.write_str("msg"),
            Self::Raw => f.write_str("raw"),
            Self::Asl => f.write_str("asl"),
            Self::Custom(t) => f.write_str(t),
        }
    }
}

/// `--- last message repeated N times ---` 레코드
pub fn repeat_line(count: u64, now: i64) -> String {
    let plural = if count == 1 { "" } else { "s" };
    format!(
        "{}: --- last message repeated {count} time{plural} ---\n",
        syslog_time(now)
    )
}

/// `Mmm dd hh:mm:ss` 로컬 시각
fn syslog_time(secs: i64) -> String {
    match Local.timestamp_opt(secs, 0).single() {
        Some(t) => t.format("%b %e %H:%M:%S").to_string(),
        None => format!("{secs:>15}"),
    }
}

fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn key_value_record(msg: &Message, time: i64) -> String {
    let mut parts = Vec::with_capacity(msg.fields.len() + 1);
    if !msg.contains_key(KEY_TIME) {
        parts.push(format!("[{KEY_TIME} {time}]"));
    }
    for (key, value) in &msg.fields {
        parts.push(format!("[{} {}]", escape_value(key), escape_value(value)));
    }
    parts.join(" ")
}

fn template_value(msg: &Message, key: &str, modifier: Option<&str>, time: i64) -> String {
    if key == KEY_TIME {
        return match modifier.map(str::to_ascii_lowercase).as_deref() {
            Some("sec") | Some("raw") => time.to_string(),
            Some("utc") | Some("zulu") => DateTime::<Utc>::from_timestamp(time, 0)
                .map(|t| t.format("%Y-%m-%d %H:%M:%SZ").to_string())
                .unwrap_or_else(|| time.to_string()),
            _ => syslog_time(time),
        };
    }
    let value = msg.get(key).unwrap_or("");
    if key == KEY_LEVEL && !matches!(modifier, Some("raw")) {
        if let Some(level) = msg.level() {
            return level.name().to_owned();
        }
    }
    value.to_owned()
}

/// `$Key`, `$(Key)`, `$((Key)(modifier))`, `$$` 를 치환합니다.
fn expand_template(template: &str, msg: &Message, time: i64) -> String {
    let mut out = String::with_capacity(template.len() * 2);
    let mut rest = template;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos + 1..];

        if let Some(r) = rest.strip_prefix('$') {
            out.push('$');
            rest = r;
        } else if let Some(r) = rest.strip_prefix("((") {
            // $((Key)(modifier))
            let parsed = r.find(")(").and_then(|k| {
                let key = &r[..k];
                let after = &r[k + 2..];
                after.find("))").map(|m| (key, &after[..m], &after[m + 2..]))
            });
            match parsed {
                Some((key, modifier, r)) => {
                    out.push_str(&template_value(msg, key, Some(modifier), time));
                    rest = r;
                }
                None => out.push('$'),
            }
        } else if let Some(r) = rest.strip_prefix('(') {
            match r.find(')') {
                Some(end) => {
                    out.push_str(&template_value(msg, &r[..end], None, time));
                    rest = &r[end + 1..];
                }
                None => out.push('$'),
            }
        } else {
            let end = rest
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(rest.len());
            if end == 0 {
                out.push('$');
            } else {
                out.push_str(&template_value(msg, &rest[..end], None, time));
                rest = &rest[end..];
            }
        }
    }
    out.push_str(rest);
    out
}
