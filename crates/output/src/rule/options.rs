//! 목적지 옵션 -- `[Key value]` 그룹
//!
//! 옵션 키는 대소문자를 구분하지 않으며, 출력 시 파싱한 순서대로
//! 정규화된 형태(`[Rotate 1048576]`, `[Mode 0640]` 등)로 다시 씁니다.

use std::fmt;

use crate::destination::naming::TimestampStyle;
use crate::error::OutputError;
use crate::format::OutputFormat;
use crate::rule::lexer::{group_words, quote};

/// 단일 목적지 옵션
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationOption {
    /// `[File path]`
    File(String),
    /// `[Rotate]`, `[Rotate size]`, `[Rotate style]`
    Rotate {
        /// 파일 최대 크기
        max: Option<u64>,
        /// 타임스탬프 스타일
        style: Option<TimestampStyle>,
    },
    /// `[Size n]`
    Size(u64),
    /// `[AllMax n]`
    AllMax(u64),
    /// `[TTL days]`
    Ttl(u32),
    /// `[Period secs]`
    Period(u64),
    /// `[Style s]`
    Style(TimestampStyle),
    /// `[Mode 0640]`
    Mode(u32),
    /// `[Uid n]`
    Uid(u32),
    /// `[Gid n]`
    Gid(u32),
    /// `[Coalesce on|off]`
    Coalesce(bool),
    /// `[Compress]`
    Compress,
    /// `[Format f]`
    Format(OutputFormat),
    /// `[Dest dir]`
    Dest(String),
    /// `[Soft]`
    Soft,
    /// `[Crashlog]`
    Crashlog,
    /// `[Basestamp]`
    Basestamp,
    /// `[Extern]`
    Extern,
}

/// `K`/`M`/`G` 접미사를 허용하는 크기 값을 해석합니다.
pub fn parse_size(s: &str) -> Option<u64> {
    let s = s.trim();
    let (digits, mult) = match s.chars().last()?.to_ascii_uppercase() {
        'K' => (&s[..s.len() - 1], 1u64 << 10),
        'M' => (&s[..s.len() - 1], 1 << 20),
        'G' => (&s[..s.len() - 1], 1 << 30),
        _ => (s, 1),
    };
    digits.parse::<u64>().ok()?.checked_mul(mult)
}

fn parse_mode(s: &str) -> Option<u32> {
    let s = s.trim();
    let digits = s
        .strip_prefix("0o")
        .or_else(|| s.strip_prefix('0'))
        .unwrap_or(s);
    if digits.is_empty() {
        return (s == "0").then_some(0);
    }
    u32::from_str_radix(digits, 8).ok().filter(|m| *m <= 0o7777)
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "on" | "1" | "true" | "yes" => Some(true),
        "off" | "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

impl DestinationOption {
    /// 대괄호 그룹 내부 텍스트를 옵션으로 해석합니다.
    pub fn parse_group(inner: &str) -> Result<Self, OutputError> {
        let words = group_words(inner).map_err(|e| OutputError::config("options", e))?;
        let Some((key, values)) = words.split_first() else {
            return Err(OutputError::config("options", "empty option group '[]'"));
        };
        let value = values.join(" ");
        let bad = |what: &str| {
            OutputError::config("options", format!("invalid {what} in option '[{inner}]'"))
        };
        let need = || {
            if value.is_empty() {
                Err(OutputError::config(
                    "options",
                    format!("option '{key}' requires a value"),
                ))
            } else {
                Ok(value.clone())
            }
        };

        let opt = match key.to_ascii_lowercase().as_str() {
            "file" => Self::File(need()?),
            "rotate" => {
                if value.is_empty() {
                    Self::Rotate {
                        max: None,
                        style: None,
                    }
                } else if let Some(max) = parse_size(&value) {
                    Self::Rotate {
                        max: Some(max),
                        style: None,
                    }
                } else {
                    Self::Rotate {
                        max: None,
                        style: Some(TimestampStyle::parse(&value)),
                    }
                }
            }
            "size" | "file_max" => Self::Size(parse_size(&need()?).ok_or_else(|| bad("size"))?),
            "allmax" | "all_max" => {
                Self::AllMax(parse_size(&need()?).ok_or_else(|| bad("size"))?)
            }
            "ttl" => Self::Ttl(need()?.parse().map_err(|_| bad("ttl"))?),
            "period" => Self::Period(need()?.parse().map_err(|_| bad("period"))?),
            "style" => Self::Style(TimestampStyle::parse(&need()?)),
            "mode" => Self::Mode(parse_mode(&need()?).ok_or_else(|| bad("mode"))?),
            "uid" => Self::Uid(need()?.parse().map_err(|_| bad("uid"))?),
            "gid" => Self::Gid(need()?.parse().map_err(|_| bad("gid"))?),
            "coalesce" => Self::Coalesce(parse_flag(&need()?).ok_or_else(|| bad("flag"))?),
            "compress" => Self::Compress,
            "format" | "fmt" => Self::Format(OutputFormat::parse(&need()?)),
            "dest" | "dst" => Self::Dest(need()?),
            "soft" => Self::Soft,
            "crashlog" => Self::Crashlog,
            "basestamp" => Self::Basestamp,
            "extern" => Self::Extern,
            other => {
                return Err(OutputError::config(
                    "options",
                    format!("unknown option '{other}'"),
                ));
            }
        };
        Ok(opt)
    }
}

impl fmt::Display for DestinationOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(p) => write!(f, "[File {}]", quote(p)),
            Self::Rotate { max: Some(m), .. } => write!(f, "[Rotate {m}]"),
            Self::Rotate {
                style: Some(s), ..
            } => write!(f, "[Rotate {}]", s.name()),
            Self::Rotate { .. } => f.write_str("[Rotate]"),
            Self::Size(n) => write!(f, "[Size {n}]"),
            Self::AllMax(n) => write!(f, "[AllMax {n}]"),
            Self::Ttl(d) => write!(f, "[TTL {d}]"),
            Self::Period(s) => write!(f, "[Period {s}]"),
            Self::Style(s) => write!(f, "[Style {}]", s.name()),
            Self::Mode(m) => write!(f, "[Mode 0{m:o}]"),
            Self::Uid(u) => write!(f, "[Uid {u}]"),
            Self::Gid(g) => write!(f, "[Gid {g}]"),
            Self::Coalesce(on) => write!(f, "[Coalesce {}]", if *on { "on" } else { "off" }),
            Self::Compress => f.write_str("[Compress]"),
            Self::Format(fmt_) => write!(f, "[Format {}]", quote(&fmt_.to_string())),
            Self::Dest(d) => write!(f, "[Dest {}]", quote(d)),
            Self::Soft => f.write_str("[Soft]"),
            Self::Crashlog => f.write_str("[Crashlog]"),
            Self::Basestamp => f.write_str("[Basestamp]"),
            Self::Extern => f.write_str("[Extern]"),
        }
    }
}

/// 순서 있는 목적지 옵션 목록
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestinationOptions {
    entries: Vec<DestinationOption>,
}

impl DestinationOptions {
    /// 옵션을 추가합니다.
    pub fn push(&mut self, opt: DestinationOption) {
        self.entries.push(opt);
    }

    /// 옵션 목록
    pub fn entries(&self) -> &[DestinationOption] {
        &self.entries
    }

    /// 옵션이 없는지 여부
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `[File path]` 값
    pub fn file(&self) -> Option<&str> {
        self.entries.iter().find_map(|o| match o {
            DestinationOption::File(p) => Some(p.as_str()),
            _ => None,
        })
    }

    /// `[File path]`를 교체하거나 맨 앞에 추가합니다.
    pub fn set_file(&mut self, path: impl Into<String>) {
        let path = path.into();
        match self
            .entries
            .iter_mut()
            .find(|o| matches!(o, DestinationOption::File(_)))
        {
            Some(slot) => *slot = DestinationOption::File(path),
            None => self.entries.insert(0, DestinationOption::File(path)),
        }
    }

    /// 경로 외에 다른 옵션이 없는지 여부
    pub fn is_bare(&self) -> bool {
        self.entries
            .iter()
            .all(|o| matches!(o, DestinationOption::File(_)))
    }

    /// `[Format f]` 값
    pub fn format(&self) -> Option<&OutputFormat> {
        self.entries.iter().rev().find_map(|o| match o {
            DestinationOption::Format(f) => Some(f),
            _ => None,
        })
    }
}

impl fmt::Display for DestinationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, opt) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{opt}")?;
        }
        Ok(())
    }
}
