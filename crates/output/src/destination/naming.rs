//! 아카이브 파일 이름 -- 타임스탬프 스타일, 스탬프 생성/해석
//!
//! 아카이브 이름은 `<base>.<stamp>` 또는 `<base>.<stamp>.gz` 입니다.
//!
//! | 스타일        | 예시                          |
//! |---------------|-------------------------------|
//! | `sec`         | `system.log.T1335200452`      |
//! | `seq`         | `system.log.0`                |
//! | `utc`         | `system.log.2012-04-06T15:30:00Z` |
//! | `utc-basic`   | `system.log.20120406T153000Z` |
//! | `local`       | `system.log.2012-04-06T15:30:00-7` |
//! | `local-basic` | `system.log.20120406T153000-07` |

use chrono::{DateTime, Local, NaiveDate, Offset, TimeZone, Utc};

/// 아카이브 타임스탬프 스타일
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimestampStyle {
    /// 스탬프 없음
    #[default]
    None,
    /// `T<초>`
    Seconds,
    /// 순번
    Sequence,
    /// `YYYY-MM-DDThh:mm:ssZ`
    Utc,
    /// `YYYYMMDDThhmmssZ`
    UtcBasic,
    /// `YYYY-MM-DDThh:mm:ss±h[:mm[:ss]]`
    Local,
    /// `YYYYMMDDThhmmss±hh[mm[ss]]`
    LocalBasic,
}

/// 파일 이름에서 해석된 스탬프의 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StampKind {
    /// `T<초>`
    Seconds,
    /// 숫자 순번
    Sequence,
    /// utc/local 날짜 형식
    Dated,
}

/// 해석된 스탬프
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedStamp {
    /// 스탬프 종류
    pub kind: StampKind,
    /// 에포크 초 (순번 스탬프는 없음)
    pub time: Option<i64>,
    /// 순번 (순번 스탬프만)
    pub seq: Option<u32>,
}

impl TimestampStyle {
    /// 스타일 이름을 해석합니다. 대소문자를 구분하지 않으며 알 수 없는 이름은 `Seconds`입니다.
    pub fn parse(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        let basic = lower
            .find('-')
            .is_some_and(|i| lower[i + 1..].starts_with('b'));

        if lower.starts_with("sec") {
            Self::Seconds
        } else if ["utc", "date", "zulu"].iter().any(|p| lower.starts_with(p)) {
            if basic { Self::UtcBasic } else { Self::Utc }
        } else if lower.starts_with("local") || lower.starts_with("lcl") {
            if basic { Self::LocalBasic } else { Self::Local }
        } else if lower.starts_with('#') || lower.starts_with("seq") {
            Self::Sequence
        } else {
            Self::Seconds
        }
    }

    /// 출력용 이름
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Seconds => "sec",
            Self::Sequence => "seq",
            Self::Utc => "utc",
            Self::UtcBasic => "utc-basic",
            Self::Local => "local",
            Self::LocalBasic => "local-basic",
        }
    }

    /// 날짜 형식 스타일인지 여부
    pub fn is_dated(self) -> bool {
        matches!(
            self,
            Self::Utc | Self::UtcBasic | Self::Local | Self::LocalBasic
        )
    }

    /// 이 스타일로 생성되는 스탬프의 종류
    pub fn stamp_kind(self) -> Option<StampKind> {
        match self {
            Self::None => None,
            Self::Seconds => Some(StampKind::Seconds),
            Self::Sequence => Some(StampKind::Sequence),
            _ => Some(StampKind::Dated),
        }
    }
}

/// 시각을 스타일에 맞는 스탬프 문자열로 만듭니다.
///
/// `Seconds`, `Sequence`, `None` 스타일과 표현할 수 없는 시각은 `T<초>` 형식입니다.
/// 순번은 호출자가 기존 아카이브 목록에서 계산합니다.
pub fn make_stamp(style: TimestampStyle, secs: i64) -> String {
    let seconds = || format!("T{secs}");
    match style {
        TimestampStyle::Utc | TimestampStyle::UtcBasic => {
            let Some(t) = DateTime::<Utc>::from_timestamp(secs, 0) else {
                return seconds();
            };
            if style == TimestampStyle::Utc {
                t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
            } else {
                t.format("%Y%m%dT%H%M%SZ").to_string()
            }
        }
        TimestampStyle::Local | TimestampStyle::LocalBasic => {
            let Some(t) = Local.timestamp_opt(secs, 0).single() else {
                return seconds();
            };
            let offset = t.offset().fix().local_minus_utc();
            let sign = if offset < 0 { '-' } else { '+' };
            let off = offset.unsigned_abs();
            let (h, m, s) = (off / 3600, (off % 3600) / 60, off % 60);

            if style == TimestampStyle::Local {
                let base = t.format("%Y-%m-%dT%H:%M:%S");
                if s > 0 {
                    format!("{base}{sign}{h}:{m:02}:{s:02}")
                } else if m > 0 {
                    format!("{base}{sign}{h}:{m:02}")
                } else {
                    format!("{base}{sign}{h}")
                }
            } else {
                let base = t.format("%Y%m%dT%H%M%S");
                if s > 0 {
                    format!("{base}{sign}{h:02}{m:02}{s:02}")
                } else if m > 0 {
                    format!("{base}{sign}{h:02}{m:02}")
                } else {
                    format!("{base}{sign}{h:02}")
                }
            }
        }
        _ => seconds(),
    }
}

/// 스탬프 문자열을 해석합니다.
///
/// `T`로 시작하면 초, 숫자로만 이루어지면 순번, 그 외에는 `style`에 따른
/// 확장/기본 날짜 형식으로 해석합니다.
pub fn parse_stamp(stamp: &str, style: TimestampStyle) -> Option<ParsedStamp> {
    if stamp.is_empty() {
        return None;
    }

    if let Some(rest) = stamp.strip_prefix('T') {
        if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        return Some(ParsedStamp {
            kind: StampKind::Seconds,
            time: Some(rest.parse().ok()?),
            seq: None,
        });
    }

    if stamp.bytes().all(|b| b.is_ascii_digit()) {
        return Some(ParsedStamp {
            kind: StampKind::Sequence,
            time: None,
            seq: Some(stamp.parse().ok()?),
        });
    }

    let time = match style {
        TimestampStyle::Utc | TimestampStyle::Local => parse_dated(stamp, false)?,
        TimestampStyle::UtcBasic | TimestampStyle::LocalBasic => parse_dated(stamp, true)?,
        _ => return None,
    };
    Some(ParsedStamp {
        kind: StampKind::Dated,
        time: Some(time),
        seq: None,
    })
}

/// 숫자 읽기 커서
struct Cursor<'a> {
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    /// 최대 `max` 자리(0이면 제한 없음)의 숫자를 읽습니다.
    fn number(&mut self, max: usize) -> Option<u32> {
        let len = self
            .rest
            .bytes()
            .take_while(u8::is_ascii_digit)
            .count();
        let len = if max > 0 { len.min(max) } else { len };
        if len == 0 {
            return None;
        }
        let (digits, rest) = self.rest.split_at(len);
        self.rest = rest;
        digits.parse().ok()
    }

    fn expect(&mut self, c: char) -> Option<()> {
        self.rest = self.rest.strip_prefix(c)?;
        Some(())
    }

    fn next_char(&mut self) -> Option<char> {
        let c = self.rest.chars().next()?;
        self.rest = &self.rest[c.len_utf8()..];
        Some(c)
    }
}

/// 날짜 형식 스탬프를 에포크 초로 변환합니다.
fn parse_dated(stamp: &str, basic: bool) -> Option<i64> {
    let mut cur = Cursor { rest: stamp };
    let width = |n: usize| if basic { n } else { 0 };

    let year = cur.number(width(4))?;
    if !basic {
        cur.expect('-')?;
    }
    let month = cur.number(width(2))?;
    if !basic {
        cur.expect('-')?;
    }
    let day = cur.number(width(2))?;
    cur.expect('T')?;
    let hour = cur.number(width(2))?;
    if !basic {
        cur.expect(':')?;
    }
    let min = cur.number(width(2))?;
    if !basic {
        cur.expect(':')?;
    }
    let sec = cur.number(width(2))?;

    let naive = NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, day)?
        .and_hms_opt(hour, min, sec)?;

    let Some(zone) = cur.next_char() else {
        return Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|t| t.timestamp());
    };

    let offset: i64 = match zone {
        '+' | '-' => {
            let mut off = i64::from(cur.number(width(2))?) * 3600;
            for unit in [60, 1] {
                if !basic && cur.expect(':').is_none() {
                    break;
                }
                match cur.number(width(2)) {
                    Some(n) => off += i64::from(n) * unit,
                    None => break,
                }
            }
            if zone == '-' { -off } else { off }
        }
        'J' | 'j' => {
            return Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|t| t.timestamp());
        }
        c if c.is_ascii_alphabetic() => military_offset(c.to_ascii_uppercase())?,
        _ => return None,
    };

    Some(naive.and_utc().timestamp() - offset)
}

/// 군용 시간대 문자의 UTC 오프셋(초)
fn military_offset(zone: char) -> Option<i64> {
    let hours = match zone {
        'A'..='I' => i64::from(zone as u8 - b'A') + 1,
        'K'..='M' => i64::from(zone as u8 - b'A'),
        'N'..='Y' => -(i64::from(zone as u8 - b'N') + 1),
        'Z' => 0,
        _ => return None,
    };
    Some(hours * 3600)
}

/// 아카이브 파일 이름에서 스탬프를 분리합니다.
///
/// 이름은 `base.stamp` 또는 `base.stamp.gz` 여야 하며, `base` 자체(현재 파일)와
/// `base.gz`는 거부됩니다. `allow_gz`가 거짓이면 압축 파일도 거부합니다.
pub fn split_archive_name<'a>(name: &'a str, base: &str, allow_gz: bool) -> Option<&'a str> {
    if base.is_empty() {
        return None;
    }
    let rest = name.strip_prefix(base)?.strip_prefix('.')?;
    let parts: Vec<&str> = rest.split('.').collect();

    let stamp = match parts.as_slice() {
        [stamp] if *stamp != "gz" => *stamp,
        [stamp, "gz"] if allow_gz => *stamp,
        _ => return None,
    };
    if stamp.is_empty() { None } else { Some(stamp) }
}

/// 아카이브 파일 이름을 만듭니다.
pub fn archive_name(base: &str, stamp: &str, compressed: bool) -> String {
    if compressed {
        format!("{base}.{stamp}.gz")
    } else {
        format!("{base}.{stamp}")
    }
}
