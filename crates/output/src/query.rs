//! 메시지 질의 -- key/연산자/값 절의 AND 결합
//!
//! [`Query`]는 [`Clause`]의 순서 있는 목록이며 모든 절이 참일 때 매칭됩니다.
//! 빈 질의(`*`)는 모든 메시지에 매칭됩니다.
//!
//! 키가 없는 메시지에 대해서는 `absent`를 제외한 모든 연산자가 실패합니다.

use std::fmt;

use regex::Regex;

use logroute_core::types::{KEY_LEVEL, Level, Message};

use crate::error::OutputError;
use crate::rule::lexer::{Token, quote};

/// 절 연산자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryOp {
    /// `==` (연산자 생략 시 기본값)
    Equal,
    /// `!=`
    NotEqual,
    /// `~=` 대소문자 무시 비교
    CaseEqual,
    /// `*=` 부분 문자열
    Substring,
    /// `^=` 접두사
    Prefix,
    /// `$=` 접미사
    Suffix,
    /// `=~` 정규식
    Regex,
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterEqual,
    /// `exists` 키 존재
    Exists,
    /// `absent` 키 부재
    Absent,
}

impl QueryOp {
    /// 토큰에서 연산자를 해석합니다.
    pub fn from_token(token: &str) -> Option<Self> {
        let op = match token {
            "==" => Self::Equal,
            "!=" => Self::NotEqual,
            "~=" => Self::CaseEqual,
            "*=" => Self::Substring,
            "^=" => Self::Prefix,
            "$=" => Self::Suffix,
            "=~" => Self::Regex,
            "<" => Self::Less,
            "<=" => Self::LessEqual,
            ">" => Self::Greater,
            ">=" => Self::GreaterEqual,
            "exists" => Self::Exists,
            "absent" => Self::Absent,
            _ => return None,
        };
        Some(op)
    }

    /// 출력용 토큰
    pub fn token(self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::CaseEqual => "~=",
            Self::Substring => "*=",
            Self::Prefix => "^=",
            Self::Suffix => "$=",
            Self::Regex => "=~",
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::Greater => ">",
            Self::GreaterEqual => ">=",
            Self::Exists => "exists",
            Self::Absent => "absent",
        }
    }

    /// 값을 필요로 하는지 여부
    pub fn takes_value(self) -> bool {
        !matches!(self, Self::Exists | Self::Absent)
    }

    fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::Less | Self::LessEqual | Self::Greater | Self::GreaterEqual
        )
    }
}

/// 단일 질의 절
#[derive(Debug, Clone)]
pub struct Clause {
    /// 메시지 키
    pub key: String,
    /// 연산자
    pub op: QueryOp,
    /// 비교 값 (`exists`/`absent`는 없음)
    pub value: Option<String>,
    regex: Option<Regex>,
}

impl PartialEq for Clause {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.op == other.op && self.value == other.value
    }
}

impl Eq for Clause {}

impl Clause {
    /// 절을 생성합니다. 정규식은 이 시점에 컴파일됩니다.
    pub fn new(
        key: impl Into<String>,
        op: QueryOp,
        value: Option<String>,
    ) -> Result<Self, OutputError> {
        let key = key.into();
        if key.is_empty() {
            return Err(OutputError::config("query", "empty key"));
        }
        if op.takes_value() != value.is_some() {
            return Err(OutputError::config(
                "query",
                format!("operator '{}' on key '{key}' has wrong arity", op.token()),
            ));
        }
        let regex = match (op, value.as_deref()) {
            (QueryOp::Regex, Some(pattern)) => Some(Regex::new(pattern).map_err(|e| {
                OutputError::config("query", format!("invalid regex for key '{key}': {e}"))
            })?),
            _ => None,
        };
        Ok(Self {
            key,
            op,
            value,
            regex,
        })
    }

    /// 메시지에 대해 절을 평가합니다.
    pub fn matches(&self, msg: &Message) -> bool {
        let actual = msg.get(&self.key);
        let (actual, expected) = match (self.op, actual, self.value.as_deref()) {
            (QueryOp::Absent, None, _) => return true,
            (QueryOp::Absent, Some(_), _) => return false,
            (_, None, _) => return false,
            (QueryOp::Exists, Some(_), _) => return true,
            (_, Some(a), Some(e)) => (a, e),
            (_, Some(_), None) => return false,
        };

        match self.op {
            QueryOp::Equal => actual == expected,
            QueryOp::NotEqual => actual != expected,
            QueryOp::CaseEqual => actual.eq_ignore_ascii_case(expected),
            QueryOp::Substring => actual.contains(expected),
            QueryOp::Prefix => actual.starts_with(expected),
            QueryOp::Suffix => actual.ends_with(expected),
            QueryOp::Regex => self.regex.as_ref().is_some_and(|r| r.is_match(actual)),
            op if op.is_numeric() => {
                let (Some(a), Some(e)) = (
                    numeric_value(&self.key, actual),
                    numeric_value(&self.key, expected),
                ) else {
                    return false;
                };
                match op {
                    QueryOp::Less => a < e,
                    QueryOp::LessEqual => a <= e,
                    QueryOp::Greater => a > e,
                    _ => a >= e,
                }
            }
            _ => false,
        }
    }
}

/// 숫자 비교용 값. `Level` 키는 레벨 이름도 허용합니다.
fn numeric_value(key: &str, value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(n) = value.parse::<i64>() {
        return Some(n);
    }
    if key == KEY_LEVEL {
        return Level::from_str_loose(value).map(|l| i64::from(l.as_number()));
    }
    None
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", quote(&self.key), self.op.token())?;
        if let Some(value) = &self.value {
            write!(f, " {}", quote(value))?;
        }
        Ok(())
    }
}

/// 절의 AND 결합
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    clauses: Vec<Clause>,
}

impl Query {
    /// 모든 메시지에 매칭되는 질의
    pub fn match_all() -> Self {
        Self::default()
    }

    /// 절 목록으로 질의를 생성합니다.
    pub fn from_clauses(clauses: Vec<Clause>) -> Self {
        Self { clauses }
    }

    /// 절 목록
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// 모든 메시지에 매칭되는지 여부
    pub fn is_match_all(&self) -> bool {
        self.clauses.is_empty()
    }

    /// 토큰 목록에서 질의를 파싱합니다.
    ///
    /// `key value`, `key op value`, `key exists`, `key absent` 형태를 허용하며
    /// `*` 하나만 있으면 전체 매칭입니다.
    pub fn parse_tokens(tokens: &[Token]) -> Result<Self, OutputError> {
        if let [only] = tokens {
            if only.bare() == Some("*") {
                return Ok(Self::match_all());
            }
        }

        let mut words = Vec::with_capacity(tokens.len());
        for token in tokens {
            match token {
                Token::Word { text, quoted } => words.push((text.as_str(), *quoted)),
                Token::Group(g) => {
                    return Err(OutputError::config(
                        "query",
                        format!("unexpected option group '[{g}]' before '='"),
                    ));
                }
            }
        }

        let mut clauses = Vec::new();
        let mut i = 0;
        while i < words.len() {
            let (key, _) = words[i];
            let op = words
                .get(i + 1)
                .filter(|(_, quoted)| !quoted)
                .and_then(|(w, _)| QueryOp::from_token(w));

            match op {
                Some(op) if !op.takes_value() => {
                    clauses.push(Clause::new(key, op, None)?);
                    i += 2;
                }
                Some(op) => {
                    let Some((value, _)) = words.get(i + 2) else {
                        return Err(OutputError::config(
                            "query",
                            format!("missing value after '{key} {}'", op.token()),
                        ));
                    };
                    clauses.push(Clause::new(key, op, Some((*value).to_owned()))?);
                    i += 3;
                }
                None => {
                    let Some((value, _)) = words.get(i + 1) else {
                        return Err(OutputError::config(
                            "query",
                            format!("missing value for key '{key}'"),
                        ));
                    };
                    clauses.push(Clause::new(key, QueryOp::Equal, Some((*value).to_owned()))?);
                    i += 2;
                }
            }
        }

        if clauses.is_empty() {
            return Err(OutputError::config("query", "empty query, use '*' to match all"));
        }
        Ok(Self { clauses })
    }

    /// 메시지가 모든 절을 만족하는지 평가합니다.
    pub fn matches(&self, msg: &Message) -> bool {
        self.clauses.iter().all(|c| c.matches(msg))
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.clauses.is_empty() {
            return f.write_str("*");
        }
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{clause}")?;
        }
        Ok(())
    }
}
