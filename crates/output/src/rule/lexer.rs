//! 규칙 라인 토크나이저
//!
//! 공백으로 단어를 나누고, 작은따옴표/큰따옴표와 백슬래시 이스케이프로
//! 여러 단어를 하나로 묶습니다. `[` 로 시작하는 대괄호 그룹은
//! 하나의 [`Token::Group`]이 됩니다.

/// 규칙 라인의 토큰
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// 일반 단어. `quoted`가 참이면 연산자/구분자로 해석하지 않습니다.
    Word { text: String, quoted: bool },
    /// 대괄호 그룹의 내부 텍스트 (괄호 제외)
    Group(String),
}

impl Token {
    /// 따옴표 없는 단어이면 그 텍스트를 반환합니다.
    pub fn bare(&self) -> Option<&str> {
        match self {
            Token::Word {
                text,
                quoted: false,
            } => Some(text),
            _ => None,
        }
    }
}

/// 라인을 토큰으로 분리합니다.
pub fn tokenize(line: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let Some(&first) = chars.peek() else {
            break;
        };

        if first == '[' {
            chars.next();
            let mut inner = String::new();
            let mut quote: Option<char> = None;
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        inner.push(c);
                        if let Some(n) = chars.next() {
                            inner.push(n);
                        }
                    }
                    '"' | '\'' if quote.is_none() => {
                        quote = Some(c);
                        inner.push(c);
                    }
                    c if Some(c) == quote => {
                        quote = None;
                        inner.push(c);
                    }
                    ']' if quote.is_none() => {
                        closed = true;
                        break;
                    }
                    _ => inner.push(c),
                }
            }
            if !closed {
                return Err("unterminated '[' option group".to_owned());
            }
            tokens.push(Token::Group(inner.trim().to_owned()));
            continue;
        }

        let mut text = String::new();
        let mut quoted = false;
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                break;
            }
            chars.next();
            match c {
                '\\' => match chars.next() {
                    Some(n) => text.push(n),
                    None => return Err("dangling escape at end of line".to_owned()),
                },
                '"' | '\'' => {
                    quoted = true;
                    let mut closed = false;
                    while let Some(n) = chars.next() {
                        if n == c {
                            closed = true;
                            break;
                        }
                        if n == '\\' {
                            match chars.next() {
                                Some(e) => text.push(e),
                                None => break,
                            }
                        } else {
                            text.push(n);
                        }
                    }
                    if !closed {
                        return Err(format!("unterminated {c} quote"));
                    }
                }
                _ => text.push(c),
            }
        }
        tokens.push(Token::Word { text, quoted });
    }

    Ok(tokens)
}

/// 대괄호 그룹 내부를 단어 목록으로 분리합니다.
pub fn group_words(inner: &str) -> Result<Vec<String>, String> {
    tokenize(inner)?
        .into_iter()
        .map(|t| match t {
            Token::Word { text, .. } => Ok(text),
            Token::Group(_) => Err("nested '[' inside option group".to_owned()),
        })
        .collect()
}

/// 출력용으로 값을 인용합니다. 파싱 시 같은 값으로 복원됩니다.
pub fn quote(value: &str) -> String {
    let needs_quote = value.is_empty()
        || value.starts_with(['[', '>', '#', '='])
        || value == "*"
        || crate::query::QueryOp::from_token(value).is_some()
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\' | '[' | ']'));
    if !needs_quote {
        return value.to_owned();
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}
