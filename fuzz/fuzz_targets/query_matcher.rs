#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use logroute_core::types::{Message, MessageSource};
use logroute_output::Query;
use logroute_output::rule::lexer::{quote, tokenize};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    /// 질의 절 목록 (최대 8개로 제한)
    clauses: Vec<FuzzClause>,
    /// 메시지 필드
    fields: Vec<(FuzzKey, String)>,
}

#[derive(Arbitrary, Debug)]
struct FuzzClause {
    key: FuzzKey,
    op: FuzzOp,
    value: String,
}

#[derive(Arbitrary, Debug, Clone, Copy)]
enum FuzzKey {
    Sender,
    Level,
    Facility,
    Message,
}

#[derive(Arbitrary, Debug, Clone, Copy)]
enum FuzzOp {
    Equal,
    NotEqual,
    Less,
    Greater,
    Prefix,
    Suffix,
    Substring,
    Regex,
    Exists,
}

impl FuzzKey {
    fn as_str(self) -> &'static str {
        match self {
            FuzzKey::Sender => "Sender",
            FuzzKey::Level => "Level",
            FuzzKey::Facility => "Facility",
            FuzzKey::Message => "Message",
        }
    }
}

impl FuzzOp {
    fn token(self) -> &'static str {
        match self {
            FuzzOp::Equal => "==",
            FuzzOp::NotEqual => "!=",
            FuzzOp::Less => "<",
            FuzzOp::Greater => ">",
            FuzzOp::Prefix => "^=",
            FuzzOp::Suffix => "$=",
            FuzzOp::Substring => "*=",
            FuzzOp::Regex => "=~",
            FuzzOp::Exists => "exists",
        }
    }
}

fuzz_target!(|input: FuzzInput| {
    let mut text = String::new();
    for clause in input.clauses.iter().take(8) {
        text.push_str(clause.key.as_str());
        text.push(' ');
        text.push_str(clause.op.token());
        if !matches!(clause.op, FuzzOp::Exists) {
            text.push(' ');
            text.push_str(&quote(&clause.value));
        }
        text.push(' ');
    }
    if text.is_empty() {
        return;
    }

    let Ok(tokens) = tokenize(&text) else {
        return;
    };
    let Ok(query) = Query::parse_tokens(&tokens) else {
        return;
    };

    let msg = input
        .fields
        .into_iter()
        .take(16)
        .fold(Message::new(MessageSource::Internal), |msg, (key, value)| {
            msg.with(key.as_str(), value)
        });

    let _ = query.matches(&msg);
});
