//! 규칙 엔진 -- 라인 기반 규칙 파싱과 출력
//!
//! 모듈 파일의 각 라인은 다음 중 하나입니다.
//!
//! ```text
//! # 주석
//! <clauses> = <action> [args] [options]     규칙
//! = <param> <value...>                      모듈 지시어
//! = <param> [File|Plist|Profile x]          설정 파일 지시어
//! > <path> [options]                        출력 목적지 선언
//! ```
//!
//! # 아키텍처
//! - [`lexer`]: 따옴표/이스케이프/대괄호 그룹 토크나이저
//! - [`options`]: `[Key value]` 목적지 옵션
//! - [`parser`]: 라인 파싱, 경로 해석, 목적지 정규화

pub mod lexer;
pub mod options;
pub mod parser;

pub use options::{DestinationOption, DestinationOptions};
pub use parser::{ParseContext, parse_line};

use std::fmt;

use crate::destination::DestinationId;
use crate::query::Query;
use crate::rule::lexer::quote;

/// 규칙 액션 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// 아무것도 하지 않음
    Noop,
    /// 모듈/프로세스 파라미터 설정
    SetParam,
    /// 출력 목적지 선언 (`>`)
    RedirectOutput,
    /// 이 모듈의 평가 중단
    Ignore,
    /// 이 모듈의 평가 중단 (기본 처리는 계속)
    Skip,
    /// 이 모듈과 이후 모든 모듈의 평가 중단
    Claim,
    /// 알림 게시
    Notify,
    /// 터미널 브로드캐스트
    Broadcast,
    /// 읽기 권한 제한
    Access,
    /// 기본 레코드 저장소에 저장
    StoreDatabase,
    /// 레코드 파일에 저장
    StoreFile,
    /// 기간별 레코드 디렉토리에 저장
    StoreDirectory,
    /// 텍스트 파일에 추가
    AppendFile,
    /// 원격 전달
    Forward,
    /// 제어 명령
    Control,
    /// 파일 내용을 파라미터로 설정
    ConfigureFile,
    /// plist 파일 설정
    ConfigurePlist,
    /// 프로파일 설정
    ConfigureProfile,
    /// 메시지 키 설정
    SetKey,
    /// 메시지 키 제거
    UnsetKey,
}

impl ActionKind {
    /// 액션 키워드를 해석합니다. `store`는 다음 단어에 따라 달라지므로 호출자가 처리합니다.
    pub fn from_keyword(word: &str) -> Option<Self> {
        let kind = match word.to_ascii_lowercase().as_str() {
            "noop" => Self::Noop,
            "set-param" => Self::SetParam,
            "ignore" => Self::Ignore,
            "skip" => Self::Skip,
            "claim" => Self::Claim,
            "notify" => Self::Notify,
            "broadcast" => Self::Broadcast,
            "access" => Self::Access,
            "store" | "save" => Self::StoreDatabase,
            "asl_file" | "store_file" => Self::StoreFile,
            "directory" | "dir" | "asl_dir" | "asl_directory" | "store_dir"
            | "store_directory" => Self::StoreDirectory,
            "file" => Self::AppendFile,
            "forward" => Self::Forward,
            "control" => Self::Control,
            "set" => Self::SetKey,
            "unset" => Self::UnsetKey,
            _ => return None,
        };
        Some(kind)
    }

    /// 출력용 키워드
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Noop => "noop",
            Self::SetParam => "set-param",
            Self::RedirectOutput => ">",
            Self::Ignore => "ignore",
            Self::Skip => "skip",
            Self::Claim => "claim",
            Self::Notify => "notify",
            Self::Broadcast => "broadcast",
            Self::Access => "access",
            Self::StoreDatabase => "store",
            Self::StoreFile => "asl_file",
            Self::StoreDirectory => "asl_directory",
            Self::AppendFile => "file",
            Self::Forward => "forward",
            Self::Control => "control",
            Self::ConfigureFile => "File",
            Self::ConfigurePlist => "Plist",
            Self::ConfigureProfile => "Profile",
            Self::SetKey => "set",
            Self::UnsetKey => "unset",
        }
    }

    /// 목적지에 기록하는 액션인지 여부
    pub fn writes(self) -> bool {
        matches!(
            self,
            Self::StoreDatabase | Self::StoreFile | Self::StoreDirectory | Self::AppendFile
        )
    }

    /// 목적지를 가지는 액션인지 여부
    pub fn has_destination(self) -> bool {
        self.writes() || self == Self::RedirectOutput
    }

    /// 메트릭 라벨용 이름
    pub fn label(self) -> &'static str {
        match self {
            Self::RedirectOutput => "redirect",
            Self::ConfigureFile => "configure-file",
            Self::ConfigurePlist => "configure-plist",
            Self::ConfigureProfile => "configure-profile",
            other => other.keyword(),
        }
    }
}

/// 파싱된 규칙. 파싱 이후 변경되지 않습니다.
#[derive(Debug, Clone)]
pub struct Rule {
    /// 질의 (지시어와 목적지 선언은 `None`)
    pub query: Option<Query>,
    /// 액션
    pub action: ActionKind,
    /// 액션 인자
    pub args: Vec<String>,
    /// 정규화된 옵션 텍스트
    pub options: String,
    /// 목적지 (기록 액션과 목적지 선언만)
    pub destination: Option<DestinationId>,
}

impl PartialEq for Rule {
    /// 목적지 ID는 레지스트리마다 다르므로 비교하지 않습니다.
    fn eq(&self, other: &Self) -> bool {
        self.query == other.query
            && self.action == other.action
            && self.args == other.args
            && self.options == other.options
    }
}

impl Eq for Rule {}

impl Rule {
    /// 메시지 질의를 가진 규칙인지 여부
    pub fn is_directive(&self) -> bool {
        self.query.is_none()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args = self
            .args
            .iter()
            .map(|a| quote(a))
            .collect::<Vec<_>>()
            .join(" ");

        match (&self.query, self.action) {
            (None, ActionKind::RedirectOutput) => write!(f, "> {}", self.options),
            (
                None,
                ActionKind::ConfigureFile | ActionKind::ConfigurePlist | ActionKind::ConfigureProfile,
            ) => write!(f, "= {args} {}", self.options),
            (None, _) => write!(f, "= {args}"),
            (Some(query), action) => {
                write!(f, "{query} = {}", action.keyword())?;
                if !args.is_empty() {
                    write!(f, " {args}")?;
                }
                if !self.options.is_empty() {
                    write!(f, " {}", self.options)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(ActionKind::from_keyword("IGNORE"), Some(ActionKind::Ignore));
        assert_eq!(
            ActionKind::from_keyword("store_directory"),
            Some(ActionKind::StoreDirectory)
        );
        assert_eq!(ActionKind::from_keyword("frobnicate"), None);
    }

    #[test]
    fn printed_keywords_reparse() {
        for kind in [
            ActionKind::Noop,
            ActionKind::SetParam,
            ActionKind::Ignore,
            ActionKind::Skip,
            ActionKind::Claim,
            ActionKind::Notify,
            ActionKind::Broadcast,
            ActionKind::Access,
            ActionKind::StoreDatabase,
            ActionKind::StoreFile,
            ActionKind::StoreDirectory,
            ActionKind::AppendFile,
            ActionKind::Forward,
            ActionKind::Control,
            ActionKind::SetKey,
            ActionKind::UnsetKey,
        ] {
            assert_eq!(ActionKind::from_keyword(kind.keyword()), Some(kind));
        }
    }

    #[test]
    fn write_actions() {
        assert!(ActionKind::AppendFile.writes());
        assert!(ActionKind::RedirectOutput.has_destination());
        assert!(!ActionKind::RedirectOutput.writes());
        assert!(!ActionKind::Notify.writes());
    }
}
