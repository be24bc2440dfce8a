//! 규칙 라인 파서
//!
//! 한 라인을 [`Rule`]로 변환합니다. 기록 액션은 목적지 옵션을 정규화한 뒤
//! [`DestinationRegistry`]에 등록(또는 재사용)합니다. 실패한 라인은
//! 레지스트리에 아무것도 남기지 않습니다.

use std::env;
use std::path::{Component, Path, PathBuf};

use crate::config::OutputConfig;
use crate::destination::{
    DEFAULT_PERIOD_SECS, DestinationKind, DestinationRegistry, DestinationSpec, TimestampStyle,
};
use crate::error::OutputError;
use crate::format::OutputFormat;
use crate::query::Query;
use crate::rule::lexer::{Token, group_words, tokenize};
use crate::rule::options::{DestinationOption, DestinationOptions};
use crate::rule::{ActionKind, Rule};

/// `$ENV(NAME)` 치환 최대 반복 횟수
const MAX_ENV_DEPTH: usize = 5;

/// 기본 레코드 저장소 디렉토리 이름 (`log_root` 기준)
pub const DATABASE_DIR: &str = "asl";

/// 라인 파싱 문맥
pub struct ParseContext<'a> {
    /// 출력 설정
    pub config: &'a OutputConfig,
    /// 현재 모듈 이름
    pub module: &'a str,
    /// 목적지 레지스트리
    pub registry: &'a mut DestinationRegistry,
}

impl ParseContext<'_> {
    fn is_primary(&self) -> bool {
        self.module == self.config.primary_module
    }
}

fn err(reason: impl Into<String>) -> OutputError {
    OutputError::config("rule", reason)
}

/// 한 라인을 파싱합니다. 빈 라인과 주석은 `None`입니다.
pub fn parse_line(ctx: &mut ParseContext<'_>, line: &str) -> Result<Option<Rule>, OutputError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    if let Some(rest) = line.strip_prefix('=') {
        let tokens = tokenize(rest).map_err(err)?;
        return parse_directive(&tokens).map(Some);
    }
    if let Some(rest) = line.strip_prefix('>') {
        let tokens = tokenize(rest).map_err(err)?;
        return parse_redirect(ctx, &tokens).map(Some);
    }

    let tokens = tokenize(line).map_err(err)?;
    let split = tokens
        .iter()
        .position(|t| t.bare() == Some("="))
        .ok_or_else(|| err("missing '=' between query and action"))?;
    let (query_tokens, action_tokens) = (&tokens[..split], &tokens[split + 1..]);

    let query = Query::parse_tokens(query_tokens)?;
    parse_action(ctx, query, action_tokens).map(Some)
}

/// `= param value...` 또는 `= param [File|Plist|Profile x]`
fn parse_directive(tokens: &[Token]) -> Result<Rule, OutputError> {
    let Some((first, rest)) = tokens.split_first() else {
        return Err(err("empty parameter directive"));
    };
    let Token::Word { text: param, .. } = first else {
        return Err(err("parameter directive must start with a name"));
    };

    if let [Token::Group(inner)] = rest {
        let words = group_words(inner).map_err(err)?;
        let (kind, value) = match words.as_slice() {
            [key, value] => {
                let kind = match key.to_ascii_lowercase().as_str() {
                    "file" => ActionKind::ConfigureFile,
                    "plist" => ActionKind::ConfigurePlist,
                    "profile" => ActionKind::ConfigureProfile,
                    other => return Err(err(format!("unknown configuration source '{other}'"))),
                };
                (kind, value)
            }
            _ => return Err(err(format!("invalid configuration source '[{inner}]'"))),
        };
        return Ok(Rule {
            query: None,
            action: kind,
            args: vec![param.clone()],
            options: format!("[{} {}]", kind.keyword(), crate::rule::lexer::quote(value)),
            destination: None,
        });
    }

    let mut args = vec![param.clone()];
    for token in rest {
        match token {
            Token::Word { text, .. } => args.push(text.clone()),
            Token::Group(g) => return Err(err(format!("unexpected option group '[{g}]'"))),
        }
    }
    Ok(Rule {
        query: None,
        action: ActionKind::SetParam,
        args,
        options: String::new(),
        destination: None,
    })
}

/// `> path [options]`
fn parse_redirect(ctx: &mut ParseContext<'_>, tokens: &[Token]) -> Result<Rule, OutputError> {
    let (args, mut opts) = split_args(tokens)?;
    attach_path_arg(&mut opts, &args)?;
    if opts.file().is_none() {
        return Err(err("'>' requires a path"));
    }
    let (action, spec, bare) = build_destination(ctx, ActionKind::RedirectOutput, &mut opts)?;
    let destination = ctx.registry.open_or_reuse(spec, bare)?;
    Ok(Rule {
        query: None,
        action,
        args: Vec::new(),
        options: opts.to_string(),
        destination: Some(destination),
    })
}

/// 단어 인자와 옵션 그룹을 분리합니다.
fn split_args(tokens: &[Token]) -> Result<(Vec<String>, DestinationOptions), OutputError> {
    let mut args = Vec::new();
    let mut opts = DestinationOptions::default();
    for token in tokens {
        match token {
            Token::Word { text, .. } => {
                if !opts.is_empty() {
                    return Err(err(format!("argument '{text}' after option groups")));
                }
                args.push(text.clone());
            }
            Token::Group(inner) => opts.push(DestinationOption::parse_group(inner)?),
        }
    }
    Ok((args, opts))
}

/// 단독 경로 인자를 `[File path]`로 바꿉니다.
fn attach_path_arg(opts: &mut DestinationOptions, args: &[String]) -> Result<(), OutputError> {
    match args {
        [] => Ok(()),
        [path] if opts.file().is_none() => {
            opts.set_file(path.clone());
            Ok(())
        }
        [_] => Err(err("path given both as argument and [File] option")),
        _ => Err(err(format!("unexpected arguments '{}'", args.join(" ")))),
    }
}

fn parse_action(
    ctx: &mut ParseContext<'_>,
    query: Query,
    tokens: &[Token],
) -> Result<Rule, OutputError> {
    let Some((first, mut rest)) = tokens.split_first() else {
        return Err(err("missing action after '='"));
    };
    let keyword = first
        .bare()
        .ok_or_else(|| err("action must be an unquoted keyword"))?;
    let mut action = ActionKind::from_keyword(keyword)
        .ok_or_else(|| err(format!("unknown action '{keyword}'")))?;

    if action == ActionKind::StoreDatabase {
        match rest.first().and_then(Token::bare).map(str::to_ascii_lowercase) {
            Some(w) if w == "file" => {
                action = ActionKind::StoreFile;
                rest = &rest[1..];
            }
            Some(w) if w == "dir" || w == "directory" => {
                action = ActionKind::StoreDirectory;
                rest = &rest[1..];
            }
            _ => {}
        }
    }

    if matches!(action, ActionKind::Broadcast | ActionKind::Forward) && !ctx.is_primary() {
        return Err(err(format!(
            "action '{}' is only allowed in module {}",
            action.keyword(),
            ctx.config.primary_module
        )));
    }

    let (args, mut opts) = split_args(rest)?;
    let name = action.keyword();
    let no_options = |opts: &DestinationOptions| {
        if opts.is_empty() {
            Ok(())
        } else {
            Err(err(format!("action '{name}' takes no options")))
        }
    };
    let arity = |ok: bool, what: &str| {
        if ok {
            Ok(())
        } else {
            Err(err(format!("action '{name}' expects {what}")))
        }
    };

    match action {
        ActionKind::Noop | ActionKind::Ignore | ActionKind::Skip | ActionKind::Claim => {
            no_options(&opts)?;
            arity(args.is_empty(), "no arguments")?;
        }
        ActionKind::Notify | ActionKind::Forward | ActionKind::UnsetKey => {
            no_options(&opts)?;
            arity(args.len() == 1, "one argument")?;
        }
        ActionKind::Broadcast => no_options(&opts)?,
        ActionKind::Control | ActionKind::SetParam => {
            no_options(&opts)?;
            arity(!args.is_empty(), "at least one argument")?;
        }
        ActionKind::SetKey => {
            no_options(&opts)?;
            arity(args.len() == 2, "a key and a value")?;
        }
        ActionKind::Access => {
            no_options(&opts)?;
            arity((1..=2).contains(&args.len()), "a uid and an optional gid")?;
            for id in &args {
                id.parse::<i64>()
                    .map_err(|_| err(format!("invalid access id '{id}'")))?;
            }
        }
        ActionKind::StoreDatabase
        | ActionKind::StoreFile
        | ActionKind::StoreDirectory
        | ActionKind::AppendFile => {
            attach_path_arg(&mut opts, &args)?;
            if action == ActionKind::StoreDatabase && opts.file().is_some() {
                action = ActionKind::StoreFile;
            }
            if action != ActionKind::StoreDatabase && opts.file().is_none() {
                return Err(err(format!("action '{}' requires a path", action.keyword())));
            }

            let (action, spec, bare) = build_destination(ctx, action, &mut opts)?;
            let destination = ctx.registry.open_or_reuse(spec, bare)?;
            return Ok(Rule {
                query: Some(query),
                action,
                args: Vec::new(),
                options: opts.to_string(),
                destination: Some(destination),
            });
        }
        ActionKind::RedirectOutput
        | ActionKind::ConfigureFile
        | ActionKind::ConfigurePlist
        | ActionKind::ConfigureProfile => {
            return Err(err(format!("'{}' is not a rule action", action.keyword())));
        }
    }

    Ok(Rule {
        query: Some(query),
        action,
        args,
        options: String::new(),
        destination: None,
    })
}

/// `$ENV(NAME)`을 치환하고 상대 경로를 모듈 루트 기준으로 해석합니다.
pub fn resolve_path(config: &OutputConfig, module: &str, raw: &str) -> Result<PathBuf, OutputError> {
    let mut path = raw.to_owned();
    let mut depth = 0;
    while path.contains("$ENV(") {
        if depth == MAX_ENV_DEPTH {
            return Err(err(format!("too many $ENV substitutions in '{raw}'")));
        }
        path = substitute_env(&path)?;
        depth += 1;
    }

    if path.is_empty() {
        return Err(err("empty path"));
    }
    let p = Path::new(&path);
    if p.components().any(|c| c == Component::ParentDir) {
        return Err(err(format!("path '{path}' must not contain '..'")));
    }
    if p.is_absolute() {
        Ok(p.to_path_buf())
    } else {
        Ok(config.module_root(module).join(p))
    }
}

fn substitute_env(path: &str) -> Result<String, OutputError> {
    let mut out = String::with_capacity(path.len());
    let mut rest = path;
    while let Some(start) = rest.find("$ENV(") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 5..];
        let end = after
            .find(')')
            .ok_or_else(|| err(format!("unterminated $ENV( in '{path}'")))?;
        let name = &after[..end];
        let value = env::var(name)
            .map_err(|_| err(format!("environment variable '{name}' is not set")))?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// 옵션을 정규화된 목적지 명세로 변환합니다.
///
/// 반환값은 (최종 액션, 명세, 경로만 지정되었는지 여부)입니다.
fn build_destination(
    ctx: &ParseContext<'_>,
    action: ActionKind,
    opts: &mut DestinationOptions,
) -> Result<(ActionKind, DestinationSpec, bool), OutputError> {
    let config = ctx.config;
    let path = match opts.file() {
        Some(raw) => {
            let resolved = resolve_path(config, ctx.module, raw)?;
            opts.set_file(resolved.to_string_lossy().into_owned());
            resolved
        }
        None => config.log_root.join(DATABASE_DIR),
    };

    let asl_format = opts.format() == Some(&OutputFormat::Asl);
    let action = match action {
        ActionKind::AppendFile if asl_format => ActionKind::StoreFile,
        other => other,
    };
    let kind = match action {
        ActionKind::StoreFile => DestinationKind::AslFile,
        ActionKind::StoreDirectory | ActionKind::StoreDatabase => DestinationKind::AslDirectory,
        ActionKind::RedirectOutput if asl_format => DestinationKind::AslFile,
        _ => DestinationKind::Text,
    };

    let mut spec = DestinationSpec::new(&path, kind, config.default_ttl_days);
    spec.flags.coalesce = true;
    spec.flags.nonstd_dir = !config.is_standard_dir(&path);

    for opt in opts.entries() {
        match opt {
            DestinationOption::File(_) => {}
            DestinationOption::Rotate { max, style } => {
                spec.flags.rotate = true;
                if let Some(max) = max {
                    spec.file_max = *max;
                }
                if let Some(style) = style {
                    spec.style = *style;
                }
            }
            DestinationOption::Size(n) => spec.file_max = *n,
            DestinationOption::AllMax(n) => spec.all_max = *n,
            DestinationOption::Ttl(d) => spec.ttl_days = *d,
            DestinationOption::Period(s) => spec.period_secs = *s,
            DestinationOption::Style(s) => {
                spec.flags.rotate = true;
                spec.style = *s;
            }
            DestinationOption::Mode(mode) => spec.mode = *mode,
            DestinationOption::Uid(uid) => {
                if !spec.uids.contains(uid) {
                    spec.uids.push(*uid);
                }
            }
            DestinationOption::Gid(gid) => {
                if !spec.gids.contains(gid) {
                    spec.gids.push(*gid);
                }
            }
            DestinationOption::Coalesce(on) => spec.flags.coalesce = *on,
            DestinationOption::Compress => spec.flags.compress = true,
            DestinationOption::Format(f) => spec.format = f.clone(),
            DestinationOption::Dest(dir) => {
                spec.rotate_dir = resolve_path(config, ctx.module, dir)?;
            }
            DestinationOption::Soft => spec.flags.soft_write = true,
            DestinationOption::Crashlog => spec.flags.crashlog = true,
            DestinationOption::Basestamp => spec.flags.basestamp = true,
            DestinationOption::Extern => spec.flags.external = true,
        }
    }

    if spec.flags.crashlog {
        spec.flags.rotate = true;
        spec.flags.basestamp = true;
        spec.flags.coalesce = false;
    }
    if !spec.format.coalesces() {
        spec.flags.coalesce = false;
    }
    spec.flags.std_bsd_msg = spec.format.is_std_bsd_msg();

    if spec.flags.basestamp && spec.style == TimestampStyle::Sequence {
        spec.style = TimestampStyle::Seconds;
    }

    if kind == DestinationKind::AslDirectory {
        spec.flags.coalesce = false;
        spec.flags.compress = false;
        spec.flags.rotate = false;
        if spec.style == TimestampStyle::None {
            spec.style = TimestampStyle::LocalBasic;
        }
    } else if (spec.flags.rotate || spec.flags.basestamp) && spec.style == TimestampStyle::None {
        spec.style = TimestampStyle::Seconds;
    }
    if spec.style.is_dated() && spec.period_secs == 0 {
        spec.period_secs = DEFAULT_PERIOD_SECS;
    }

    let bare = opts.is_bare();
    Ok((action, spec, bare))
}
