//! 출력 엔진 통합 테스트
//!
//! - 크기 로테이션 시나리오 (testproc)
//! - 공유 목적지와 참조 카운트
//! - soft-write 실패 허용
//! - 보존 정책 (AllMax, TTL)
//! - 체크포인트 결과 (soft 로테이션 실패, 날짜 스타일 주기, 재로딩)
//! - 선형 재평가와의 동치성
//! - 규칙 출력/재파싱 왕복 (proptest)

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use proptest::prelude::*;

use logroute_core::TracingSink;
use logroute_core::types::{KEY_FACILITY, KEY_LEVEL, KEY_MESSAGE, KEY_SENDER, Message, MessageSource};
use logroute_output::rule::parse_line;
use logroute_output::{
    ActionKind, CheckpointReason, DestinationRegistry, Module, ModuleSource, OutputConfig,
    OutputConfigBuilder, Router, rule::ParseContext,
};

// =============================================================================
// 헬퍼
// =============================================================================

fn config(root: &Path) -> OutputConfig {
    OutputConfigBuilder::new()
        .log_root(root)
        .primary_module("main")
        .build()
        .expect("valid config")
}

fn router(root: &Path, modules: &[(&str, String)]) -> Router {
    let sources = modules
        .iter()
        .map(|(name, text)| ModuleSource::new(*name, text.clone()))
        .collect();
    Router::new(config(root), sources, Box::new(TracingSink))
}

fn message(sender: &str, text: &str) -> Message {
    Message::new(MessageSource::LocalSocket)
        .with(KEY_SENDER, sender)
        .with(KEY_MESSAGE, text)
}

fn archives(dir: &Path, base: &str) -> Vec<(String, u64)> {
    let prefix = format!("{base}.");
    let mut out: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .filter_map(Result::ok)
        .filter_map(|e| {
            let name = e.file_name().into_string().ok()?;
            name.starts_with(&prefix)
                .then(|| (name, e.metadata().map(|m| m.len()).unwrap_or(0)))
        })
        .collect();
    out.sort();
    out
}

fn file_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .map(|s| s.lines().map(str::to_owned).collect())
        .unwrap_or_default()
}

// =============================================================================
// 크기 로테이션 시나리오
// =============================================================================

#[test]
fn testproc_rotates_at_crossing_write() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("x.log");
    let rule = format!(
        "Sender testproc = store file [File {}] [Rotate 100]\n",
        path.display()
    );
    let mut r = router(tmp.path(), &[("main", rule)]);

    // [Time 1] [Sender testproc] [Message ab]\n == 40 bytes
    let record = |text: &str| message("testproc", text).with("Time", "1");
    assert_eq!(
        logroute_output::OutputFormat::Asl
            .format_record(&record("ab"), 0)
            .len(),
        40
    );

    r.route_at(&record("ab"), 1000);
    r.route_at(&record("ab"), 1000);
    assert_eq!(fs::metadata(&path).unwrap().len(), 80);
    assert!(archives(tmp.path(), "x.log").is_empty());

    let outcome = r.route_at(&record("ab"), 1000);
    assert!(outcome.failures.is_empty());
    assert_eq!(fs::metadata(&path).unwrap().len(), 40);
    assert_eq!(
        archives(tmp.path(), "x.log"),
        vec![("x.log.T1000".to_owned(), 80)]
    );

    let id = r.registry().find(&path).unwrap();
    assert_eq!(r.registry().get(id).unwrap().size(), 40);
}

#[test]
fn messages_from_other_senders_are_not_stored() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("x.log");
    let rule = format!("Sender testproc = store file [File {}]\n", path.display());
    let mut r = router(tmp.path(), &[("main", rule)]);
    let outcome = r.route_at(&message("other", "hello"), 0);
    assert_eq!(outcome.matched_rules, 0);
    assert!(!path.exists());
}

// =============================================================================
// 공유 목적지
// =============================================================================

#[test]
fn identical_destinations_share_one_instance() {
    let tmp = tempfile::tempdir().unwrap();
    let text = "Sender a = file shared.log [Format msg]\nSender b = file shared.log [Format msg]\n";
    let mut r = router(tmp.path(), &[("main", text.to_owned())]);

    assert_eq!(r.registry().len(), 1);
    let rules = &r.modules()[0].rules;
    assert_eq!(rules[0].destination, rules[1].destination);
    let id = rules[0].destination.unwrap();
    assert_eq!(r.registry().get(id).unwrap().refcount(), 2);

    r.route_at(&message("a", "from a"), 0);
    r.route_at(&message("b", "from b"), 0);
    assert_eq!(
        file_lines(&tmp.path().join("shared.log")),
        vec!["from a".to_owned(), "from b".to_owned()]
    );
}

#[test]
fn releasing_every_reference_frees_destination_once() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config(tmp.path());
    let mut registry = DestinationRegistry::new();
    let text = "* = file one.log\nSender x = file one.log\n> one.log\n";
    let mut module =
        Module::parse(ModuleSource::new("main", text), &config, &mut registry, 0).unwrap();

    let id = registry.find(&tmp.path().join("one.log")).unwrap();
    assert_eq!(registry.get(id).unwrap().refcount(), 3);

    module.release(&mut registry, 0);
    assert!(registry.is_empty());
    assert!(registry.get(id).is_none());

    // 이미 반환한 규칙은 다시 해제하지 않음
    module.release(&mut registry, 0);
    assert!(module.rules.iter().all(|r| r.destination.is_none()));
}

// =============================================================================
// soft-write
// =============================================================================

#[test]
fn soft_write_failures_do_not_stop_routing() {
    let tmp = tempfile::tempdir().unwrap();
    let blocker = tmp.path().join("blocker");
    fs::write(&blocker, "not a directory").unwrap();
    let bad = blocker.join("sub").join("x.log");

    let mut r = router(
        tmp.path(),
        &[
            ("main", format!("* = file {} [Soft]\n", bad.display())),
            ("later", format!("* = file {} [Format msg]\n", tmp.path().join("ok.log").display())),
        ],
    );

    let mut last_fails = 0;
    for n in 0..3 {
        let outcome = r.route_at(&message("app", &format!("m{n}")), 0);
        assert!(outcome.failures.is_empty());
        let dest = r.registry().get(r.registry().find(&bad).unwrap()).unwrap();
        assert!(dest.fails() > last_fails);
        last_fails = dest.fails();
    }
    assert_eq!(file_lines(&tmp.path().join("ok.log")), vec!["m0", "m1", "m2"]);
    assert_eq!(r.failing_destinations(), 1);
}

#[test]
fn hard_write_failures_are_reported_and_isolated() {
    let tmp = tempfile::tempdir().unwrap();
    let blocker = tmp.path().join("blocker");
    fs::write(&blocker, "").unwrap();
    let bad = blocker.join("x.log");

    let mut r = router(
        tmp.path(),
        &[(
            "main",
            format!("* = file {}\n* = file ok.log [Format msg]\n", bad.display()),
        )],
    );
    let outcome = r.route_at(&message("app", "still delivered"), 0);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].action, ActionKind::AppendFile);
    assert_eq!(file_lines(&tmp.path().join("ok.log")), vec!["still delivered"]);
}

// =============================================================================
// 보존 정책
// =============================================================================

#[test]
fn all_max_bounds_archived_total() {
    let tmp = tempfile::tempdir().unwrap();
    let mut r = router(
        tmp.path(),
        &[("main", "* = file r.log [Format msg] [Rotate 1K] [AllMax 25]\n".to_owned())],
    );

    // 각 파일은 이전 로테이션 시각에 열리므로 아카이브 이름이 겹치지 않음
    for (n, now) in [1000, 2000, 3000, 4000].into_iter().enumerate() {
        r.route_at(&message("app", &format!("record-{n}")), now - 500);
        assert_eq!(r.checkpoint_all_at(CheckpointReason::Force, now), 1);
        let total: u64 = archives(tmp.path(), "r.log").iter().map(|(_, s)| s).sum();
        assert!(total <= 25, "archived total {total}");
    }

    let left = archives(tmp.path(), "r.log");
    assert_eq!(left.len(), 2);
    let contents: Vec<String> = left
        .iter()
        .flat_map(|(name, _)| file_lines(&tmp.path().join(name)))
        .collect();
    assert!(contents.contains(&"record-3".to_owned()));
    assert!(!contents.contains(&"record-0".to_owned()));
}

#[test]
fn ttl_removes_expired_archives_on_time_checkpoint() {
    let tmp = tempfile::tempdir().unwrap();
    let mut r = router(
        tmp.path(),
        &[("main", "* = file t.log [Format msg] [Rotate 1K] [TTL 1]\n".to_owned())],
    );

    r.route_at(&message("app", "old"), 1000);
    assert_eq!(r.checkpoint_all_at(CheckpointReason::Force, 1000), 1);
    assert_eq!(archives(tmp.path(), "t.log").len(), 1);

    r.route_at(&message("app", "new"), 1000 + 86_400);
    assert_eq!(r.checkpoint_all_at(CheckpointReason::Time, 1000 + 2 * 86_400), 0);
    assert!(archives(tmp.path(), "t.log").is_empty());
    assert_eq!(file_lines(&tmp.path().join("t.log")), vec!["new"]);
}

#[test]
fn shutdown_does_not_rotate() {
    let tmp = tempfile::tempdir().unwrap();
    let mut r = router(
        tmp.path(),
        &[("main", "* = file s.log [Format msg] [Rotate 10]\n".to_owned())],
    );
    r.route_at(&message("app", "x"), 0);
    r.shutdown(0);
    assert!(archives(tmp.path(), "s.log").is_empty());
    assert_eq!(file_lines(&tmp.path().join("s.log")), vec!["x"]);
}

// =============================================================================
// 체크포인트 결과
// =============================================================================

#[test]
fn failed_soft_rotation_is_not_counted() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("blocker"), "").unwrap();
    let mut r = router(
        tmp.path(),
        &[(
            "main",
            "* = file x.log [Format msg] [Rotate 1K] [Soft] [Dest blocker/arch]\n".to_owned(),
        )],
    );
    let path = tmp.path().join("x.log");

    r.route_at(&message("app", "abc"), 0);
    assert_eq!(r.checkpoint_all_at(CheckpointReason::Force, 10), 0);

    let dest = r.registry().get(r.registry().find(&path).unwrap()).unwrap();
    assert_eq!(dest.fails(), 1);
    assert!(archives(tmp.path(), "x.log").is_empty());

    // 보관하지 못한 파일에 계속 이어 쓴다
    r.route_at(&message("app", "def"), 20);
    assert_eq!(file_lines(&path), vec!["abc", "def"]);
}

#[test]
fn dated_style_rolls_once_per_day_on_timer_ticks() {
    let tmp = tempfile::tempdir().unwrap();
    let mut r = router(
        tmp.path(),
        &[("main", "* = file d.log [Format msg] [Rotate utc]\n".to_owned())],
    );
    let opened = 1_333_726_200;
    r.route_at(&message("app", "today"), opened);

    for tick in 1..=5 {
        assert_eq!(r.checkpoint_all_at(CheckpointReason::Time, opened + tick * 60), 0);
    }
    assert!(archives(tmp.path(), "d.log").is_empty());

    assert_eq!(r.checkpoint_all_at(CheckpointReason::Time, opened + 86_400), 1);
    let archived = archives(tmp.path(), "d.log");
    assert_eq!(archived.len(), 1);
    assert_eq!(file_lines(&tmp.path().join(&archived[0].0)), vec!["today"]);
}

#[test]
fn reload_archives_rotating_files() {
    let tmp = tempfile::tempdir().unwrap();
    let rules = "* = file r.log [Format msg] [Rotate 1M]\n".to_owned();
    let mut r = router(tmp.path(), &[("main", rules.clone())]);
    r.route_at(&message("app", "before"), 500);

    let errors = r.reload_at(vec![ModuleSource::new("main", rules)], 600);
    assert!(errors.is_empty());
    r.route_at(&message("app", "after"), 600);
    r.shutdown(600);

    let archived = archives(tmp.path(), "r.log");
    assert_eq!(archived.len(), 1);
    assert_eq!(file_lines(&tmp.path().join(&archived[0].0)), vec!["before"]);
    assert_eq!(file_lines(&tmp.path().join("r.log")), vec!["after"]);
}

// =============================================================================
// 선형 재평가 동치성
// =============================================================================

const MAIN_RULES: &str = "\
Facility auth = claim
Sender a = file a.log [Format msg]
Level <= 3 = file urgent.log [Format msg]
Sender b = ignore
* = file all.log [Format msg]
";

const EXTRA_RULES: &str = "\
* = set Tag yes
Tag yes Sender c = file c.log [Format msg]
Sender b = skip
* = unset Tag
Tag exists = file leaked.log [Format msg]
* = file extra.log [Format msg]
";

/// 규칙을 순서대로 직접 평가해 메시지를 받아야 할 파일 경로를 계산합니다.
fn expected_paths(r: &Router, msg: &Message) -> BTreeSet<PathBuf> {
    let mut out = BTreeSet::new();
    'modules: for module in r.modules() {
        if !module.enabled {
            continue;
        }
        let mut working = msg.clone();
        for rule in &module.rules {
            let Some(query) = &rule.query else { continue };
            if !query.matches(&working) {
                continue;
            }
            match rule.action {
                ActionKind::Ignore | ActionKind::Skip => break,
                ActionKind::Claim => break 'modules,
                ActionKind::SetKey => working.set(rule.args[0].clone(), rule.args[1].clone()),
                ActionKind::UnsetKey => working.unset(&rule.args[0]),
                action if action.writes() => {
                    let dest = r.registry().get(rule.destination.unwrap()).unwrap();
                    out.insert(dest.spec().path.clone());
                }
                _ => {}
            }
        }
    }
    out
}

#[test]
fn routing_matches_linear_reevaluation() {
    let tmp = tempfile::tempdir().unwrap();
    let mut r = router(
        tmp.path(),
        &[("main", MAIN_RULES.to_owned()), ("extra", EXTRA_RULES.to_owned())],
    );
    assert_eq!(r.modules().len(), 2);
    let paths: Vec<PathBuf> = r.registry().iter().map(|(_, d)| d.spec().path.clone()).collect();

    let mut n = 0;
    for sender in ["a", "b", "c"] {
        for level in 0..8 {
            for facility in [None, Some("auth"), Some("user")] {
                n += 1;
                let text = format!("msg-{n}");
                let mut msg = message(sender, &text).with(KEY_LEVEL, level.to_string());
                if let Some(facility) = facility {
                    msg = msg.with(KEY_FACILITY, facility);
                }

                let expected = expected_paths(&r, &msg);
                r.route_at(&msg, 0);
                let actual: BTreeSet<PathBuf> = paths
                    .iter()
                    .filter(|p| file_lines(p).contains(&text))
                    .cloned()
                    .collect();
                assert_eq!(actual, expected, "{sender} level {level} {facility:?}");
            }
        }
    }

    assert!(!tmp.path().join("module/extra/leaked.log").exists());
    assert!(!file_lines(&tmp.path().join("module/extra/c.log")).is_empty());
}

// =============================================================================
// 출력/재파싱 왕복
// =============================================================================

fn parse_one(root: &Path, line: &str) -> Option<logroute_output::Rule> {
    let config = config(root);
    let mut registry = DestinationRegistry::new();
    let mut ctx = ParseContext {
        config: &config,
        module: "main",
        registry: &mut registry,
    };
    parse_line(&mut ctx, line).expect("line parses")
}

fn clause_strategy() -> impl Strategy<Value = String> {
    let key = "[A-Z][a-z]{0,6}";
    let value = "[a-z0-9]{1,8}";
    let op = prop::sample::select(vec![
        "", "== ", "!= ", "~= ", "*= ", "^= ", "$= ", "=~ ", "< ", "<= ", "> ", ">= ",
    ]);
    prop_oneof![
        (key, op, value).prop_map(|(k, op, v)| format!("{k} {op}{v}")),
        key.prop_map(|k| format!("{k} exists")),
        key.prop_map(|k| format!("{k} absent")),
    ]
}

fn query_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("*".to_owned()),
        prop::collection::vec(clause_strategy(), 1..4).prop_map(|c| c.join(" ")),
    ]
}

fn options_strategy() -> impl Strategy<Value = String> {
    prop::sample::subsequence(
        vec![
            "[Rotate 4K]",
            "[AllMax 1M]",
            "[TTL 3]",
            "[Mode 0600]",
            "[Format msg]",
            "[Style utc]",
            "[Compress]",
            "[Soft]",
            "[Uid 0]",
        ],
        0..4,
    )
    .prop_map(|o| o.join(" "))
}

fn action_strategy() -> impl Strategy<Value = String> {
    let word = "[a-z][a-z0-9]{0,7}";
    let control = prop_oneof![
        Just("ignore".to_owned()),
        Just("skip".to_owned()),
        Just("claim".to_owned()),
        Just("noop".to_owned()),
        Just("store".to_owned()),
    ];
    let external = prop_oneof![
        word.prop_map(|w| format!("notify {w}")),
        word.prop_map(|w| format!("broadcast {w}")),
        word.prop_map(|w| format!("forward {w}")),
        word.prop_map(|w| format!("control {w}")),
        (word, word).prop_map(|(k, v)| format!("set {k} {v}")),
        word.prop_map(|w| format!("unset {w}")),
        (0u32..1000, 0u32..1000).prop_map(|(u, g)| format!("access {u} {g}")),
    ];
    let writes = prop_oneof![
        (word, options_strategy()).prop_map(|(w, o)| format!("file {w}.log {o}")),
        (word, options_strategy()).prop_map(|(w, o)| format!("store file {w}.asl {o}")),
        (word, options_strategy()).prop_map(|(w, o)| format!("store directory {w} {o}")),
    ];
    prop_oneof![control, external, writes]
}

proptest! {
    #[test]
    fn printed_rules_reparse_to_the_same_rule(query in query_strategy(), action in action_strategy()) {
        let tmp = tempfile::tempdir().unwrap();
        let line = format!("{query} = {action}");
        let first = parse_one(tmp.path(), &line).unwrap();
        let printed = first.to_string();
        let second = parse_one(tmp.path(), &printed).unwrap();
        prop_assert_eq!(&first, &second, "{} -> {}", line, printed);
        prop_assert_eq!(printed, second.to_string());
    }
}
