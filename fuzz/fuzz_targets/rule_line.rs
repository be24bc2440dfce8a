#![no_main]

use libfuzzer_sys::fuzz_target;
use logroute_output::rule::{ParseContext, parse_line};
use logroute_output::{DestinationRegistry, OutputConfigBuilder};

fuzz_target!(|data: &[u8]| {
    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(config) = OutputConfigBuilder::new()
        .log_root("/tmp/logroute-fuzz")
        .primary_module("main")
        .build()
    else {
        return;
    };

    // 목적지는 지연 열기이므로 파싱만으로는 파일이 생기지 않음
    let mut registry = DestinationRegistry::new();
    let mut ctx = ParseContext {
        config: &config,
        module: "main",
        registry: &mut registry,
    };
    if let Ok(Some(rule)) = parse_line(&mut ctx, line) {
        // 출력한 규칙은 다시 파싱되어야 함
        let printed = rule.to_string();
        let mut registry = DestinationRegistry::new();
        let mut ctx = ParseContext {
            config: &config,
            module: "main",
            registry: &mut registry,
        };
        let _ = parse_line(&mut ctx, &printed);
    }
});
