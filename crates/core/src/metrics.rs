//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `logroute_`
//! - 모듈명: `output_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 모듈 레이블 키
pub const LABEL_MODULE: &str = "module";

/// 액션 레이블 키 (store_file, notify, forward ...)
pub const LABEL_ACTION: &str = "action";

/// 체크포인트 사유 레이블 키 (test, force, size, time, crash)
pub const LABEL_REASON: &str = "reason";

// ─── Output 메트릭 ─────────────────────────────────────────────────

/// Output: 라우팅된 메시지 수 (counter)
pub const OUTPUT_MESSAGES_ROUTED_TOTAL: &str = "logroute_output_messages_routed_total";

/// Output: claim 으로 후속 모듈에서 제외된 메시지 수 (counter)
pub const OUTPUT_MESSAGES_CLAIMED_TOTAL: &str = "logroute_output_messages_claimed_total";

/// Output: 규칙 매칭 수 (counter, label: module)
pub const OUTPUT_RULE_MATCHES_TOTAL: &str = "logroute_output_rule_matches_total";

/// Output: 실패한 액션 수 (counter, label: action)
pub const OUTPUT_ACTION_FAILURES_TOTAL: &str = "logroute_output_action_failures_total";

/// Output: 목적지에 기록된 바이트 수 (counter)
pub const OUTPUT_BYTES_WRITTEN_TOTAL: &str = "logroute_output_bytes_written_total";

/// Output: 수행된 로테이션 수 (counter, label: reason)
pub const OUTPUT_ROTATIONS_TOTAL: &str = "logroute_output_rotations_total";

/// Output: 보존 정책으로 삭제된 아카이브 수 (counter)
pub const OUTPUT_ARCHIVES_PRUNED_TOTAL: &str = "logroute_output_archives_pruned_total";

/// Output: 등록된 목적지 수 (gauge)
pub const OUTPUT_DESTINATIONS_ACTIVE: &str = "logroute_output_destinations_active";

/// Output: 로드된 모듈 수 (gauge)
pub const OUTPUT_MODULES_LOADED: &str = "logroute_output_modules_loaded";

/// Output: 메시지 1건 라우팅 소요 시간 (histogram, 초)
pub const OUTPUT_ROUTE_DURATION_SECONDS: &str = "logroute_output_route_duration_seconds";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "logroute_daemon_uptime_seconds";

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "logroute_daemon_build_info";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 라우팅 지연 시간 히스토그램 버킷 (초)
pub const ROUTE_DURATION_BUCKETS: [f64; 10] = [
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 1.0,
];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(
        OUTPUT_MESSAGES_ROUTED_TOTAL,
        "Total number of messages passed through the router"
    );
    describe_counter!(
        OUTPUT_MESSAGES_CLAIMED_TOTAL,
        "Total number of messages claimed by a module"
    );
    describe_counter!(
        OUTPUT_RULE_MATCHES_TOTAL,
        "Total number of rule matches per module"
    );
    describe_counter!(
        OUTPUT_ACTION_FAILURES_TOTAL,
        "Total number of failed rule actions"
    );
    describe_counter!(
        OUTPUT_BYTES_WRITTEN_TOTAL,
        "Total bytes written to file destinations"
    );
    describe_counter!(
        OUTPUT_ROTATIONS_TOTAL,
        "Total number of destination rotations by checkpoint reason"
    );
    describe_counter!(
        OUTPUT_ARCHIVES_PRUNED_TOTAL,
        "Total number of archived files removed by retention"
    );
    describe_gauge!(
        OUTPUT_DESTINATIONS_ACTIVE,
        "Number of destinations currently registered"
    );
    describe_gauge!(OUTPUT_MODULES_LOADED, "Number of output modules loaded");
    describe_histogram!(
        OUTPUT_ROUTE_DURATION_SECONDS,
        "Time to route a single message in seconds"
    );

    describe_gauge!(DAEMON_UPTIME_SECONDS, "logroute daemon uptime in seconds");
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        OUTPUT_MESSAGES_ROUTED_TOTAL,
        OUTPUT_MESSAGES_CLAIMED_TOTAL,
        OUTPUT_RULE_MATCHES_TOTAL,
        OUTPUT_ACTION_FAILURES_TOTAL,
        OUTPUT_BYTES_WRITTEN_TOTAL,
        OUTPUT_ROTATIONS_TOTAL,
        OUTPUT_ARCHIVES_PRUNED_TOTAL,
        OUTPUT_DESTINATIONS_ACTIVE,
        OUTPUT_MODULES_LOADED,
        OUTPUT_ROUTE_DURATION_SECONDS,
        DAEMON_UPTIME_SECONDS,
        DAEMON_BUILD_INFO,
    ];

    #[test]
    fn all_metrics_start_with_logroute_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("logroute_"),
                "Metric '{}' does not start with 'logroute_' prefix",
                name
            );
        }
    }

    #[test]
    fn counters_end_with_total() {
        for name in ALL_METRIC_NAMES.iter().filter(|n| n.contains("_total")) {
            assert!(name.ends_with("_total"));
        }
    }

    #[test]
    fn describe_all_does_not_panic() {
        describe_all();
    }

    #[test]
    fn route_duration_buckets_are_sorted() {
        let buckets = ROUTE_DURATION_BUCKETS;
        for i in 1..buckets.len() {
            assert!(buckets[i] > buckets[i - 1]);
        }
    }
}
