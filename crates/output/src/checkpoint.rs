//! 체크포인트 -- 로테이션과 보존 정책
//!
//! [`Destination::checkpoint`]는 사유에 따라 현재 파일을 아카이브로 굴리고,
//! 그 뒤 보존 정책(ttl, all_max)을 적용합니다.
//!
//! | 사유    | 조건                                                        |
//! |---------|-------------------------------------------------------------|
//! | `Force` | 현재 파일이 있으면                                          |
//! | `Size`  | `file_max > 0` 이고 크기 > 0                                |
//! | `Test`  | `size >= file_max > 0` 또는 주기 경과                       |
//! | `Time`  | 시간 스타일 목적지, 크기 > 0, 주기 경과                     |
//! | `Crash` | crashlog 목적지만                                           |
//!
//! soft-write 목적지에서 아카이브 생성이 실패하면 굴리지 않은 것으로 보고합니다.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;

use logroute_core::metrics as m;

use crate::destination::naming::{self, TimestampStyle};
use crate::destination::{DEFAULT_PERIOD_SECS, Destination, DestinationState, ListRole, list_files};
use crate::error::OutputError;

/// 체크포인트 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckpointReason {
    /// 조건 검사 (크기 또는 주기)
    Test,
    /// 무조건
    Force,
    /// 크기 초과 직전
    Size,
    /// 주기 타이머
    Time,
    /// 크래시 알림
    Crash,
}

impl CheckpointReason {
    /// 메트릭 라벨용 이름
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::Force => "force",
            Self::Size => "size",
            Self::Time => "time",
            Self::Crash => "crash",
        }
    }
}

impl fmt::Display for CheckpointReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Destination {
    /// 설정된 주기. 주기 없는 시간 스타일 목적지는 하루입니다.
    fn effective_period(&self) -> u64 {
        match self.spec().period_secs {
            0 => DEFAULT_PERIOD_SECS,
            secs => secs,
        }
    }

    fn period_elapsed(&self, now: i64) -> bool {
        let period = i64::try_from(self.effective_period()).unwrap_or(i64::MAX);
        now - self.stamp >= period
    }

    fn is_time_styled(&self) -> bool {
        let spec = self.spec();
        spec.style.is_dated() || spec.is_directory() || spec.period_secs > 0
    }

    /// 사유에 따라 굴려야 하는지 판단합니다.
    pub fn should_roll(&self, reason: CheckpointReason, now: i64) -> bool {
        let spec = self.spec();
        if !spec.rolls() {
            return false;
        }
        let has_file = self
            .current_path
            .as_deref()
            .is_some_and(|p| p.exists());

        match reason {
            CheckpointReason::Crash => spec.flags.crashlog && has_file,
            CheckpointReason::Force => has_file,
            CheckpointReason::Size => spec.file_max > 0 && self.size > 0,
            CheckpointReason::Test => {
                (spec.file_max > 0 && self.size >= spec.file_max)
                    || (spec.period_secs > 0 && self.size > 0 && self.period_elapsed(now))
            }
            CheckpointReason::Time => {
                self.is_time_styled() && self.size > 0 && self.period_elapsed(now)
            }
        }
    }

    /// 체크포인트를 수행합니다. 굴렸으면 `true`를 반환합니다.
    ///
    /// `Time` 체크포인트는 굴리지 않더라도 보존 정책을 적용합니다.
    pub fn checkpoint(&mut self, reason: CheckpointReason, now: i64) -> Result<bool, OutputError> {
        if self.state == DestinationState::Rotating {
            return Err(OutputError::State(format!(
                "checkpoint of {} while rotating",
                self.spec().path.display()
            )));
        }

        if self.current_path.is_none() && self.spec().rolls() {
            // 디스크에 남아 있는 현재 파일의 크기와 스탬프를 얻기 위해 연다
            let existing = self.spec().current_path(now);
            if !self.spec().is_stamped() && existing.exists() {
                self.ensure_open(now)?;
            }
        }

        let rolled = self.should_roll(reason, now) && self.roll(now)?;
        if rolled {
            metrics::counter!(m::OUTPUT_ROTATIONS_TOTAL, m::LABEL_REASON => reason.as_str())
                .increment(1);
            tracing::info!(
                path = %self.spec().path.display(),
                reason = %reason,
                "destination rotated"
            );
        }

        if rolled || reason == CheckpointReason::Time {
            self.apply_retention(now);
        }
        Ok(rolled)
    }

    /// 현재 파일을 아카이브로 옮기고 새 파일을 엽니다.
    ///
    /// 아카이브 실패가 soft-write로 허용되면 `false`를 반환하고 현재 파일은 그대로 둡니다.
    fn roll(&mut self, now: i64) -> Result<bool, OutputError> {
        if let Err(e) = self.flush_pending(now) {
            tracing::warn!(path = %self.spec().path.display(), error = %e, "flush before rotation failed");
        }
        self.close();
        self.state = DestinationState::Rotating;

        let result = if self.spec().is_stamped() {
            // 다음 열기에서 새 스탬프 이름을 사용
            Ok(())
        } else {
            self.archive_current(now)
        };

        self.state = DestinationState::Closed;
        self.size = 0;
        match result {
            Ok(()) => {
                if !self.spec().is_stamped() {
                    self.ensure_open(now)?;
                }
                Ok(true)
            }
            Err(e) => self.io_failure("rotate", e).map(|()| false),
        }
    }

    fn archive_current(&mut self, now: i64) -> io::Result<()> {
        let spec = self.spec().clone();
        let current = spec.path.clone();
        if !current.exists() {
            return Ok(());
        }
        let base = spec.base_name();
        fs::create_dir_all(&spec.rotate_dir)?;

        let target = if spec.style == TimestampStyle::Sequence {
            let next = list_files(&spec.rotate_dir, &base, ListRole::Destination, spec.style)?
                .iter()
                .filter_map(|e| e.seq)
                .max()
                .map_or(0, |s| s.saturating_add(1));
            spec.rotate_dir
                .join(naming::archive_name(&base, &next.to_string(), false))
        } else {
            let mut stamp = if self.stamp > 0 { self.stamp } else { now };
            loop {
                let name = naming::make_stamp(spec.style, stamp);
                let plain = spec.rotate_dir.join(naming::archive_name(&base, &name, false));
                let gz = spec.rotate_dir.join(naming::archive_name(&base, &name, true));
                if !plain.exists() && !gz.exists() {
                    break plain;
                }
                stamp += 1;
            }
        };

        fs::rename(&current, &target)?;
        if spec.flags.compress {
            compress(&target)?;
        }
        Ok(())
    }

    /// 보존 정책을 적용합니다. 실패는 로그만 남깁니다.
    pub fn apply_retention(&mut self, now: i64) {
        if let Err(e) = self.prune(now) {
            let err = OutputError::Retention {
                path: self.spec().rotate_dir.display().to_string(),
                reason: e.to_string(),
            };
            tracing::warn!(error = %err, "retention failed");
        }
    }

    fn prune(&self, now: i64) -> io::Result<()> {
        let spec = self.spec();
        if spec.ttl_days == 0 && spec.all_max == 0 {
            return Ok(());
        }
        let style = if spec.style == TimestampStyle::None {
            TimestampStyle::Seconds
        } else {
            spec.style
        };
        let current_name = self
            .current_path
            .as_deref()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned());

        let mut entries: Vec<_> =
            list_files(&spec.rotate_dir, &spec.base_name(), ListRole::Destination, style)?
                .into_iter()
                .filter(|e| Some(&e.name) != current_name.as_ref())
                .collect();

        let mut removed = 0u64;
        if spec.ttl_days > 0 {
            let cutoff = now - i64::from(spec.ttl_days) * 86_400;
            let (expired, kept): (Vec<_>, Vec<_>) =
                entries.into_iter().partition(|e| e.timestamp < cutoff);
            for entry in expired {
                remove_archive(&spec.rotate_dir.join(&entry.name))?;
                removed += 1;
            }
            entries = kept;
        }

        if spec.all_max > 0 {
            let mut total: u64 = entries.iter().map(|e| e.size).sum();
            for entry in &entries {
                if total <= spec.all_max {
                    break;
                }
                remove_archive(&spec.rotate_dir.join(&entry.name))?;
                total = total.saturating_sub(entry.size);
                removed += 1;
            }
        }

        if removed > 0 {
            metrics::counter!(m::OUTPUT_ARCHIVES_PRUNED_TOTAL).increment(removed);
            tracing::debug!(dir = %spec.rotate_dir.display(), removed, "pruned archives");
        }
        Ok(())
    }
}

fn remove_archive(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// 아카이브를 gzip으로 압축하고 원본을 삭제합니다.
fn compress(path: &Path) -> io::Result<PathBuf> {
    let mut gz_name = path.as_os_str().to_owned();
    gz_name.push(".gz");
    let gz_path = PathBuf::from(gz_name);

    let mut input = BufReader::new(File::open(path)?);
    let output = File::create(&gz_path)?;
    if let Ok(meta) = fs::metadata(path) {
        let _ = output.set_permissions(meta.permissions());
    }
    let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?;
    fs::remove_file(path)?;
    Ok(gz_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::{DestinationKind, DestinationSpec};
    use crate::format::OutputFormat;
    use std::io::Read;

    fn rotating(dir: &Path, file_max: u64) -> Destination {
        let mut spec = DestinationSpec::new(dir.join("x.log"), DestinationKind::Text, 7);
        spec.format = OutputFormat::Msg;
        spec.flags.rotate = true;
        spec.style = TimestampStyle::Seconds;
        spec.file_max = file_max;
        Destination::new(spec)
    }

    fn names(dir: &Path) -> Vec<String> {
        let mut v: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        v.sort();
        v
    }

    #[test]
    fn rotates_on_the_crossing_write() {
        let tmp = tempfile::tempdir().unwrap();
        let mut dst = rotating(tmp.path(), 100);
        let record = format!("{}\n", "a".repeat(39));

        dst.deliver(&record, 1000, 30).unwrap();
        dst.deliver(&record, 1001, 30).unwrap();
        assert_eq!(names(tmp.path()), vec!["x.log"]);
        dst.deliver(&record, 1002, 30).unwrap();

        assert_eq!(names(tmp.path()), vec!["x.log", "x.log.T1000"]);
        assert_eq!(fs::metadata(tmp.path().join("x.log")).unwrap().len(), 40);
        assert_eq!(fs::metadata(tmp.path().join("x.log.T1000")).unwrap().len(), 80);
        assert_eq!(dst.state(), DestinationState::Open);
    }

    #[test]
    fn non_rotating_destinations_never_roll() {
        let tmp = tempfile::tempdir().unwrap();
        let mut spec = DestinationSpec::new(tmp.path().join("x.log"), DestinationKind::Text, 7);
        spec.format = OutputFormat::Msg;
        let mut dst = Destination::new(spec);
        dst.deliver("abc\n", 1, 30).unwrap();
        assert!(!dst.checkpoint(CheckpointReason::Force, 2).unwrap());
        assert_eq!(names(tmp.path()), vec!["x.log"]);
    }

    #[test]
    fn force_requires_a_current_file() {
        let tmp = tempfile::tempdir().unwrap();
        let mut dst = rotating(tmp.path(), 0);
        assert!(!dst.checkpoint(CheckpointReason::Force, 5).unwrap());
        dst.deliver("abc\n", 5, 30).unwrap();
        assert!(dst.checkpoint(CheckpointReason::Force, 6).unwrap());
        assert_eq!(names(tmp.path()), vec!["x.log", "x.log.T5"]);
    }

    #[test]
    fn test_reason_checks_size() {
        let tmp = tempfile::tempdir().unwrap();
        let mut dst = rotating(tmp.path(), 4);
        dst.deliver("abc\n", 5, 30).unwrap();
        assert!(dst.should_roll(CheckpointReason::Test, 5));
        let mut small = rotating(tmp.path(), 100);
        small.deliver("abc\n", 5, 30).unwrap();
        assert!(!small.should_roll(CheckpointReason::Test, 5));
    }

    #[test]
    fn crash_only_for_crashlog() {
        let tmp = tempfile::tempdir().unwrap();
        let mut dst = rotating(tmp.path(), 0);
        dst.deliver("abc\n", 5, 30).unwrap();
        assert!(!dst.checkpoint(CheckpointReason::Crash, 6).unwrap());
    }

    #[test]
    fn basestamp_destinations_start_a_new_stamped_file() {
        let tmp = tempfile::tempdir().unwrap();
        let mut spec = DestinationSpec::new(tmp.path().join("c.log"), DestinationKind::Text, 7);
        spec.format = OutputFormat::Msg;
        spec.flags.rotate = true;
        spec.flags.basestamp = true;
        spec.flags.crashlog = true;
        spec.style = TimestampStyle::Seconds;
        let mut dst = Destination::new(spec);

        dst.deliver("one\n", 10, 30).unwrap();
        assert!(dst.checkpoint(CheckpointReason::Crash, 10).unwrap());
        assert_eq!(dst.state(), DestinationState::Closed);
        dst.deliver("two\n", 10, 30).unwrap();
        assert_eq!(names(tmp.path()), vec!["c.log.T10", "c.log.T11"]);
    }

    #[test]
    fn sequence_archives_count_up() {
        let tmp = tempfile::tempdir().unwrap();
        let mut dst = rotating(tmp.path(), 0);
        let mut spec = dst.spec().clone();
        spec.style = TimestampStyle::Sequence;
        dst = Destination::new(spec);

        for t in 0..3 {
            dst.deliver("abc\n", t, 30).unwrap();
            dst.checkpoint(CheckpointReason::Force, t).unwrap();
        }
        assert_eq!(names(tmp.path()), vec!["x.log", "x.log.0", "x.log.1", "x.log.2"]);
    }

    #[test]
    fn colliding_stamps_are_bumped() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("x.log.T7"), b"old").unwrap();
        let mut dst = rotating(tmp.path(), 0);
        dst.deliver("abc\n", 7, 30).unwrap();
        dst.checkpoint(CheckpointReason::Force, 7).unwrap();
        assert_eq!(names(tmp.path()), vec!["x.log", "x.log.T7", "x.log.T8"]);
    }

    #[test]
    fn compressed_archives_are_gzip() {
        let tmp = tempfile::tempdir().unwrap();
        let mut dst = rotating(tmp.path(), 0);
        let mut spec = dst.spec().clone();
        spec.flags.compress = true;
        dst = Destination::new(spec);

        dst.deliver("hello\n", 3, 30).unwrap();
        dst.checkpoint(CheckpointReason::Force, 3).unwrap();
        assert_eq!(names(tmp.path()), vec!["x.log", "x.log.T3.gz"]);

        let file = File::open(tmp.path().join("x.log.T3.gz")).unwrap();
        let mut text = String::new();
        flate2::read::GzDecoder::new(file)
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "hello\n");
    }

    #[test]
    fn retention_applies_ttl_then_all_max() {
        let tmp = tempfile::tempdir().unwrap();
        let day = 86_400;
        let now = 100 * day;
        fs::write(tmp.path().join(format!("x.log.T{}", now - 10 * day)), vec![0; 10]).unwrap();
        fs::write(tmp.path().join(format!("x.log.T{}", now - 3 * day)), vec![0; 10]).unwrap();
        fs::write(tmp.path().join(format!("x.log.T{}", now - 2 * day)), vec![0; 10]).unwrap();
        fs::write(tmp.path().join(format!("x.log.T{}", now - day)), vec![0; 10]).unwrap();

        let mut dst = rotating(tmp.path(), 0);
        let mut spec = dst.spec().clone();
        spec.ttl_days = 7;
        spec.all_max = 25;
        dst = Destination::new(spec);

        dst.checkpoint(CheckpointReason::Time, now).unwrap();
        assert_eq!(
            names(tmp.path()),
            vec![
                format!("x.log.T{}", now - 2 * day),
                format!("x.log.T{}", now - day)
            ]
        );
    }

    #[test]
    fn time_checkpoint_rolls_dated_styles_once_per_period() {
        let tmp = tempfile::tempdir().unwrap();
        let mut dst = rotating(tmp.path(), 0);
        let mut spec = dst.spec().clone();
        spec.style = TimestampStyle::UtcBasic;
        dst = Destination::new(spec);

        assert!(!dst.checkpoint(CheckpointReason::Time, 10).unwrap());
        let opened = 1_333_726_200;
        dst.deliver("abc\n", opened, 30).unwrap();
        for tick in 1..=5 {
            assert!(!dst.checkpoint(CheckpointReason::Time, opened + tick * 60).unwrap());
        }
        assert_eq!(names(tmp.path()), vec!["x.log"]);

        assert!(dst.checkpoint(CheckpointReason::Time, opened + 86_400).unwrap());
        assert_eq!(names(tmp.path()), vec!["x.log", "x.log.20120406T153000Z"]);
    }

    #[test]
    fn explicit_period_overrides_the_default() {
        let tmp = tempfile::tempdir().unwrap();
        let mut dst = rotating(tmp.path(), 0);
        let mut spec = dst.spec().clone();
        spec.style = TimestampStyle::Utc;
        spec.period_secs = 3600;
        dst = Destination::new(spec);

        dst.deliver("abc\n", 7200, 30).unwrap();
        assert!(!dst.checkpoint(CheckpointReason::Time, 7260).unwrap());
        assert!(dst.checkpoint(CheckpointReason::Time, 10_800).unwrap());
    }

    #[test]
    fn failed_soft_rotation_is_not_reported_as_rolled() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        let mut dst = rotating(tmp.path(), 0);
        let mut spec = dst.spec().clone();
        spec.flags.soft_write = true;
        spec.rotate_dir = blocker.join("arch");
        dst = Destination::new(spec);

        dst.deliver("abc\n", 5, 30).unwrap();
        assert!(!dst.checkpoint(CheckpointReason::Force, 6).unwrap());
        assert_eq!(dst.fails(), 1);
        assert_eq!(names(tmp.path()), vec!["blocker", "x.log"]);
        assert_eq!(fs::read_to_string(tmp.path().join("x.log")).unwrap(), "abc\n");

        // 다음 쓰기는 기존 파일에 이어서 기록
        dst.deliver("def\n", 7, 30).unwrap();
        assert_eq!(fs::read_to_string(tmp.path().join("x.log")).unwrap(), "abc\ndef\n");
    }

    #[test]
    fn failed_hard_rotation_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        let mut dst = rotating(tmp.path(), 0);
        let mut spec = dst.spec().clone();
        spec.rotate_dir = blocker.join("arch");
        dst = Destination::new(spec);

        dst.deliver("abc\n", 5, 30).unwrap();
        assert!(dst.checkpoint(CheckpointReason::Force, 6).is_err());
        assert_eq!(dst.fails(), 1);
    }
}
