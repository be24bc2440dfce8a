//! 아카이브 목록 조회
//!
//! [`list_files`]는 디렉토리에서 `base.stamp[.gz]` 형태의 파일을 찾아
//! 정렬된 [`FileListEntry`] 목록을 반환합니다.
//!
//! - [`ListRole::Destination`]: 삭제 순서 (오래된 것 먼저). 순번 스타일은 순번 순.
//! - [`ListRole::Source`]: 최신 것 먼저. `.gz`는 제외하고, 설정 스타일과 관계없이
//!   초 단위 스탬프를 허용합니다.

use std::fs;
use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

use crate::destination::naming::{StampKind, TimestampStyle, parse_stamp, split_archive_name};

/// 목록 조회 용도
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListRole {
    /// 다른 곳으로 옮겨질 원본 파일
    Source,
    /// 보존 정책 적용 대상 아카이브
    Destination,
}

/// 아카이브 파일 항목
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileListEntry {
    /// 파일 이름 (디렉토리 제외)
    pub name: String,
    /// 스탬프 시각 (순번 스탬프는 파일 수정 시각)
    pub timestamp: i64,
    /// 순번 스탬프
    pub seq: Option<u32>,
    /// 바이트 크기
    pub size: u64,
}

/// 디렉토리에서 `base`의 아카이브 목록을 조회합니다. 디렉토리가 없으면 빈 목록입니다.
pub fn list_files(
    dir: &Path,
    base: &str,
    role: ListRole,
    style: TimestampStyle,
) -> io::Result<Vec<FileListEntry>> {
    let read_dir = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let expected = style.stamp_kind();
    let mut out = Vec::new();

    for entry in read_dir {
        let entry = entry?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        let Some(stamp) = split_archive_name(&name, base, role == ListRole::Destination) else {
            continue;
        };
        let Some(parsed) = parse_stamp(stamp, style) else {
            continue;
        };

        let accepted = Some(parsed.kind) == expected
            || (role == ListRole::Source && parsed.kind == StampKind::Seconds);
        if !accepted {
            continue;
        }

        let meta = match entry.metadata() {
            Ok(m) if m.is_file() => m,
            _ => continue,
        };
        let timestamp = match parsed.time {
            Some(t) => t,
            None => meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
                .unwrap_or(0),
        };

        out.push(FileListEntry {
            name,
            timestamp,
            seq: parsed.seq,
            size: meta.len(),
        });
    }

    if style == TimestampStyle::Sequence {
        out.sort_by(|a, b| a.seq.cmp(&b.seq).then_with(|| a.name.cmp(&b.name)));
    } else {
        out.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.seq.cmp(&b.seq))
                .then_with(|| a.name.cmp(&b.name))
        });
    }
    if role == ListRole::Source {
        out.reverse();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str, len: usize) {
        fs::write(dir.join(name), vec![b'x'; len]).unwrap();
    }

    #[test]
    fn missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let list = list_files(
            &dir.path().join("nope"),
            "a.log",
            ListRole::Destination,
            TimestampStyle::Seconds,
        )
        .unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn destination_role_is_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.log", 5);
        touch(dir.path(), "a.log.T300", 3);
        touch(dir.path(), "a.log.T100.gz", 1);
        touch(dir.path(), "a.log.T200", 2);
        touch(dir.path(), "b.log.T50", 2);
        touch(dir.path(), "a.log.junk", 2);

        let list = list_files(
            dir.path(),
            "a.log",
            ListRole::Destination,
            TimestampStyle::Seconds,
        )
        .unwrap();
        let names: Vec<_> = list.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.log.T100.gz", "a.log.T200", "a.log.T300"]);
        assert_eq!(list[1].size, 2);
        assert_eq!(list[0].timestamp, 100);
    }

    #[test]
    fn source_role_is_newest_first_and_skips_gz() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.log.T100", 1);
        touch(dir.path(), "a.log.T200.gz", 1);
        touch(dir.path(), "a.log.2012-04-06T15:30:00Z", 1);

        let list = list_files(dir.path(), "a.log", ListRole::Source, TimestampStyle::Utc).unwrap();
        let names: Vec<_> = list.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.log.2012-04-06T15:30:00Z", "a.log.T100"]);
    }

    #[test]
    fn style_mismatch_is_rejected_for_destinations() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.log.T100", 1);
        touch(dir.path(), "a.log.20120406T153000Z", 1);

        let list =
            list_files(dir.path(), "a.log", ListRole::Destination, TimestampStyle::UtcBasic)
                .unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "a.log.20120406T153000Z");
    }

    #[test]
    fn sequence_entries_sort_by_number() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.log.10", 1);
        touch(dir.path(), "a.log.2", 1);
        touch(dir.path(), "a.log.0.gz", 1);

        let list =
            list_files(dir.path(), "a.log", ListRole::Destination, TimestampStyle::Sequence)
                .unwrap();
        let seqs: Vec<_> = list.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![Some(0), Some(2), Some(10)]);
    }
}
