//! 출력 목적지 -- 명세, 런타임 상태, 참조 카운트 레지스트리
//!
//! [`DestinationSpec`]은 규칙 파싱 시 확정되는 불변 속성이고,
//! [`Destination`]은 첫 쓰기 또는 체크포인트에서 열리는 런타임 인스턴스입니다.
//! 같은 경로를 가리키는 규칙들은 [`DestinationRegistry`]를 통해
//! 하나의 인스턴스를 공유합니다.
//!
//! # 상태 전이
//! ```text
//! Closed -> Open -> Rotating -> Open -> Closed
//! ```

pub mod access;
pub mod files;
pub mod naming;
pub mod registry;

pub use files::{FileListEntry, ListRole, list_files};
pub use naming::TimestampStyle;
pub use registry::{DestinationId, DestinationRegistry};

use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use logroute_core::metrics as m;

use crate::error::OutputError;
use crate::format::{OutputFormat, repeat_line};

/// 파일 목적지 기본 권한
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// 디렉토리 목적지 기본 권한
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// 디렉토리와 날짜 스타일 목적지의 기본 교체 주기 (초)
pub const DEFAULT_PERIOD_SECS: u64 = 86_400;

/// 목적지 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DestinationKind {
    /// 텍스트 파일 (`file`)
    Text,
    /// 레코드 파일 (`store file`)
    AslFile,
    /// 기간별 레코드 파일 디렉토리 (`store dir`)
    AslDirectory,
}

impl DestinationKind {
    /// 출력용 이름
    pub fn name(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::AslFile => "asl-file",
            Self::AslDirectory => "asl-directory",
        }
    }
}

/// 목적지 플래그
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DestinationFlags {
    /// 크기/시간 기반 로테이션
    pub rotate: bool,
    /// 중복 메시지 요약
    pub coalesce: bool,
    /// 로테이션된 아카이브 gzip 압축
    pub compress: bool,
    /// 다른 프로세스가 기록하는 파일
    pub external: bool,
    /// 현재 파일 이름에도 스탬프를 붙임
    pub basestamp: bool,
    /// 크래시 체크포인트 대상
    pub crashlog: bool,
    /// 쓰기 실패를 로그로만 남김
    pub soft_write: bool,
    /// 표준 로그 루트 밖의 디렉토리
    pub nonstd_dir: bool,
    /// `std`/`bsd`/`msg` 형식
    pub std_bsd_msg: bool,
}

impl DestinationFlags {
    /// 설정된 플래그 이름 목록
    pub fn names(&self) -> Vec<&'static str> {
        [
            (self.rotate, "rotate"),
            (self.coalesce, "coalesce"),
            (self.compress, "compress"),
            (self.external, "external"),
            (self.basestamp, "basestamp"),
            (self.crashlog, "crashlog"),
            (self.soft_write, "soft"),
            (self.nonstd_dir, "nonstd_dir"),
            (self.std_bsd_msg, "std_bsd_msg"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect()
    }
}

/// 목적지의 확정된 속성
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DestinationSpec {
    /// 해석된 경로 (디렉토리 목적지는 디렉토리)
    pub path: PathBuf,
    /// 아카이브 디렉토리
    pub rotate_dir: PathBuf,
    /// 종류
    pub kind: DestinationKind,
    /// 레코드 형식
    pub format: OutputFormat,
    /// 아카이브 스탬프 스타일
    pub style: TimestampStyle,
    /// 파일 최대 크기 (0 = 제한 없음)
    pub file_max: u64,
    /// 아카이브 전체 최대 크기 (0 = 제한 없음)
    pub all_max: u64,
    /// 아카이브 보존 기간 (일, 0 = 무기한)
    pub ttl_days: u32,
    /// 시간 기반 교체 주기 (초, 0 = 매 타이머)
    pub period_secs: u64,
    /// 파일 권한
    pub mode: u32,
    /// 소유자 목록 (첫 항목이 파일 소유자)
    pub uids: Vec<u32>,
    /// 그룹 목록 (첫 항목이 파일 그룹)
    pub gids: Vec<u32>,
    /// 플래그
    pub flags: DestinationFlags,
}

impl DestinationSpec {
    /// 기본값으로 명세를 생성합니다.
    pub fn new(path: impl Into<PathBuf>, kind: DestinationKind, ttl_days: u32) -> Self {
        let path = path.into();
        let is_dir = kind == DestinationKind::AslDirectory;
        let rotate_dir = if is_dir {
            path.clone()
        } else {
            path.parent().map(Path::to_path_buf).unwrap_or_default()
        };
        let format = if kind == DestinationKind::Text {
            OutputFormat::Std
        } else {
            OutputFormat::Asl
        };
        Self {
            path,
            rotate_dir,
            kind,
            format,
            style: TimestampStyle::None,
            file_max: 0,
            all_max: 0,
            ttl_days,
            period_secs: if is_dir { DEFAULT_PERIOD_SECS } else { 0 },
            mode: if is_dir {
                DEFAULT_DIR_MODE
            } else {
                DEFAULT_FILE_MODE
            },
            uids: Vec::new(),
            gids: Vec::new(),
            flags: DestinationFlags::default(),
        }
    }

    /// 디렉토리 목적지 여부
    pub fn is_directory(&self) -> bool {
        self.kind == DestinationKind::AslDirectory
    }

    /// 아카이브 이름의 기준 이름 (경로의 마지막 요소)
    pub fn base_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// 현재 파일 이름에 스탬프가 붙는지 여부
    pub fn is_stamped(&self) -> bool {
        self.flags.basestamp || self.is_directory()
    }

    /// 스탬프에 대한 현재 파일 경로
    pub fn current_path(&self, stamp: i64) -> PathBuf {
        if !self.is_stamped() {
            return self.path.clone();
        }
        let name = naming::archive_name(
            &self.base_name(),
            &naming::make_stamp(self.style, stamp),
            false,
        );
        if self.is_directory() {
            self.path.join(name)
        } else {
            self.path.with_file_name(name)
        }
    }

    /// 로테이션 가능 여부 (로테이션 플래그 또는 디렉토리 목적지)
    pub fn rolls(&self) -> bool {
        self.flags.rotate || self.is_directory()
    }

    /// 속성 블록을 사람이 읽는 형태로 출력합니다.
    pub fn describe(&self, refcount: u32) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "    path: {}", self.path.display());
        let _ = writeln!(out, "    refcount: {refcount}");
        let _ = writeln!(out, "    kind: {}", self.kind.name());
        let _ = writeln!(out, "    format: {}", self.format);
        let _ = writeln!(out, "    style: {}", self.style.name());
        let _ = writeln!(out, "    rotate_dir: {}", self.rotate_dir.display());
        let _ = writeln!(out, "    flags: {}", self.flags.names().join(" "));
        let _ = writeln!(out, "    ttl: {} days", self.ttl_days);
        let _ = writeln!(out, "    mode: 0{:o}", self.mode);
        let _ = writeln!(out, "    file_max: {}", self.file_max);
        let _ = writeln!(out, "    all_max: {}", self.all_max);
        let _ = writeln!(out, "    period: {}", self.period_secs);
        let _ = writeln!(out, "    uid: {:?}", self.uids);
        let _ = writeln!(out, "    gid: {:?}", self.gids);
        out
    }
}

/// 런타임 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationState {
    /// 열려 있지 않음
    Closed,
    /// 쓰기 가능
    Open,
    /// 로테이션 진행 중
    Rotating,
}

/// 중복 메시지 요약 상태
#[derive(Debug, Default)]
struct DupState {
    last_key: Option<String>,
    last_time: i64,
    count: u64,
}

/// 목적지 런타임 인스턴스
#[derive(Debug)]
pub struct Destination {
    spec: DestinationSpec,
    pub(crate) state: DestinationState,
    pub(crate) file: Option<File>,
    pub(crate) current_path: Option<PathBuf>,
    pub(crate) size: u64,
    pub(crate) stamp: i64,
    pub(crate) last_stamp: i64,
    fails: u64,
    pub(crate) refcount: u32,
    dup: DupState,
}

impl Destination {
    pub(crate) fn new(spec: DestinationSpec) -> Self {
        Self {
            spec,
            state: DestinationState::Closed,
            file: None,
            current_path: None,
            size: 0,
            stamp: 0,
            last_stamp: 0,
            fails: 0,
            refcount: 1,
            dup: DupState::default(),
        }
    }

    /// 명세
    pub fn spec(&self) -> &DestinationSpec {
        &self.spec
    }

    /// 현재 상태
    pub fn state(&self) -> DestinationState {
        self.state
    }

    /// 참조 카운트
    pub fn refcount(&self) -> u32 {
        self.refcount
    }

    /// 누적 실패 횟수
    pub fn fails(&self) -> u64 {
        self.fails
    }

    /// 현재 파일 크기
    pub fn size(&self) -> u64 {
        self.size
    }

    /// 현재 파일 경로 (열린 적이 없으면 `None`)
    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    /// 대기 중인 중복 메시지 수
    pub fn pending_duplicates(&self) -> u64 {
        self.dup.count
    }

    /// I/O 실패를 기록하고 soft-write 정책에 따라 처리합니다.
    pub(crate) fn io_failure(&mut self, what: &str, err: io::Error) -> Result<(), OutputError> {
        self.fails += 1;
        let path = self.spec.path.display().to_string();
        if self.spec.flags.soft_write {
            tracing::warn!(path = %path, fails = self.fails, error = %err, "{what} failed (soft write)");
            Ok(())
        } else {
            tracing::error!(path = %path, fails = self.fails, error = %err, "{what} failed");
            Err(OutputError::destination_io(path, format!("{what}: {err}")))
        }
    }

    /// 현재 파일이 열려 있지 않으면 엽니다. 새 파일이면 권한을 적용합니다.
    pub fn ensure_open(&mut self, now: i64) -> Result<(), OutputError> {
        if self.file.is_some() {
            return Ok(());
        }

        let mut stamp = now;
        if self.spec.is_stamped() && stamp <= self.last_stamp {
            stamp = self.last_stamp + 1;
        }
        let path = self.spec.current_path(stamp);

        match self.open_path(&path, stamp) {
            Ok(()) => {
                self.state = DestinationState::Open;
                self.current_path = Some(path);
                tracing::debug!(path = %self.spec.path.display(), size = self.size, "destination opened");
                Ok(())
            }
            Err(e) => self.io_failure("open", e),
        }
    }

    fn open_path(&mut self, path: &Path, stamp: i64) -> io::Result<()> {
        if path.exists() {
            let file = access::open_existing(path)?;
            let meta = file.metadata()?;
            self.size = meta.len();
            self.stamp = meta
                .created()
                .or_else(|_| meta.modified())
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| i64::try_from(d.as_secs()).unwrap_or(stamp))
                .unwrap_or(stamp);
            if self.spec.is_stamped() {
                self.last_stamp = self.last_stamp.max(stamp);
            }
            self.file = Some(file);
            return Ok(());
        }

        access::create_parent_dirs(path, !self.spec.flags.nonstd_dir, self.spec.mode)?;
        let file = access::create_file(path, self.spec.mode)?;
        let owner = access::apply_owner(
            path,
            self.spec.uids.first().copied(),
            self.spec.gids.first().copied(),
        );
        if let Err(e) = owner {
            drop(file);
            let _ = fs::remove_file(path);
            return Err(e);
        }

        self.size = 0;
        self.stamp = stamp;
        self.last_stamp = self.last_stamp.max(stamp);
        self.file = Some(file);
        Ok(())
    }

    /// 파일에 바이트를 씁니다.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<usize, OutputError> {
        let result = match self.file.as_mut() {
            Some(file) => file.write_all(bytes),
            None => return Ok(0),
        };
        match result {
            Ok(()) => {
                self.size += bytes.len() as u64;
                metrics::counter!(m::OUTPUT_BYTES_WRITTEN_TOTAL).increment(bytes.len() as u64);
                Ok(bytes.len())
            }
            Err(e) => self.io_failure("write", e).map(|()| 0),
        }
    }

    /// 레코드를 기록합니다. 기록한 바이트 수를 반환하며 중복으로 요약된 경우 0입니다.
    ///
    /// 쓰기로 `file_max`를 넘게 되면 먼저 `Size` 체크포인트를 수행합니다.
    pub fn deliver(&mut self, record: &str, now: i64, max_dup: u64) -> Result<usize, OutputError> {
        if self.state == DestinationState::Rotating {
            return Err(OutputError::State(format!(
                "write to {} while rotating",
                self.spec.path.display()
            )));
        }

        if self.spec.flags.coalesce {
            let key = OutputFormat::dedup_key(record);
            let window = i64::try_from(max_dup).unwrap_or(i64::MAX);
            if self.dup.last_key.as_deref() == Some(key) && now - self.dup.last_time < window {
                self.dup.count += 1;
                return Ok(0);
            }
        }

        self.ensure_open(now)?;
        if self.file.is_none() {
            return Ok(0);
        }

        let len = record.len() as u64;
        if self.spec.flags.rotate
            && self.spec.file_max > 0
            && self.size > 0
            && self.size + len > self.spec.file_max
        {
            self.checkpoint(crate::checkpoint::CheckpointReason::Size, now)?;
            self.ensure_open(now)?;
        }

        self.flush_pending(now)?;
        let written = self.write_bytes(record.as_bytes())?;

        if self.spec.flags.coalesce {
            self.dup.last_key = Some(OutputFormat::dedup_key(record).to_owned());
            self.dup.last_time = now;
            self.dup.count = 0;
        }
        Ok(written)
    }

    /// 대기 중인 중복 요약을 조건 없이 기록합니다.
    pub(crate) fn flush_pending(&mut self, now: i64) -> Result<(), OutputError> {
        if self.dup.count == 0 {
            return Ok(());
        }
        let line = repeat_line(self.dup.count, now);
        self.dup.count = 0;
        self.dup.last_time = now;
        if self.file.is_none() {
            self.ensure_open(now)?;
        }
        self.write_bytes(line.as_bytes()).map(|_| ())
    }

    /// 요약 지연이 지난 중복 메시지를 기록합니다.
    pub fn flush_duplicates(&mut self, now: i64, max_dup: u64) -> Result<(), OutputError> {
        let window = i64::try_from(max_dup).unwrap_or(i64::MAX);
        if self.dup.count > 0 && now - self.dup.last_time >= window {
            self.flush_pending(now)?;
        }
        Ok(())
    }

    /// 파일을 닫습니다.
    pub(crate) fn close(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = file.sync_data() {
                tracing::debug!(path = %self.spec.path.display(), error = %e, "sync on close failed");
            }
        }
        self.state = DestinationState::Closed;
    }
}
