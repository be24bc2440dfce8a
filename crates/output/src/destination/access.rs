//! 파일/디렉토리 생성과 권한 적용

use std::fs::{self, DirBuilder, File, OpenOptions, Permissions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::Path;

/// 표준 로그 디렉토리의 권한
pub const STD_DIR_MODE: u32 = 0o755;

/// 파일 모드에서 디렉토리 모드를 계산합니다. 읽기 권한이 있는 주체에 실행 권한을 더합니다.
pub fn dir_mode_for(file_mode: u32) -> u32 {
    let mode = file_mode & 0o777;
    mode | ((mode & 0o444) >> 2)
}

/// 상위 디렉토리를 생성합니다.
pub fn create_parent_dirs(path: &Path, standard: bool, file_mode: u32) -> io::Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() || parent.is_dir() {
        return Ok(());
    }
    let mode = if standard {
        STD_DIR_MODE
    } else {
        dir_mode_for(file_mode)
    };
    DirBuilder::new().recursive(true).mode(mode).create(parent)
}

/// 새 파일을 `mode & 0o666` 권한으로 생성합니다. 이미 존재하면 실패합니다.
pub fn create_file(path: &Path, mode: u32) -> io::Result<File> {
    let mode = mode & 0o666;
    let file = OpenOptions::new()
        .append(true)
        .create_new(true)
        .mode(mode)
        .open(path)?;
    // umask와 무관하게 요청한 권한을 적용
    file.set_permissions(Permissions::from_mode(mode))?;
    Ok(file)
}

/// 기존 일반 파일을 추가 모드로 엽니다.
pub fn open_existing(path: &Path) -> io::Result<File> {
    let meta = fs::metadata(path)?;
    if !meta.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a regular file", path.display()),
        ));
    }
    OpenOptions::new().append(true).open(path)
}

/// 소유자/그룹을 지정합니다. 둘 다 없으면 아무것도 하지 않습니다.
pub fn apply_owner(path: &Path, uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
    if uid.is_none() && gid.is_none() {
        return Ok(());
    }
    std::os::unix::fs::chown(path, uid, gid)
}
