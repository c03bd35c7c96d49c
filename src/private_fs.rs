//! 仅属主可访问的目录与文件（700 / 600）

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

/// 确保目录存在且权限为 700
pub fn ensure_private_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)?;

    #[cfg(unix)]
    fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;

    Ok(())
}

/// 以 600 权限打开（必要时创建）文件
pub fn open_private(path: &Path, truncate: bool) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true).write(true).truncate(truncate);

    #[cfg(unix)]
    options.mode(0o600);

    let file = options.open(path)?;

    // 已存在的文件不受 mode() 影响
    #[cfg(unix)]
    file.set_permissions(fs::Permissions::from_mode(0o600))?;

    Ok(file)
}

/// 截断后整体写入，权限 600；父目录按 700 创建
pub fn write_private(path: &Path, contents: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        ensure_private_dir(parent)?;
    }

    let mut file = open_private(path, true)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn mode(path: &Path) -> u32 {
        fs::metadata(path).unwrap().permissions().mode() & 0o777
    }

    #[test]
    fn test_write_private_sets_modes() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("state").join("agent.env");

        write_private(&path, "hello\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
        assert_eq!(mode(&path), 0o600);
        assert_eq!(mode(path.parent().unwrap()), 0o700);
    }

    #[test]
    fn test_write_private_truncates_and_tightens() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("manifest");
        fs::write(&path, "a much longer previous content\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        write_private(&path, "x\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "x\n");
        assert_eq!(mode(&path), 0o600);
    }
}
