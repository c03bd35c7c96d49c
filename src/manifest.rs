//! 密钥清单扫描
//!
//! 非递归枚举密钥目录下的普通文件，排除公钥本身，
//! 保留带有 `<name>.pub` 兄弟文件的私钥 basename。
//! 结果整体覆盖写入 manifest 缓存（每行一个，600），
//! 扫描到空目录也会写出空文件，以区分 "扫过、没有" 和 "从未扫过"。

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::private_fs::write_private;

/// 有序的私钥 basename 列表
///
/// 顺序即目录枚举顺序，不保证跨平台/跨运行稳定。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyManifest {
    entries: Vec<String>,
}

impl KeyManifest {
    pub fn new(entries: Vec<String>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// 读取缓存；从未扫描过返回 None
    pub fn read_cache(path: &Path) -> Result<Option<Self>> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::Config(format!(
                    "无法读取 manifest 缓存 {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let entries = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Ok(Some(Self::new(entries)))
    }

    /// 整体覆盖写入缓存
    pub fn write_cache(&self, path: &Path) -> Result<()> {
        let mut contents = self.entries.join("\n");
        if !contents.is_empty() {
            contents.push('\n');
        }

        write_private(path, &contents).map_err(|e| {
            Error::Config(format!("无法写入 manifest 缓存 {}: {}", path.display(), e))
        })
    }
}

/// 扫描结果：空清单不是错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Empty,
    NonEmpty(KeyManifest),
}

impl ScanOutcome {
    pub fn is_empty(&self) -> bool {
        matches!(self, ScanOutcome::Empty)
    }

    pub fn into_manifest(self) -> KeyManifest {
        match self {
            ScanOutcome::Empty => KeyManifest::default(),
            ScanOutcome::NonEmpty(manifest) => manifest,
        }
    }
}

/// 扫描密钥目录并写入缓存
pub fn scan_manifest(key_dir: &Path, public_suffix: &str, cache_path: &Path) -> Result<ScanOutcome> {
    let manifest = KeyManifest::new(collect_key_basenames(key_dir, public_suffix)?);
    manifest.write_cache(cache_path)?;

    tracing::debug!(
        "🔑 scanned {:?}: {} key(s) -> {:?}",
        key_dir,
        manifest.len(),
        cache_path
    );

    if manifest.is_empty() {
        Ok(ScanOutcome::Empty)
    } else {
        Ok(ScanOutcome::NonEmpty(manifest))
    }
}

/// 枚举带公钥兄弟文件的私钥；目录不存在视为空
pub fn collect_key_basenames(key_dir: &Path, public_suffix: &str) -> Result<Vec<String>> {
    let entries = match fs::read_dir(key_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!("key directory {:?} does not exist", key_dir);
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(Error::Config(format!(
                "无法读取密钥目录 {}: {}",
                key_dir.display(),
                e
            )))
        }
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            Error::Config(format!("无法读取密钥目录 {}: {}", key_dir.display(), e))
        })?;

        let Ok(name) = entry.file_name().into_string() else {
            tracing::debug!("skipping non-UTF-8 file name {:?}", entry.file_name());
            continue;
        };

        if name.ends_with(public_suffix) || !is_regular_file(&entry.path()) {
            continue;
        }

        if is_regular_file(&public_sibling(key_dir, &name, public_suffix)) {
            names.push(name);
        }
    }

    Ok(names)
}

fn public_sibling(key_dir: &Path, name: &str, public_suffix: &str) -> PathBuf {
    key_dir.join(format!("{}{}", name, public_suffix))
}

/// 跟随符号链接判断
fn is_regular_file(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}
