//! 数据类型定义

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// agent socket 的环境变量名
pub const SOCKET_VAR: &str = "SSH_AUTH_SOCK";

/// agent pid 的环境变量名
pub const PID_VAR: &str = "SSH_AGENT_PID";

/// Agent 描述符：一个 (socket, pid) 对
///
/// 既可能是候选（来自环境变量或会话文件），也可能是已确认存活的 agent。
/// `pid == 0` 或空 socket 路径表示字段缺失，Prober 会直接判为 Dead。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub socket_path: PathBuf,
    pub pid: u32,
}

impl AgentDescriptor {
    pub fn new<P: Into<PathBuf>>(socket_path: P, pid: u32) -> Self {
        Self {
            socket_path: socket_path.into(),
            pid,
        }
    }

    /// 两个字段是否都非空
    pub fn is_complete(&self) -> bool {
        !self.socket_path.as_os_str().is_empty() && self.pid > 0
    }

    /// 读取当前进程继承的描述符
    ///
    /// 两个变量都没设置时返回 None；只设置了一个时返回不完整的描述符。
    pub fn from_env() -> Option<Self> {
        let socket = std::env::var_os(SOCKET_VAR);
        let pid = std::env::var(PID_VAR).ok();
        if socket.is_none() && pid.is_none() {
            return None;
        }

        Some(Self {
            socket_path: socket.map(PathBuf::from).unwrap_or_default(),
            pid: pid.and_then(|p| p.trim().parse().ok()).unwrap_or(0),
        })
    }

    /// 从 `NAME=value;` 赋值行解析
    ///
    /// `ssh-agent -s` 的输出和会话文件共用这个格式。
    /// 两个变量都必须存在，pid 必须是正整数。
    pub fn from_assignments(text: &str) -> Option<Self> {
        let mut socket = None;
        let mut pid = None;

        for (name, value) in parse_assignments(text) {
            match name {
                SOCKET_VAR => socket = Some(value),
                PID_VAR => pid = Some(value),
                _ => {}
            }
        }

        let socket = socket.filter(|s| !s.is_empty())?;
        let pid = pid?.trim().parse::<u32>().ok().filter(|p| *p > 0)?;
        Some(Self::new(socket, pid))
    }

    /// 渲染为两行可 source 的 shell 赋值
    ///
    /// 路径含空格、`;` 等字符时用单引号包裹。
    pub fn to_assignments(&self) -> String {
        format!(
            "{SOCKET_VAR}={}; export {SOCKET_VAR};\n{PID_VAR}={}; export {PID_VAR};\n",
            shell_quote(&self.socket_path.to_string_lossy()),
            self.pid
        )
    }
}

impl fmt::Display for AgentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (pid {})", self.socket_path.display(), self.pid)
    }
}

/// 逐行解析 `NAME=value; ...`，忽略注释和无法识别的行
fn parse_assignments(text: &str) -> impl Iterator<Item = (&str, String)> + '_ {
    text.lines().filter_map(|line| {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let (name, rest) = line.split_once('=')?;
        let name = name.trim();
        let valid_name = !name.is_empty()
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_name {
            return None;
        }

        Some((name, shell_unquote(rest)?))
    })
}

/// 不需要引号的字符
fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || "/._-+:@%,=".contains(c)
}

/// 按 POSIX shell 规则给值加单引号（`'` 写成 `'\''`）
fn shell_quote(value: &str) -> String {
    if !value.is_empty() && value.chars().all(is_shell_safe) {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// 读取到第一个不在引号内的 `;` 为止，去掉单引号和反斜杠转义
///
/// 引号未闭合时返回 None。
fn shell_unquote(raw: &str) -> Option<String> {
    let mut value = String::new();
    let mut quoted = false;
    let mut chars = raw.trim_start().chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => quoted = !quoted,
            '\\' if !quoted => value.push(chars.next()?),
            ';' if !quoted => break,
            c => value.push(c),
        }
    }

    if quoted {
        return None;
    }
    Some(value.trim_end().to_string())
}

/// 会话来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionOrigin {
    /// 调用进程继承的环境
    Inherited,
    /// 会话文件
    Persisted,
    /// 本次新启动
    Spawned,
}

impl fmt::Display for SessionOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionOrigin::Inherited => write!(f, "inherited"),
            SessionOrigin::Persisted => write!(f, "persisted"),
            SessionOrigin::Spawned => write!(f, "spawned"),
        }
    }
}

/// 已确认存活的会话
///
/// 所有下游调用都显式接收这个值，不依赖进程环境变量。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHandle {
    pub descriptor: AgentDescriptor,
    pub origin: SessionOrigin,
}

impl SessionHandle {
    pub fn new(descriptor: AgentDescriptor, origin: SessionOrigin) -> Self {
        Self { descriptor, origin }
    }

    pub fn socket_path(&self) -> &Path {
        &self.descriptor.socket_path
    }

    pub fn pid(&self) -> u32 {
        self.descriptor.pid
    }
}

/// 会话解析模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// 必要时启动新 agent
    Ensure,
    /// 只查询，绝不启动
    CheckOnly,
}

/// 原语退出码分类
///
/// 三个原语共用同一套词汇：0 / 1 / ≥2（含被信号终止）。
/// 对 query 而言 `Partial` 表示 "没有 identity"；对 add 而言表示部分失败。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitClass {
    Success,
    Partial,
    Unreachable,
}

impl ExitClass {
    pub fn from_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => ExitClass::Success,
            Some(1) => ExitClass::Partial,
            _ => ExitClass::Unreachable,
        }
    }
}

/// 凭据加载策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadPolicy {
    /// 每个 key 一次调用，失败互相隔离
    #[default]
    PerEntry,
    /// 所有 key 一次调用
    Batch,
}

impl FromStr for LoadPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "per-entry" | "per_entry" => Ok(LoadPolicy::PerEntry),
            "batch" => Ok(LoadPolicy::Batch),
            _ => Err(format!("Invalid load policy: {}", s)),
        }
    }
}

impl fmt::Display for LoadPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadPolicy::PerEntry => write!(f, "per-entry"),
            LoadPolicy::Batch => write!(f, "batch"),
        }
    }
}

/// 单个凭据的加载结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    Added,
    NeedsPassphrase,
    AgentUnreachable,
    FileMissing,
}

impl LoadStatus {
    /// add-identities 退出码到结果的映射
    pub fn from_exit(class: ExitClass) -> Self {
        match class {
            ExitClass::Success => LoadStatus::Added,
            ExitClass::Partial => LoadStatus::NeedsPassphrase,
            ExitClass::Unreachable => LoadStatus::AgentUnreachable,
        }
    }
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadStatus::Added => write!(f, "added"),
            LoadStatus::NeedsPassphrase => write!(f, "needs passphrase"),
            LoadStatus::AgentUnreachable => write!(f, "agent unreachable"),
            LoadStatus::FileMissing => write!(f, "file missing"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOutcome {
    pub basename: String,
    pub status: LoadStatus,
}

impl LoadOutcome {
    pub fn new(basename: impl Into<String>, status: LoadStatus) -> Self {
        Self {
            basename: basename.into(),
            status,
        }
    }
}

/// 一次加载的汇总，不持久化
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSummary {
    pub policy: LoadPolicy,
    pub outcomes: Vec<LoadOutcome>,
}

impl LoadSummary {
    pub fn added(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == LoadStatus::Added)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.added()
    }

    /// 至少一个 Added 即视为成功
    pub fn is_success(&self) -> bool {
        self.added() > 0
    }

    /// 成功但有失败项（PartialCredentialFailure）
    pub fn is_partial(&self) -> bool {
        self.is_success() && self.failed() > 0
    }

    /// 没有任何 key 送达 agent：除了文件缺失之外全部是 AgentUnreachable
    pub fn is_unreachable(&self) -> bool {
        let mut reached_agent = false;
        for outcome in &self.outcomes {
            match outcome.status {
                LoadStatus::AgentUnreachable => reached_agent = true,
                LoadStatus::FileMissing => {}
                LoadStatus::Added | LoadStatus::NeedsPassphrase => return false,
            }
        }
        reached_agent
    }

    pub fn failures(&self) -> impl Iterator<Item = &LoadOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status != LoadStatus::Added)
    }

    /// 人类可读摘要
    pub fn message(&self) -> String {
        if self.outcomes.is_empty() {
            return "nothing to load".to_string();
        }
        format!("{} added / {} failed", self.added(), self.failed())
    }
}
