//! Agent 原语边界
//!
//! agent 被视为不透明的子进程协作者，只通过四个原语访问：
//! spawn、list（query-identities）、add、remove-all。
//! 所有调用都是阻塞的，没有超时。

use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

use crate::config::AgentCommands;
use crate::error::{Error, Result};
use crate::types::{AgentDescriptor, ExitClass, PID_VAR, SOCKET_VAR};

/// 一次原语调用的结果
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub class: ExitClass,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn new(code: Option<i32>, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            class: ExitClass::from_code(code),
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    fn from_output(output: Output) -> Self {
        Self::new(
            output.status.code(),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        )
    }
}

/// Agent 原语
///
/// 会话总是作为参数显式传入，实现不得修改调用进程的环境。
pub trait AgentBackend {
    /// 启动新 agent，返回其原始标准输出（两行 `NAME=value;` 赋值）
    fn spawn(&self) -> Result<String>;

    /// 列出 identity：0 = 有，1 = 没有，≥2 = 连不上
    fn list_identities(&self, agent: &AgentDescriptor) -> Result<CommandOutput>;

    /// 添加 identity：0 = 全部成功，1 = 部分失败（如需要口令），≥2 = 连不上
    fn add_identities(&self, agent: &AgentDescriptor, keys: &[PathBuf]) -> Result<CommandOutput>;

    /// 移除全部 identity：0 = 已移除，1 = 无可移除，≥2 = 连不上
    fn remove_all_identities(&self, agent: &AgentDescriptor) -> Result<CommandOutput>;
}

/// 通过 `ssh-agent` / `ssh-add` 子进程实现的原语
#[derive(Debug, Clone)]
pub struct CommandBackend {
    commands: AgentCommands,
}

impl CommandBackend {
    pub fn new(commands: AgentCommands) -> Self {
        Self { commands }
    }

    /// 针对指定会话的 ssh-add 命令
    fn ssh_add(&self, agent: &AgentDescriptor) -> Command {
        let mut command = Command::new(&self.commands.add_program);
        command
            .env(SOCKET_VAR, &agent.socket_path)
            .env(PID_VAR, agent.pid.to_string());
        command
    }

    fn run(&self, mut command: Command, what: &str) -> Result<CommandOutput> {
        let output = command.output().map_err(|e| {
            Error::AgentUnavailable(format!(
                "无法执行 {} ({:?}): {}",
                what, self.commands.add_program, e
            ))
        })?;

        let output = CommandOutput::from_output(output);
        tracing::debug!("{} exited with {:?}", what, output.code);
        Ok(output)
    }
}

impl Default for CommandBackend {
    fn default() -> Self {
        Self::new(AgentCommands::default())
    }
}

impl AgentBackend for CommandBackend {
    fn spawn(&self) -> Result<String> {
        tracing::debug!("spawning {:?} -s", self.commands.agent_program);

        let output = Command::new(&self.commands.agent_program)
            .arg("-s")
            .env_remove(SOCKET_VAR)
            .env_remove(PID_VAR)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                Error::Spawn(format!("无法执行 {:?}: {}", self.commands.agent_program, e))
            })?;

        if !output.status.success() {
            return Err(Error::Spawn(format!(
                "{:?} 退出码 {:?}: {}",
                self.commands.agent_program,
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn list_identities(&self, agent: &AgentDescriptor) -> Result<CommandOutput> {
        let mut command = self.ssh_add(agent);
        command.arg("-l").stdin(Stdio::null());
        self.run(command, "ssh-add -l")
    }

    fn add_identities(&self, agent: &AgentDescriptor, keys: &[PathBuf]) -> Result<CommandOutput> {
        let mut command = self.ssh_add(agent);
        // stdin 继承，口令提示才能到达终端
        command.args(keys).stdin(Stdio::inherit());
        self.run(command, "ssh-add")
    }

    fn remove_all_identities(&self, agent: &AgentDescriptor) -> Result<CommandOutput> {
        let mut command = self.ssh_add(agent);
        command.arg("-D").stdin(Stdio::null());
        self.run(command, "ssh-add -D")
    }
}
