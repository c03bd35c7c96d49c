//! 测试用的脚本化 agent 原语
//!
//! socket 用普通文件代替，pid 用测试进程自身的 pid（一定存活且可探测）。

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use ssh_agent_session::{AgentBackend, AgentDescriptor, CommandOutput, Result, SessionConfig};

pub struct FakeAgent {
    pub socket: PathBuf,
    pub reachable: bool,
    pub identities: Vec<String>,
}

pub struct FakeBackend {
    root: PathBuf,
    pub agents: RefCell<Vec<FakeAgent>>,
    pub spawns: Cell<usize>,
    pub lists: Cell<usize>,
    pub add_calls: RefCell<Vec<Vec<PathBuf>>>,
    /// 需要口令的 key（basename）
    pub locked_keys: RefCell<HashSet<String>>,
    /// 新启动的 agent 是否无法连接
    pub spawn_unreachable: Cell<bool>,
    /// add 时 agent 已失联（list 仍然正常）
    pub adds_unreachable: Cell<bool>,
}

impl FakeBackend {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            agents: RefCell::new(Vec::new()),
            spawns: Cell::new(0),
            lists: Cell::new(0),
            add_calls: RefCell::new(Vec::new()),
            locked_keys: RefCell::new(HashSet::new()),
            spawn_unreachable: Cell::new(false),
            adds_unreachable: Cell::new(false),
        }
    }

    /// 注册一个已在运行的 agent
    pub fn add_agent(&self, name: &str, reachable: bool, identities: &[&str]) -> AgentDescriptor {
        let socket = self.root.join(format!("{}.sock", name));
        fs::write(&socket, "").unwrap();
        self.agents.borrow_mut().push(FakeAgent {
            socket: socket.clone(),
            reachable,
            identities: identities.iter().map(|s| s.to_string()).collect(),
        });
        AgentDescriptor::new(socket, std::process::id())
    }

    pub fn lock_key(&self, basename: &str) {
        self.locked_keys.borrow_mut().insert(basename.to_string());
    }

    pub fn identities(&self, agent: &AgentDescriptor) -> Vec<String> {
        self.agents
            .borrow()
            .iter()
            .find(|a| a.socket == agent.socket_path)
            .map(|a| a.identities.clone())
            .unwrap_or_default()
    }

    pub fn set_reachable(&self, agent: &AgentDescriptor, reachable: bool) {
        if let Some(a) = self
            .agents
            .borrow_mut()
            .iter_mut()
            .find(|a| a.socket == agent.socket_path)
        {
            a.reachable = reachable;
        }
    }

    fn reachable_index(&self, agent: &AgentDescriptor) -> Option<usize> {
        self.agents
            .borrow()
            .iter()
            .position(|a| a.socket == agent.socket_path && a.reachable)
    }
}

fn unreachable_output() -> CommandOutput {
    CommandOutput::new(
        Some(2),
        "",
        "Could not open a connection to your authentication agent.\n",
    )
}

impl AgentBackend for FakeBackend {
    fn spawn(&self) -> Result<String> {
        let n = self.spawns.get() + 1;
        self.spawns.set(n);

        let socket = self.root.join(format!("spawned.{}.sock", n));
        fs::write(&socket, "").unwrap();
        self.agents.borrow_mut().push(FakeAgent {
            socket: socket.clone(),
            reachable: !self.spawn_unreachable.get(),
            identities: Vec::new(),
        });

        let pid = std::process::id();
        Ok(format!(
            "SSH_AUTH_SOCK={}; export SSH_AUTH_SOCK;\nSSH_AGENT_PID={}; export SSH_AGENT_PID;\necho Agent pid {};\n",
            socket.display(),
            pid,
            pid
        ))
    }

    fn list_identities(&self, agent: &AgentDescriptor) -> Result<CommandOutput> {
        self.lists.set(self.lists.get() + 1);

        let Some(idx) = self.reachable_index(agent) else {
            return Ok(unreachable_output());
        };
        let agents = self.agents.borrow();
        let identities = &agents[idx].identities;
        if identities.is_empty() {
            return Ok(CommandOutput::new(Some(1), "The agent has no identities.\n", ""));
        }

        let stdout: String = identities
            .iter()
            .map(|name| format!("256 SHA256:fake{} {} (ED25519)\n", name, name))
            .collect();
        Ok(CommandOutput::new(Some(0), stdout, ""))
    }

    fn add_identities(&self, agent: &AgentDescriptor, keys: &[PathBuf]) -> Result<CommandOutput> {
        self.add_calls.borrow_mut().push(keys.to_vec());

        if self.adds_unreachable.get() {
            return Ok(unreachable_output());
        }
        let Some(idx) = self.reachable_index(agent) else {
            return Ok(unreachable_output());
        };

        let mut stderr = String::new();
        let mut failed = false;
        for key in keys {
            let name = key.file_name().unwrap().to_string_lossy().to_string();
            if self.locked_keys.borrow().contains(&name) {
                failed = true;
                continue;
            }
            self.agents.borrow_mut()[idx].identities.push(name.clone());
            stderr.push_str(&format!("Identity added: {} ({}@test)\n", key.display(), name));
        }

        let code = if failed { 1 } else { 0 };
        Ok(CommandOutput::new(Some(code), "", stderr))
    }

    fn remove_all_identities(&self, agent: &AgentDescriptor) -> Result<CommandOutput> {
        let Some(idx) = self.reachable_index(agent) else {
            return Ok(unreachable_output());
        };
        self.agents.borrow_mut()[idx].identities.clear();
        Ok(CommandOutput::new(Some(0), "", "All identities removed.\n"))
    }
}

/// 测试目录：state / keys / agents 三个子目录
pub struct Sandbox {
    pub temp: tempfile::TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir_all(temp.path().join("keys")).unwrap();
        fs::create_dir_all(temp.path().join("agents")).unwrap();
        Self { temp }
    }

    pub fn config(&self) -> SessionConfig {
        SessionConfig::new(self.temp.path().join("state"), self.key_dir())
    }

    pub fn key_dir(&self) -> PathBuf {
        self.temp.path().join("keys")
    }

    pub fn agents_dir(&self) -> PathBuf {
        self.temp.path().join("agents")
    }

    pub fn backend(&self) -> FakeBackend {
        FakeBackend::new(&self.agents_dir())
    }

    /// 写入一对私钥 / 公钥
    pub fn add_key_pair(&self, name: &str) {
        fs::write(self.key_dir().join(name), "PRIVATE").unwrap();
        fs::write(self.key_dir().join(format!("{}.pub", name)), "PUBLIC").unwrap();
    }
}
