#![forbid(unsafe_code)]
//! Session risk detection: is this shell running inside an editor/IDE
//! integration, a remote session, or under an AI agent?
//!
//! Detection is read-only and degrades to "unknown/false" when the process
//! table is unavailable. The process tree is inspected through the
//! [`ProcessInspector`] trait so the ladder can be tested without a real
//! process tree.

use crate::system;

/// Environment variables set by editors, IDE terminals and their remote
/// variants. Any one of these is the strongest editor signal we have.
const EDITOR_ENV_VARS: &[&str] = &[
    // VSCode family
    "VSCODE_PID",
    "VSCODE_IPC_HOOK",
    "VSCODE_IPC_HOOK_CLI",
    "VSCODE_INJECTION",
    "VSCODE_CWD",
    "VSCODE_NLS_CONFIG",
    // JetBrains family
    "IDEA_INITIAL_DIRECTORY",
    "PYCHARM_HOSTED",
    "WEBSTORM_VM_OPTIONS",
    "INTELLIJ_ENVIRONMENT_READER",
    // other editors
    "ATOM_HOME",
    "SUBLIME_TEXT_PATH",
    "CURSOR_USER_DATA_DIR",
    // GUI terminal emulators commonly embedded in IDE setups
    "GNOME_TERMINAL_SCREEN",
    "KONSOLE_DBUS_SESSION",
    "ITERM_SESSION_ID",
    "KITTY_WINDOW_ID",
    "ALACRITTY_SOCKET",
    // remote development environments
    "REMOTE_CONTAINERS",
    "CODESPACES",
    "GITPOD_WORKSPACE_ID",
];

/// Process names that identify an editor anywhere in the parent chain.
const EDITOR_PROCESS_NAMES: &[&str] = &[
    "code",
    "code-server",
    "vscode-server",
    "code-insiders",
    "code-oss",
    "vscodium",
    "idea",
    "intellij",
    "pycharm",
    "webstorm",
    "phpstorm",
    "rubymine",
    "clion",
    "datagrip",
    "goland",
    "rider",
    "android-studio",
    "cursor",
    "atom",
    "sublime_text",
    "subl",
    "brackets",
    "notepad++",
    "gedit",
    "kate",
    "emacs",
    "vim",
    "nvim",
    "nano",
    "theia",
    "gitpod",
    "codespaces",
    "cloud9",
    "replit",
    "codesandbox",
];

/// Terminal types that alone only weakly suggest an editor; they count only
/// together with a GUI display.
const EDITOR_TERMINAL_TYPES: &[&str] = &[
    "xterm-256color",
    "screen-256color",
    "tmux-256color",
    "vt100",
    "vt220",
    "linux",
    "ansi",
];

/// Environment variables that identify AI coding agents and assistants.
const AI_ENV_VARS: &[&str] = &[
    "AUGMENT_SESSION_ID",
    "AUGMENT_USER_ID",
    "AUGMENT_WORKSPACE_ID",
    "AUGMENT_TASK_ID",
    "AUGMENT_AGENT_VERSION",
    "AUGMENT_API_BASE_URL",
    "AUGMENT_EXECUTION_CONTEXT",
    "AUGMENT_CODE_CONTEXT",
    "CLAUDE_API_KEY",
    "ANTHROPIC_API_KEY",
    "GITHUB_COPILOT_TOKEN",
    "GITHUB_COPILOT_API_KEY",
    "COPILOT_SESSION_ID",
    "COPILOT_USER_ID",
    "COPILOT_WORKSPACE_ID",
    "COPILOT_CHAT_SESSION",
    "COPILOT_TERMINAL_SESSION",
    "GITHUB_COPILOT_CHAT",
    "GITHUB_COPILOT_CLI",
    "GITHUB_TOKEN",
    "GH_TOKEN",
    "VSCODE_COPILOT_SESSION",
    "COPILOT_AGENT_SESSION",
    "OPENAI_API_KEY",
    "OPENAI_API_BASE",
    "OPENAI_ORGANIZATION",
    "CHATGPT_SESSION_ID",
    "CHATGPT_USER_ID",
    "OPENAI_SESSION_TOKEN",
    "CHATGPT_API_KEY",
];

/// Process names that identify AI agents in the parent chain.
const AI_PROCESS_NAMES: &[&str] = &[
    "augment",
    "augment-agent",
    "augment-code",
    "augment-cli",
    "copilot",
    "github-copilot",
    "copilot-agent",
    "chatgpt",
    "openai",
    "openai-cli",
    "claude",
    "anthropic",
    "claude-cli",
    "codeium",
    "tabnine",
];

/// Walks stop after this many parents.
const MAX_TREE_DEPTH: usize = 10;

pub type Pid = i32;

/// Read-only view of the process table. The OS-backed implementation reads
/// `/proc`; tests inject a fake tree.
pub trait ProcessInspector {
    fn current_pid(&self) -> Pid;
    fn parent_of(&self, pid: Pid) -> Option<Pid>;
    fn name_of(&self, pid: Pid) -> Option<String>;
}

pub struct OsProcessInspector;

impl ProcessInspector for OsProcessInspector {
    fn current_pid(&self) -> Pid {
        std::process::id() as Pid
    }

    fn parent_of(&self, pid: Pid) -> Option<Pid> {
        system::parent_of(pid)
    }

    fn name_of(&self, pid: Pid) -> Option<String> {
        system::process_name(pid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnvironmentInfo {
    pub is_editor_session: bool,
    pub is_remote_session: bool,
    pub is_ai_session: bool,
    /// Detection confidence, 0 to 100. Environment variables score highest,
    /// the terminal-type heuristic lowest.
    pub confidence: u8,
}

type EnvFn<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Detect the current session environment from the real process environment
/// and process table.
pub fn detect() -> EnvironmentInfo {
    detect_with(&|name| std::env::var(name).ok(), &OsProcessInspector)
}

/// Detection ladder, strongest signal first: editor environment variables,
/// remote session with editor markers, editor process in the parent chain,
/// and finally terminal type combined with a GUI display.
pub fn detect_with(env: EnvFn, proc_tree: &dyn ProcessInspector) -> EnvironmentInfo {
    let has_env_vars = EDITOR_ENV_VARS.iter().any(|var| env(var).is_some());
    let is_remote = env("SSH_CLIENT").is_some() || env("SSH_CONNECTION").is_some();
    let remote_editor = is_remote
        && (has_env_vars
            || env("REMOTE_CONTAINERS").is_some()
            || env("CODESPACES").is_some()
            || env("GITPOD_WORKSPACE_ID").is_some());
    let in_tree = process_tree_contains(proc_tree, EDITOR_PROCESS_NAMES);
    let weak_terminal = editor_terminal_type(env)
        && (env("DISPLAY").is_some() || env("WAYLAND_DISPLAY").is_some());

    let is_editor_session = has_env_vars || remote_editor || in_tree || weak_terminal;
    let confidence = if has_env_vars {
        90
    } else if remote_editor {
        80
    } else if in_tree {
        70
    } else if weak_terminal {
        40
    } else {
        0
    };

    let is_ai_session = AI_ENV_VARS.iter().any(|var| env(var).is_some())
        || process_tree_contains(proc_tree, AI_PROCESS_NAMES);

    EnvironmentInfo {
        is_editor_session,
        is_remote_session: is_remote,
        is_ai_session,
        confidence,
    }
}

fn editor_terminal_type(env: EnvFn) -> bool {
    match env("TERM") {
        Some(term) => EDITOR_TERMINAL_TYPES.contains(&term.as_str()),
        None => false,
    }
}

fn process_tree_contains(proc_tree: &dyn ProcessInspector, names: &[&str]) -> bool {
    let mut pid = proc_tree.current_pid();
    let mut depth = 0;

    while pid > 1 && depth < MAX_TREE_DEPTH {
        if let Some(name) = proc_tree.name_of(pid) {
            if names
                .iter()
                .any(|candidate| name == *candidate || name.contains(candidate))
            {
                return true;
            }
        }

        match proc_tree.parent_of(pid) {
            Some(parent) if parent != pid && parent >= 1 => pid = parent,
            _ => break,
        }
        depth += 1;
    }

    false
}
