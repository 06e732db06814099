use crate::error::SpawnError;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

const SHELL: &str = "/bin/sh";

/// Что запускать: строка уходит в `/bin/sh -c`, список - напрямую в exec
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSpec {
    Shell(String),
    Argv(Vec<String>),
}

impl CommandSpec {
    pub fn shell(command: impl Into<String>) -> Self {
        CommandSpec::Shell(command.into())
    }

    pub fn argv<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::Argv(args.into_iter().map(Into::into).collect())
    }

    /// Собрать команду с перенаправленными stdout/stderr. stdin закрыт.
    pub(crate) fn build(&self, options: &SpawnOptions) -> Result<Command, SpawnError> {
        let mut command = match self {
            CommandSpec::Shell(line) => {
                if line.trim().is_empty() {
                    return Err(SpawnError::EmptyCommand);
                }
                let mut command = Command::new(SHELL);
                command.arg("-c").arg(line);
                command
            }
            CommandSpec::Argv(args) => {
                let (program, rest) = args.split_first().ok_or(SpawnError::EmptyCommand)?;
                if program.is_empty() {
                    return Err(SpawnError::EmptyCommand);
                }
                let mut command = Command::new(program);
                command.args(rest);
                command
            }
        };

        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = &options.cwd {
            command.current_dir(cwd);
        }
        command.envs(options.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        Ok(command)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandSpec::Shell(line) => write!(f, "{}", line),
            CommandSpec::Argv(args) => write!(f, "{}", args.join(" ")),
        }
    }
}

/// Дополнительные параметры запуска
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpawnOptions {
    pub cwd: Option<PathBuf>,
    /// Добавляется к окружению демона
    pub env: Vec<(String, String)>,
}
