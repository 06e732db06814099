use std::fmt;
use std::process::ExitStatus;

/// Идентификатор дочернего процесса внутри супервизора (pid может переиспользоваться ОС)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChildId(pub u64);

impl fmt::Display for ChildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "child#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => f.write_str("stdout"),
            StreamKind::Stderr => f.write_str("stderr"),
        }
    }
}

/// Итог завершения процесса: (код, сигнал)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    pub code: i32,
    pub signal: i32,
}

impl ExitInfo {
    /// Код выхода при завершении сигналом
    pub const NO_CODE: i32 = -1;
    /// Сигнал при обычном завершении
    pub const NO_SIGNAL: i32 = 0;

    pub fn exited(code: i32) -> Self {
        Self {
            code,
            signal: Self::NO_SIGNAL,
        }
    }

    pub fn signaled(signal: i32) -> Self {
        Self {
            code: Self::NO_CODE,
            signal,
        }
    }

    pub fn is_signaled(&self) -> bool {
        self.signal != Self::NO_SIGNAL
    }
}

impl From<ExitStatus> for ExitInfo {
    fn from(status: ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;

        match (status.code(), status.signal()) {
            (Some(code), _) => ExitInfo::exited(code),
            (None, Some(signal)) => ExitInfo::signaled(signal),
            (None, None) => ExitInfo::exited(Self::NO_CODE),
        }
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_signaled() {
            write!(f, "signal {}", self.signal)
        } else {
            write!(f, "code {}", self.code)
        }
    }
}
