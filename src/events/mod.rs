pub mod keyboard;
pub mod process;
pub mod window;

pub use keyboard::{BindingKey, InputEvent, KeyCode, KeyState, ModifierSet, Trigger};
pub use process::{ChildId, ExitInfo, StreamKind};
pub use window::{WindowEvent, WindowEventKind, WindowId};

use std::fmt;

/// Типизированное событие в очереди моста. Производители только кладут события,
/// маршрутизация выполняется потребителем на потоке скрипта.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    Input(InputEvent),
    RepeatTick {
        key: KeyCode,
        generation: u64,
    },
    Line {
        child: ChildId,
        stream: StreamKind,
        line: String,
    },
    Exit {
        child: ChildId,
        status: ExitInfo,
    },
    Window(WindowEvent),
    Shutdown,
}

impl BridgeEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BridgeEvent::Input(_) => EventKind::Input,
            BridgeEvent::RepeatTick { .. } => EventKind::Repeat,
            BridgeEvent::Line { stream, .. } => (*stream).into(),
            BridgeEvent::Exit { .. } => EventKind::Exit,
            BridgeEvent::Window(_) => EventKind::Window,
            BridgeEvent::Shutdown => EventKind::Shutdown,
        }
    }
}

/// Вид исходного события, используется в логах ошибок скрипта
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Input,
    Repeat,
    Stdout,
    Stderr,
    Exit,
    Window,
    Shutdown,
}

impl From<StreamKind> for EventKind {
    fn from(stream: StreamKind) -> Self {
        match stream {
            StreamKind::Stdout => EventKind::Stdout,
            StreamKind::Stderr => EventKind::Stderr,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Input => "input",
            EventKind::Repeat => "repeat",
            EventKind::Stdout => "stdout",
            EventKind::Stderr => "stderr",
            EventKind::Exit => "exit",
            EventKind::Window => "window",
            EventKind::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}
