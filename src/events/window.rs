use std::fmt;

/// Идентификатор окна, выданный композитором
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(pub u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window#{}", self.0)
    }
}

/// Тип события окна
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowEventKind {
    Created,
    Destroyed,
    FocusChanged,
    TitleChanged,
    GeometryChanged,
    WorkspaceChanged,
}

impl WindowEventKind {
    pub const ALL: [WindowEventKind; 6] = [
        WindowEventKind::Created,
        WindowEventKind::Destroyed,
        WindowEventKind::FocusChanged,
        WindowEventKind::TitleChanged,
        WindowEventKind::GeometryChanged,
        WindowEventKind::WorkspaceChanged,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WindowEventKind::Created => "created",
            WindowEventKind::Destroyed => "destroyed",
            WindowEventKind::FocusChanged => "focus_changed",
            WindowEventKind::TitleChanged => "title_changed",
            WindowEventKind::GeometryChanged => "geometry_changed",
            WindowEventKind::WorkspaceChanged => "workspace_changed",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for WindowEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Уведомление оконной подсистемы: (тип, окно, необязательный числовой аргумент)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowEvent {
    pub kind: WindowEventKind,
    pub window: WindowId,
    pub argument: Option<i64>,
    pub timestamp: std::time::Instant,
}

impl WindowEvent {
    pub fn new(kind: WindowEventKind, window: WindowId, argument: Option<i64>) -> Self {
        Self {
            kind,
            window,
            argument,
            timestamp: std::time::Instant::now(),
        }
    }

    pub fn focus_changed(window: WindowId) -> Self {
        Self::new(WindowEventKind::FocusChanged, window, None)
    }
}

impl fmt::Display for WindowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.argument {
            Some(arg) => write!(
                f,
                "{}: {} [{}] ({}ms ago)",
                self.kind,
                self.window,
                arg,
                self.timestamp.elapsed().as_millis()
            ),
            None => write!(
                f,
                "{}: {} ({}ms ago)",
                self.kind,
                self.window,
                self.timestamp.elapsed().as_millis()
            ),
        }
    }
}
