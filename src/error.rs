use crate::events::{ChildId, StreamKind};
use crate::script::ScriptError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Ошибка конфигурации: {0}")]
    Config(String),

    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error("Ошибка чтения {stream} процесса {child}: {source}")]
    StreamIo {
        child: ChildId,
        stream: StreamKind,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("Неизвестный дочерний процесс: {0}")]
    UnknownChild(ChildId),

    #[error("Неизвестная клавиша: {0}")]
    UnknownKey(String),

    #[error("Ошибка ввода-вывода: {0}")]
    Io(#[from] std::io::Error),

    #[error("Устройство не найдено: {0}")]
    DeviceNotFound(String),

    #[error("Недостаточно прав доступа: {0}")]
    Permission(String),

    #[error("Очередь событий закрыта")]
    QueueClosed,

    #[error("Внутренняя ошибка: {0}")]
    Internal(String),
}

/// Ошибки запуска дочернего процесса. Возвращаются синхронно вызывающему `spawn`.
#[derive(Error, Debug)]
pub enum SpawnError {
    #[error("Пустая команда")]
    EmptyCommand,

    #[error("Не удалось запустить '{command}': {source}")]
    Exec {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Процесс '{command}' запущен без канала {stream}")]
    MissingPipe { command: String, stream: StreamKind },
}

impl BridgeError {
    pub fn device_not_found<T>(msg: impl Into<String>) -> Result<T> {
        Err(BridgeError::DeviceNotFound(msg.into()))
    }

    pub fn config<T>(msg: impl Into<String>) -> Result<T> {
        Err(BridgeError::Config(msg.into()))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

// Удобные макросы для создания ошибок
#[macro_export]
macro_rules! bridge_error {
    (config, $($arg:tt)*) => {
        $crate::error::BridgeError::Config(format!($($arg)*))
    };
    (device_not_found, $($arg:tt)*) => {
        $crate::error::BridgeError::DeviceNotFound(format!($($arg)*))
    };
    (permission, $($arg:tt)*) => {
        $crate::error::BridgeError::Permission(format!($($arg)*))
    };
    (unknown_key, $($arg:tt)*) => {
        $crate::error::BridgeError::UnknownKey(format!($($arg)*))
    };
    (internal, $($arg:tt)*) => {
        $crate::error::BridgeError::Internal(format!($($arg)*))
    };
}
