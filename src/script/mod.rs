//! Граница между мостом и скриптовым рантаймом.
//!
//! Мост хранит только непрозрачные [`CallbackId`]. Сами значения функций живут
//! в рантайме и вызываются исключительно на потоке скрипта.

pub mod lua;

pub use lua::LuaEngine;

use std::fmt;
use thiserror::Error;

/// Непрозрачная ссылка на callback внутри скриптового рантайма
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(u64);

impl CallbackId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "callback#{}", self.0)
    }
}

/// Позиционный аргумент callback'а
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptValue {
    Nil,
    Integer(i64),
    String(String),
}

impl From<i64> for ScriptValue {
    fn from(value: i64) -> Self {
        ScriptValue::Integer(value)
    }
}

impl From<i32> for ScriptValue {
    fn from(value: i32) -> Self {
        ScriptValue::Integer(value.into())
    }
}

impl From<String> for ScriptValue {
    fn from(value: String) -> Self {
        ScriptValue::String(value)
    }
}

impl<T: Into<ScriptValue>> From<Option<T>> for ScriptValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ScriptValue::Nil)
    }
}

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Ошибка выполнения скрипта: {0}")]
    Runtime(String),

    #[error("Неизвестный callback: {0}")]
    UnknownCallback(CallbackId),

    #[error("Не удалось загрузить скрипт {name}: {message}")]
    Load { name: String, message: String },
}

/// Рантайм, способный вызвать сохранённый callback с аргументами.
/// Все методы вызываются только с потока скрипта.
pub trait ScriptEngine {
    fn invoke(&mut self, callback: CallbackId, args: &[ScriptValue]) -> Result<(), ScriptError>;

    /// Callback больше не может сработать (привязка заменена, процесс завершён)
    fn release(&mut self, _callback: CallbackId) {}
}

#[cfg(test)]
pub(crate) mod recording {
    use super::*;
    use std::collections::HashMap;
    use std::time::Instant;

    type Hook = Box<dyn FnMut(&[ScriptValue]) -> Result<(), ScriptError>>;

    /// Записывает вызовы; для отдельных callback'ов можно задать поведение
    #[derive(Default)]
    pub struct RecordingEngine {
        pub calls: Vec<(CallbackId, Vec<ScriptValue>, Instant)>,
        pub released: Vec<CallbackId>,
        hooks: HashMap<CallbackId, Hook>,
    }

    impl RecordingEngine {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn on<F>(&mut self, callback: CallbackId, hook: F)
        where
            F: FnMut(&[ScriptValue]) -> Result<(), ScriptError> + 'static,
        {
            self.hooks.insert(callback, Box::new(hook));
        }

        pub fn called(&self) -> Vec<CallbackId> {
            self.calls.iter().map(|(callback, _, _)| *callback).collect()
        }

        pub fn calls_of(&self, callback: CallbackId) -> Vec<Vec<ScriptValue>> {
            self.calls
                .iter()
                .filter(|(c, _, _)| *c == callback)
                .map(|(_, args, _)| args.clone())
                .collect()
        }
    }

    impl ScriptEngine for RecordingEngine {
        fn invoke(&mut self, callback: CallbackId, args: &[ScriptValue]) -> Result<(), ScriptError> {
            self.calls.push((callback, args.to_vec(), Instant::now()));
            match self.hooks.get_mut(&callback) {
                Some(hook) => hook(args),
                None => Ok(()),
            }
        }

        fn release(&mut self, callback: CallbackId) {
            self.released.push(callback);
        }
    }
}
