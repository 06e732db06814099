use crate::bridge_error;
use crate::debug_if_enabled;
use crate::error::Result;
use crate::events::{BindingKey, KeyCode, ModifierSet, Trigger};
use crate::mappings::KeyCodes;
use crate::script::CallbackId;
use std::collections::HashMap;

/// Реестр привязок клавиш и кнопок мыши. Меняется и читается только на потоке скрипта.
#[derive(Debug, Default)]
pub struct KeybindRegistry {
    bindings: HashMap<BindingKey, CallbackId>,
}

impl KeybindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ключ привязки клавиши по именам модификаторов и клавиши
    pub fn key_binding<S: AsRef<str>>(modifiers: &[S], key: &str) -> Result<BindingKey> {
        let modifiers = ModifierSet::from_names(modifiers).map_err(|e| bridge_error!(config, "{}", e))?;
        let code = KeyCodes::key_code(key).ok_or_else(|| bridge_error!(unknown_key, "{}", key))?;
        Ok(BindingKey::new(modifiers, Trigger::Key(KeyCode::new(code))))
    }

    /// Ключ привязки кнопки мыши (`left`, `right`, `middle`, ...)
    pub fn button_binding<S: AsRef<str>>(modifiers: &[S], button: &str) -> Result<BindingKey> {
        let modifiers = ModifierSet::from_names(modifiers).map_err(|e| bridge_error!(config, "{}", e))?;
        let code = KeyCodes::button_code(button)
            .ok_or_else(|| bridge_error!(unknown_key, "кнопка {}", button))?;
        Ok(BindingKey::new(modifiers, Trigger::Button(KeyCode::new(code))))
    }

    /// Зарегистрировать привязку. Повторная регистрация заменяет прежнюю,
    /// прежний callback возвращается для освобождения.
    pub fn register(&mut self, key: BindingKey, callback: CallbackId) -> Option<CallbackId> {
        debug_if_enabled!("Привязка {} -> {:?}", key, callback);
        self.bindings.insert(key, callback)
    }

    pub fn unregister(&mut self, key: &BindingKey) -> Option<CallbackId> {
        self.bindings.remove(key)
    }

    /// Точное совпадение множества модификаторов: лишний зажатый модификатор
    /// означает другую комбинацию.
    pub fn resolve(&self, modifiers: ModifierSet, trigger: Trigger) -> Option<CallbackId> {
        self.bindings
            .get(&BindingKey::new(modifiers, trigger))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Очистить реестр, вернуть все callback'и
    pub fn clear(&mut self) -> Vec<CallbackId> {
        self.bindings.drain().map(|(_, callback)| callback).collect()
    }
}
