//! Lua 5.4 рантайм поверх `mlua`.

mod api;
mod child;

pub use child::LuaChild;

use super::{CallbackId, ScriptEngine, ScriptError, ScriptValue};
use crate::bridge::SharedCore;
use crate::debug_if_enabled;
use mlua::prelude::*;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use tracing::info;

pub(crate) type SharedStore = Rc<RefCell<CallbackStore>>;

/// Lua функции, на которые мост ссылается через [`CallbackId`]
#[derive(Default)]
pub(crate) struct CallbackStore {
    next_id: u64,
    entries: HashMap<CallbackId, LuaRegistryKey>,
}

impl CallbackStore {
    pub(crate) fn insert(&mut self, lua: &Lua, callback: LuaFunction) -> LuaResult<CallbackId> {
        let key = lua.create_registry_value(callback)?;
        self.next_id += 1;
        let id = CallbackId::new(self.next_id);
        self.entries.insert(id, key);
        Ok(id)
    }

    fn function(&self, lua: &Lua, id: CallbackId) -> Option<LuaResult<LuaFunction>> {
        self.entries.get(&id).map(|key| lua.registry_value(key))
    }

    pub(crate) fn remove(&mut self, lua: &Lua, id: CallbackId) {
        if let Some(key) = self.entries.remove(&id) {
            let _ = lua.remove_registry_value(key);
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

impl From<LuaError> for ScriptError {
    fn from(err: LuaError) -> Self {
        ScriptError::Runtime(err.to_string())
    }
}

pub struct LuaEngine {
    lua: Lua,
    core: SharedCore,
    store: SharedStore,
}

impl LuaEngine {
    /// Создать состояние Lua и зарегистрировать таблицу `wm`
    pub fn new(core: SharedCore) -> Result<Self, ScriptError> {
        let lua = Lua::new();
        let store = SharedStore::default();
        api::register(&lua, &core, &store)?;

        Ok(Self { lua, core, store })
    }

    pub fn load_file(&mut self, path: &Path) -> Result<(), ScriptError> {
        let name = path.display().to_string();
        let source = std::fs::read_to_string(path).map_err(|e| ScriptError::Load {
            name: name.clone(),
            message: e.to_string(),
        })?;
        self.load_str(&name, &source)
    }

    /// Выполнить фрагмент. Привязки, сделанные до ошибки, остаются в силе.
    pub fn load_str(&mut self, name: &str, source: &str) -> Result<(), ScriptError> {
        let result = self
            .lua
            .load(source)
            .set_name(format!("@{}", name))
            .exec();
        self.release_replaced();

        result.map_err(|e| ScriptError::Load {
            name: name.to_string(),
            message: e.to_string(),
        })?;

        info!(
            "Скрипт {} загружен, callback'ов: {}",
            name,
            self.store.borrow().len()
        );
        Ok(())
    }

    /// Вне цикла доставки заменённые callback'и освобождаем сами
    fn release_replaced(&mut self) {
        let released = self.core.borrow_mut().take_released();
        for callback in released {
            self.release(callback);
        }
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    fn to_lua(&self, value: &ScriptValue) -> LuaResult<LuaValue> {
        Ok(match value {
            ScriptValue::Nil => LuaValue::Nil,
            ScriptValue::Integer(i) => LuaValue::Integer(*i),
            ScriptValue::String(s) => LuaValue::String(self.lua.create_string(s)?),
        })
    }
}

impl ScriptEngine for LuaEngine {
    fn invoke(&mut self, callback: CallbackId, args: &[ScriptValue]) -> Result<(), ScriptError> {
        // Хранилище отпускается до вызова: callback может регистрировать новые
        let function = self
            .store
            .borrow()
            .function(&self.lua, callback)
            .ok_or(ScriptError::UnknownCallback(callback))??;

        let args = args
            .iter()
            .map(|value| self.to_lua(value))
            .collect::<LuaResult<Vec<_>>>()?;

        function.call::<()>(LuaMultiValue::from_vec(args))?;
        Ok(())
    }

    fn release(&mut self, callback: CallbackId) {
        debug_if_enabled!("Освобождение {}", callback);
        self.store.borrow_mut().remove(&self.lua, callback);
    }
}
