use super::SharedStore;
use crate::bridge::SharedCore;
use crate::services::process_supervisor::{CallbackSlot, ChildHandle};
use mlua::prelude::*;

/// Дочерний процесс на стороне Lua: `child:on_line_stdout(fn)`, `child:wait()`, ...
pub struct LuaChild {
    handle: ChildHandle,
    core: SharedCore,
    store: SharedStore,
}

impl LuaChild {
    pub(crate) fn new(handle: ChildHandle, core: SharedCore, store: SharedStore) -> Self {
        Self {
            handle,
            core,
            store,
        }
    }

    fn register(&self, lua: &Lua, slot: CallbackSlot, callback: LuaFunction) -> LuaResult<()> {
        register_callback(lua, &self.core, &self.store, &self.handle, slot, callback)
    }
}

/// Сохранить функцию и привязать её к слоту процесса. При ошибке функция
/// не остаётся в хранилище.
pub(crate) fn register_callback(
    lua: &Lua,
    core: &SharedCore,
    store: &SharedStore,
    handle: &ChildHandle,
    slot: CallbackSlot,
    callback: LuaFunction,
) -> LuaResult<()> {
    let id = store.borrow_mut().insert(lua, callback)?;
    let result = core.borrow_mut().set_child_callback(handle.id, slot, id);
    if let Err(e) = result {
        store.borrow_mut().remove(lua, id);
        return Err(LuaError::external(e));
    }
    Ok(())
}

impl LuaUserData for LuaChild {
    fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("pid", |_, this, ()| Ok(this.handle.pid));

        methods.add_method("id", |_, this, ()| Ok(this.handle.id.0));

        methods.add_method("on_line_stdout", |lua, this, callback: LuaFunction| {
            this.register(lua, CallbackSlot::Stdout, callback)
        });

        methods.add_method("on_line_stderr", |lua, this, callback: LuaFunction| {
            this.register(lua, CallbackSlot::Stderr, callback)
        });

        methods.add_method("on_exit", |lua, this, callback: LuaFunction| {
            this.register(lua, CallbackSlot::Exit, callback)
        });

        // Блокирует поток скрипта до завершения процесса
        methods.add_method("wait", |_, this, ()| {
            let info = this.handle.wait();
            Ok((info.code, info.signal))
        });

        methods.add_method("kill", |_, this, ()| {
            Ok(this.core.borrow_mut().kill(this.handle.id))
        });

        methods.add_method("running", |_, this, ()| {
            Ok(this.core.borrow().supervisor().is_running(this.handle.id))
        });
    }
}
