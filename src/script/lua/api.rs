//! Глобальная таблица `wm`: ввод, процессы, окна, логирование.
//!
//! ```lua
//! wm.input.setup({ repeat_info = { rate = 30, delay = 150 } })
//! wm.input.keybind({ "Control_L", "Alt_L" }, "Return", function()
//!     wm.proc.spawn({ "foot" })
//! end)
//!
//! local child = wm.proc.spawn("ls -1", { cwd = "/tmp" })
//! child:on_line_stdout(function(line) wm.log.info(line) end)
//! child:on_exit(function(code, signal) end)
//! ```

use super::child::{register_callback, LuaChild};
use super::SharedStore;
use crate::bridge::SharedCore;
use crate::config::SetupConfig;
use crate::error::BridgeError;
use crate::events::WindowEventKind;
use crate::services::process_supervisor::{CallbackSlot, CommandSpec, SpawnOptions};
use mlua::prelude::*;
use std::path::PathBuf;

pub(crate) fn register(lua: &Lua, core: &SharedCore, store: &SharedStore) -> LuaResult<()> {
    let wm = lua.create_table()?;

    wm.set("input", input_table(lua, core, store)?)?;
    wm.set("proc", proc_table(lua, core, store)?)?;
    wm.set("window", window_table(lua, core, store)?)?;
    wm.set("log", log_table(lua)?)?;

    let quit_core = SharedCore::clone(core);
    wm.set(
        "quit",
        lua.create_function(move |_, ()| {
            quit_core.borrow_mut().quit();
            Ok(())
        })?,
    )?;

    lua.globals().set("wm", wm)?;
    Ok(())
}

fn input_table(lua: &Lua, core: &SharedCore, store: &SharedStore) -> LuaResult<LuaTable> {
    let input = lua.create_table()?;

    // wm.input.setup(cfg): один раз, неизвестные поля - ошибка
    let setup_core = SharedCore::clone(core);
    input.set(
        "setup",
        lua.create_function(move |lua, config: LuaValue| {
            let config: SetupConfig = lua
                .from_value(config)
                .map_err(|e| LuaError::external(BridgeError::Config(e.to_string())))?;
            setup_core
                .borrow_mut()
                .setup(config)
                .map_err(LuaError::external)
        })?,
    )?;

    // wm.input.keybind(mods, key, fn)
    let (bind_core, bind_store) = (SharedCore::clone(core), SharedStore::clone(store));
    input.set(
        "keybind",
        lua.create_function(
            move |lua, (modifiers, key, callback): (Vec<String>, String, LuaFunction)| {
                let id = bind_store.borrow_mut().insert(lua, callback)?;
                let result = bind_core.borrow_mut().keybind(&modifiers, &key, id);
                result.map_err(|e| {
                    bind_store.borrow_mut().remove(lua, id);
                    LuaError::external(e)
                })
            },
        )?,
    )?;

    // wm.input.mousebind(mods, button, fn)
    let (mouse_core, mouse_store) = (SharedCore::clone(core), SharedStore::clone(store));
    input.set(
        "mousebind",
        lua.create_function(
            move |lua, (modifiers, button, callback): (Vec<String>, String, LuaFunction)| {
                let id = mouse_store.borrow_mut().insert(lua, callback)?;
                let result = mouse_core.borrow_mut().mousebind(&modifiers, &button, id);
                result.map_err(|e| {
                    mouse_store.borrow_mut().remove(lua, id);
                    LuaError::external(e)
                })
            },
        )?,
    )?;

    // wm.input.unbind(mods, key) -> bool
    let unbind_core = SharedCore::clone(core);
    input.set(
        "unbind",
        lua.create_function(move |_, (modifiers, key): (Vec<String>, String)| {
            unbind_core
                .borrow_mut()
                .unbind(&modifiers, &key)
                .map_err(LuaError::external)
        })?,
    )?;

    Ok(input)
}

/// Аргументы `spawn` после разбора
struct SpawnRequest {
    command: CommandSpec,
    options: SpawnOptions,
    callbacks: Vec<(CallbackSlot, LuaFunction)>,
}

fn parse_spawn(command: LuaValue, opts: Option<LuaTable>) -> LuaResult<SpawnRequest> {
    let command = match command {
        LuaValue::String(line) => CommandSpec::Shell(line.to_string_lossy()),
        LuaValue::Table(args) => CommandSpec::Argv(
            args.sequence_values::<String>()
                .collect::<LuaResult<Vec<_>>>()?,
        ),
        other => {
            return Err(LuaError::external(format!(
                "spawn: ожидается строка или список строк, получено {}",
                other.type_name()
            )))
        }
    };

    let mut options = SpawnOptions::default();
    let mut callbacks = Vec::new();

    if let Some(opts) = opts {
        options.cwd = opts.get::<Option<String>>("cwd")?.map(PathBuf::from);

        if let Some(env) = opts.get::<Option<LuaTable>>("env")? {
            for pair in env.pairs::<String, String>() {
                options.env.push(pair?);
            }
        }

        for (field, slot) in [
            ("stdout", CallbackSlot::Stdout),
            ("stderr", CallbackSlot::Stderr),
            ("exit", CallbackSlot::Exit),
        ] {
            if let Some(callback) = opts.get::<Option<LuaFunction>>(field)? {
                callbacks.push((slot, callback));
            }
        }
    }

    Ok(SpawnRequest {
        command,
        options,
        callbacks,
    })
}

fn proc_table(lua: &Lua, core: &SharedCore, store: &SharedStore) -> LuaResult<LuaTable> {
    let proc = lua.create_table()?;

    // wm.proc.spawn(cmd, opts?) -> child
    let (spawn_core, spawn_store) = (SharedCore::clone(core), SharedStore::clone(store));
    proc.set(
        "spawn",
        lua.create_function(move |lua, (command, opts): (LuaValue, Option<LuaTable>)| {
            let request = parse_spawn(command, opts)?;

            let spawned = spawn_core
                .borrow_mut()
                .spawn(&request.command, &request.options);
            let handle = spawned.map_err(LuaError::external)?;

            // Callback'и из opts регистрируются до возврата: ни одна строка не проходит мимо
            for (slot, callback) in request.callbacks {
                register_callback(lua, &spawn_core, &spawn_store, &handle, slot, callback)?;
            }

            Ok(LuaChild::new(
                handle,
                SharedCore::clone(&spawn_core),
                SharedStore::clone(&spawn_store),
            ))
        })?,
    )?;

    Ok(proc)
}

fn window_table(lua: &Lua, core: &SharedCore, store: &SharedStore) -> LuaResult<LuaTable> {
    let window = lua.create_table()?;

    // wm.window.on(kind, fn), fn(window_id, argument_or_nil)
    let (on_core, on_store) = (SharedCore::clone(core), SharedStore::clone(store));
    window.set(
        "on",
        lua.create_function(move |lua, (kind, callback): (String, LuaFunction)| {
            let Some(kind) = WindowEventKind::from_name(&kind) else {
                let known: Vec<&str> = WindowEventKind::ALL.iter().map(|k| k.as_str()).collect();
                return Err(LuaError::external(format!(
                    "Неизвестное событие окна '{}', допустимые: {}",
                    kind,
                    known.join(", ")
                )));
            };
            let id = on_store.borrow_mut().insert(lua, callback)?;
            on_core.borrow_mut().on_window_event(kind, id);
            Ok(())
        })?,
    )?;

    Ok(window)
}

fn log_table(lua: &Lua) -> LuaResult<LuaTable> {
    let log = lua.create_table()?;

    log.set(
        "trace",
        lua.create_function(|_, msg: String| {
            tracing::trace!(target: "script", "{}", msg);
            Ok(())
        })?,
    )?;
    log.set(
        "debug",
        lua.create_function(|_, msg: String| {
            tracing::debug!(target: "script", "{}", msg);
            Ok(())
        })?,
    )?;
    log.set(
        "info",
        lua.create_function(|_, msg: String| {
            tracing::info!(target: "script", "{}", msg);
            Ok(())
        })?,
    )?;
    log.set(
        "warn",
        lua.create_function(|_, msg: String| {
            tracing::warn!(target: "script", "{}", msg);
            Ok(())
        })?,
    )?;
    log.set(
        "error",
        lua.create_function(|_, msg: String| {
            tracing::error!(target: "script", "{}", msg);
            Ok(())
        })?,
    )?;

    Ok(log)
}
