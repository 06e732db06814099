use super::queue::EventSender;
use crate::config::{RepeatSettings, SetupConfig, XkbConfig};
use crate::error::{BridgeError, Result};
use crate::events::{
    BindingKey, BridgeEvent, ChildId, EventKind, InputEvent, KeyState, Trigger, WindowEvent, WindowEventKind,
};
use crate::script::{CallbackId, ScriptValue};
use crate::services::keybind_registry::KeybindRegistry;
use crate::services::key_repeater::KeyRepeater;
use crate::services::process_supervisor::{
    CallbackSlot, ChildHandle, CommandSpec, ProcessSupervisor, SpawnOptions,
};
use crate::{debug_if_enabled, trace_if_enabled};
use smallvec::{smallvec, SmallVec};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tokio::runtime::Handle;
use tracing::{info, warn};

/// Состояние потока скрипта. `Rc<RefCell<..>>` не `Send`: реестры и callback'и
/// не могут уйти на другой поток.
pub type SharedCore = Rc<RefCell<BridgeCore>>;

/// Что вызвать в ответ на событие
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub callback: CallbackId,
    pub origin: EventKind,
    pub args: SmallVec<[ScriptValue; 2]>,
}

impl Invocation {
    fn new(callback: CallbackId, origin: EventKind, args: SmallVec<[ScriptValue; 2]>) -> Self {
        Self {
            callback,
            origin,
            args,
        }
    }
}

/// Реестры и сервисы моста. Все изменения происходят на потоке скрипта,
/// в том числе синхронно изнутри callback'ов.
pub struct BridgeCore {
    sender: EventSender,
    keybinds: KeybindRegistry,
    repeater: KeyRepeater,
    supervisor: ProcessSupervisor,
    window_handlers: HashMap<WindowEventKind, CallbackId>,
    xkb: Option<XkbConfig>,
    setup_applied: bool,
    quit_requested: bool,
    released: Vec<CallbackId>,
}

impl BridgeCore {
    pub fn new(settings: RepeatSettings, runtime: Handle, sender: EventSender) -> Self {
        Self {
            repeater: KeyRepeater::new(runtime.clone(), sender.clone(), settings),
            supervisor: ProcessSupervisor::new(runtime, sender.clone()),
            sender,
            keybinds: KeybindRegistry::new(),
            window_handlers: HashMap::new(),
            xkb: None,
            setup_applied: false,
            quit_requested: false,
            released: Vec::new(),
        }
    }

    /// Однократная настройка из скрипта
    pub fn setup(&mut self, config: SetupConfig) -> Result<()> {
        if self.setup_applied {
            return BridgeError::config("setup уже был применён");
        }
        config.validate()?;

        if let Some(repeat) = config.repeat_info {
            self.repeater.set_settings(repeat.to_settings()?);
        }
        if let Some(xkb) = config.xkbconfig {
            info!(
                "xkb: layout {:?}, variant {:?}, options {:?}",
                xkb.layout, xkb.variant, xkb.options
            );
            self.xkb = Some(xkb);
        }

        self.setup_applied = true;
        info!("Настройка из скрипта применена");
        Ok(())
    }

    pub fn keybind<S: AsRef<str>>(&mut self, modifiers: &[S], key: &str, callback: CallbackId) -> Result<()> {
        let binding = KeybindRegistry::key_binding(modifiers, key)?;
        self.bind(binding, callback);
        Ok(())
    }

    pub fn mousebind<S: AsRef<str>>(
        &mut self,
        modifiers: &[S],
        button: &str,
        callback: CallbackId,
    ) -> Result<()> {
        let binding = KeybindRegistry::button_binding(modifiers, button)?;
        self.bind(binding, callback);
        Ok(())
    }

    fn bind(&mut self, binding: BindingKey, callback: CallbackId) {
        if let Some(previous) = self.keybinds.register(binding, callback) {
            info!("Привязка {} переназначена", binding);
            self.repeater.cancel_binding(&binding);
            self.released.push(previous);
        }
    }

    /// Удалить привязку клавиши. Возвращает false, если её не было.
    pub fn unbind<S: AsRef<str>>(&mut self, modifiers: &[S], key: &str) -> Result<bool> {
        let binding = KeybindRegistry::key_binding(modifiers, key)?;
        match self.keybinds.unregister(&binding) {
            Some(previous) => {
                self.repeater.cancel_binding(&binding);
                self.released.push(previous);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn on_window_event(&mut self, kind: WindowEventKind, callback: CallbackId) {
        if let Some(previous) = self.window_handlers.insert(kind, callback) {
            self.released.push(previous);
        }
    }

    pub fn spawn(&mut self, command: &CommandSpec, options: &SpawnOptions) -> Result<ChildHandle> {
        self.supervisor.spawn(command, options).map_err(|e| {
            warn!("Не удалось запустить '{}': {}", command, e);
            BridgeError::from(e)
        })
    }

    pub fn set_child_callback(
        &mut self,
        child: ChildId,
        slot: CallbackSlot,
        callback: CallbackId,
    ) -> Result<()> {
        if let Some(previous) = self.supervisor.set_callback(child, slot, callback)? {
            self.released.push(previous);
        }
        Ok(())
    }

    pub fn on_line_stdout(&mut self, child: ChildId, callback: CallbackId) -> Result<()> {
        self.set_child_callback(child, CallbackSlot::Stdout, callback)
    }

    pub fn on_line_stderr(&mut self, child: ChildId, callback: CallbackId) -> Result<()> {
        self.set_child_callback(child, CallbackSlot::Stderr, callback)
    }

    pub fn on_exit(&mut self, child: ChildId, callback: CallbackId) -> Result<()> {
        self.set_child_callback(child, CallbackSlot::Exit, callback)
    }

    pub fn kill(&mut self, child: ChildId) -> bool {
        self.supervisor.kill(child)
    }

    /// Цикл доставки остановится после текущего callback'а
    pub fn quit(&mut self) {
        if !self.quit_requested {
            info!("Запрошено завершение");
            self.quit_requested = true;
        }
    }

    pub fn is_quit_requested(&self) -> bool {
        self.quit_requested
    }

    /// Сопоставить событие с callback'ом. Сам вызов делает владелец рантайма
    /// уже после того, как заимствование ядра отпущено.
    pub fn route(&mut self, event: BridgeEvent) -> Option<Invocation> {
        match event {
            BridgeEvent::Input(input) => self.route_input(input),
            BridgeEvent::RepeatTick { key, generation } => {
                let callback = self.repeater.accept_tick(key, generation)?;
                Some(Invocation::new(callback, EventKind::Repeat, SmallVec::new()))
            }
            BridgeEvent::Line {
                child,
                stream,
                line,
            } => {
                let Some(callback) = self.supervisor.line_callback(child, stream) else {
                    trace_if_enabled!("{} {}: строка без получателя", child, stream);
                    return None;
                };
                Some(Invocation::new(
                    callback,
                    stream.into(),
                    smallvec![ScriptValue::String(line)],
                ))
            }
            BridgeEvent::Exit { child, status } => {
                let callbacks = self.supervisor.finish(child)?;
                self.released.extend(callbacks.all());
                let callback = callbacks.exit?;
                Some(Invocation::new(
                    callback,
                    EventKind::Exit,
                    smallvec![ScriptValue::from(status.code), ScriptValue::from(status.signal)],
                ))
            }
            BridgeEvent::Window(window) => self.route_window(window),
            BridgeEvent::Shutdown => {
                self.quit();
                None
            }
        }
    }

    fn route_input(&mut self, input: InputEvent) -> Option<Invocation> {
        match input.state {
            KeyState::Pressed => {
                let Some(callback) = self.keybinds.resolve(input.modifiers, input.trigger) else {
                    trace_if_enabled!("Нет привязки для {}", input.binding_key());
                    return None;
                };
                debug_if_enabled!("{} -> {}", input, callback);

                if let Trigger::Key(code) = input.trigger {
                    self.repeater.press(code, input.binding_key(), callback);
                }
                Some(Invocation::new(callback, EventKind::Input, SmallVec::new()))
            }
            KeyState::Released => {
                self.repeater.release(input.trigger.code());
                None
            }
            // Повторы генерирует KeyRepeater
            KeyState::Repeat => None,
        }
    }

    fn route_window(&mut self, window: WindowEvent) -> Option<Invocation> {
        let callback = self.window_handlers.get(&window.kind).copied()?;
        debug_if_enabled!("{} -> {}", window, callback);
        Some(Invocation::new(
            callback,
            EventKind::Window,
            smallvec![
                ScriptValue::Integer(window.window.0 as i64),
                ScriptValue::from(window.argument)
            ],
        ))
    }

    /// Callback'и, которые больше не могут сработать
    pub fn take_released(&mut self) -> Vec<CallbackId> {
        std::mem::take(&mut self.released)
    }

    /// Остановить повторы, завершить процессы и вернуть все callback'и
    pub fn shutdown(&mut self) -> Vec<CallbackId> {
        self.repeater.stop_all();
        self.supervisor.kill_all();

        let mut released = self.take_released();
        released.extend(self.supervisor.drain_callbacks());
        released.extend(self.keybinds.clear());
        released.extend(self.window_handlers.drain().map(|(_, callback)| callback));
        released
    }

    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    pub fn repeat_settings(&self) -> RepeatSettings {
        self.repeater.settings()
    }

    pub fn xkb(&self) -> Option<&XkbConfig> {
        self.xkb.as_ref()
    }

    pub fn keybinds(&self) -> &KeybindRegistry {
        &self.keybinds
    }

    pub fn repeater(&self) -> &KeyRepeater {
        &self.repeater
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }
}
