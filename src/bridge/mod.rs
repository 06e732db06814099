//! Мост событий: все производители пишут в одну очередь, поток скрипта
//! разбирает её по порядку и вызывает callback'и по одному, до завершения.

pub mod queue;
pub mod router;

pub use router::{BridgeCore, Invocation, SharedCore};
pub use queue::{event_queue, EventReceiver, EventSender};

use crate::config::RepeatSettings;
use crate::events::BridgeEvent;
use crate::script::ScriptEngine;
use crate::trace_if_enabled;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{error, info};

pub struct Bridge {
    core: SharedCore,
    receiver: EventReceiver,
    runtime: Handle,
}

impl Bridge {
    /// Создаётся на потоке скрипта; фоновые задачи запускаются в `runtime`
    pub fn new(settings: RepeatSettings, runtime: Handle) -> Self {
        let (sender, receiver) = event_queue();
        let core = BridgeCore::new(settings, runtime.clone(), sender);

        Self {
            core: Rc::new(RefCell::new(core)),
            receiver,
            runtime,
        }
    }

    pub fn core(&self) -> SharedCore {
        Rc::clone(&self.core)
    }

    /// Отправитель для производителей на других потоках
    pub fn sender(&self) -> EventSender {
        self.core.borrow().sender()
    }

    pub fn quit_requested(&self) -> bool {
        self.core.borrow().is_quit_requested()
    }

    /// Доставить одно событие. Ошибка скрипта логируется, доставка продолжается.
    pub fn dispatch<E: ScriptEngine + ?Sized>(&self, event: BridgeEvent, engine: &mut E) {
        let kind = event.kind();
        trace_if_enabled!("Событие {}", kind);

        // Заимствование отпускается до вызова: callback может обращаться к ядру
        let invocation = self.core.borrow_mut().route(event);

        if let Some(invocation) = invocation {
            if let Err(e) = engine.invoke(invocation.callback, &invocation.args) {
                error!(
                    "Ошибка в callback {} (событие {}): {}",
                    invocation.callback, invocation.origin, e
                );
            }
        }

        let released = self.core.borrow_mut().take_released();
        for callback in released {
            engine.release(callback);
        }
    }

    /// Разобрать всё, что уже лежит в очереди, не блокируясь.
    /// Для встраивания в цикл событий хоста.
    pub fn dispatch_pending<E: ScriptEngine + ?Sized>(&mut self, engine: &mut E) -> usize {
        let mut delivered = 0;
        while !self.quit_requested() {
            let Some(event) = self.receiver.try_recv() else {
                break;
            };
            self.dispatch(event, engine);
            delivered += 1;
        }
        delivered
    }

    /// Дождаться одного события не дольше `timeout` и доставить его
    pub fn dispatch_next<E: ScriptEngine + ?Sized>(&mut self, engine: &mut E, timeout: Duration) -> bool {
        match self.receiver.recv_timeout(&self.runtime, timeout) {
            Some(event) => {
                self.dispatch(event, engine);
                true
            }
            None => false,
        }
    }

    /// Блокирующий цикл доставки для отдельного потока скрипта. Возвращается
    /// после `quit()` или события Shutdown.
    pub fn run<E: ScriptEngine + ?Sized>(&mut self, engine: &mut E) {
        info!("Цикл доставки событий запущен");

        while !self.quit_requested() {
            match self.receiver.recv_blocking() {
                Some(event) => self.dispatch(event, engine),
                None => break,
            }
        }

        self.shutdown(engine);
    }

    /// Остановить повторы, послать kill всем процессам, освободить callback'и
    pub fn shutdown<E: ScriptEngine + ?Sized>(&mut self, engine: &mut E) {
        let released = self.core.borrow_mut().shutdown();
        for callback in released {
            engine.release(callback);
        }
        info!(
            "Мост остановлен, необработанных событий: {}",
            self.receiver.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RepeatInfo, SetupConfig};
    use crate::events::{
        ExitInfo, InputEvent, KeyCode, KeyState, ModifierSet, Trigger, WindowEvent,
        WindowEventKind, WindowId,
    };
    use crate::script::recording::RecordingEngine;
    use crate::script::{CallbackId, ScriptError, ScriptValue};
    use crate::services::process_supervisor::{CommandSpec, SpawnOptions};
    use std::time::Instant;
    use tokio::runtime::Runtime;

    const RETURN: u16 = 28;
    const A: u16 = 30;

    fn runtime() -> Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap()
    }

    fn bridge(rt: &Runtime, settings: RepeatSettings) -> Bridge {
        Bridge::new(settings, rt.handle().clone())
    }

    fn key(modifiers: ModifierSet, code: u16, state: KeyState) -> InputEvent {
        InputEvent::new(modifiers, Trigger::Key(KeyCode(code)), state, "test")
    }

    fn cb(id: u64) -> CallbackId {
        CallbackId::new(id)
    }

    /// Доставлять события, пока `done` не станет истинным
    fn pump_until<F>(bridge: &mut Bridge, engine: &mut RecordingEngine, mut done: F)
    where
        F: FnMut(&RecordingEngine) -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done(engine) {
            assert!(Instant::now() < deadline, "события не пришли вовремя");
            bridge.dispatch_next(engine, Duration::from_millis(50));
        }
    }

    #[test]
    fn test_rebind_fires_only_latest_callback() {
        let rt = runtime();
        let mut bridge = bridge(&rt, RepeatSettings::default());
        let mut engine = RecordingEngine::new();
        let core = bridge.core();

        core.borrow_mut().keybind(&["Control_L", "Alt_L"], "Return", cb(1)).unwrap();
        core.borrow_mut().keybind(&["Alt_L", "Control_L"], "Return", cb(2)).unwrap();

        let held = ModifierSet::CONTROL_L | ModifierSet::ALT_L;
        bridge.sender().input(key(held, RETURN, KeyState::Pressed)).unwrap();
        bridge.sender().input(key(held, RETURN, KeyState::Released)).unwrap();
        assert_eq!(bridge.dispatch_pending(&mut engine), 2);

        assert_eq!(engine.called(), vec![cb(2)]);
        assert_eq!(engine.released, vec![cb(1)]);
    }

    #[test]
    fn test_exact_match_and_key_phases() {
        let rt = runtime();
        let mut bridge = bridge(&rt, RepeatSettings::default());
        let mut engine = RecordingEngine::new();
        let core = bridge.core();
        core.borrow_mut().keybind(&["Control_L", "Alt_L"], "Return", cb(1)).unwrap();

        let sender = bridge.sender();
        let held = ModifierSet::CONTROL_L | ModifierSet::ALT_L;
        sender.input(key(held | ModifierSet::SHIFT_L, RETURN, KeyState::Pressed)).unwrap();
        sender.input(key(held, RETURN, KeyState::Released)).unwrap();
        sender.input(key(held, RETURN, KeyState::Repeat)).unwrap();
        bridge.dispatch_pending(&mut engine);
        assert!(engine.calls.is_empty());

        sender.input(key(held, RETURN, KeyState::Pressed)).unwrap();
        sender.input(key(held, RETURN, KeyState::Released)).unwrap();
        bridge.dispatch_pending(&mut engine);
        assert_eq!(engine.called(), vec![cb(1)]);
        assert!(!core.borrow().repeater().is_repeating(KeyCode(RETURN)));
    }

    #[test]
    fn test_repeat_timing_through_bridge() {
        let rt = runtime();
        let mut bridge = bridge(&rt, RepeatSettings { rate: 30, delay_ms: 150 });
        let mut engine = RecordingEngine::new();
        bridge.core().borrow_mut().keybind(&[] as &[&str], "a", cb(1)).unwrap();

        let pressed = Instant::now();
        bridge
            .sender()
            .input(key(ModifierSet::empty(), A, KeyState::Pressed))
            .unwrap();
        pump_until(&mut bridge, &mut engine, |engine| engine.calls.len() >= 4);

        let times: Vec<Instant> = engine.calls.iter().map(|(_, _, at)| *at).collect();
        assert!(times[1].duration_since(pressed) >= Duration::from_millis(150));
        for pair in times[1..].windows(2) {
            let gap = pair[1].duration_since(pair[0]);
            assert!(gap <= Duration::from_millis(120), "интервал повтора {:?}", gap);
        }

        // Тики успевают накопиться в очереди до отпускания
        std::thread::sleep(Duration::from_millis(100));
        let calls_at_release = engine.calls.len();
        bridge
            .sender()
            .input(key(ModifierSet::empty(), A, KeyState::Released))
            .unwrap();

        // Накопленные до отпускания тики уже недействительны
        while bridge.dispatch_next(&mut engine, Duration::from_millis(20)) {}
        assert!(!bridge.core().borrow().repeater().is_repeating(KeyCode(A)));

        std::thread::sleep(Duration::from_millis(150));
        bridge.dispatch_pending(&mut engine);
        assert_eq!(engine.calls.len(), calls_at_release);
    }

    #[test]
    fn test_key_up_sent_while_script_busy_stops_repeats() {
        let rt = runtime();
        let mut bridge = bridge(&rt, RepeatSettings { rate: 100, delay_ms: 10 });
        let mut engine = RecordingEngine::new();
        bridge.core().borrow_mut().keybind(&[] as &[&str], "a", cb(1)).unwrap();

        bridge
            .sender()
            .input(key(ModifierSet::empty(), A, KeyState::Pressed))
            .unwrap();
        bridge.dispatch_pending(&mut engine);
        assert_eq!(engine.called(), vec![cb(1)]);

        // Поток скрипта занят, тики копятся в очереди
        std::thread::sleep(Duration::from_millis(200));
        bridge
            .sender()
            .input(key(ModifierSet::empty(), A, KeyState::Released))
            .unwrap();
        bridge.dispatch_pending(&mut engine);

        assert_eq!(engine.called(), vec![cb(1)]);
    }

    #[test]
    fn test_echo_hello_stdout_before_exit() {
        let rt = runtime();
        let mut bridge = bridge(&rt, RepeatSettings::default());
        let mut engine = RecordingEngine::new();
        let core = bridge.core();

        let child = core
            .borrow_mut()
            .spawn(&CommandSpec::argv(["echo", "hello"]), &SpawnOptions::default())
            .unwrap();
        core.borrow_mut().on_line_stdout(child.id, cb(1)).unwrap();
        core.borrow_mut().on_exit(child.id, cb(2)).unwrap();

        pump_until(&mut bridge, &mut engine, |engine| engine.called().contains(&cb(2)));

        assert_eq!(engine.called(), vec![cb(1), cb(2)]);
        assert_eq!(engine.calls_of(cb(1)), vec![vec![ScriptValue::String("hello".into())]]);
        assert_eq!(
            engine.calls_of(cb(2)),
            vec![vec![ScriptValue::Integer(0), ScriptValue::Integer(0)]]
        );
        assert_eq!(engine.released, vec![cb(1), cb(2)]);
        assert!(!core.borrow().supervisor().is_running(child.id));
    }

    #[test]
    fn test_kill_reports_termination_and_drops_queued_lines() {
        let rt = runtime();
        let mut bridge = bridge(&rt, RepeatSettings::default());
        let mut engine = RecordingEngine::new();
        let core = bridge.core();

        let child = core
            .borrow_mut()
            .spawn(&CommandSpec::argv(["sh", "-c", "echo one; echo two; exec sleep 30"]), &SpawnOptions::default())
            .unwrap();
        core.borrow_mut().on_line_stdout(child.id, cb(1)).unwrap();
        core.borrow_mut().on_line_stderr(child.id, cb(2)).unwrap();
        core.borrow_mut().on_exit(child.id, cb(3)).unwrap();

        // Строки уже в очереди, но ещё не доставлены
        std::thread::sleep(Duration::from_millis(200));
        assert!(core.borrow_mut().kill(child.id));
        assert!(!core.borrow_mut().kill(child.id));

        pump_until(&mut bridge, &mut engine, |engine| engine.called().contains(&cb(3)));
        assert_eq!(engine.called(), vec![cb(3)]);
        assert_eq!(
            engine.calls_of(cb(3)),
            vec![vec![ScriptValue::Integer(ExitInfo::NO_CODE as i64), ScriptValue::Integer(9)]]
        );
        assert!(!core.borrow_mut().kill(child.id));
    }

    #[test]
    fn test_kill_after_exit_delivers_output() {
        let rt = runtime();
        let mut bridge = bridge(&rt, RepeatSettings::default());
        let mut engine = RecordingEngine::new();
        let core = bridge.core();

        let child = core
            .borrow_mut()
            .spawn(&CommandSpec::argv(["echo", "hello"]), &SpawnOptions::default())
            .unwrap();
        core.borrow_mut().on_line_stdout(child.id, cb(1)).unwrap();
        core.borrow_mut().on_exit(child.id, cb(2)).unwrap();

        child.wait();
        assert!(!core.borrow_mut().kill(child.id));

        pump_until(&mut bridge, &mut engine, |engine| engine.called().contains(&cb(2)));
        assert_eq!(engine.called(), vec![cb(1), cb(2)]);
        assert_eq!(
            engine.calls_of(cb(2)),
            vec![vec![ScriptValue::Integer(0), ScriptValue::Integer(0)]]
        );
    }

    #[test]
    fn test_shutdown_releases_running_child_callbacks() {
        let rt = runtime();
        let mut bridge = bridge(&rt, RepeatSettings::default());
        let mut engine = RecordingEngine::new();
        let core = bridge.core();

        let child = core
            .borrow_mut()
            .spawn(&CommandSpec::argv(["sleep", "30"]), &SpawnOptions::default())
            .unwrap();
        core.borrow_mut().on_line_stdout(child.id, cb(1)).unwrap();
        core.borrow_mut().on_line_stderr(child.id, cb(2)).unwrap();
        core.borrow_mut().on_exit(child.id, cb(3)).unwrap();
        core.borrow_mut().keybind(&[] as &[&str], "a", cb(4)).unwrap();

        bridge.sender().shutdown().unwrap();
        bridge.run(&mut engine);

        let mut released = engine.released.clone();
        released.sort();
        assert_eq!(released, vec![cb(1), cb(2), cb(3), cb(4)]);

        // Процесс убит, его Exit уже некому доставлять
        assert_eq!(
            child.wait_timeout(Duration::from_secs(5)),
            Some(ExitInfo::signaled(9))
        );
        assert!(engine.calls.is_empty());
    }

    #[test]
    fn test_script_error_does_not_stop_delivery() {
        let rt = runtime();
        let mut bridge = bridge(&rt, RepeatSettings::default());
        let mut engine = RecordingEngine::new();
        let core = bridge.core();

        core.borrow_mut().on_window_event(WindowEventKind::Created, cb(1));
        core.borrow_mut().on_window_event(WindowEventKind::FocusChanged, cb(2));
        engine.on(cb(1), |_| Err(ScriptError::Runtime("boom".into())));

        let sender = bridge.sender();
        sender
            .window(WindowEvent::new(WindowEventKind::Created, WindowId(5), Some(3)))
            .unwrap();
        sender.window(WindowEvent::focus_changed(WindowId(5))).unwrap();
        sender
            .window(WindowEvent::new(WindowEventKind::Destroyed, WindowId(5), None))
            .unwrap();
        assert_eq!(bridge.dispatch_pending(&mut engine), 3);

        assert_eq!(engine.called(), vec![cb(1), cb(2)]);
        assert_eq!(
            engine.calls_of(cb(1)),
            vec![vec![ScriptValue::Integer(5), ScriptValue::Integer(3)]]
        );
        assert_eq!(
            engine.calls_of(cb(2)),
            vec![vec![ScriptValue::Integer(5), ScriptValue::Nil]]
        );
    }

    #[test]
    fn test_callbacks_reenter_core_and_quit_stops_loop() {
        let rt = runtime();
        let mut bridge = bridge(&rt, RepeatSettings::default());
        let mut engine = RecordingEngine::new();
        let core = bridge.core();
        core.borrow_mut().keybind(&["Super_L"], "a", cb(1)).unwrap();

        let child = core
            .borrow_mut()
            .spawn(&CommandSpec::argv(["sleep", "30"]), &SpawnOptions::default())
            .unwrap();

        let hook_core = bridge.core();
        engine.on(cb(1), move |_| {
            let mut core = hook_core.borrow_mut();
            core.keybind(&["Super_L"], "a", CallbackId::new(2))
                .map_err(|e| ScriptError::Runtime(e.to_string()))?;
            core.quit();
            Ok(())
        });

        let sender = bridge.sender();
        sender.input(key(ModifierSet::SUPER_L, A, KeyState::Pressed)).unwrap();
        sender.input(key(ModifierSet::SUPER_L, A, KeyState::Released)).unwrap();
        sender.input(key(ModifierSet::SUPER_L, A, KeyState::Pressed)).unwrap();
        bridge.run(&mut engine);

        // Цикл остановился сразу после callback'а, вызвавшего quit
        assert_eq!(engine.called(), vec![cb(1)]);
        assert!(engine.released.contains(&cb(1)));
        assert!(engine.released.contains(&cb(2)));
        assert_eq!(
            child.wait_timeout(Duration::from_secs(5)),
            Some(ExitInfo::signaled(9))
        );
    }

    #[test]
    fn test_shutdown_event_and_setup_once() {
        let rt = runtime();
        let mut bridge = bridge(&rt, RepeatSettings::default());
        let mut engine = RecordingEngine::new();
        let core = bridge.core();

        let setup = SetupConfig {
            repeat_info: Some(RepeatInfo { rate: 25, delay: 600 }),
            xkbconfig: None,
        };
        core.borrow_mut().setup(setup.clone()).unwrap();
        assert_eq!(core.borrow().repeat_settings(), RepeatSettings { rate: 25, delay_ms: 600 });
        assert!(core.borrow_mut().setup(setup).is_err());

        bridge.sender().shutdown().unwrap();
        bridge.run(&mut engine);
        assert!(bridge.quit_requested());
        assert!(engine.calls.is_empty());
        assert_eq!(core.borrow().supervisor().running(), 0);
    }
}
