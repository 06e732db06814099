use crate::bridge::EventSender;
use crate::config::RepeatSettings;
use crate::events::{BindingKey, BridgeEvent, KeyCode};
use crate::script::CallbackId;
use crate::{debug_if_enabled, trace_if_enabled};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};
use tracing::info;

/// Живые поколения повторов по клавишам. Общая для `EventSender` и
/// `KeyRepeater`: отправка отпускания клавиши снимает её повтор сразу, не
/// дожидаясь, пока событие дойдёт до головы очереди.
#[derive(Debug, Clone, Default)]
pub struct RepeatGate {
    live: Arc<DashMap<KeyCode, u64>>,
}

impl RepeatGate {
    fn open(&self, key: KeyCode, generation: u64) {
        self.live.insert(key, generation);
    }

    /// Снять повтор клавиши. Возвращает true, если он был активен.
    pub fn revoke(&self, key: KeyCode) -> bool {
        self.live.remove(&key).is_some()
    }

    pub fn is_live(&self, key: KeyCode, generation: u64) -> bool {
        self.live
            .get(&key)
            .is_some_and(|current| *current == generation)
    }
}

/// Программный автоповтор удерживаемых клавиш.
///
/// Задача повтора только кладёт `RepeatTick` в очередь. Тик, уже стоящий в
/// очереди, отбрасывается при потреблении, если его поколение снято с `RepeatGate`.
pub struct KeyRepeater {
    runtime: Handle,
    sender: EventSender,
    gate: RepeatGate,
    settings: RwLock<RepeatSettings>,
    active_repeaters: DashMap<KeyCode, RepeaterTask>,
    generation: AtomicU64,
}

/// Состояние повтора одной физической клавиши
#[derive(Debug)]
struct RepeaterTask {
    handle: JoinHandle<()>,
    generation: u64,
    binding: BindingKey,
    callback: CallbackId,
    pressed_at: Instant,
}

impl KeyRepeater {
    pub fn new(runtime: Handle, sender: EventSender, settings: RepeatSettings) -> Self {
        info!(
            "Инициализация KeyRepeater (rate: {}/с, delay: {}мс)",
            settings.rate, settings.delay_ms
        );

        Self {
            runtime,
            gate: sender.repeat_gate().clone(),
            sender,
            settings: RwLock::new(settings),
            active_repeaters: DashMap::new(),
            generation: AtomicU64::new(1),
        }
    }

    pub fn settings(&self) -> RepeatSettings {
        *self.settings.read()
    }

    /// Новые параметры применяются к следующему нажатию, текущие повторы снимаются
    pub fn set_settings(&self, settings: RepeatSettings) {
        info!(
            "Параметры повтора: rate {}/с, delay {}мс",
            settings.rate, settings.delay_ms
        );
        *self.settings.write() = settings;
        self.stop_all();
    }

    /// Нажатие клавиши с найденной привязкой: запланировать повторы этого callback'а
    pub fn press(&self, key: KeyCode, binding: BindingKey, callback: CallbackId) {
        self.release(key);

        let settings = self.settings();
        let Some(interval) = settings.interval() else {
            trace_if_enabled!("Повтор выключен (rate = 0), {} не повторяется", key);
            return;
        };

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        self.gate.open(key, generation);

        let handle = self.runtime.spawn(Self::repeater_task(
            key,
            generation,
            settings.delay(),
            interval,
            self.sender.clone(),
            self.gate.clone(),
        ));

        debug_if_enabled!(
            "Запуск повтора {} ({}), поколение {}",
            key,
            binding,
            generation
        );

        self.active_repeaters.insert(
            key,
            RepeaterTask {
                handle,
                generation,
                binding,
                callback,
                pressed_at: Instant::now(),
            },
        );
    }

    /// Отпускание клавиши. Возвращает true, если повтор был активен.
    pub fn release(&self, key: KeyCode) -> bool {
        self.gate.revoke(key);
        match self.active_repeaters.remove(&key) {
            Some((_, task)) => {
                task.handle.abort();
                debug_if_enabled!(
                    "Повтор {} остановлен через {}мс",
                    key,
                    task.pressed_at.elapsed().as_millis()
                );
                true
            }
            None => false,
        }
    }

    /// Снять повторы привязки, которую переназначили или удалили
    pub fn cancel_binding(&self, binding: &BindingKey) {
        let keys: Vec<KeyCode> = self
            .active_repeaters
            .iter()
            .filter(|entry| entry.value().binding == *binding)
            .map(|entry| *entry.key())
            .collect();

        for key in keys {
            self.release(key);
        }
    }

    /// Тик из очереди: callback, если повтор ещё актуален
    pub fn accept_tick(&self, key: KeyCode, generation: u64) -> Option<CallbackId> {
        if !self.gate.is_live(key, generation) {
            trace_if_enabled!("Устаревший тик {} (поколение {})", key, generation);
            return None;
        }

        let entry = self.active_repeaters.get(&key)?;
        (entry.generation == generation).then_some(entry.callback)
    }

    pub fn is_repeating(&self, key: KeyCode) -> bool {
        self.active_repeaters.contains_key(&key)
    }

    pub fn active(&self) -> usize {
        self.active_repeaters.len()
    }

    /// Остановить все активные повторители
    pub fn stop_all(&self) {
        let count = self.active_repeaters.len();
        if count > 0 {
            info!("Остановка {} активных повторителей", count);

            let keys: Vec<KeyCode> = self
                .active_repeaters
                .iter()
                .map(|entry| *entry.key())
                .collect();

            for key in keys {
                self.gate.revoke(key);
                if let Some((_, task)) = self.active_repeaters.remove(&key) {
                    task.handle.abort();
                }
            }
        }
    }

    /// Задача повторения клавиши: первый тик через delay, затем каждые interval
    async fn repeater_task(
        key: KeyCode,
        generation: u64,
        delay: Duration,
        interval: Duration,
        sender: EventSender,
        gate: RepeatGate,
    ) {
        let start = tokio::time::Instant::now() + delay;
        let mut ticker = interval_at(start, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut repeat_count: u64 = 0;
        loop {
            ticker.tick().await;

            // Отпускание уже отправлено в очередь: больше не тикаем
            if !gate.is_live(key, generation) {
                break;
            }
            if sender.send(BridgeEvent::RepeatTick { key, generation }).is_err() {
                break;
            }
            repeat_count += 1;
        }

        debug_if_enabled!(
            "Задача повторения для {} завершена после {} повторов",
            key,
            repeat_count
        );
    }
}

impl Drop for KeyRepeater {
    fn drop(&mut self) {
        for entry in self.active_repeaters.iter() {
            self.gate.revoke(*entry.key());
            entry.value().handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{event_queue, EventReceiver};
    use crate::events::{InputEvent, KeyState, ModifierSet, Trigger};
    use tokio::runtime::Runtime;

    fn runtime() -> Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap()
    }

    fn binding(code: u16) -> BindingKey {
        BindingKey::new(ModifierSet::CONTROL_L, Trigger::Key(KeyCode(code)))
    }

    fn next_tick(rx: &mut EventReceiver, rt: &Runtime, timeout: Duration) -> Option<(KeyCode, u64)> {
        match rx.recv_timeout(rt.handle(), timeout)? {
            BridgeEvent::RepeatTick { key, generation } => Some((key, generation)),
            other => panic!("неожиданное событие {:?}", other),
        }
    }

    #[test]
    fn test_repeat_timing_and_release() {
        let rt = runtime();
        let (tx, mut rx) = event_queue();
        let repeater = KeyRepeater::new(
            rt.handle().clone(),
            tx,
            RepeatSettings {
                rate: 30,
                delay_ms: 150,
            },
        );

        let key = KeyCode(30);
        let pressed = Instant::now();
        repeater.press(key, binding(30), CallbackId::new(1));
        assert!(repeater.is_repeating(key));

        let (tick_key, generation) = next_tick(&mut rx, &rt, Duration::from_secs(2)).unwrap();
        let first = pressed.elapsed();
        assert_eq!(tick_key, key);
        assert!(first >= Duration::from_millis(150), "первый повтор через {:?}", first);
        assert_eq!(repeater.accept_tick(key, generation), Some(CallbackId::new(1)));

        let before_second = Instant::now();
        next_tick(&mut rx, &rt, Duration::from_secs(2)).unwrap();
        let gap = before_second.elapsed();
        assert!(gap <= Duration::from_millis(120), "интервал {:?}", gap);

        // Тики, уже стоящие в очереди, после отпускания устаревают
        std::thread::sleep(Duration::from_millis(80));
        assert!(repeater.release(key));
        while let Some((key, generation)) = next_tick(&mut rx, &rt, Duration::from_millis(10)) {
            assert_eq!(repeater.accept_tick(key, generation), None);
        }
        assert!(next_tick(&mut rx, &rt, Duration::from_millis(150)).is_none());
    }

    #[test]
    fn test_sent_key_up_cancels_queued_ticks() {
        let rt = runtime();
        let (tx, mut rx) = event_queue();
        let repeater = KeyRepeater::new(
            rt.handle().clone(),
            tx.clone(),
            RepeatSettings {
                rate: 100,
                delay_ms: 10,
            },
        );

        let key = KeyCode(30);
        repeater.press(key, binding(30), CallbackId::new(1));
        std::thread::sleep(Duration::from_millis(100));

        // Отпускание ещё не дошло до репитера, но тики уже недействительны
        tx.input(InputEvent::new(
            ModifierSet::CONTROL_L,
            Trigger::Key(key),
            KeyState::Released,
            "test",
        ))
        .unwrap();
        assert!(repeater.is_repeating(key));

        let mut ticks = 0;
        let mut saw_release = false;
        while let Some(event) = rx.try_recv() {
            match event {
                BridgeEvent::RepeatTick { key, generation } => {
                    assert_eq!(repeater.accept_tick(key, generation), None);
                    ticks += 1;
                }
                BridgeEvent::Input(input) => {
                    assert_eq!(input.state, KeyState::Released);
                    saw_release = true;
                }
                other => panic!("неожиданное событие {:?}", other),
            }
        }
        assert!(saw_release);
        assert!(ticks > 0);

        // Задача повтора больше ничего не отправляет. Допустим один тик,
        // проверенный задачей до снятия поколения.
        std::thread::sleep(Duration::from_millis(100));
        let mut late = 0;
        while let Some((key, generation)) = next_tick(&mut rx, &rt, Duration::from_millis(10)) {
            assert_eq!(repeater.accept_tick(key, generation), None);
            late += 1;
        }
        assert!(late <= 1, "поздних тиков: {}", late);
    }

    #[test]
    fn test_repress_invalidates_old_generation() {
        let rt = runtime();
        let (tx, _rx) = event_queue();
        let repeater = KeyRepeater::new(rt.handle().clone(), tx, RepeatSettings::default());

        let key = KeyCode(30);
        repeater.press(key, binding(30), CallbackId::new(1));
        repeater.press(key, binding(30), CallbackId::new(2));
        assert_eq!(repeater.active(), 1);

        // Поколения выдаются по возрастанию с 1: первое нажатие получило 1
        assert_eq!(repeater.accept_tick(key, 1), None);
        assert_eq!(repeater.accept_tick(key, 2), Some(CallbackId::new(2)));
    }

    #[test]
    fn test_rate_zero_disables_repeat() {
        let rt = runtime();
        let (tx, mut rx) = event_queue();
        let repeater = KeyRepeater::new(
            rt.handle().clone(),
            tx,
            RepeatSettings { rate: 0, delay_ms: 0 },
        );

        repeater.press(KeyCode(30), binding(30), CallbackId::new(1));
        assert!(!repeater.is_repeating(KeyCode(30)));
        assert!(next_tick(&mut rx, &rt, Duration::from_millis(50)).is_none());
    }

    #[test]
    fn test_cancel_binding_and_settings_change() {
        let rt = runtime();
        let (tx, _rx) = event_queue();
        let repeater = KeyRepeater::new(rt.handle().clone(), tx, RepeatSettings::default());

        repeater.press(KeyCode(30), binding(30), CallbackId::new(1));
        repeater.press(KeyCode(48), binding(48), CallbackId::new(2));

        repeater.cancel_binding(&binding(30));
        assert!(!repeater.is_repeating(KeyCode(30)));
        assert!(repeater.is_repeating(KeyCode(48)));

        repeater.set_settings(RepeatSettings { rate: 10, delay_ms: 500 });
        assert_eq!(repeater.active(), 0);
        assert_eq!(repeater.settings().rate, 10);
    }
}
