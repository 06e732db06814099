use crate::bridge::EventSender;
use crate::config::InputConfig;
use crate::error::{BridgeError, Result};
use crate::events::{InputEvent, KeyState, Trigger};
use crate::trace_if_enabled;
use crate::utils::DeviceFinder;
use evdev::{Device, EventType};
use parking_lot::RwLock;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::modifier_state::ModifierState;
use super::r#trait::InputSourceTrait;

/// Перевести сырое KEY событие evdev во внутреннее. Модификаторы берутся
/// до применения перехода самой клавиши.
pub fn translate(
    modifiers: &mut ModifierState,
    code: u16,
    value: i32,
    device_name: &str,
) -> Option<InputEvent> {
    let state = KeyState::from_evdev_value(value)?;
    let snapshot = modifiers.apply(code, state);
    Some(InputEvent::new(
        snapshot,
        Trigger::from_evdev_code(code),
        state,
        device_name,
    ))
}

/// Открытое устройство с запомненным именем
struct OpenedDevice {
    device: Device,
    name: String,
}

impl OpenedDevice {
    fn open(path: &Path) -> Result<Self> {
        let device = Device::open(path).map_err(|e| {
            BridgeError::DeviceNotFound(format!("Не удалось открыть устройство {:?}: {}", path, e))
        })?;
        let name = device.name().unwrap_or("Unknown").to_string();
        Self::log_opened_device(&device, path);
        Ok(Self { device, name })
    }

    fn log_opened_device(device: &Device, path: &Path) {
        info!("Устройство: {} ({:?})", device.name().unwrap_or("Unknown"), path);
        debug!("Физический путь: {:?}", device.physical_path());
        debug!("Уникальный ID: {:?}", device.unique_name());
    }
}

/// Читает клавиатуру и, если настроено, мышь. Устройства не захватываются:
/// композитор продолжает получать ввод.
pub struct EvdevInputSource {
    devices: Vec<OpenedDevice>,
    sender: EventSender,
    modifier_state: Arc<RwLock<ModifierState>>,
}

impl EvdevInputSource {
    pub fn new(config: &InputConfig, sender: EventSender) -> Result<Self> {
        info!("Инициализация EvdevInputSource");

        let keyboard_path = DeviceFinder::find_keyboard_device(&config.keyboard_device)?;
        let mut devices = vec![OpenedDevice::open(&keyboard_path)?];

        if let Some(pointer) = &config.pointer_device {
            match DeviceFinder::find_pointer_device(pointer).and_then(|p| OpenedDevice::open(&p)) {
                Ok(device) => devices.push(device),
                // При автопоиске отсутствие мыши не фатально
                Err(e) if pointer == "auto" => {
                    warn!("Мышь не найдена, mousebind не будет срабатывать: {}", e)
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Self {
            devices,
            sender,
            modifier_state: Arc::new(RwLock::new(ModifierState::new())),
        })
    }

    async fn run_impl(self) -> Result<()> {
        info!(
            "EvdevInputSource запущен, устройств: {}",
            self.devices.len()
        );

        let mut readers = JoinSet::new();
        for opened in self.devices {
            let sender = self.sender.clone();
            let modifiers = Arc::clone(&self.modifier_state);
            readers.spawn_blocking(move || read_device(opened, modifiers, sender));
        }

        while let Some(joined) = readers.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(e) => return Err(BridgeError::Internal(format!("Поток чтения устройства: {}", e))),
            }
        }

        info!("EvdevInputSource остановлен");
        Ok(())
    }
}

/// Блокирующее чтение одного устройства до закрытия очереди
fn read_device(
    mut opened: OpenedDevice,
    modifiers: Arc<RwLock<ModifierState>>,
    sender: EventSender,
) -> Result<()> {
    loop {
        let events = match opened.device.fetch_events() {
            Ok(events) => events,
            Err(e) if matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock) => {
                std::thread::sleep(Duration::from_millis(10));
                continue;
            }
            Err(e) => {
                error!("Ошибка чтения событий {}: {}", opened.name, e);
                return Err(BridgeError::Io(e));
            }
        };

        for event in events {
            if event.event_type() != EventType::KEY {
                continue;
            }

            let translated = translate(
                &mut modifiers.write(),
                event.code(),
                event.value(),
                &opened.name,
            );
            let Some(input) = translated else {
                debug!("Неизвестное значение события: {}", event.value());
                continue;
            };

            trace_if_enabled!("Событие ввода: {}", input);

            if sender.input(input).is_err() {
                info!("Очередь закрыта, чтение {} прекращено", opened.name);
                return Ok(());
            }
        }
    }
}

#[async_trait::async_trait]
impl InputSourceTrait for EvdevInputSource {
    async fn run(self: Box<Self>) -> Result<()> {
        (*self).run_impl().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{KeyCode, ModifierSet};

    #[test]
    fn test_translate_key_sequence() {
        let mut state = ModifierState::new();

        let ctrl = translate(&mut state, 29, 1, "kbd").unwrap();
        assert_eq!(ctrl.modifiers, ModifierSet::empty());
        assert_eq!(ctrl.state, KeyState::Pressed);

        let enter = translate(&mut state, 28, 1, "kbd").unwrap();
        assert_eq!(enter.modifiers, ModifierSet::CONTROL_L);
        assert_eq!(enter.trigger, Trigger::Key(KeyCode(28)));
        assert_eq!(enter.device_name, "kbd");

        let repeat = translate(&mut state, 28, 2, "kbd").unwrap();
        assert_eq!(repeat.state, KeyState::Repeat);
    }

    #[test]
    fn test_translate_button_uses_keyboard_modifiers() {
        let mut state = ModifierState::new();
        translate(&mut state, 125, 1, "kbd");

        let click = translate(&mut state, 272, 1, "mouse").unwrap();
        assert_eq!(click.trigger, Trigger::Button(KeyCode(272)));
        assert_eq!(click.modifiers, ModifierSet::SUPER_L);
    }

    #[test]
    fn test_translate_rejects_unknown_value() {
        let mut state = ModifierState::new();
        assert!(translate(&mut state, 29, 7, "kbd").is_none());
        assert!(state.current().is_empty());
    }
}
