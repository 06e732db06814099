use crate::error::{BridgeError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Класс устройства ввода, которое ищем
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Keyboard,
    Pointer,
}

impl DeviceKind {
    fn label(&self) -> &'static str {
        match self {
            DeviceKind::Keyboard => "клавиатура",
            DeviceKind::Pointer => "указатель",
        }
    }

    /// Приоритет устройства по имени ссылки в /dev/input/by-id. None - не подходит.
    fn by_id_priority(&self, name: &str) -> Option<u32> {
        if !name.contains("event") {
            return None;
        }
        let lower = name.to_lowercase();
        match self {
            DeviceKind::Keyboard => {
                if lower.contains("mouse") {
                    None
                } else if name.ends_with("event-kbd") {
                    Some(100)
                } else if lower.contains("keyboard") || lower.contains("kbd") {
                    Some(50)
                } else {
                    None
                }
            }
            DeviceKind::Pointer => {
                if name.ends_with("event-mouse") {
                    Some(100)
                } else if lower.contains("mouse") {
                    Some(50)
                } else {
                    None
                }
            }
        }
    }
}

/// Что известно о возможностях устройства после открытия через evdev
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    pub name: String,
    pub has_letter_keys: bool,
    pub key_count: usize,
    pub has_left_button: bool,
}

impl Capabilities {
    fn probe(device: &evdev::Device) -> Self {
        let name = device.name().unwrap_or("Unknown").to_string();
        match device.supported_keys() {
            Some(keys) => Self {
                name,
                has_letter_keys: keys.contains(evdev::KeyCode::KEY_A)
                    && keys.contains(evdev::KeyCode::KEY_SPACE)
                    && keys.contains(evdev::KeyCode::KEY_ENTER),
                key_count: keys.iter().count(),
                has_left_button: keys.contains(evdev::KeyCode::BTN_LEFT),
            },
            None => Self {
                name,
                ..Self::default()
            },
        }
    }

    /// Подходит ли устройство под класс
    pub fn matches(&self, kind: DeviceKind) -> bool {
        let lower = self.name.to_lowercase();
        match kind {
            DeviceKind::Keyboard => {
                let pointer_like = ["mouse", "touchpad", "trackpoint"]
                    .iter()
                    .any(|word| lower.contains(word));
                !pointer_like && self.has_letter_keys && self.key_count > 20
            }
            DeviceKind::Pointer => self.has_left_button && !self.has_letter_keys,
        }
    }
}

pub struct DeviceFinder;

impl DeviceFinder {
    /// Найти клавиатуру: явный путь или `auto`
    pub fn find_keyboard_device(device_path: &str) -> Result<PathBuf> {
        Self::find_device(device_path, DeviceKind::Keyboard)
    }

    /// Найти мышь/тачпад: явный путь или `auto`
    pub fn find_pointer_device(device_path: &str) -> Result<PathBuf> {
        Self::find_device(device_path, DeviceKind::Pointer)
    }

    pub fn find_device(device_path: &str, kind: DeviceKind) -> Result<PathBuf> {
        if device_path != "auto" {
            let path = PathBuf::from(device_path);
            return if path.exists() {
                info!("Используется указанное устройство ({}): {:?}", kind.label(), path);
                Ok(path)
            } else {
                BridgeError::device_not_found(format!(
                    "Указанное устройство не найдено: {:?}",
                    path
                ))
            };
        }

        Self::auto_find(kind)
    }

    fn auto_find(kind: DeviceKind) -> Result<PathBuf> {
        info!("Автопоиск устройства: {}", kind.label());

        if let Ok(device) = Self::find_by_id(kind) {
            info!("Найдено устройство по ID: {:?}", device);
            return Ok(device);
        }

        if let Ok(device) = Self::find_by_event_devices(kind) {
            info!("Найдено устройство среди event устройств: {:?}", device);
            return Ok(device);
        }

        BridgeError::device_not_found(format!(
            "Не удалось найти устройство ({}). \
             Убедитесь, что пользователь добавлен в группу 'input'",
            kind.label()
        ))
    }

    fn find_by_id(kind: DeviceKind) -> Result<PathBuf> {
        let by_id_dir = Path::new("/dev/input/by-id");

        if !by_id_dir.exists() {
            debug!("Директория /dev/input/by-id не существует");
            return BridgeError::device_not_found("Директория by-id не найдена");
        }

        let entries = fs::read_dir(by_id_dir).map_err(|e| {
            BridgeError::Permission(format!("Нет доступа к /dev/input/by-id: {}", e))
        })?;

        let mut candidates = Vec::new();

        for entry in entries {
            let path = entry?.path();
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("")
                .to_string();

            let Some(priority) = kind.by_id_priority(&name) else {
                continue;
            };

            if !Self::is_device_accessible(&path) {
                warn!("Устройство {:?} недоступно", path);
                continue;
            }

            if Self::probe_matches(&path, kind) {
                info!("Кандидат ({}): {} (приоритет: {})", kind.label(), name, priority);
                candidates.push((path, priority));
            } else {
                debug!("Устройство не прошло проверку возможностей: {}", name);
            }
        }

        candidates.sort_by(|a, b| b.1.cmp(&a.1));

        match candidates.into_iter().next() {
            Some((path, _)) => Ok(path),
            None => BridgeError::device_not_found("Подходящее устройство не найдено в by-id"),
        }
    }

    fn find_by_event_devices(kind: DeviceKind) -> Result<PathBuf> {
        let input_dir = Path::new("/dev/input");

        let entries = fs::read_dir(input_dir)
            .map_err(|e| BridgeError::Permission(format!("Нет доступа к /dev/input: {}", e)))?;

        let mut event_devices = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_event = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("event"));
            if is_event {
                event_devices.push(path);
            }
        }

        event_devices.sort();

        for device_path in event_devices {
            debug!("Проверяем устройство: {:?}", device_path);
            if Self::probe_matches(&device_path, kind) {
                return Ok(device_path);
            }
        }

        BridgeError::device_not_found(format!(
            "Не найдено доступное устройство ({}) среди event устройств",
            kind.label()
        ))
    }

    fn probe_matches(device_path: &Path, kind: DeviceKind) -> bool {
        match evdev::Device::open(device_path) {
            Ok(device) => {
                let caps = Capabilities::probe(&device);
                let matches = caps.matches(kind);
                debug!(
                    "Устройство {:?} ({}): клавиш {}, подходит: {}",
                    device_path, caps.name, caps.key_count, matches
                );
                matches
            }
            Err(e) => {
                debug!("Не удалось открыть устройство {:?}: {}", device_path, e);
                false
            }
        }
    }

    fn is_device_accessible(device_path: &Path) -> bool {
        match fs::File::open(device_path) {
            Ok(_) => true,
            Err(e) => {
                debug!("Устройство {:?} недоступно: {}", device_path, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_missing_path() {
        let result = DeviceFinder::find_keyboard_device("/non/existent/path");
        assert!(matches!(result, Err(BridgeError::DeviceNotFound(_))));

        let result = DeviceFinder::find_pointer_device("/non/existent/mouse");
        assert!(matches!(result, Err(BridgeError::DeviceNotFound(_))));
    }

    #[test]
    fn test_explicit_existing_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();
        assert_eq!(
            DeviceFinder::find_keyboard_device(path).unwrap(),
            file.path().to_path_buf()
        );
    }

    #[test]
    fn test_by_id_priority() {
        let kbd = DeviceKind::Keyboard;
        assert_eq!(kbd.by_id_priority("usb-Logitech_K120-event-kbd"), Some(100));
        assert_eq!(kbd.by_id_priority("usb-Some_Keyboard-event-if01"), Some(50));
        assert_eq!(kbd.by_id_priority("usb-Razer_DeathAdder_Mouse-event-kbd"), None);
        assert_eq!(kbd.by_id_priority("usb-Logitech_K120-kbd"), None);

        let ptr = DeviceKind::Pointer;
        assert_eq!(ptr.by_id_priority("usb-Razer_DeathAdder-event-mouse"), Some(100));
        assert_eq!(ptr.by_id_priority("usb-Logitech_K120-event-kbd"), None);
    }

    #[test]
    fn test_capabilities_matching() {
        let keyboard = Capabilities {
            name: "AT Translated Set 2 keyboard".into(),
            has_letter_keys: true,
            key_count: 110,
            has_left_button: false,
        };
        assert!(keyboard.matches(DeviceKind::Keyboard));
        assert!(!keyboard.matches(DeviceKind::Pointer));

        let mouse = Capabilities {
            name: "Logitech USB Optical Mouse".into(),
            has_letter_keys: false,
            key_count: 5,
            has_left_button: true,
        };
        assert!(mouse.matches(DeviceKind::Pointer));
        assert!(!mouse.matches(DeviceKind::Keyboard));

        // Мышь с клавиатурным интерфейсом не считается клавиатурой
        let gaming_mouse = Capabilities {
            name: "Razer DeathAdder Mouse".into(),
            has_letter_keys: true,
            key_count: 200,
            has_left_button: false,
        };
        assert!(!gaming_mouse.matches(DeviceKind::Keyboard));
    }
}
