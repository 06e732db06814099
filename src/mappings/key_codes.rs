use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Каноническое имя клавиши -> evdev код. Первое имя для кода считается основным
/// при обратном преобразовании.
const KEYS: &[(&str, u16)] = &[
    // Буквенные клавиши
    ("a", 30), ("b", 48), ("c", 46), ("d", 32), ("e", 18), ("f", 33),
    ("g", 34), ("h", 35), ("i", 23), ("j", 36), ("k", 37), ("l", 38),
    ("m", 50), ("n", 49), ("o", 24), ("p", 25), ("q", 16), ("r", 19),
    ("s", 31), ("t", 20), ("u", 22), ("v", 47), ("w", 17), ("x", 45),
    ("y", 21), ("z", 44),

    // Цифровые клавиши (верхний ряд)
    ("1", 2), ("2", 3), ("3", 4), ("4", 5), ("5", 6),
    ("6", 7), ("7", 8), ("8", 9), ("9", 10), ("0", 11),

    // Специальные клавиши
    ("space", 57),
    ("enter", 28),
    ("escape", 1),
    ("backspace", 14),
    ("tab", 15),
    ("capslock", 58),

    // Пунктуация
    ("minus", 12),
    ("equal", 13),
    ("leftbrace", 26),
    ("rightbrace", 27),
    ("backslash", 43),
    ("semicolon", 39),
    ("apostrophe", 40),
    ("grave", 41),
    ("comma", 51),
    ("dot", 52),
    ("slash", 53),

    // Навигация/редакция
    ("insert", 110),
    ("delete", 111),
    ("home", 102),
    ("end", 107),
    ("pageup", 104),
    ("pagedown", 109),

    // Системные
    ("printscreen", 99),
    ("scrolllock", 70),
    ("pause", 119),

    // Numpad
    ("kp0", 82), ("kp1", 79), ("kp2", 80), ("kp3", 81), ("kp4", 75),
    ("kp5", 76), ("kp6", 77), ("kp7", 71), ("kp8", 72), ("kp9", 73),
    ("kpdecimal", 83),
    ("kpdivide", 98),
    ("kpmultiply", 55),
    ("kpadd", 78),
    ("kpsubtract", 74),
    ("kpenter", 96),

    // Модификаторы как самостоятельные клавиши
    ("control_l", 29),
    ("control_r", 97),
    ("shift_l", 42),
    ("shift_r", 54),
    ("alt_l", 56),
    ("alt_r", 100),
    ("super_l", 125),
    ("super_r", 126),

    // Стрелки
    ("up", 103),
    ("down", 108),
    ("left", 105),
    ("right", 106),

    // Функциональные клавиши
    ("f1", 59), ("f2", 60), ("f3", 61), ("f4", 62), ("f5", 63), ("f6", 64),
    ("f7", 65), ("f8", 66), ("f9", 67), ("f10", 68), ("f11", 87), ("f12", 88),
];

/// Синонимы в нотации xkb keysym
const KEY_ALIASES: &[(&str, &str)] = &[
    ("return", "enter"),
    ("esc", "escape"),
    ("print", "printscreen"),
    ("period", "dot"),
    ("prior", "pageup"),
    ("next", "pagedown"),
    ("ctrl", "control_l"),
    ("shift", "shift_l"),
    ("alt", "alt_l"),
    ("super", "super_l"),
];

const BUTTONS: &[(&str, u16)] = &[
    ("left", 0x110),    // BTN_LEFT
    ("right", 0x111),   // BTN_RIGHT
    ("middle", 0x112),  // BTN_MIDDLE
    ("side", 0x113),    // BTN_SIDE
    ("extra", 0x114),   // BTN_EXTRA
    ("forward", 0x115), // BTN_FORWARD
    ("back", 0x116),    // BTN_BACK
];

static KEY_NAME_TO_CODE: Lazy<HashMap<&'static str, u16>> = Lazy::new(|| {
    let mut map: HashMap<&'static str, u16> = KEYS.iter().copied().collect();
    for (alias, target) in KEY_ALIASES {
        if let Some(code) = map.get(target).copied() {
            map.insert(*alias, code);
        }
    }
    map
});

static KEY_CODE_TO_NAME: Lazy<HashMap<u16, &'static str>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for (name, code) in KEYS {
        map.entry(*code).or_insert(*name);
    }
    map
});

/// Трансляция имён клавиш и кнопок мыши в evdev коды и обратно
pub struct KeyCodes;

impl KeyCodes {
    /// Код клавиши по имени (регистронезависимо, принимает синонимы xkb)
    pub fn key_code(name: &str) -> Option<u16> {
        KEY_NAME_TO_CODE.get(name.to_lowercase().as_str()).copied()
    }

    pub fn key_name(code: u16) -> Option<&'static str> {
        KEY_CODE_TO_NAME.get(&code).copied()
    }

    pub fn button_code(name: &str) -> Option<u16> {
        let normalized = name.to_lowercase();
        BUTTONS
            .iter()
            .find(|(candidate, _)| *candidate == normalized)
            .map(|(_, code)| *code)
    }

    pub fn button_name(code: u16) -> Option<&'static str> {
        BUTTONS
            .iter()
            .find(|(_, candidate)| *candidate == code)
            .map(|(name, _)| *name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_key_mapping() {
        assert_eq!(KeyCodes::key_code("a"), Some(30));
        assert_eq!(KeyCodes::key_code("space"), Some(57));
        assert_eq!(KeyCodes::key_code("control_l"), Some(29));
    }

    #[test]
    fn test_case_insensitive_and_aliases() {
        assert_eq!(KeyCodes::key_code("A"), Some(30));
        assert_eq!(KeyCodes::key_code("Return"), Some(28));
        assert_eq!(KeyCodes::key_code("Escape"), Some(1));
        assert_eq!(KeyCodes::key_code("Control_L"), Some(29));
    }

    #[test]
    fn test_reverse_mapping_uses_canonical_name() {
        assert_eq!(KeyCodes::key_name(28), Some("enter"));
        assert_eq!(KeyCodes::key_name(30), Some("a"));
        assert_eq!(KeyCodes::key_name(9999), None);
    }

    #[test]
    fn test_invalid_key() {
        assert!(KeyCodes::key_code("invalid_key").is_none());
    }

    #[test]
    fn test_buttons() {
        assert_eq!(KeyCodes::button_code("Left"), Some(0x110));
        assert_eq!(KeyCodes::button_name(0x112), Some("middle"));
        assert!(KeyCodes::button_code("wheel").is_none());
    }

    #[test]
    fn test_no_duplicate_canonical_names() {
        let mut seen = std::collections::HashSet::new();
        for (name, _) in KEYS {
            assert!(seen.insert(*name), "дубликат имени {}", name);
        }
    }
}
