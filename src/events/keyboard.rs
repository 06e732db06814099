use crate::mappings::KeyCodes;
use bitflags::bitflags;
use std::fmt;

/// Состояние клавиши
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyState {
    Pressed,
    Released,
    Repeat,
}

impl KeyState {
    /// Значение evdev события: 0 - отпускание, 1 - нажатие, 2 - аппаратный повтор
    pub fn from_evdev_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(KeyState::Released),
            1 => Some(KeyState::Pressed),
            2 => Some(KeyState::Repeat),
            _ => None,
        }
    }
}

/// Код клавиши или кнопки (evdev коды)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyCode(pub u16);

impl KeyCode {
    pub fn new(code: u16) -> Self {
        Self(code)
    }

    pub fn value(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match KeyCodes::key_name(self.0).or_else(|| KeyCodes::button_name(self.0)) {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "KEY_{}", self.0),
        }
    }
}

bitflags! {
    /// Набор модификаторов. Порядок и повторы не важны: равенство - это равенство множеств.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct ModifierSet: u16 {
        const SHIFT_L = 1;
        const SHIFT_R = 1 << 1;
        const CONTROL_L = 1 << 2;
        const CONTROL_R = 1 << 3;
        const ALT_L = 1 << 4;
        const ALT_R = 1 << 5;
        const SUPER_L = 1 << 6;
        const SUPER_R = 1 << 7;
        const ISO_LEVEL3_SHIFT = 1 << 8;
        const ISO_LEVEL5_SHIFT = 1 << 9;
        const HYPER_L = 1 << 10;
        const HYPER_R = 1 << 11;
    }
}

/// Имена модификаторов в нотации xkb
const MODIFIER_NAMES: [(&str, ModifierSet); 12] = [
    ("Shift_L", ModifierSet::SHIFT_L),
    ("Shift_R", ModifierSet::SHIFT_R),
    ("Control_L", ModifierSet::CONTROL_L),
    ("Control_R", ModifierSet::CONTROL_R),
    ("Alt_L", ModifierSet::ALT_L),
    ("Alt_R", ModifierSet::ALT_R),
    ("Super_L", ModifierSet::SUPER_L),
    ("Super_R", ModifierSet::SUPER_R),
    ("ISO_Level3_Shift", ModifierSet::ISO_LEVEL3_SHIFT),
    ("ISO_Level5_Shift", ModifierSet::ISO_LEVEL5_SHIFT),
    ("Hyper_L", ModifierSet::HYPER_L),
    ("Hyper_R", ModifierSet::HYPER_R),
];

impl ModifierSet {
    /// Один модификатор по имени xkb (`Control_L`, `Alt_L`, ...)
    pub fn from_xkb_name(name: &str) -> Option<Self> {
        MODIFIER_NAMES
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, flag)| *flag)
    }

    /// Собрать множество из списка имён; повторы схлопываются
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, String> {
        let mut result = Self::empty();
        for name in names {
            let name = name.as_ref();
            let flag = Self::from_xkb_name(name)
                .ok_or_else(|| format!("Неизвестный модификатор: {}", name))?;
            result |= flag;
        }
        Ok(result)
    }

    pub fn names(&self) -> Vec<&'static str> {
        MODIFIER_NAMES
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect()
    }
}

impl fmt::Display for ModifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.names();
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join("+"))
        }
    }
}

/// Клавиша клавиатуры или кнопка мыши
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    Key(KeyCode),
    Button(KeyCode),
}

impl Trigger {
    /// Классификация сырого evdev кода: диапазон BTN_MISC..KEY_OK - кнопки
    pub fn from_evdev_code(code: u16) -> Self {
        if (0x100..0x160).contains(&code) {
            Trigger::Button(KeyCode(code))
        } else {
            Trigger::Key(KeyCode(code))
        }
    }

    pub fn code(&self) -> KeyCode {
        match self {
            Trigger::Key(code) | Trigger::Button(code) => *code,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Key(code) => write!(f, "{}", code),
            Trigger::Button(code) => write!(f, "button:{}", code),
        }
    }
}

/// Ключ привязки: точное множество модификаторов + клавиша/кнопка
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingKey {
    pub modifiers: ModifierSet,
    pub trigger: Trigger,
}

impl BindingKey {
    pub fn new(modifiers: ModifierSet, trigger: Trigger) -> Self {
        Self { modifiers, trigger }
    }
}

impl fmt::Display for BindingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modifiers.is_empty() {
            write!(f, "{}", self.trigger)
        } else {
            write!(f, "{}+{}", self.modifiers, self.trigger)
        }
    }
}

/// Сырое событие ввода от бэкенда
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEvent {
    pub modifiers: ModifierSet,
    pub trigger: Trigger,
    pub state: KeyState,
    pub timestamp: std::time::Instant,
    pub device_name: String,
}

impl InputEvent {
    pub fn new(
        modifiers: ModifierSet,
        trigger: Trigger,
        state: KeyState,
        device_name: impl Into<String>,
    ) -> Self {
        Self {
            modifiers,
            trigger,
            state,
            timestamp: std::time::Instant::now(),
            device_name: device_name.into(),
        }
    }

    pub fn binding_key(&self) -> BindingKey {
        BindingKey::new(self.modifiers, self.trigger)
    }
}

impl fmt::Display for InputEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}] {:?} ({})",
            self.binding_key(),
            self.device_name,
            self.state,
            self.timestamp.elapsed().as_millis()
        )
    }
}
