use crate::events::{KeyState, ModifierSet};
use evdev::KeyCode as EvKey;

/// Удерживаемые модификаторы по физическим клавишам
#[derive(Debug, Default)]
pub struct ModifierState {
    held: ModifierSet,
}

impl ModifierState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> ModifierSet {
        self.held
    }

    /// Флаг модификатора для evdev кода. Правый Alt - это Alt_R, не ISO_Level3_Shift:
    /// раскладку здесь не интерпретируем.
    pub fn flag_for(code: u16) -> Option<ModifierSet> {
        let flag = match EvKey::new(code) {
            EvKey::KEY_LEFTSHIFT => ModifierSet::SHIFT_L,
            EvKey::KEY_RIGHTSHIFT => ModifierSet::SHIFT_R,
            EvKey::KEY_LEFTCTRL => ModifierSet::CONTROL_L,
            EvKey::KEY_RIGHTCTRL => ModifierSet::CONTROL_R,
            EvKey::KEY_LEFTALT => ModifierSet::ALT_L,
            EvKey::KEY_RIGHTALT => ModifierSet::ALT_R,
            EvKey::KEY_LEFTMETA => ModifierSet::SUPER_L,
            EvKey::KEY_RIGHTMETA => ModifierSet::SUPER_R,
            _ => return None,
        };
        Some(flag)
    }

    /// Применить переход клавиши. Возвращает набор, действовавший до перехода.
    pub fn apply(&mut self, code: u16, state: KeyState) -> ModifierSet {
        let before = self.held;
        if let Some(flag) = Self::flag_for(code) {
            match state {
                KeyState::Pressed => self.held.insert(flag),
                KeyState::Released => self.held.remove(flag),
                KeyState::Repeat => {}
            }
        }
        before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEFTCTRL: u16 = 29;
    const LEFTALT: u16 = 56;
    const RIGHTMETA: u16 = 126;
    const KEY_A: u16 = 30;

    #[test]
    fn test_snapshot_is_taken_before_transition() {
        let mut state = ModifierState::new();

        // Нажатие Ctrl само по себе идёт без Ctrl в наборе
        assert_eq!(state.apply(LEFTCTRL, KeyState::Pressed), ModifierSet::empty());
        assert_eq!(state.apply(LEFTALT, KeyState::Pressed), ModifierSet::CONTROL_L);
        assert_eq!(
            state.apply(KEY_A, KeyState::Pressed),
            ModifierSet::CONTROL_L | ModifierSet::ALT_L
        );

        // Отпускание Ctrl ещё видит Ctrl
        assert_eq!(
            state.apply(LEFTCTRL, KeyState::Released),
            ModifierSet::CONTROL_L | ModifierSet::ALT_L
        );
        assert_eq!(state.current(), ModifierSet::ALT_L);
    }

    #[test]
    fn test_left_and_right_are_distinct() {
        let mut state = ModifierState::new();
        state.apply(RIGHTMETA, KeyState::Pressed);
        assert_eq!(state.current(), ModifierSet::SUPER_R);
        assert_eq!(ModifierState::flag_for(125), Some(ModifierSet::SUPER_L));
        assert_eq!(ModifierState::flag_for(100), Some(ModifierSet::ALT_R));
        assert_eq!(ModifierState::flag_for(KEY_A), None);
    }

    #[test]
    fn test_hardware_repeat_does_not_change_state() {
        let mut state = ModifierState::new();
        state.apply(LEFTCTRL, KeyState::Pressed);
        state.apply(LEFTCTRL, KeyState::Repeat);
        assert_eq!(state.current(), ModifierSet::CONTROL_L);
    }
}
