use crate::bridge::EventSender;
use crate::error::Result;
use crate::events::{
    BridgeEvent, InputEvent, KeyCode, KeyState, ModifierSet, Trigger, WindowEvent,
    WindowEventKind, WindowId,
};
use crate::mappings::KeyCodes;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use super::r#trait::InputSourceTrait;

const DEVICE_NAME: &str = "dry-run";

/// Эмуляция ввода без доступа к устройствам. Команды читаются со stdin:
///
/// ```text
/// Control_L+Alt_L+Return     нажатие и отпускание комбинации
/// Super_L+button:left        кнопка мыши
/// window focus_changed 3     событие окна (аргумент опционален)
/// quit                       остановить мост
/// ```
pub struct DryRunInputSource {
    sender: EventSender,
}

impl DryRunInputSource {
    pub fn new(sender: EventSender) -> Self {
        info!("Инициализация DryRunInputSource");
        Self { sender }
    }

    async fn run_impl(self) -> Result<()> {
        info!("Dry-run режим: события вводятся со stdin, например 'Control_L+Return'");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        while let Some(line) = lines.next_line().await? {
            let events = match parse_command(&line) {
                Ok(events) => events,
                Err(e) => {
                    warn!("Dry-run: {}", e);
                    continue;
                }
            };

            for event in events {
                debug!("Dry-run событие: {:?}", event.kind());
                self.sender.send(event)?;
            }
        }

        info!("stdin закрыт, dry-run ввод завершён");
        Ok(())
    }
}

/// Разобрать одну строку команды dry-run
pub fn parse_command(line: &str) -> std::result::Result<Vec<BridgeEvent>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(Vec::new());
    }

    if line == "quit" {
        return Ok(vec![BridgeEvent::Shutdown]);
    }

    if let Some(rest) = line.strip_prefix("window ") {
        return parse_window(rest).map(|event| vec![BridgeEvent::Window(event)]);
    }

    let mut parts: Vec<&str> = line.split('+').map(str::trim).collect();
    let trigger_name = parts.pop().unwrap_or_default();
    let modifiers = ModifierSet::from_names(&parts)?;

    let trigger = match trigger_name.strip_prefix("button:") {
        Some(button) => KeyCodes::button_code(button).map(|code| Trigger::Button(KeyCode(code))),
        None => KeyCodes::key_code(trigger_name).map(|code| Trigger::Key(KeyCode(code))),
    }
    .ok_or_else(|| format!("Неизвестная клавиша: {}", trigger_name))?;

    Ok([KeyState::Pressed, KeyState::Released]
        .into_iter()
        .map(|state| {
            BridgeEvent::Input(InputEvent::new(modifiers, trigger, state, DEVICE_NAME))
        })
        .collect())
}

fn parse_window(rest: &str) -> std::result::Result<WindowEvent, String> {
    let mut words = rest.split_whitespace();

    let kind_name = words.next().ok_or("window: не указан тип события")?;
    let kind = WindowEventKind::from_name(kind_name)
        .ok_or_else(|| format!("window: неизвестный тип '{}'", kind_name))?;

    let window = words
        .next()
        .ok_or("window: не указан id окна")?
        .parse::<u64>()
        .map_err(|e| format!("window: некорректный id: {}", e))?;

    let argument = words
        .next()
        .map(|arg| arg.parse::<i64>())
        .transpose()
        .map_err(|e| format!("window: некорректный аргумент: {}", e))?;

    Ok(WindowEvent::new(kind, WindowId(window), argument))
}

#[async_trait::async_trait]
impl InputSourceTrait for DryRunInputSource {
    async fn run(self: Box<Self>) -> Result<()> {
        (*self).run_impl().await
    }
}
