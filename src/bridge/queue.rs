//! Единая FIFO очередь событий: много производителей, один потребитель.

use crate::error::{BridgeError, Result};
use crate::events::{BridgeEvent, InputEvent, KeyState, Trigger, WindowEvent};
use crate::services::key_repeater::RepeatGate;
use crate::trace_if_enabled;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

/// Создать очередь. Отправитель клонируется в каждый поток-производитель,
/// получатель принадлежит потоку скрипта.
pub fn event_queue() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sender = EventSender {
        tx,
        repeat_gate: RepeatGate::default(),
    };
    (sender, EventReceiver { rx })
}

/// Сторона производителя. Отправка никогда не блокирует.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: UnboundedSender<BridgeEvent>,
    repeat_gate: RepeatGate,
}

impl EventSender {
    /// Отпускание клавиши снимает её автоповтор ещё до постановки в очередь
    pub fn send(&self, event: BridgeEvent) -> Result<()> {
        if let BridgeEvent::Input(InputEvent {
            state: KeyState::Released,
            trigger: Trigger::Key(key),
            ..
        }) = &event
        {
            if self.repeat_gate.revoke(*key) {
                trace_if_enabled!("Повтор {} снят при отправке отпускания", key);
            }
        }
        self.tx.send(event).map_err(|_| BridgeError::QueueClosed)
    }

    pub fn input(&self, event: InputEvent) -> Result<()> {
        self.send(BridgeEvent::Input(event))
    }

    pub fn window(&self, event: WindowEvent) -> Result<()> {
        self.send(BridgeEvent::Window(event))
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(BridgeEvent::Shutdown)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub(crate) fn repeat_gate(&self) -> &RepeatGate {
        &self.repeat_gate
    }
}

/// Сторона потребителя
#[derive(Debug)]
pub struct EventReceiver {
    rx: UnboundedReceiver<BridgeEvent>,
}

impl EventReceiver {
    /// Блокирующее ожидание. Нельзя вызывать из асинхронного контекста.
    pub fn recv_blocking(&mut self) -> Option<BridgeEvent> {
        self.rx.blocking_recv()
    }

    pub fn try_recv(&mut self) -> Option<BridgeEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Ожидание не дольше `timeout`, таймер берётся из рантайма `handle`.
    /// Таймер создаётся внутри `block_on`: вне рантайма у него нет драйвера времени.
    pub fn recv_timeout(&mut self, handle: &Handle, timeout: Duration) -> Option<BridgeEvent> {
        let rx = &mut self.rx;
        handle
            .block_on(async move { tokio::time::timeout(timeout, rx.recv()).await })
            .ok()
            .flatten()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
