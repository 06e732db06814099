use super::child::{read_stream, watch_child, CallbackSlot, ChildCallbacks, ChildHandle, ChildRecord, ExitSlot};
use super::command::{CommandSpec, SpawnOptions};
use crate::bridge::EventSender;
use crate::debug_if_enabled;
use crate::error::{BridgeError, Result, SpawnError};
use crate::events::{ChildId, StreamKind};
use crate::script::CallbackId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::info;

/// Владелец дочерних процессов. Живёт на потоке скрипта: реестр callback'ов
/// меняется только оттуда, фоновые задачи лишь кладут события в очередь.
pub struct ProcessSupervisor {
    runtime: Handle,
    sender: EventSender,
    children: HashMap<ChildId, ChildRecord>,
    next_id: u64,
}

impl ProcessSupervisor {
    pub fn new(runtime: Handle, sender: EventSender) -> Self {
        Self {
            runtime,
            sender,
            children: HashMap::new(),
            next_id: 1,
        }
    }

    /// Запустить процесс. Чтение stdout/stderr начинается сразу; строки,
    /// пришедшие до регистрации callback'а, не сохраняются.
    pub fn spawn(
        &mut self,
        command: &CommandSpec,
        options: &SpawnOptions,
    ) -> std::result::Result<ChildHandle, SpawnError> {
        let display = command.to_string();
        let mut cmd = command.build(options)?;

        // Command::spawn регистрирует процесс в драйвере сигналов рантайма
        let _guard = self.runtime.enter();
        let mut child = cmd.spawn().map_err(|source| SpawnError::Exec {
            command: display.clone(),
            source,
        })?;

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            (stdout, _) => {
                let _ = child.start_kill();
                let stream = if stdout.is_none() {
                    StreamKind::Stdout
                } else {
                    StreamKind::Stderr
                };
                return Err(SpawnError::MissingPipe {
                    command: display,
                    stream,
                });
            }
        };

        let id = ChildId(self.next_id);
        self.next_id += 1;
        let pid = child.id();

        let readers = [
            self.runtime
                .spawn(read_stream(id, StreamKind::Stdout, stdout, self.sender.clone())),
            self.runtime
                .spawn(read_stream(id, StreamKind::Stderr, stderr, self.sender.clone())),
        ];

        let exit = Arc::new(ExitSlot::default());
        let (kill_tx, kill_rx) = oneshot::channel();
        self.runtime.spawn(watch_child(
            id,
            child,
            kill_rx,
            readers,
            Arc::clone(&exit),
            self.sender.clone(),
        ));

        let shown = display.as_str();
        info!("Запущен процесс {} (pid {:?}): {}", id, pid, shown);

        self.children.insert(
            id,
            ChildRecord {
                command: display,
                pid,
                callbacks: ChildCallbacks::default(),
                killed: false,
                kill_tx: Some(kill_tx),
                exit: Arc::clone(&exit),
            },
        );

        Ok(ChildHandle::new(id, pid, exit))
    }

    /// Зарегистрировать или заменить callback; возвращает заменённый
    pub fn set_callback(
        &mut self,
        child: ChildId,
        slot: CallbackSlot,
        callback: CallbackId,
    ) -> Result<Option<CallbackId>> {
        let record = self
            .children
            .get_mut(&child)
            .ok_or(BridgeError::UnknownChild(child))?;

        debug_if_enabled!("{}: callback {:?} -> {:?}", child, slot, callback);
        Ok(record.callbacks.replace(slot, callback))
    }

    /// Запросить завершение. Повторный вызов и вызов для завершённого процесса
    /// ничего не делают. Exit всё равно приходит обычным путём.
    pub fn kill(&mut self, child: ChildId) -> bool {
        let Some(record) = self.children.get_mut(&child) else {
            debug_if_enabled!("kill для уже завершённого {}", child);
            return false;
        };
        // Процесс уже вышел сам, его вывод доставляется как обычно
        if record.killed || record.exit.get().is_some() {
            return false;
        }

        let Some(kill_tx) = record.kill_tx.take() else {
            return false;
        };
        // Ошибка означает, что наблюдатель уже увидел выход процесса
        if kill_tx.send(()).is_err() {
            debug_if_enabled!("{} завершился раньше kill", child);
            return false;
        }

        info!("Завершение процесса {} ({})", child, record.command);
        record.killed = true;
        true
    }

    pub fn kill_all(&mut self) {
        let ids: Vec<ChildId> = self.children.keys().copied().collect();
        if !ids.is_empty() {
            info!("Завершение {} дочерних процессов", ids.len());
        }
        for id in ids {
            self.kill(id);
        }
    }

    /// Отобрать callback'и у всех ещё живых процессов. Их события после
    /// остановки моста уже не доставляются.
    pub fn drain_callbacks(&mut self) -> Vec<CallbackId> {
        self.children
            .values_mut()
            .flat_map(|record| record.take_callbacks().all().collect::<Vec<_>>())
            .collect()
    }

    /// Callback для строки. Для убитого процесса строки из очереди отбрасываются.
    pub fn line_callback(&self, child: ChildId, stream: StreamKind) -> Option<CallbackId> {
        let record = self.children.get(&child)?;
        if record.killed {
            return None;
        }
        record.callbacks.get(stream.into())
    }

    /// Процесс завершён и вывод вычитан: забыть его и вернуть его callback'и
    pub fn finish(&mut self, child: ChildId) -> Option<ChildCallbacks> {
        self.children.remove(&child).map(|record| record.callbacks)
    }

    pub fn pid(&self, child: ChildId) -> Option<u32> {
        self.children.get(&child).and_then(|record| record.pid)
    }

    pub fn is_running(&self, child: ChildId) -> bool {
        self.children.contains_key(&child)
    }

    pub fn running(&self) -> usize {
        self.children.len()
    }
}
