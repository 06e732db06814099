use crate::bridge::EventSender;
use crate::error::BridgeError;
use crate::events::{BridgeEvent, ChildId, ExitInfo, StreamKind};
use crate::script::CallbackId;
use crate::services::line_framer::LineFramer;
use crate::trace_if_enabled;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const READ_CHUNK: usize = 4096;

/// Слот callback'а дочернего процесса
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackSlot {
    Stdout,
    Stderr,
    Exit,
}

impl From<StreamKind> for CallbackSlot {
    fn from(stream: StreamKind) -> Self {
        match stream {
            StreamKind::Stdout => CallbackSlot::Stdout,
            StreamKind::Stderr => CallbackSlot::Stderr,
        }
    }
}

/// Зарегистрированные callback'и процесса, не больше одного на слот
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChildCallbacks {
    pub stdout: Option<CallbackId>,
    pub stderr: Option<CallbackId>,
    pub exit: Option<CallbackId>,
}

impl ChildCallbacks {
    pub fn get(&self, slot: CallbackSlot) -> Option<CallbackId> {
        match slot {
            CallbackSlot::Stdout => self.stdout,
            CallbackSlot::Stderr => self.stderr,
            CallbackSlot::Exit => self.exit,
        }
    }

    /// Заменить callback, вернуть предыдущий
    pub fn replace(&mut self, slot: CallbackSlot, callback: CallbackId) -> Option<CallbackId> {
        let target = match slot {
            CallbackSlot::Stdout => &mut self.stdout,
            CallbackSlot::Stderr => &mut self.stderr,
            CallbackSlot::Exit => &mut self.exit,
        };
        target.replace(callback)
    }

    pub fn all(&self) -> impl Iterator<Item = CallbackId> {
        [self.stdout, self.stderr, self.exit].into_iter().flatten()
    }
}

/// Итог процесса, доступный из любого потока. Заполняется один раз после того,
/// как оба потока вывода вычитаны.
#[derive(Debug, Default)]
pub struct ExitSlot {
    status: Mutex<Option<ExitInfo>>,
    ready: Condvar,
}

impl ExitSlot {
    fn complete(&self, info: ExitInfo) {
        let mut status = self.status.lock();
        if status.is_none() {
            *status = Some(info);
            self.ready.notify_all();
        }
    }

    pub fn get(&self) -> Option<ExitInfo> {
        *self.status.lock()
    }

    pub fn wait(&self) -> ExitInfo {
        let mut status = self.status.lock();
        loop {
            if let Some(info) = *status {
                return info;
            }
            self.ready.wait(&mut status);
        }
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<ExitInfo> {
        let mut status = self.status.lock();
        if status.is_none() {
            self.ready.wait_for(&mut status, timeout);
        }
        *status
    }
}

/// Внешний дескриптор процесса, возвращается вызывающему `spawn`
#[derive(Debug, Clone)]
pub struct ChildHandle {
    pub id: ChildId,
    pub pid: Option<u32>,
    exit: Arc<ExitSlot>,
}

impl ChildHandle {
    pub(crate) fn new(id: ChildId, pid: Option<u32>, exit: Arc<ExitSlot>) -> Self {
        Self { id, pid, exit }
    }

    /// Блокирующее ожидание завершения процесса.
    ///
    /// Завершение обнаруживается на рабочих потоках рантайма, поэтому вызов из
    /// callback'а на потоке скрипта не зависает. Но поток скрипта стоит всё это
    /// время и события не доставляются: внутри callback'ов лучше `on_exit`.
    pub fn wait(&self) -> ExitInfo {
        self.exit.wait()
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<ExitInfo> {
        self.exit.wait_timeout(timeout)
    }
}

/// Состояние процесса на стороне потока скрипта
#[derive(Debug)]
pub(crate) struct ChildRecord {
    pub command: String,
    pub pid: Option<u32>,
    pub callbacks: ChildCallbacks,
    pub killed: bool,
    pub kill_tx: Option<oneshot::Sender<()>>,
    pub exit: Arc<ExitSlot>,
}

impl ChildRecord {
    /// Забрать все callback'и, оставив слоты пустыми
    pub fn take_callbacks(&mut self) -> ChildCallbacks {
        std::mem::take(&mut self.callbacks)
    }
}

/// Читает поток процесса, режет на строки и кладёт их в очередь.
/// Ошибка чтения считается концом потока.
pub(crate) async fn read_stream<R>(
    child: ChildId,
    stream: StreamKind,
    mut reader: R,
    sender: EventSender,
) where
    R: AsyncRead + Unpin,
{
    let mut framer = LineFramer::new();
    let mut buf = [0u8; READ_CHUNK];

    let send = |line: Vec<u8>| {
        let line = String::from_utf8_lossy(&line).into_owned();
        trace_if_enabled!("{} {}: {}", child, stream, line);
        sender.send(BridgeEvent::Line {
            child,
            stream,
            line,
        })
    };

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                for line in framer.feed(&buf[..n]) {
                    if send(line).is_err() {
                        return;
                    }
                }
            }
            Err(source) => {
                let err = BridgeError::StreamIo {
                    child,
                    stream,
                    source,
                };
                warn!("{}", err);
                break;
            }
        }
    }

    for line in framer.finish() {
        if send(line).is_err() {
            return;
        }
    }
}

/// Ждёт завершения процесса (или команды kill), дочитывает вывод и только после
/// этого публикует Exit: событие выхода не может обогнать последние строки.
pub(crate) async fn watch_child(
    id: ChildId,
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    readers: [JoinHandle<()>; 2],
    exit: Arc<ExitSlot>,
    sender: EventSender,
) {
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        Ok(()) = kill_rx => None,
    };

    let killed = exited.is_none();
    let status = match exited {
        Some(status) => status,
        None => {
            if let Err(e) = child.start_kill() {
                warn!("Не удалось послать SIGKILL процессу {}: {}", id, e);
            }
            child.wait().await
        }
    };

    let info = match status {
        Ok(status) => ExitInfo::from(status),
        Err(e) => {
            warn!("Ошибка ожидания процесса {}: {}", id, e);
            ExitInfo::exited(ExitInfo::NO_CODE)
        }
    };

    for reader in readers {
        // Строки убитого процесса всё равно отбрасываются, а pipe могут держать его потомки
        if killed {
            reader.abort();
        }
        let _ = reader.await;
    }

    info!("Процесс {} завершён: {}", id, info);
    exit.complete(info);

    if sender.send(BridgeEvent::Exit { child: id, status: info }).is_err() {
        trace_if_enabled!("Очередь закрыта, Exit для {} не доставлен", id);
    }
}
