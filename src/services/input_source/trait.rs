use crate::bridge::EventSender;
use crate::config::InputConfig;
use crate::error::Result;

/// Источник событий ввода: читает бэкенд и кладёт `InputEvent` в очередь моста
#[async_trait::async_trait]
pub trait InputSourceTrait {
    /// Работает до закрытия очереди или фатальной ошибки устройства
    async fn run(self: Box<Self>) -> Result<()>;
}

/// Выбрать источник по флагу dry_run
pub fn create_input_source(
    config: &InputConfig,
    sender: EventSender,
    dry_run: bool,
) -> Result<Box<dyn InputSourceTrait + Send>> {
    if dry_run {
        Ok(Box::new(super::dry_input_source::DryRunInputSource::new(
            sender,
        )))
    } else {
        Ok(Box::new(super::evdev_source::EvdevInputSource::new(
            config, sender,
        )?))
    }
}
