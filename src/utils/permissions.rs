use crate::error::{BridgeError, Result};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Проверить доступ к устройствам ввода
pub fn check_permissions() -> Result<()> {
    info!("Проверка прав доступа...");

    check_input_devices_access(Path::new("/dev/input"))?;
    check_user();

    info!("Проверка прав доступа завершена успешно");
    Ok(())
}

fn check_input_devices_access(input_dir: &Path) -> Result<()> {
    if !input_dir.exists() {
        return Err(BridgeError::Permission(format!(
            "Директория {} не существует",
            input_dir.display()
        )));
    }

    match fs::read_dir(input_dir) {
        Ok(_) => {
            info!("Доступ к {} подтвержден", input_dir.display());
            Ok(())
        }
        Err(e) => Err(BridgeError::Permission(format!(
            "Нет доступа к {}: {}. Добавьте пользователя в группу 'input'",
            input_dir.display(),
            e
        ))),
    }
}

fn check_user() {
    match std::env::var("USER") {
        Ok(user) if user == "root" => {
            warn!("Приложение запущено от имени root");
            warn!("Дочерние процессы скрипта тоже получат права root");
        }
        Ok(user) => {
            info!("Приложение запущено от имени пользователя: {}", user);
        }
        Err(_) => {
            warn!("Не удалось определить пользователя");
        }
    }
}

/// Команды для выдачи прав на чтение /dev/input
pub fn get_setup_commands() -> Vec<String> {
    vec![
        "# Добавить пользователя в группу input:".to_string(),
        "sudo usermod -a -G input $USER".to_string(),
        "".to_string(),
        "# После выполнения команды перезайдите в систему".to_string(),
    ]
}
