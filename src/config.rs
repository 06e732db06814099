use crate::bridge_error;
use crate::error::BridgeError;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Конфигурация демона (TOML + переменные окружения `WMB_*`)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub input: InputConfig,
    pub repeat: RepeatConfig,
    pub script: ScriptConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
            filter: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InputConfig {
    /// "auto" или путь к /dev/input/eventN
    pub keyboard_device: String,
    /// Мышь опциональна: без неё mousebind просто не срабатывает
    pub pointer_device: Option<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            keyboard_device: "auto".to_string(),
            pointer_device: None,
        }
    }
}

/// Параметры повтора до вызова `setup()` из скрипта
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RepeatConfig {
    pub rate: u32,
    pub delay_ms: u64,
}

impl Default for RepeatConfig {
    fn default() -> Self {
        Self {
            rate: 40,
            delay_ms: 160,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScriptConfig {
    pub path: PathBuf,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("init.lua"),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("WMB_").split("__"));

        let config: Config = figment
            .extract()
            .with_context(|| format!("Не удалось загрузить конфигурацию из {:?}", config_path))?;

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Неверный уровень логирования: {}", self.logging.level),
        }

        match self.logging.format.as_str() {
            "compact" | "full" => {}
            _ => anyhow::bail!("Неверный формат логирования: {}", self.logging.format),
        }

        if self.input.keyboard_device.trim().is_empty() {
            anyhow::bail!("keyboard_device не может быть пустым");
        }

        if let Some(pointer) = &self.input.pointer_device {
            if pointer.trim().is_empty() {
                anyhow::bail!("pointer_device не может быть пустым");
            }
        }

        if self.script.path.as_os_str().is_empty() {
            anyhow::bail!("Путь к скрипту не может быть пустым");
        }

        Ok(())
    }

    pub fn repeat_settings(&self) -> RepeatSettings {
        RepeatSettings {
            rate: self.repeat.rate,
            delay_ms: self.repeat.delay_ms,
        }
    }
}

/// Действующие параметры повтора: частота в повторах/с и задержка до первого повтора
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatSettings {
    pub rate: u32,
    pub delay_ms: u64,
}

impl RepeatSettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Интервал между повторами; `None` при rate = 0 (повтор выключен)
    pub fn interval(&self) -> Option<Duration> {
        if self.rate == 0 {
            None
        } else {
            Some((Duration::from_secs(1) / self.rate).max(Duration::from_millis(1)))
        }
    }
}

impl Default for RepeatSettings {
    fn default() -> Self {
        Config::default().repeat_settings()
    }
}

/// Аргумент `setup()` из скрипта. Неизвестные поля - ошибка, а не молчаливый пропуск.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetupConfig {
    #[serde(default)]
    pub repeat_info: Option<RepeatInfo>,
    #[serde(default)]
    pub xkbconfig: Option<XkbConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepeatInfo {
    pub rate: i64,
    pub delay: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct XkbConfig {
    #[serde(default)]
    pub layout: Option<String>,
    #[serde(default)]
    pub rules: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub options: Option<String>,
    #[serde(default)]
    pub variant: Option<String>,
}

impl SetupConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        if let Some(repeat) = &self.repeat_info {
            repeat.to_settings()?;
        }
        if let Some(xkb) = &self.xkbconfig {
            xkb.validate()?;
        }
        Ok(())
    }
}

impl RepeatInfo {
    pub fn to_settings(&self) -> crate::error::Result<RepeatSettings> {
        if self.rate < 0 {
            return BridgeError::config(format!("repeat_info.rate отрицательный: {}", self.rate));
        }
        if self.delay < 0 {
            return BridgeError::config(format!("repeat_info.delay отрицательный: {}", self.delay));
        }
        let rate = u32::try_from(self.rate)
            .map_err(|_| bridge_error!(config, "repeat_info.rate слишком большой: {}", self.rate))?;

        Ok(RepeatSettings {
            rate,
            delay_ms: self.delay as u64,
        })
    }
}

impl XkbConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        for (field, value) in [("rules", &self.rules), ("model", &self.model)] {
            if let Some(value) = value {
                if value.is_empty() || value.chars().any(char::is_whitespace) {
                    return BridgeError::config(format!(
                        "xkbconfig.{}: недопустимое имя '{}'",
                        field, value
                    ));
                }
            }
        }

        let layouts = match &self.layout {
            Some(layout) => {
                let entries: Vec<&str> = layout.split(',').map(str::trim).collect();
                if entries.iter().any(|entry| entry.is_empty()) {
                    return BridgeError::config(format!(
                        "xkbconfig.layout: пустой элемент в '{}'",
                        layout
                    ));
                }
                entries.len()
            }
            None => 1,
        };

        if let Some(variant) = &self.variant {
            let variants = variant.split(',').count();
            if variants > layouts {
                return BridgeError::config(format!(
                    "xkbconfig.variant: {} вариантов на {} раскладок",
                    variants, layouts
                ));
            }
        }

        if let Some(options) = &self.options {
            for option in options.split(',').map(str::trim) {
                let well_formed = option
                    .split_once(':')
                    .map(|(group, name)| !group.is_empty() && !name.is_empty())
                    .unwrap_or(false);
                if !well_formed {
                    return BridgeError::config(format!(
                        "xkbconfig.options: '{}' не в форме group:option",
                        option
                    ));
                }
            }
        }

        Ok(())
    }
}
