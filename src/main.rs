use anyhow::{Context, Result};
use clap::Parser;
use script_bridge::config::{Config, LoggingConfig};
use script_bridge::error::BridgeError;
use script_bridge::script::LuaEngine;
use script_bridge::services::input_source::create_input_source;
use script_bridge::utils::{check_permissions, get_setup_commands};
use script_bridge::Bridge;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "wm-script-bridge")]
#[command(about = "Связывает ввод, дочерние процессы и события окон с Lua-скриптом")]
struct Args {
    /// Путь к файлу конфигурации
    #[arg(short, long, default_value = "wm-bridge.toml")]
    config: PathBuf,

    /// Lua-скрипт (перекрывает [script] path)
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Без доступа к устройствам: ввод эмулируется командами со stdin
    #[arg(long)]
    dry_run: bool,

    /// Уровень логирования (перекрывает [logging] level)
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if let Some(script) = &args.script {
        config.script.path = script.clone();
    }

    init_tracing(&config.logging)?;

    info!("Запуск wm-script-bridge v{}", env!("CARGO_PKG_VERSION"));
    info!("Конфигурация загружена из: {:?}", args.config);

    // Поток скрипта - главный поток; runtime обслуживает процессы, таймеры и ввод
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("wm-bridge-worker")
        .build()
        .context("Не удалось создать tokio runtime")?;

    let mut bridge = Bridge::new(config.repeat_settings(), runtime.handle().clone());
    let mut engine = LuaEngine::new(bridge.core()).context("Не удалось создать Lua-рантайм")?;

    match engine.load_file(&config.script.path) {
        Ok(()) => info!("Скрипт загружен: {:?}", config.script.path),
        Err(e) => error!("{}", e),
    }

    if args.dry_run {
        warn!("Режим сухого запуска: устройства ввода не открываются");
    } else if let Err(e) = check_permissions() {
        log_permission_hint(&e);
        return Err(e.into());
    }

    let input_source = match create_input_source(&config.input, bridge.sender(), args.dry_run) {
        Ok(source) => source,
        Err(e) => {
            log_permission_hint(&e);
            return Err(e.into());
        }
    };

    runtime.spawn(async move {
        if let Err(e) = input_source.run().await {
            error!("Ошибка в источнике ввода: {}", e);
        }
    });

    let sender = bridge.sender();
    runtime.spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => info!("Получен сигнал завершения (Ctrl+C)"),
            Err(err) => error!("Ошибка при ожидании сигнала завершения: {}", err),
        }
        if sender.shutdown().is_err() {
            warn!("Очередь уже закрыта");
        }
    });

    info!("Все сервисы запущены");

    bridge.run(&mut engine);

    info!("Завершение работы...");
    drop(engine);
    drop(bridge);

    // Блокирующие потоки чтения evdev не прерываются, ждём их ограниченно
    runtime.shutdown_timeout(Duration::from_secs(5));

    info!("wm-script-bridge завершил работу");
    Ok(())
}

fn log_permission_hint(e: &BridgeError) {
    if matches!(e, BridgeError::Permission(_) | BridgeError::DeviceNotFound(_)) {
        warn!("Возможно, не хватает прав на /dev/input:");
        for line in get_setup_commands() {
            warn!("  {}", line);
        }
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    // RUST_LOG имеет приоритет над конфигурацией
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        let directives = if logging.filter.is_empty() {
            logging.level.clone()
        } else {
            format!("{},{}", logging.level, logging.filter)
        };
        EnvFilter::try_new(directives)
    })?;

    let registry = tracing_subscriber::registry().with(filter);
    match logging.format.as_str() {
        "full" => registry.with(tracing_subscriber::fmt::layer()).init(),
        _ => registry.with(tracing_subscriber::fmt::layer().compact()).init(),
    }

    Ok(())
}
