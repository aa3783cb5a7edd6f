use arcadestick::config::Config;
use arcadestick::controller::sample_source::SimulatedSource;
use arcadestick::controller::ControllerHandle;
use arcadestick::transport::hid::{HidTransport, LogSink};
use arcadestick::transport::{ConnectionEvent, TransportKind};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = setup_config().await?;
    info!(
        "Starting arcadestick: profile {}, transport {:?}",
        config.profile, config.transport
    );

    // no register access here, the simulated source is driven by a demo script
    let source = Arc::new(SimulatedSource::new());
    let demo_cancel = CancellationToken::new();
    let demo = tokio::spawn(run_demo(source.clone(), config.clone(), demo_cancel.clone()));

    match config.transport {
        TransportKind::Hid => {
            let (link_tx, link_rx) = mpsc::channel(8);
            let (report_tx, report_rx) = mpsc::channel(config.bus.report_queue_depth);

            let controller = ControllerHandle::spawn(&config, source, link_rx, report_tx)
                .map_err(|e| eyre!("Failed to spawn controller: {}", e))?;
            let transport =
                HidTransport::spawn(LogSink::new(), report_rx, controller.cancel_token());

            link_tx
                .send(ConnectionEvent::Connected)
                .await
                .map_err(|e| eyre!("Failed to signal connection: {}", e))?;

            tokio::signal::ctrl_c().await?;
            info!("Ctrl-C received");
            // the host goes away before the pipeline stops
            let _ = link_tx.send(ConnectionEvent::Disconnected).await;
            demo_cancel.cancel();
            controller.shutdown().await;
            transport.join().await;
        }
        TransportKind::Serial => {
            let device = tokio::fs::OpenOptions::new()
                .write(true)
                .open(&config.serial.device)
                .await
                .map_err(|e| {
                    eyre!(
                        "Failed to open serial device {}: {}",
                        config.serial.device.display(),
                        e
                    )
                })?;
            info!("Writing frames to {}", config.serial.device.display());

            let controller = ControllerHandle::spawn_serial(&config, source, device)
                .map_err(|e| eyre!("Failed to spawn controller: {}", e))?;

            tokio::signal::ctrl_c().await?;
            info!("Ctrl-C received");
            demo_cancel.cancel();
            controller.shutdown().await;
        }
    }

    let _ = demo.await;
    info!("Bye");
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    let level = match std::env::var("RUST_LOG").as_deref() {
        Ok("trace") => Level::TRACE,
        Ok("debug") => Level::DEBUG,
        Ok("warn") => Level::WARN,
        Ok("error") => Level::ERROR,
        _ => Level::INFO,
    };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

async fn setup_config() -> Result<Config> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);
    info!("Using configuration {}", path.display());

    let config = Config::ensure_default_config(&path)
        .await
        .map_err(|e| eyre!("Failed to load configuration: {}", e))?;
    Ok(config)
}

/// Cycles through every input of the stick so the pipeline has something
/// to report
async fn run_demo(source: Arc<SimulatedSource>, config: Config, cancel: CancellationToken) {
    let pause = |ms| tokio::time::sleep(Duration::from_millis(ms));
    let fsr = config.analog.fsr_channel;
    let pot = config.analog.pot_channel;

    loop {
        for button in &config.buttons {
            debug!("Demo: line {} (code 0x{:02X})", button.line, button.code);
            source.press(button.line);
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = pause(200) => {}
            }
            source.release(button.line);
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = pause(300) => {}
            }
        }

        debug!("Demo: force sensor");
        for raw in [900, 2200, 3800] {
            source.set_adc(fsr, raw);
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = pause(600) => {}
            }
            source.set_adc(fsr, 0);
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = pause(600) => {}
            }
        }

        debug!("Demo: potentiometer sweep");
        for raw in (0..=4095).step_by(512).chain((0..=4095).rev().step_by(512)) {
            source.set_adc(pot, raw);
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = pause(250) => {}
            }
        }
    }
}
