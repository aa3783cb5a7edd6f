use arcadestick::config::Config;
use arcadestick::controller::sample_source::SimulatedSource;
use arcadestick::controller::ControllerHandle;
use arcadestick::mapping::keyboard::usage;
use arcadestick::mapping::{OutputReport, Profile};
use arcadestick::transport::ConnectionEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};

struct Stick {
    source: Arc<SimulatedSource>,
    link: mpsc::Sender<ConnectionEvent>,
    reports: mpsc::Receiver<OutputReport>,
    handle: ControllerHandle,
}

impl Stick {
    fn start(config: Config) -> Self {
        let source = Arc::new(SimulatedSource::new());
        Self::start_with(config, source)
    }

    fn start_with(config: Config, source: Arc<SimulatedSource>) -> Self {
        let (link, link_rx) = mpsc::channel(4);
        let (report_tx, reports) = mpsc::channel(64);
        let handle = ControllerHandle::spawn(&config, source.clone(), link_rx, report_tx).unwrap();
        Self {
            source,
            link,
            reports,
            handle,
        }
    }

    async fn connect(&self) {
        self.link.send(ConnectionEvent::Connected).await.unwrap();
    }

    async fn next(&mut self) -> OutputReport {
        timeout(Duration::from_secs(2), self.reports.recv())
            .await
            .expect("no report within 2s")
            .expect("report channel closed")
    }

    /// Skips reports until one equals `expected`
    async fn wait_for(&mut self, expected: OutputReport) {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if self.next().await == expected {
                return;
            }
        }
        panic!("never saw {}", expected);
    }

    fn drain(&mut self) -> Vec<OutputReport> {
        let mut out = Vec::new();
        while let Ok(report) = self.reports.try_recv() {
            out.push(report);
        }
        out
    }
}

fn keyboard(keys: &[u8]) -> OutputReport {
    let mut bytes = [0u8; 9];
    bytes[0] = 0x01;
    bytes[3..3 + keys.len()].copy_from_slice(keys);
    OutputReport::Keyboard(bytes)
}

#[tokio::test(start_paused = true)]
async fn gamepad_reports_idle_state_then_pressed_button() {
    let mut stick = Stick::start(Config::default());
    stick.connect().await;

    assert_eq!(stick.next().await, OutputReport::Gamepad([1, 0, 0, 0, 0]));

    // line 9 carries code 0x01, bit 0
    stick.source.press(9);
    stick.wait_for(OutputReport::Gamepad([1, 1, 0, 0, 0])).await;

    // line 18 carries code 0x0F, bit 11
    stick.source.press(18);
    stick
        .wait_for(OutputReport::Gamepad([1, 0x01, 0x08, 0, 0]))
        .await;

    stick.source.release(9);
    stick.source.release(18);
    stick.wait_for(OutputReport::Gamepad([1, 0, 0, 0, 0])).await;

    stick.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn gamepad_report_carries_pot_next_to_buttons() {
    let source = Arc::new(SimulatedSource::new());
    source.set_adc(0, 4095);
    let mut stick = Stick::start_with(Config::default(), source);
    stick.connect().await;
    stick.wait_for(OutputReport::Gamepad([1, 0, 0, 255, 0])).await;

    // a full window of 170 averages to pot 10
    stick.source.set_adc(0, 170);
    stick.wait_for(OutputReport::Gamepad([1, 0, 0, 10, 0])).await;

    stick.source.press(9);
    stick.wait_for(OutputReport::Gamepad([1, 1, 0, 10, 0])).await;

    stick.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn idle_link_still_gets_keepalives() {
    let mut stick = Stick::start(Config::default());
    stick.connect().await;
    stick.next().await;

    sleep(Duration::from_millis(1000)).await;
    let idle = stick.drain();
    // one report per keep-alive period, give or take the tick alignment
    assert!((8..=10).contains(&idle.len()), "got {}", idle.len());
    assert!(idle
        .iter()
        .all(|r| *r == OutputReport::Gamepad([1, 0, 0, 0, 0])));

    stick.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn held_buttons_survive_a_reconnect() {
    let mut stick = Stick::start(Config::default());
    stick.connect().await;
    stick.next().await;

    for line in [9, 6, 7] {
        stick.source.press(line);
    }
    stick.wait_for(OutputReport::Gamepad([1, 0b111, 0, 0, 0])).await;

    stick.link.send(ConnectionEvent::Disconnected).await.unwrap();
    sleep(Duration::from_millis(50)).await;
    stick.drain();
    sleep(Duration::from_millis(500)).await;
    assert!(stick.drain().is_empty(), "reports sent while disconnected");

    stick.connect().await;
    assert_eq!(
        stick.next().await,
        OutputReport::Gamepad([1, 0b111, 0, 0, 0])
    );

    stick.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn firm_press_reports_settled_force_once() {
    let config = Config {
        timing: arcadestick::config::TimingConfig {
            // long enough for the moving average to fill
            fsr_settle_ms: 400,
            ..Default::default()
        },
        ..Config::default()
    };
    let mut stick = Stick::start(config);
    stick.connect().await;
    stick.next().await;

    stick.source.set_adc(2, 2200);
    stick.wait_for(OutputReport::Gamepad([1, 0, 0, 0, 127])).await;

    stick.source.set_adc(2, 0);
    stick.wait_for(OutputReport::Gamepad([1, 0, 0, 0, 0])).await;

    sleep(Duration::from_millis(300)).await;
    assert!(stick
        .drain()
        .iter()
        .all(|r| r.as_bytes()[4] == 0));

    stick.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn keyboard_profile_holds_button_and_force_keys() {
    let config = Config {
        profile: Profile::Keyboard,
        ..Config::default()
    };
    let mut stick = Stick::start(config);
    stick.connect().await;
    assert_eq!(stick.next().await, keyboard(&[]));

    stick.source.press(9);
    stick.wait_for(keyboard(&[usage::A])).await;

    // a light press settles below 0x1D and maps to two keys
    stick.source.set_adc(2, 600);
    stick.wait_for(keyboard(&[usage::A, usage::W, usage::E])).await;

    stick.source.release(9);
    stick.wait_for(keyboard(&[usage::W, usage::E])).await;

    stick.source.set_adc(2, 0);
    stick.wait_for(keyboard(&[])).await;

    stick.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn media_step_is_released_after_fifty_ms() {
    let mut config = Config {
        profile: Profile::KeyboardMedia,
        ..Config::default()
    };
    // one pot sample per 200ms keeps consecutive steps apart
    config.timing.pot_poll_ms = 200;
    let source = Arc::new(SimulatedSource::new());
    source.set_adc(0, 4095);
    let mut stick = Stick::start_with(config, source);
    stick.connect().await;

    let mut media = Vec::new();
    while media.len() < 2 {
        let report = stick.next().await;
        if report.is_media() {
            media.push((report, Instant::now()));
        }
    }

    assert_eq!(media[0].0, OutputReport::Media([2, 0x01, 0]));
    assert_eq!(media[1].0, OutputReport::Media([2, 0, 0]));
    let held = media[1].1 - media[0].1;
    assert!(
        held >= Duration::from_millis(50) && held < Duration::from_millis(60),
        "media command held for {:?}",
        held
    );

    stick.handle.shutdown().await;
}
