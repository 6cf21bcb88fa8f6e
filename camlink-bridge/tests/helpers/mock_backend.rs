//! Scriptable output backend for pipeline tests
//!
//! Lets tests decide, at any moment, whether the "device" renders, freezes
//! (reports running but never calls back) or dies (reports not running), and
//! inject typed failures into `configure` / `open`.

use camlink_bridge::audio::{OutputBackend, OutputFormat, OutputGraph};
use camlink_bridge::playback::OutputNode;
use camlink_bridge::{Error, Result};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Render period of the mock device
pub const MOCK_PERIOD: Duration = Duration::from_millis(5);

/// Frames requested per mock callback (5 ms at 48 kHz)
pub const MOCK_FRAMES: usize = 240;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphMode {
    /// Calls render every period
    Rendering = 0,
    /// Reports running, never calls render
    Frozen = 1,
    /// Reports not running
    Dead = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    SessionConfig,
    Format,
    EngineStart,
}

impl InjectedFailure {
    fn to_error(self) -> Error {
        match self {
            InjectedFailure::SessionConfig => {
                Error::SessionConfigFailed("injected session failure".to_string())
            }
            InjectedFailure::Format => {
                Error::FormatCreationFailed("injected format failure".to_string())
            }
            InjectedFailure::EngineStart => {
                Error::EngineStartFailed("injected engine failure".to_string())
            }
        }
    }
}

/// Shared control/observation surface of a [`MockBackend`]
#[derive(Debug)]
pub struct MockControl {
    mode: AtomicU8,
    pub configure_calls: AtomicU32,
    pub open_calls: AtomicU32,
    pub graphs_stopped: AtomicU32,
    /// Reported through `OutputBackend::stream_errors`
    pub stream_errors: AtomicU32,
    configure_failure: Mutex<Option<InjectedFailure>>,
    open_failure: Mutex<Option<InjectedFailure>>,
    last_format: Mutex<Option<OutputFormat>>,
}

impl MockControl {
    pub fn set_mode(&self, mode: GraphMode) {
        self.mode.store(mode as u8, Ordering::SeqCst);
    }

    pub fn mode(&self) -> GraphMode {
        match self.mode.load(Ordering::SeqCst) {
            0 => GraphMode::Rendering,
            1 => GraphMode::Frozen,
            _ => GraphMode::Dead,
        }
    }

    pub fn fail_configure(&self, failure: Option<InjectedFailure>) {
        *self.configure_failure.lock().unwrap() = failure;
    }

    pub fn fail_open(&self, failure: Option<InjectedFailure>) {
        *self.open_failure.lock().unwrap() = failure;
    }

    pub fn opens(&self) -> u32 {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn configures(&self) -> u32 {
        self.configure_calls.load(Ordering::SeqCst)
    }

    pub fn last_format(&self) -> Option<OutputFormat> {
        *self.last_format.lock().unwrap()
    }
}

pub struct MockBackend {
    control: Arc<MockControl>,
}

impl MockBackend {
    pub fn new(mode: GraphMode) -> (Self, Arc<MockControl>) {
        let control = Arc::new(MockControl {
            mode: AtomicU8::new(mode as u8),
            configure_calls: AtomicU32::new(0),
            open_calls: AtomicU32::new(0),
            graphs_stopped: AtomicU32::new(0),
            stream_errors: AtomicU32::new(0),
            configure_failure: Mutex::new(None),
            open_failure: Mutex::new(None),
            last_format: Mutex::new(None),
        });
        (
            Self {
                control: Arc::clone(&control),
            },
            control,
        )
    }
}

impl OutputBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn configure(&mut self, format: &OutputFormat) -> Result<()> {
        self.control.configure_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = *self.control.configure_failure.lock().unwrap() {
            return Err(failure.to_error());
        }
        *self.control.last_format.lock().unwrap() = Some(*format);
        Ok(())
    }

    fn open(&mut self, node: Arc<OutputNode>) -> Result<Box<dyn OutputGraph>> {
        self.control.open_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = *self.control.open_failure.lock().unwrap() {
            return Err(failure.to_error());
        }

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let control = Arc::clone(&self.control);

        let handle = thread::spawn(move || {
            let mut buffer = vec![0.0f32; MOCK_FRAMES];
            while !thread_stop.load(Ordering::SeqCst) {
                if control.mode() == GraphMode::Rendering {
                    node.render(&mut buffer);
                }
                thread::sleep(MOCK_PERIOD);
            }
        });

        Ok(Box::new(MockGraph {
            control: Arc::clone(&self.control),
            stop,
            handle: Some(handle),
        }))
    }

    fn stream_errors(&self) -> u32 {
        self.control.stream_errors.load(Ordering::SeqCst)
    }
}

struct MockGraph {
    control: Arc<MockControl>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl OutputGraph for MockGraph {
    fn is_running(&self) -> bool {
        self.handle.is_some() && self.control.mode() != GraphMode::Dead
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            self.control.graphs_stopped.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MockGraph {
    fn drop(&mut self) {
        self.stop();
    }
}
