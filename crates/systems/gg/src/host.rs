//! Host capabilities injected into a Game Gear session
//!
//! Every capability is optional. A session with none of them attached still
//! runs: frames and audio blocks are dropped, no buttons are pressed, the
//! free-run loop only stops through its [`StopHandle`](crate::StopHandle),
//! and external RAM starts zeroed.

use crate::controller::Buttons;
use emu_core::apu::AudioSink;
use emu_core::cpu_z80::CpuStep;
use emu_core::logging::{log, LogCategory, LogLevel};

/// Consumer of finished frames (160x144 values of 12-bit BGR)
pub trait DisplaySink {
    fn draw_frame(&mut self, frame: &[u16]);
}

impl<F: FnMut(&[u16])> DisplaySink for F {
    fn draw_frame(&mut self, frame: &[u16]) {
        self(frame)
    }
}

/// Polled whenever the program reads a controller port
pub trait InputSource {
    fn buttons(&mut self) -> Buttons;
}

impl<F: FnMut() -> Buttons> InputSource for F {
    fn buttons(&mut self) -> Buttons {
        self()
    }
}

/// Kind of a traced RAM access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemAccess {
    Read,
    Write,
}

/// Debugger hooks, only invoked during single-step trace execution
pub trait TraceSink {
    /// The step about to be executed
    fn cpu_step(&mut self, _step: &CpuStep) {}

    /// A write to the paging registers is about to be applied
    fn mapper_changed(&mut self) {}

    /// Access to on-board RAM; `offset` is relative to the 8 KiB block
    fn mem_access(&mut self, _access: MemAccess, _offset: u16, _data: u8) {}
}

/// Receives non-fatal warnings (e.g. a rejected snapshot)
pub trait DiagnosticSink {
    fn warning(&mut self, message: &str);
}

impl<F: FnMut(&str)> DiagnosticSink for F {
    fn warning(&mut self, message: &str) {
        self(message)
    }
}

/// Polled periodically by the free-run loop; returning `true` stops it
pub trait SignalSource {
    fn check(&mut self) -> bool;
}

impl<F: FnMut() -> bool> SignalSource for F {
    fn check(&mut self) -> bool {
        self()
    }
}

/// Supplies the cartridge's external (battery-backed) RAM on first use
pub trait ExternalRamProvider {
    fn acquire(&mut self) -> Vec<u8>;
}

impl<F: FnMut() -> Vec<u8>> ExternalRamProvider for F {
    fn acquire(&mut self) -> Vec<u8> {
        self()
    }
}

/// The set of capabilities a session talks to
#[derive(Default)]
pub struct Host {
    display: Option<Box<dyn DisplaySink>>,
    audio: Option<Box<dyn AudioSink>>,
    input: Option<Box<dyn InputSource>>,
    trace: Option<Box<dyn TraceSink>>,
    diagnostics: Option<Box<dyn DiagnosticSink>>,
    signals: Option<Box<dyn SignalSource>>,
    external_ram: Option<Box<dyn ExternalRamProvider>>,
}

impl Host {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_display(mut self, sink: impl DisplaySink + 'static) -> Self {
        self.display = Some(Box::new(sink));
        self
    }

    pub fn with_audio(mut self, sink: impl AudioSink + 'static) -> Self {
        self.audio = Some(Box::new(sink));
        self
    }

    pub fn with_input(mut self, source: impl InputSource + 'static) -> Self {
        self.input = Some(Box::new(source));
        self
    }

    pub fn with_trace(mut self, sink: impl TraceSink + 'static) -> Self {
        self.trace = Some(Box::new(sink));
        self
    }

    pub fn with_diagnostics(mut self, sink: impl DiagnosticSink + 'static) -> Self {
        self.diagnostics = Some(Box::new(sink));
        self
    }

    pub fn with_signals(mut self, source: impl SignalSource + 'static) -> Self {
        self.signals = Some(Box::new(source));
        self
    }

    pub fn with_external_ram(mut self, provider: impl ExternalRamProvider + 'static) -> Self {
        self.external_ram = Some(Box::new(provider));
        self
    }

    pub fn has_trace(&self) -> bool {
        self.trace.is_some()
    }

    pub(crate) fn buttons(&mut self) -> Buttons {
        match self.input.as_mut() {
            Some(input) => input.buttons(),
            None => Buttons::NONE,
        }
    }

    /// `true` when the host asks the free-run loop to stop
    pub(crate) fn check_signals(&mut self) -> bool {
        self.signals.as_mut().is_some_and(|s| s.check())
    }

    pub(crate) fn acquire_external_ram(&mut self) -> Vec<u8> {
        match self.external_ram.as_mut() {
            Some(provider) => provider.acquire(),
            None => Vec::new(),
        }
    }

    pub(crate) fn trace_cpu_step(&mut self, step: &CpuStep) {
        if let Some(trace) = self.trace.as_mut() {
            trace.cpu_step(step);
        }
    }

    pub(crate) fn trace_mapper_changed(&mut self) {
        if let Some(trace) = self.trace.as_mut() {
            trace.mapper_changed();
        }
    }

    pub(crate) fn trace_mem(&mut self, access: MemAccess, offset: u16, data: u8) {
        if let Some(trace) = self.trace.as_mut() {
            trace.mem_access(access, offset, data);
        }
    }

    /// Surface a warning to the diagnostic sink and the log
    pub(crate) fn warn(&mut self, category: LogCategory, message: &str) {
        log(category, LogLevel::Warn, || message.to_string());
        if let Some(diagnostics) = self.diagnostics.as_mut() {
            diagnostics.warning(message);
        }
    }
}

impl DisplaySink for Host {
    fn draw_frame(&mut self, frame: &[u16]) {
        if let Some(display) = self.display.as_mut() {
            display.draw_frame(frame);
        }
    }
}

impl AudioSink for Host {
    fn play(&mut self, left: &[f64], right: &[f64]) {
        if let Some(audio) = self.audio.as_mut() {
            audio.play(left, right);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_empty_host_defaults() {
        let mut host = Host::new();
        assert_eq!(host.buttons(), Buttons::NONE);
        assert!(!host.check_signals());
        assert!(host.acquire_external_ram().is_empty());
        assert!(!host.has_trace());
        // Dropped silently
        host.draw_frame(&[0; 4]);
        host.play(&[0.0], &[0.0]);
    }

    #[test]
    fn test_host_forwards_to_capabilities() {
        let frames = Rc::new(RefCell::new(0));
        let warnings = Rc::new(RefCell::new(Vec::new()));

        let f = Rc::clone(&frames);
        let w = Rc::clone(&warnings);
        let mut host = Host::new()
            .with_display(move |_: &[u16]| *f.borrow_mut() += 1)
            .with_input(|| Buttons::START)
            .with_diagnostics(move |msg: &str| w.borrow_mut().push(msg.to_string()))
            .with_signals(|| true);

        host.draw_frame(&[0; 4]);
        host.warn(LogCategory::State, "careful");

        assert_eq!(*frames.borrow(), 1);
        assert_eq!(host.buttons(), Buttons::START);
        assert!(host.check_signals());
        assert_eq!(warnings.borrow().as_slice(), ["careful"]);
    }
}
