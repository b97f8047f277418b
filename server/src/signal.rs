//! OS signal handling for orderly shutdown
//!
//! The OS-facing side runs on its own tokio task and never touches server
//! state. It only dispatches to callbacks registered per [`SignalKind`], and
//! the callbacks the server installs do nothing but flip a [`ShutdownFlag`]
//! that the control loop checks between ticks.

use log::{debug, info, warn};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// SIGINT / Ctrl+C
    Interrupt,
    /// SIGTERM
    Terminate,
    /// SIGHUP
    Hangup,
}

impl SignalKind {
    /// Signals this platform can deliver
    pub fn supported() -> &'static [SignalKind] {
        if cfg!(unix) {
            &[SignalKind::Interrupt, SignalKind::Terminate, SignalKind::Hangup]
        } else {
            &[SignalKind::Interrupt]
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalKind::Interrupt => "SIGINT",
            SignalKind::Terminate => "SIGTERM",
            SignalKind::Hangup => "SIGHUP",
        };
        f.write_str(name)
    }
}

/// Cloneable "should stop" flag shared between signal callbacks and the loop
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn should_stop(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

type Callback = Box<dyn Fn(SignalKind) + Send + Sync>;
type CallbackMap = HashMap<SignalKind, Vec<Callback>>;

/// Registry of per-signal callbacks plus the task listening for signals
///
/// Owned by the process entry point for the lifetime of the server.
#[derive(Default)]
pub struct SignalHandler {
    callbacks: Arc<Mutex<CallbackMap>>,
    listener: Option<JoinHandle<()>>,
}

impl SignalHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds and starts a handler that requests a stop on every supported signal.
    pub fn install_shutdown(flag: &ShutdownFlag) -> io::Result<Self> {
        let mut handler = Self::new();
        for &kind in SignalKind::supported() {
            let flag = flag.clone();
            handler.register_callback(kind, move |kind| {
                info!("Received {}, shutting down", kind);
                flag.request_stop();
            });
        }
        handler.start()?;
        Ok(handler)
    }

    pub fn register_callback<F>(&mut self, kind: SignalKind, callback: F)
    where
        F: Fn(SignalKind) + Send + Sync + 'static,
    {
        if !SignalKind::supported().contains(&kind) {
            warn!("{} is not delivered on this platform, callback will never run", kind);
        }
        lock(&self.callbacks)
            .entry(kind)
            .or_default()
            .push(Box::new(callback));
    }

    /// Runs every callback registered for `kind`, as if the signal had arrived.
    pub fn notify(&self, kind: SignalKind) {
        dispatch(&self.callbacks, kind);
    }

    pub fn is_listening(&self) -> bool {
        self.listener
            .as_ref()
            .is_some_and(|listener| !listener.is_finished())
    }

    /// Installs the OS handlers and spawns the listener task.
    ///
    /// Must be called from within a tokio runtime. Starting twice is a no-op.
    pub fn start(&mut self) -> io::Result<()> {
        if self.is_listening() {
            return Ok(());
        }
        let callbacks = Arc::clone(&self.callbacks);
        self.listener = Some(spawn_listener(callbacks)?);
        debug!("Signal listener started");
        Ok(())
    }

    /// Detaches from the OS signals. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
            debug!("Signal listener stopped");
        }
    }
}

impl Drop for SignalHandler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock(callbacks: &Mutex<CallbackMap>) -> MutexGuard<'_, CallbackMap> {
    // A panicking callback must not disable shutdown for good
    callbacks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn dispatch(callbacks: &Mutex<CallbackMap>, kind: SignalKind) {
    let callbacks = lock(callbacks);
    match callbacks.get(&kind) {
        Some(list) => list.iter().for_each(|callback| callback(kind)),
        None => debug!("No callback registered for {}", kind),
    }
}

#[cfg(unix)]
fn spawn_listener(callbacks: Arc<Mutex<CallbackMap>>) -> io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind as UnixSignal};

    let mut interrupt = signal(UnixSignal::interrupt())?;
    let mut terminate = signal(UnixSignal::terminate())?;
    let mut hangup = signal(UnixSignal::hangup())?;

    Ok(tokio::spawn(async move {
        loop {
            let kind = tokio::select! {
                Some(()) = interrupt.recv() => SignalKind::Interrupt,
                Some(()) = terminate.recv() => SignalKind::Terminate,
                Some(()) = hangup.recv() => SignalKind::Hangup,
                else => break,
            };
            dispatch(&callbacks, kind);
        }
    }))
}

#[cfg(not(unix))]
fn spawn_listener(callbacks: Arc<Mutex<CallbackMap>>) -> io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            dispatch(&callbacks, SignalKind::Interrupt);
        }
    }))
}
