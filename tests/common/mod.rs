#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use agentvisor::{
    Component, ComponentConfig, ComponentError, ComponentEvent, ComponentMetadata, ComponentRef,
    ComponentState, HandlerFn, LifecycleManager, Message, MessageBus, MessageType, PerformanceMetrics,
    SystemEvent,
};

/// Shared call log: `"start:a"`, `"stop:c"`, ...
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn calls(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Scriptable component.
pub struct Scripted {
    state: ComponentState,
    log: CallLog,
    pub fail_start: AtomicBool,
    /// Start failures are reported as fatal instead of retryable.
    pub fatal_start: AtomicBool,
    pub fail_stop: AtomicBool,
    start_delay: Mutex<Duration>,
    unhealthy_checks: AtomicU32,
    starts: AtomicU32,
    received: Mutex<Vec<Arc<Message>>>,
}

impl Scripted {
    pub fn new(cfg: ComponentConfig, log: CallLog) -> Self {
        Self {
            state: ComponentState::new(cfg),
            log,
            fail_start: AtomicBool::new(false),
            fatal_start: AtomicBool::new(false),
            fail_stop: AtomicBool::new(false),
            start_delay: Mutex::new(Duration::ZERO),
            unhealthy_checks: AtomicU32::new(0),
            starts: AtomicU32::new(0),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> &ComponentState {
        &self.state
    }

    /// Makes the next `n` health checks fail.
    pub fn force_unhealthy(&self, n: u32) {
        self.unhealthy_checks.store(n, Ordering::SeqCst);
    }

    pub fn set_start_delay(&self, d: Duration) {
        *self.start_delay.lock().unwrap() = d;
    }

    pub fn starts(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }

    /// Messages received that are not system events.
    pub fn received(&self) -> Vec<Arc<Message>> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl Component for Scripted {
    fn config(&self) -> &ComponentConfig {
        self.state.config()
    }

    async fn start(&self) -> Result<(), ComponentError> {
        let id = &self.state.config().id;
        self.log.lock().unwrap().push(format!("start:{id}"));
        self.starts.fetch_add(1, Ordering::SeqCst);

        let delay = *self.start_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fatal_start.load(Ordering::SeqCst) {
            return Err(ComponentError::fatal("start refused for good"));
        }
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(ComponentError::fail("start refused"));
        }
        self.state.mark_started();
        Ok(())
    }

    async fn stop(&self) -> Result<(), ComponentError> {
        let id = &self.state.config().id;
        self.log.lock().unwrap().push(format!("stop:{id}"));
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(ComponentError::fail("stop refused"));
        }
        self.state.mark_stopped();
        Ok(())
    }

    async fn process_message(
        &self,
        message: Arc<Message>,
    ) -> Result<Option<Message>, ComponentError> {
        if SystemEvent::from_message(&message).is_some() {
            return Ok(None);
        }
        self.received.lock().unwrap().push(Arc::clone(&message));
        if message.kind() == MessageType::Query && message.payload().action == "ping" {
            let reply = message.reply(self.state.config().id.clone(), "pong".into());
            return Ok(Some(reply));
        }
        Ok(None)
    }

    fn is_healthy(&self) -> bool {
        let forced = self
            .unhealthy_checks
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        !forced && self.state.is_healthy()
    }

    fn update_heartbeat(&self) {
        self.state.heartbeat();
    }

    fn metadata(&self) -> ComponentMetadata {
        self.state.metadata()
    }

    fn metrics(&self) -> PerformanceMetrics {
        self.state.metrics()
    }

    fn events(&self) -> broadcast::Receiver<ComponentEvent> {
        self.state.subscribe()
    }
}

/// Registers a scripted component and returns a handle to it.
pub fn register(
    manager: &LifecycleManager,
    cfg: ComponentConfig,
    log: &CallLog,
) -> Arc<Scripted> {
    let scripted = Arc::new(Scripted::new(cfg.clone(), log.clone()));
    let handle = Arc::clone(&scripted);
    manager
        .register_component(cfg, move |_, _| Ok(handle as ComponentRef))
        .unwrap();
    scripted
}

/// Collects every system event broadcast over the bus.
pub fn capture_events(bus: &MessageBus) -> Arc<Mutex<Vec<SystemEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bus.subscribe(
        "test-observer",
        HandlerFn::arc("observer", move |msg: Arc<Message>| {
            let sink = Arc::clone(&sink);
            async move {
                if let Some(ev) = SystemEvent::from_message(&msg) {
                    sink.lock().unwrap().push(ev);
                }
                Ok::<_, ComponentError>(())
            }
        }),
    );
    seen
}
