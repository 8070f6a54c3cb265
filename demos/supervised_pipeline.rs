//! # Example: supervised_pipeline
//!
//! Three components wired over the bus, plus one that keeps failing its
//! health check:
//! - `ingest` (priority 95, critical) emits a `parse` command every 200ms
//! - `parser` (priority 60) answers each command with a `response`
//! - `sink` (priority 10) counts the responses
//! - `flaky` (priority 20) turns unhealthy after a second and is restarted
//!   until its budget of 2 restarts is spent
//!
//! ## Flow
//! ```text
//! start_all_components()   ingest ─► parser ─► flaky ─► sink
//! ingest ──parse──► parser ──response──► sink
//! health-monitor:
//!   flaky unhealthy ─► agent-error ─► restart (1) ─► ... ─► restart (2)
//!                   ─► agent-failure, flaky offline
//! Ctrl-C / 6s ─► runtime.shutdown()
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=agentvisor=debug cargo run --example supervised_pipeline
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

use agentvisor::{
    Component, ComponentConfig, ComponentContext, ComponentError, ComponentEvent,
    ComponentMetadata, ComponentRef, ComponentState, ERROR_TOPIC, HandlerFn, LifecycleConfig,
    Message, MessageBus, MessageBusConfig, MessageType, PerformanceMetrics, Runtime, SystemEvent,
};

/// Sends a `parse` command to the parser on a fixed period.
struct Ingest {
    state: ComponentState,
    bus: MessageBus,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl Ingest {
    fn new(cfg: ComponentConfig, ctx: ComponentContext) -> Self {
        Self {
            state: ComponentState::new(cfg),
            bus: ctx.bus().clone(),
            ticker: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Component for Ingest {
    fn config(&self) -> &ComponentConfig {
        self.state.config()
    }

    async fn start(&self) -> Result<(), ComponentError> {
        let bus = self.bus.clone();
        let ticker = tokio::spawn(async move {
            let mut seq = 0u64;
            loop {
                tokio::time::sleep(Duration::from_millis(200)).await;
                seq += 1;
                let cmd = Message::new(MessageType::Command, "ingest", "parse")
                    .to("parser")
                    .with_reply_to("sink")
                    .with_data(serde_json::json!({ "line": format!("record-{seq}") }));
                if let Err(e) = bus.send(cmd) {
                    tracing::warn!(error = %e, "ingest: command dropped");
                }
            }
        });
        *self.ticker.lock().unwrap() = Some(ticker);
        self.state.mark_started();
        Ok(())
    }

    async fn stop(&self) -> Result<(), ComponentError> {
        if let Some(ticker) = self.ticker.lock().unwrap().take() {
            ticker.abort();
        }
        self.state.mark_stopped();
        Ok(())
    }

    async fn process_message(&self, _: Arc<Message>) -> Result<Option<Message>, ComponentError> {
        Ok(None)
    }

    fn is_healthy(&self) -> bool {
        self.state.is_healthy()
    }

    fn update_heartbeat(&self) {
        self.state.heartbeat()
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

/// Upper-cases the `line` of every `parse` command.
struct Parser {
    state: ComponentState,
}

#[async_trait]
impl Component for Parser {
    fn config(&self) -> &ComponentConfig {
        self.state.config()
    }

    async fn start(&self) -> Result<(), ComponentError> {
        self.state.mark_started();
        Ok(())
    }

    async fn stop(&self) -> Result<(), ComponentError> {
        self.state.mark_stopped();
        Ok(())
    }

    async fn process_message(&self, msg: Arc<Message>) -> Result<Option<Message>, ComponentError> {
        if msg.kind() != MessageType::Command || msg.payload().action != "parse" {
            return Ok(None);
        }
        let started = Instant::now();
        let Some(line) = msg.payload().data["line"].as_str() else {
            self.state.record_operation(started.elapsed(), false);
            return Err(ComponentError::fail("parse command without a line"));
        };
        let parsed = line.to_uppercase();
        self.state.record_operation(started.elapsed(), true);
        Ok(Some(msg.reply("parser", serde_json::json!({ "parsed": parsed }))))
    }

    fn is_healthy(&self) -> bool {
        self.state.is_healthy()
    }

    fn update_heartbeat(&self) {
        self.state.heartbeat()
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

/// Counts parsed records.
struct Sink {
    state: ComponentState,
    received: AtomicU64,
}

#[async_trait]
impl Component for Sink {
    fn config(&self) -> &ComponentConfig {
        self.state.config()
    }

    async fn start(&self) -> Result<(), ComponentError> {
        self.state.mark_started();
        Ok(())
    }

    async fn stop(&self) -> Result<(), ComponentError> {
        println!("🗄  sink: {} records stored", self.received.load(Ordering::Relaxed));
        self.state.mark_stopped();
        Ok(())
    }

    async fn process_message(&self, msg: Arc<Message>) -> Result<Option<Message>, ComponentError> {
        if msg.kind() == MessageType::Response {
            let n = self.received.fetch_add(1, Ordering::Relaxed) + 1;
            println!("🗄  sink #{n}: {}", msg.payload().data["parsed"]);
        }
        Ok(None)
    }

    fn is_healthy(&self) -> bool {
        self.state.is_healthy()
    }

    fn update_heartbeat(&self) {
        self.state.heartbeat()
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

/// Healthy for one second after each start.
struct Flaky {
    state: ComponentState,
    started_at: Mutex<Option<Instant>>,
}

#[async_trait]
impl Component for Flaky {
    fn config(&self) -> &ComponentConfig {
        self.state.config()
    }

    async fn start(&self) -> Result<(), ComponentError> {
        *self.started_at.lock().unwrap() = Some(Instant::now());
        self.state.mark_started();
        Ok(())
    }

    async fn stop(&self) -> Result<(), ComponentError> {
        self.state.mark_stopped();
        Ok(())
    }

    async fn process_message(&self, _: Arc<Message>) -> Result<Option<Message>, ComponentError> {
        Ok(None)
    }

    fn is_healthy(&self) -> bool {
        let young = self
            .started_at
            .lock()
            .unwrap()
            .is_some_and(|t| t.elapsed() < Duration::from_secs(1));
        young && self.state.is_healthy()
    }

    fn update_heartbeat(&self) {
        self.state.heartbeat()
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

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("agentvisor=info")),
        )
        .init();

    let runtime = Runtime::builder()
        .with_bus_config(MessageBusConfig {
            retry_delay: Duration::from_millis(100),
            ..MessageBusConfig::default()
        })
        .with_lifecycle_config(LifecycleConfig {
            health_check_interval: Duration::from_millis(250),
            restart_delay: Duration::from_millis(300),
            ..LifecycleConfig::default()
        })
        .build();
    let bus = runtime.bus();

    // System events are broadcast, so any subscriber sees them.
    bus.subscribe(
        "console",
        HandlerFn::arc("console", |msg: Arc<Message>| async move {
            match SystemEvent::from_message(&msg) {
                Some(SystemEvent::AgentFailure { component_id, restart_count, .. }) => {
                    println!("💀 {component_id} gave up after {restart_count} restarts");
                }
                Some(ev) => println!("📣 {} {}", ev.action(), ev.component_id()),
                None => {}
            }
            Ok::<_, ComponentError>(())
        }),
    );
    bus.subscribe(
        ERROR_TOPIC,
        HandlerFn::arc("dead-letters", |msg: Arc<Message>| async move {
            println!("⚠️  undeliverable: {}", msg.payload().data);
            Ok::<_, ComponentError>(())
        }),
    );

    let every_check = Duration::ZERO;
    runtime.register_component(
        ComponentConfig::new("ingest", "Ingest").with_priority(95),
        |cfg, ctx| Ok(Arc::new(Ingest::new(cfg, ctx)) as ComponentRef),
    )?;
    runtime.register_component(
        ComponentConfig::new("parser", "Parser")
            .with_priority(60)
            .with_capability("parse"),
        |cfg, _| Ok(Arc::new(Parser { state: ComponentState::new(cfg) }) as ComponentRef),
    )?;
    runtime.register_component(
        ComponentConfig::new("flaky", "Flaky")
            .with_priority(20)
            .with_max_restart_attempts(2)
            .with_health_check_interval(every_check),
        |cfg, _| {
            Ok(Arc::new(Flaky {
                state: ComponentState::new(cfg),
                started_at: Mutex::new(None),
            }) as ComponentRef)
        },
    )?;
    runtime.register_component(
        ComponentConfig::new("sink", "Sink")
            .with_priority(10)
            .with_dependency("parser"),
        |cfg, _| {
            Ok(Arc::new(Sink {
                state: ComponentState::new(cfg),
                received: AtomicU64::new(0),
            }) as ComponentRef)
        },
    )?;

    runtime.start().await?;

    tokio::select! {
        res = agentvisor::wait_for_shutdown_signal() => res?,
        _ = tokio::time::sleep(Duration::from_secs(6)) => {}
    }

    let health = runtime.lifecycle().system_health();
    println!("🩺 system {} ({}/{} active)", health.status, health.active, health.total);
    for c in &health.components {
        println!("   {:<8} {:<12} restarts={}", c.id, c.status.as_str(), c.restart_count);
    }
    let metrics = bus.metrics();
    println!(
        "📊 bus: delivered={} retried={} abandoned={}",
        metrics.delivered, metrics.retried, metrics.abandoned
    );

    let failures = runtime.shutdown().await;
    if !failures.is_empty() {
        anyhow::bail!("{} components failed to stop", failures.len());
    }
    Ok(())
}
