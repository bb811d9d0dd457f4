//! # Gateway System
//!
//! Wires the Session Manager, Order Routing & Lifecycle Engine, Position Tracker and
//! Streaming Hub into one running system (mirrors the teacher's
//! `system::builder::SystemBuilder` → `SystemBuild` two-step: assemble components, then
//! spawn the tasks that keep them converging).

use crate::config::GatewayConfig;
use crate::error::GatewayCoreError;
use crate::shutdown::AsyncShutdown;
use chrono::{DateTime, Utc};
use gateway_execution::engine::circuit::CircuitConfig;
use gateway_execution::engine::reorder::FLUSH_TIMEOUT;
use gateway_execution::engine::EngineConfig;
use gateway_execution::order::report::ApplyOutcome;
use gateway_execution::position::PositionKey;
use gateway_execution::{BrokerClient, ExecutionReport, GatewayError, Order, PositionTracker, Router, SessionManager};
use gateway_markets::BrokerKind;
use gateway_risk::PreTradeGate;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Assembles a [`GatewaySystem`] from its adapters and configuration. Does not start
/// any background task until [`GatewaySystemBuilder::build`] is called.
#[derive(Debug)]
pub struct GatewaySystemBuilder {
    clients: Vec<Arc<dyn BrokerClient>>,
    config: GatewayConfig,
    risk_gate: Option<Arc<PreTradeGate>>,
}

impl GatewaySystemBuilder {
    pub fn new(clients: Vec<Arc<dyn BrokerClient>>, config: GatewayConfig) -> Self {
        Self {
            clients,
            config,
            risk_gate: None,
        }
    }

    /// Registers the pre-trade gate (spec §4.4). Omitting this leaves the gate
    /// disabled, which is a valid configuration for an edge layer that performs its
    /// own risk checks upstream of the Router.
    pub fn risk_gate(mut self, gate: PreTradeGate) -> Self {
        self.risk_gate = Some(Arc::new(gate));
        self
    }

    /// Builds the system's components. Nothing is spawned yet; call
    /// [`GatewaySystem::spawn_reconciler`] once the caller is ready to run.
    pub fn build(self) -> GatewaySystem {
        let sessions = Arc::new(SessionManager::new(self.clients.clone()));

        let engine_config = EngineConfig {
            stale_order_threshold: self.config.engine.stale_order_threshold(),
            circuit: CircuitConfig {
                failures_to_open: self.config.engine.circuit_failures_to_open,
                cool_off: self.config.engine.circuit_cool_off(),
            },
            risk_gate: self.risk_gate,
            ..EngineConfig::default()
        };

        let router = Arc::new(Router::new(self.clients, sessions.clone(), engine_config));
        let positions = Arc::new(PositionTracker::new());

        GatewaySystem {
            router,
            sessions,
            positions,
            config: self.config,
            reconciler: None,
            reorder_flush: None,
        }
    }
}

/// A fully assembled, running gateway: the three shared collaborators (Router,
/// SessionManager, PositionTracker) plus the handle to the background reconciler loop
/// once started. Streaming hubs are created per `(userId, brokerKind)` on demand by the
/// edge layer, not owned here (spec §4.6: one hub per connected user/broker pair).
#[allow(missing_debug_implementations)]
pub struct GatewaySystem {
    pub router: Arc<Router>,
    pub sessions: Arc<SessionManager>,
    pub positions: Arc<PositionTracker>,
    pub config: GatewayConfig,
    reconciler: Option<JoinHandle<()>>,
    reorder_flush: Option<JoinHandle<()>>,
}

impl GatewaySystem {
    /// Starts the periodic reconciliation sweep (spec §4.4): every
    /// `engine.reconcilerInterval`, poll every non-terminal order whose `updated_at` is
    /// older than `engine.staleOrderThreshold` and converge it via the adapter's
    /// `getOrder`, the same path `Router::get` falls through to on demand.
    pub fn spawn_reconciler(&mut self) {
        if self.reconciler.is_some() {
            return;
        }
        let router = self.router.clone();
        let interval = self.config.engine.reconciler_interval();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let now = Utc::now();
                for order_id in router.stale_order_ids(now).await {
                    if let Err(error) = router.get(order_id, now).await {
                        tracing::warn!(%order_id, %error, "reconciler poll failed");
                    }
                }
            }
        });
        self.reconciler = Some(handle);
        self.spawn_reorder_flush();
    }

    /// Periodically applies any execution reports that have been sitting in the
    /// reorder buffer past their flush timeout (spec §5). Ticks at a quarter of the
    /// flush timeout itself so a held report is never force-applied much later than
    /// the 2 s bound the spec names.
    fn spawn_reorder_flush(&mut self) {
        if self.reorder_flush.is_some() {
            return;
        }
        let router = self.router.clone();
        let interval = FLUSH_TIMEOUT / 4;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                router.flush_expired_reorder_buffers(Utc::now()).await;
            }
        });
        self.reorder_flush = Some(handle);
    }

    /// Feeds one execution report (from an adapter's stream or a reconciliation poll)
    /// through the Router's ingestion path, then forwards any resulting fill to the
    /// Position Tracker (spec §4.5: the Position Tracker is fed by every fill).
    pub async fn ingest_execution_report(
        &self,
        report: ExecutionReport,
        now: DateTime<Utc>,
    ) -> Result<Order, GatewayCoreError> {
        let broker_order_id = report.broker_order_id.clone();
        let (snapshot, outcome) = self
            .router
            .apply_execution_report(report, now)
            .await
            .map_err(|kind| GatewayError::new(kind, broker_order_id.0))?;

        if let ApplyOutcome::Applied { fill: Some(fill) } = outcome {
            let key = PositionKey {
                user_id: snapshot.user_id.clone(),
                broker_kind: snapshot.broker_kind,
                exchange_segment: snapshot.exchange_segment.clone(),
                symbol: snapshot.symbol.clone(),
                product_type: snapshot.product_type,
            };
            self.positions.apply_fill(key, snapshot.side, fill.qty, fill.price, now);
        }

        Ok(snapshot)
    }

    pub fn broker_names(&self) -> Vec<BrokerKind> {
        self.config.brokers.keys().copied().collect()
    }
}

impl AsyncShutdown for GatewaySystem {
    type Result = Result<(), GatewayCoreError>;

    fn shutdown(&mut self) -> impl Future<Output = Self::Result> {
        let reconciler = self.reconciler.take();
        let reorder_flush = self.reorder_flush.take();
        async move {
            for handle in [reconciler, reorder_flush].into_iter().flatten() {
                handle.abort();
                // `abort()` races the task's own completion; either outcome means it's
                // no longer running, which is all shutdown needs to guarantee.
                let _ = handle.await;
            }
            Ok(())
        }
    }
}
