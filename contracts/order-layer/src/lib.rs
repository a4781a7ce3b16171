//! Order Layer - Price-Triggered Leveraged Positions
//!
//! Wraps the loop engine with a small order book: a user escrows margin
//! behind an entry trigger, anyone may execute the entry once the collateral
//! price crosses it, and a take-profit or stop-loss later closes the
//! position the same way.
//!
//! ## Lifecycle
//!
//! ```text
//! create_order ──> PENDING ──execute_orders──> ACTIVE ──execute_unwinds──> CLOSED
//!                     │                           └────close_position────┘
//!                     └──cancel_order──> CANCELLED
//! ```
//!
//! ## Custody
//!
//! The layer holds escrow under its own identity and opens every position
//! on the lending market under a derived custody key. The custody key ->
//! owner table is the only link between the market account and the user.
//!
//! ## Batches
//!
//! `execute_orders` and `execute_unwinds` are permissionless. Each element
//! succeeds or fails on its own; one failing position never blocks the rest.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use leverloop_common::{
    errors::{LoopError, LoopResult},
    events::{EventLog, LoopEvent},
    market::Host,
    types::{
        derive_custody_key, derive_order_id, derive_position_id, Address, AssetId, LoopParams,
        LoopReport, Order, OrderId, OrderKind, Position, PositionId, PositionStatus, Trigger,
        TriggerDirection, UnwindParams, UnwindReport,
    },
    validation::{require_batch_size, require_owner, require_positive, validate_loop_params},
};
use leverloop_engine::{short_key, LoopEngine};


// ============ Order Request ============

/// What a user asks the layer to open once the entry trigger fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct OrderRequest {
    /// Collateral asset (A)
    pub collateral_asset: AssetId,
    /// Debt asset (B)
    pub debt_asset: AssetId,
    /// Margin escrowed now, looped on entry (native A)
    pub margin: u128,
    /// Target leverage in basis points
    pub target_leverage_bps: u64,
    /// Minimum health factor in basis points
    pub min_health_factor_bps: u64,
    /// Slippage tolerance for entry and exit swaps
    pub max_slippage_bps: u64,
}

impl OrderRequest {
    fn loop_params(&self, caller: Address, beneficiary: Address) -> LoopParams {
        LoopParams {
            collateral_asset: self.collateral_asset,
            debt_asset: self.debt_asset,
            caller,
            beneficiary,
            initial_margin: self.margin,
            target_leverage_bps: self.target_leverage_bps,
            min_health_factor_bps: self.min_health_factor_bps,
            max_slippage_bps: self.max_slippage_bps,
        }
    }
}

// ============ Order Layer ============

/// Order book and position registry
#[derive(Debug)]
pub struct OrderLayer {
    /// Account escrow and unwind proceeds pass through
    identity: Address,
    positions: BTreeMap<PositionId, Position>,
    orders: BTreeMap<OrderId, Order>,
    /// Custody key -> owner
    custody_owners: BTreeMap<Address, Address>,
    owner_positions: BTreeMap<Address, Vec<PositionId>>,
    nonce: u64,
    sequence: u64,
    events: EventLog,
}

impl OrderLayer {
    pub fn new(identity: Address) -> Self {
        Self {
            identity,
            positions: BTreeMap::new(),
            orders: BTreeMap::new(),
            custody_owners: BTreeMap::new(),
            owner_positions: BTreeMap::new(),
            nonce: 0,
            sequence: 0,
            events: EventLog::new(),
        }
    }

    pub fn identity(&self) -> Address {
        self.identity
    }

    // ============ Queries ============

    pub fn position(&self, position_id: &PositionId) -> Option<&Position> {
        self.positions.get(position_id)
    }

    /// Entry, take-profit and stop-loss orders of a position
    pub fn orders_for(&self, position_id: &PositionId) -> Vec<&Order> {
        [OrderKind::Entry, OrderKind::TakeProfit, OrderKind::StopLoss]
            .iter()
            .filter_map(|kind| self.orders.get(&derive_order_id(position_id, *kind)))
            .collect()
    }

    pub fn owner_of_custody(&self, custody_key: &Address) -> Option<Address> {
        self.custody_owners.get(custody_key).copied()
    }

    pub fn positions_of(&self, owner: &Address) -> Vec<&Position> {
        self.owner_positions
            .get(owner)
            .map(|ids| ids.iter().filter_map(|id| self.positions.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<LoopEvent> {
        self.events.drain()
    }

    // ============ Create ============

    /// Escrow margin and record a pending position behind an entry trigger
    pub fn create_order<H: Host>(
        &mut self,
        host: &mut H,
        engine: &LoopEngine,
        owner: Address,
        request: OrderRequest,
        entry: Trigger,
    ) -> LoopResult<PositionId> {
        // 1. Same rules the engine applies before touching a market
        let config = engine.config();
        validate_loop_params(
            &request.loop_params(owner, owner),
            config.min_health_factor_floor_bps,
            config.max_slippage_bps,
        )?;
        require_positive(entry.price)?;

        // 2. Pull escrow into the layer's custody
        host.transfer_from(request.collateral_asset, self.identity, owner, self.identity, request.margin)?;

        // 3. Derive identifiers
        let position_id = derive_position_id(&owner, self.nonce);
        self.nonce += 1;
        let custody_key = derive_custody_key(&self.identity, &position_id);

        // 4. Record position and entry order
        self.sequence += 1;
        self.positions.insert(
            position_id,
            Position {
                id: position_id,
                owner,
                custody_key,
                collateral_asset: request.collateral_asset,
                debt_asset: request.debt_asset,
                margin: request.margin,
                collateral: 0,
                debt: 0,
                target_leverage_bps: request.target_leverage_bps,
                min_health_factor_bps: request.min_health_factor_bps,
                max_slippage_bps: request.max_slippage_bps,
                loops: 0,
                status: PositionStatus::Pending,
                created_at: self.sequence,
                updated_at: self.sequence,
            },
        );
        self.upsert_order(position_id, OrderKind::Entry, entry);
        self.custody_owners.insert(custody_key, owner);
        self.owner_positions.entry(owner).or_default().push(position_id);

        self.events.emit(LoopEvent::OrderCreated {
            position_id,
            owner,
            margin: request.margin,
            trigger_price: entry.price,
            direction: entry.direction,
            sequence: self.sequence,
        });
        info!(
            position = %short_key(&position_id),
            owner = %short_key(&owner),
            margin = request.margin,
            trigger_price = entry.price,
            "order created"
        );

        Ok(position_id)
    }

    // ============ Entry Execution ============

    /// Activate every pending position in `batch` whose entry trigger holds
    pub fn execute_orders<H: Host>(
        &mut self,
        host: &mut H,
        engine: &mut LoopEngine,
        batch: &[PositionId],
    ) -> LoopResult<Vec<LoopResult<LoopReport>>> {
        require_batch_size(batch.len())?;

        Ok(batch
            .iter()
            .map(|position_id| {
                let outcome = self.activate(host, engine, position_id);
                if let Err(err) = &outcome {
                    skip(position_id, err, "entry skipped");
                }
                outcome
            })
            .collect())
    }

    fn activate<H: Host>(
        &mut self,
        host: &mut H,
        engine: &mut LoopEngine,
        position_id: &PositionId,
    ) -> LoopResult<LoopReport> {
        // 1. Position must be pending with a live entry order
        let position = self.position_in(position_id, PositionStatus::Pending)?.clone();
        let entry = self
            .orders
            .get(&derive_order_id(position_id, OrderKind::Entry))
            .filter(|order| order.is_live())
            .ok_or(LoopError::TriggerNotMet { position_id: *position_id })?
            .trigger;

        // 2. Trigger against the collateral spot price
        let spot = host.price(position.collateral_asset)?;
        if !entry.is_met(spot) {
            return Err(LoopError::TriggerNotMet { position_id: *position_id });
        }

        // 3. Let the engine pull the escrow and loop it for the custody key
        let request = request_of(&position);
        host.approve(position.collateral_asset, self.identity, engine.identity(), position.margin)?;
        let report = match engine.execute_loop(host, &request.loop_params(self.identity, position.custody_key)) {
            Ok(report) => report,
            Err(err) => {
                if let Err(reset) = host.approve(position.collateral_asset, self.identity, engine.identity(), 0) {
                    warn!(
                        position = %short_key(position_id),
                        error = %reset,
                        "failed to reset engine allowance"
                    );
                }
                return Err(err);
            }
        };

        // 4. Record the open position
        self.sequence += 1;
        let sequence = self.sequence;
        if let Some(position) = self.positions.get_mut(position_id) {
            position.status = PositionStatus::Active;
            position.collateral = report.final_collateral;
            position.debt = report.final_debt;
            position.loops = report.iterations;
            position.updated_at = sequence;
        }
        if let Some(order) = self.orders.get_mut(&derive_order_id(position_id, OrderKind::Entry)) {
            order.executed = true;
        }

        self.events.emit(LoopEvent::OrderExecuted {
            position_id: *position_id,
            custody_key: position.custody_key,
            collateral: report.final_collateral,
            debt: report.final_debt,
            sequence,
        });
        info!(
            position = %short_key(position_id),
            spot,
            iterations = report.iterations,
            leverage_bps = report.achieved_leverage_bps,
            "entry order executed"
        );

        Ok(report)
    }

    // ============ Exit Triggers ============

    /// Set or replace the take-profit trigger (fires at or above `price`)
    pub fn set_take_profit(&mut self, owner: Address, position_id: &PositionId, price: u128) -> LoopResult<()> {
        self.set_exit(owner, position_id, OrderKind::TakeProfit, price)
    }

    /// Set or replace the stop-loss trigger (fires at or below `price`)
    pub fn set_stop_loss(&mut self, owner: Address, position_id: &PositionId, price: u128) -> LoopResult<()> {
        self.set_exit(owner, position_id, OrderKind::StopLoss, price)
    }

    fn set_exit(&mut self, owner: Address, position_id: &PositionId, kind: OrderKind, price: u128) -> LoopResult<()> {
        let position = self.owned(owner, position_id)?;
        if !matches!(position.status, PositionStatus::Pending | PositionStatus::Active) {
            return Err(LoopError::InvalidStatus {
                position_id: *position_id,
                status: position.status,
            });
        }
        require_positive(price)?;

        let direction = match kind {
            OrderKind::StopLoss => TriggerDirection::AtOrBelow,
            _ => TriggerDirection::AtOrAbove,
        };
        let trigger = Trigger::new(price, direction);
        let unchanged = self
            .orders
            .get(&derive_order_id(position_id, kind))
            .is_some_and(|order| order.is_live() && order.trigger == trigger);
        if unchanged {
            return Ok(());
        }

        self.sequence += 1;
        self.upsert_order(*position_id, kind, trigger);
        self.events.emit(LoopEvent::TriggerSet {
            position_id: *position_id,
            kind,
            trigger_price: price,
            sequence: self.sequence,
        });
        debug!(position = %short_key(position_id), kind = ?kind, price, "exit trigger set");
        Ok(())
    }

    // ============ Exit Execution ============

    /// Close every active position in `batch` whose take-profit or stop-loss fired
    pub fn execute_unwinds<H: Host>(
        &mut self,
        host: &mut H,
        engine: &mut LoopEngine,
        batch: &[PositionId],
    ) -> LoopResult<Vec<LoopResult<UnwindReport>>> {
        require_batch_size(batch.len())?;

        Ok(batch
            .iter()
            .map(|position_id| {
                let outcome = match self.fired_exit(&*host, position_id) {
                    Ok(kind) => self.close(host, engine, position_id, Some(kind)),
                    Err(err) => Err(err),
                };
                if let Err(err) = &outcome {
                    skip(position_id, err, "exit skipped");
                }
                outcome
            })
            .collect())
    }

    /// Owner closes an active position at market
    pub fn close_position<H: Host>(
        &mut self,
        host: &mut H,
        engine: &mut LoopEngine,
        owner: Address,
        position_id: &PositionId,
    ) -> LoopResult<UnwindReport> {
        self.owned(owner, position_id)?;
        self.close(host, engine, position_id, None)
    }

    /// The exit order that fires at the current spot; take-profit wins a tie
    fn fired_exit<H: Host>(&self, host: &H, position_id: &PositionId) -> LoopResult<OrderKind> {
        let position = self.position_in(position_id, PositionStatus::Active)?;
        let spot = host.price(position.collateral_asset)?;

        [OrderKind::TakeProfit, OrderKind::StopLoss]
            .into_iter()
            .find(|kind| {
                self.orders
                    .get(&derive_order_id(position_id, *kind))
                    .is_some_and(|order| order.is_live() && order.trigger.is_met(spot))
            })
            .ok_or(LoopError::TriggerNotMet { position_id: *position_id })
    }

    fn close<H: Host>(
        &mut self,
        host: &mut H,
        engine: &mut LoopEngine,
        position_id: &PositionId,
        by_trigger: Option<OrderKind>,
    ) -> LoopResult<UnwindReport> {
        // 1. Position must be active
        let position = self.position_in(position_id, PositionStatus::Active)?.clone();

        // 2. Full unwind paying the owner directly; the engine rolls back on failure
        let params = UnwindParams {
            recipient: position.owner,
            ..UnwindParams::close_all(
                position.collateral_asset,
                position.debt_asset,
                position.custody_key,
                position.max_slippage_bps,
            )
        };
        let report = engine.unwind_loop(host, &params)?;

        // 3. Retire the position and its exit orders
        self.sequence += 1;
        let sequence = self.sequence;
        if let Some(position) = self.positions.get_mut(position_id) {
            position.status = PositionStatus::Closed;
            position.collateral = report.remaining_collateral;
            position.debt = report.remaining_debt;
            position.updated_at = sequence;
        }
        for kind in [OrderKind::TakeProfit, OrderKind::StopLoss] {
            if let Some(order) = self.orders.get_mut(&derive_order_id(position_id, kind)) {
                if Some(kind) == by_trigger {
                    order.executed = true;
                } else if order.is_live() {
                    order.cancelled = true;
                }
            }
        }

        self.events.emit(LoopEvent::PositionClosed {
            position_id: *position_id,
            owner: position.owner,
            collateral_returned: report.collateral_withdrawn,
            debt_surplus_returned: report.debt_surplus,
            by_trigger,
            sequence,
        });
        info!(
            position = %short_key(position_id),
            by_trigger = ?by_trigger,
            collateral_returned = report.collateral_withdrawn,
            debt_surplus_returned = report.debt_surplus,
            "position closed"
        );

        Ok(report)
    }

    // ============ Cancel ============

    /// Cancel a pending position and return its escrow
    pub fn cancel_order<H: Host>(&mut self, host: &mut H, owner: Address, position_id: &PositionId) -> LoopResult<u128> {
        let position = self.owned(owner, position_id)?.clone();
        if !position.is_pending() {
            return Err(LoopError::InvalidStatus {
                position_id: *position_id,
                status: position.status,
            });
        }

        host.transfer(position.collateral_asset, self.identity, owner, position.margin)?;

        self.sequence += 1;
        let sequence = self.sequence;
        if let Some(position) = self.positions.get_mut(position_id) {
            position.status = PositionStatus::Cancelled;
            position.updated_at = sequence;
        }
        for kind in [OrderKind::Entry, OrderKind::TakeProfit, OrderKind::StopLoss] {
            if let Some(order) = self.orders.get_mut(&derive_order_id(position_id, kind)) {
                order.cancelled = true;
            }
        }

        self.events.emit(LoopEvent::OrderCancelled {
            position_id: *position_id,
            owner,
            margin_returned: position.margin,
            sequence,
        });
        info!(position = %short_key(position_id), margin = position.margin, "order cancelled");

        Ok(position.margin)
    }

    // ============ Helpers ============

    fn upsert_order(&mut self, position_id: PositionId, kind: OrderKind, trigger: Trigger) {
        let id = derive_order_id(&position_id, kind);
        self.orders.insert(
            id,
            Order {
                id,
                position_id,
                trigger,
                kind,
                executed: false,
                cancelled: false,
            },
        );
    }

    fn owned(&self, owner: Address, position_id: &PositionId) -> LoopResult<&Position> {
        let position = self
            .positions
            .get(position_id)
            .ok_or(LoopError::PositionNotFound { position_id: *position_id })?;
        require_owner(position.owner, owner)?;
        Ok(position)
    }

    fn position_in(&self, position_id: &PositionId, status: PositionStatus) -> LoopResult<&Position> {
        let position = self
            .positions
            .get(position_id)
            .ok_or(LoopError::PositionNotFound { position_id: *position_id })?;
        if position.status != status {
            return Err(LoopError::InvalidStatus {
                position_id: *position_id,
                status: position.status,
            });
        }
        Ok(position)
    }
}

fn request_of(position: &Position) -> OrderRequest {
    OrderRequest {
        collateral_asset: position.collateral_asset,
        debt_asset: position.debt_asset,
        margin: position.margin,
        target_leverage_bps: position.target_leverage_bps,
        min_health_factor_bps: position.min_health_factor_bps,
        max_slippage_bps: position.max_slippage_bps,
    }
}

fn skip(position_id: &PositionId, err: &LoopError, message: &'static str) {
    if matches!(err, LoopError::TriggerNotMet { .. }) {
        debug!(position = %short_key(position_id), "{}", message);
    } else {
        warn!(position = %short_key(position_id), code = err.code(), "{}", message);
    }
}
