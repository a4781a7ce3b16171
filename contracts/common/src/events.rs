//! Engine and Order Events
//!
//! Events are collected during an invocation and published only when it
//! commits. Indexers consume them to follow positions without replaying
//! market calls.

use crate::Vec;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use crate::types::{Address, AssetId, OrderKind, PositionId, Termination, TriggerDirection};

/// Event types for indexing and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum EventType {
    // Engine Events (0x01 - 0x1F)
    LoopExecuted = 0x01,
    LoopIteration = 0x02,
    LoopUnwound = 0x03,

    // Order Events (0x20 - 0x3F)
    OrderCreated = 0x20,
    OrderExecuted = 0x21,
    TriggerSet = 0x22,
    PositionClosed = 0x23,
    OrderCancelled = 0x24,

    // Config Events (0x80 - 0x9F)
    EnginePaused = 0x80,
    EngineUnpaused = 0x81,
    ConfigUpdated = 0x82,
}

/// All events the engine and order layer can emit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum LoopEvent {
    // ============ Engine Events ============

    /// A leverage loop committed
    LoopExecuted {
        caller: Address,
        beneficiary: Address,
        collateral_asset: AssetId,
        debt_asset: AssetId,
        margin: u128,
        collateral: u128,
        debt: u128,
        iterations: u8,
        health_factor_bps: u64,
        leverage_bps: u64,
        termination: Termination,
        sequence: u64,
    },

    /// One borrow -> swap -> deposit round of a committed loop
    LoopIteration {
        beneficiary: Address,
        iteration: u8,
        borrowed: u128,
        received: u128,
        health_factor_bps: u64,
        sequence: u64,
    },

    /// An unwind committed
    LoopUnwound {
        beneficiary: Address,
        recipient: Address,
        collateral_asset: AssetId,
        debt_asset: AssetId,
        debt_repaid: u128,
        collateral_sold: u128,
        collateral_withdrawn: u128,
        debt_surplus: u128,
        sequence: u64,
    },

    // ============ Order Events ============

    /// A position was created with escrowed margin
    OrderCreated {
        position_id: PositionId,
        owner: Address,
        margin: u128,
        trigger_price: u128,
        direction: TriggerDirection,
        sequence: u64,
    },

    /// An entry order fired and the position became active
    OrderExecuted {
        position_id: PositionId,
        custody_key: Address,
        collateral: u128,
        debt: u128,
        sequence: u64,
    },

    /// Take-profit or stop-loss set on a position
    TriggerSet {
        position_id: PositionId,
        kind: OrderKind,
        trigger_price: u128,
        sequence: u64,
    },

    /// A position was unwound and its proceeds routed to the owner
    PositionClosed {
        position_id: PositionId,
        owner: Address,
        collateral_returned: u128,
        debt_surplus_returned: u128,
        by_trigger: Option<OrderKind>,
        sequence: u64,
    },

    /// A pending position was cancelled and escrow returned
    OrderCancelled {
        position_id: PositionId,
        owner: Address,
        margin_returned: u128,
        sequence: u64,
    },

    // ============ Config Events ============

    /// Engine paused
    EnginePaused {
        sequence: u64,
    },

    /// Engine unpaused
    EngineUnpaused {
        sequence: u64,
    },

    /// A configuration parameter changed
    ConfigUpdated {
        param: u8,
        old_value: u128,
        new_value: u128,
        sequence: u64,
    },
}

impl LoopEvent {
    /// Get the event type for filtering
    pub fn event_type(&self) -> EventType {
        match self {
            Self::LoopExecuted { .. } => EventType::LoopExecuted,
            Self::LoopIteration { .. } => EventType::LoopIteration,
            Self::LoopUnwound { .. } => EventType::LoopUnwound,
            Self::OrderCreated { .. } => EventType::OrderCreated,
            Self::OrderExecuted { .. } => EventType::OrderExecuted,
            Self::TriggerSet { .. } => EventType::TriggerSet,
            Self::PositionClosed { .. } => EventType::PositionClosed,
            Self::OrderCancelled { .. } => EventType::OrderCancelled,
            Self::EnginePaused { .. } => EventType::EnginePaused,
            Self::EngineUnpaused { .. } => EventType::EngineUnpaused,
            Self::ConfigUpdated { .. } => EventType::ConfigUpdated,
        }
    }

    /// Sequence number of the invocation that emitted the event
    pub fn sequence(&self) -> u64 {
        match self {
            Self::LoopExecuted { sequence, .. }
            | Self::LoopIteration { sequence, .. }
            | Self::LoopUnwound { sequence, .. }
            | Self::OrderCreated { sequence, .. }
            | Self::OrderExecuted { sequence, .. }
            | Self::TriggerSet { sequence, .. }
            | Self::PositionClosed { sequence, .. }
            | Self::OrderCancelled { sequence, .. }
            | Self::EnginePaused { sequence }
            | Self::EngineUnpaused { sequence }
            | Self::ConfigUpdated { sequence, .. } => *sequence,
        }
    }

    /// Serialize event to bytes for storage/transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).unwrap_or_default()
    }

    /// Deserialize event from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        borsh::from_slice(bytes).ok()
    }
}

/// Event log for collecting events during execution
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<LoopEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Emit an event (add to log)
    pub fn emit(&mut self, event: LoopEvent) {
        self.events.push(event);
    }

    /// Move every event of `other` to the end of this log
    pub fn append(&mut self, other: &mut EventLog) {
        self.events.append(&mut other.events);
    }

    /// Get all events
    pub fn events(&self) -> &[LoopEvent] {
        &self.events
    }

    /// Take ownership of all events
    pub fn into_events(self) -> Vec<LoopEvent> {
        self.events
    }

    /// Filter events by type
    pub fn filter_by_type(&self, event_type: EventType) -> Vec<&LoopEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Check if any events were emitted
    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Get number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True if nothing was emitted
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drain all events
    pub fn drain(&mut self) -> Vec<LoopEvent> {
        core::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executed(sequence: u64) -> LoopEvent {
        LoopEvent::LoopExecuted {
            caller: [1u8; 32],
            beneficiary: [2u8; 32],
            collateral_asset: [3u8; 32],
            debt_asset: [4u8; 32],
            margin: 10_000_000_000_000_000_000,
            collateral: 19_950_000_000_000_000_000,
            debt: 20_000_000_000,
            iterations: 2,
            health_factor_bps: 16_400,
            leverage_bps: 19_950,
            termination: Termination::TargetReached,
            sequence,
        }
    }

    #[test]
    fn test_event_type() {
        let event = executed(7);
        assert_eq!(event.event_type(), EventType::LoopExecuted);
        assert_eq!(event.sequence(), 7);
        assert_eq!(LoopEvent::EnginePaused { sequence: 3 }.sequence(), 3);
    }

    #[test]
    fn test_event_serialization() {
        let event = LoopEvent::PositionClosed {
            position_id: [9u8; 32],
            owner: [2u8; 32],
            collateral_returned: 11_000_000_000_000_000_000,
            debt_surplus_returned: 12_345,
            by_trigger: Some(OrderKind::TakeProfit),
            sequence: 200,
        };

        let bytes = event.to_bytes();
        let restored = LoopEvent::from_bytes(&bytes).unwrap();
        assert_eq!(event, restored);
        assert!(LoopEvent::from_bytes(&[0xff, 0x00]).is_none());
    }

    #[test]
    fn test_event_log() {
        let mut log = EventLog::new();
        assert!(log.is_empty());

        log.emit(executed(1));
        let mut staged = EventLog::new();
        staged.emit(LoopEvent::LoopIteration {
            beneficiary: [2u8; 32],
            iteration: 0,
            borrowed: 15_000_000_000,
            received: 7_480_000_000_000_000_000,
            health_factor_bps: 15_900,
            sequence: 1,
        });
        log.append(&mut staged);

        assert!(staged.is_empty());
        assert_eq!(log.len(), 2);
        assert!(log.has_events());
        assert_eq!(log.filter_by_type(EventType::LoopIteration).len(), 1);

        let drained = log.drain();
        assert_eq!(drained.len(), 2);
        assert!(!log.has_events());
    }
}
