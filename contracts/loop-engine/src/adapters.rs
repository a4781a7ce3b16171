//! Lending Market Adapters
//!
//! Lending pools attribute positions in one of two ways:
//!
//! - **Beneficiary-addressed** ([`DelegatedPool`]): every call names the
//!   account it acts for, and tokens move between that call's `from`/`to`
//!   and the pool.
//! - **Caller-addressed** ([`SessionPool`]): every call acts for the
//!   authenticated caller, and tokens move between the caller and the pool.
//!
//! The engines only see [`LendingMarket`]. [`BeneficiaryAddressed`] and
//! [`CallerAddressed`] translate it onto each pool shape and forward every
//! other host capability to the wrapped host unchanged.

use leverloop_common::{
    errors::{LoopError, LoopResult},
    market::{Checkpoint, Exchange, LendingMarket, PriceSource, TokenLedger},
    types::{AccountHealth, Address, AssetConfig, AssetId},
};

// ============ Raw Pool Shapes ============

/// Pool whose calls carry an explicit on-behalf-of account
pub trait DelegatedPool {
    /// Take `amount` from `from` and credit it as collateral of `on_behalf_of`
    fn deposit_for(&mut self, asset: AssetId, amount: u128, from: Address, on_behalf_of: Address) -> LoopResult<()>;

    /// Record debt on `on_behalf_of` and pay the tokens to `to`
    fn borrow_for(&mut self, asset: AssetId, amount: u128, on_behalf_of: Address, to: Address) -> LoopResult<()>;

    /// Release collateral of `owner` to `to`; returns the amount released
    fn withdraw_from(&mut self, asset: AssetId, amount: u128, owner: Address, to: Address) -> LoopResult<u128>;

    /// Take tokens from `from` to reduce the debt of `on_behalf_of`; returns the amount repaid
    fn repay_for(&mut self, asset: AssetId, amount: u128, from: Address, on_behalf_of: Address) -> LoopResult<u128>;

    fn user_health(&self, account: Address) -> LoopResult<AccountHealth>;
    fn reserve_liquidity(&self, asset: AssetId) -> LoopResult<u128>;
    fn reserve_config(&self, asset: AssetId) -> LoopResult<AssetConfig>;
    fn supplied(&self, asset: AssetId, account: Address) -> LoopResult<u128>;
    fn owed(&self, asset: AssetId, account: Address) -> LoopResult<u128>;
}

/// Pool that attributes every call to the authenticated caller
pub trait SessionPool {
    /// Supply `amount` of the caller's tokens as the caller's collateral
    fn mint_as(&mut self, caller: Address, asset: AssetId, amount: u128) -> LoopResult<()>;

    /// Borrow `amount` for the caller, paying the caller
    fn borrow_as(&mut self, caller: Address, asset: AssetId, amount: u128) -> LoopResult<()>;

    /// Redeem up to `amount` of the caller's collateral to the caller
    fn redeem_as(&mut self, caller: Address, asset: AssetId, amount: u128) -> LoopResult<u128>;

    /// Repay up to `amount` of the caller's debt from the caller
    fn repay_as(&mut self, caller: Address, asset: AssetId, amount: u128) -> LoopResult<u128>;

    fn account_liquidity(&self, account: Address) -> LoopResult<AccountHealth>;
    fn cash(&self, asset: AssetId) -> LoopResult<u128>;
    fn market_config(&self, asset: AssetId) -> LoopResult<AssetConfig>;
    fn supply_balance(&self, asset: AssetId, account: Address) -> LoopResult<u128>;
    fn borrow_balance(&self, asset: AssetId, account: Address) -> LoopResult<u128>;
}

// ============ Capability Forwarding ============

macro_rules! forward_host_capabilities {
    ($adapter:ident) => {
        impl<P: Exchange> Exchange for $adapter<P> {
            fn quote_out(&self, asset_in: AssetId, asset_out: AssetId, amount_in: u128) -> LoopResult<u128> {
                self.inner.quote_out(asset_in, asset_out, amount_in)
            }

            fn quote_in(&self, asset_in: AssetId, asset_out: AssetId, amount_out: u128) -> LoopResult<u128> {
                self.inner.quote_in(asset_in, asset_out, amount_out)
            }

            fn swap(
                &mut self,
                asset_in: AssetId,
                asset_out: AssetId,
                amount_in: u128,
                min_out: u128,
                payer: Address,
                recipient: Address,
            ) -> LoopResult<u128> {
                self.inner.swap(asset_in, asset_out, amount_in, min_out, payer, recipient)
            }

            fn pair_exists(&self, asset_a: AssetId, asset_b: AssetId) -> bool {
                self.inner.pair_exists(asset_a, asset_b)
            }
        }

        impl<P: PriceSource> PriceSource for $adapter<P> {
            fn price(&self, asset: AssetId) -> LoopResult<u128> {
                self.inner.price(asset)
            }
        }

        impl<P: TokenLedger> TokenLedger for $adapter<P> {
            fn balance_of(&self, asset: AssetId, holder: Address) -> u128 {
                self.inner.balance_of(asset, holder)
            }

            fn allowance(&self, asset: AssetId, owner: Address, spender: Address) -> u128 {
                self.inner.allowance(asset, owner, spender)
            }

            fn approve(&mut self, asset: AssetId, owner: Address, spender: Address, amount: u128) -> LoopResult<()> {
                self.inner.approve(asset, owner, spender, amount)
            }

            fn transfer(&mut self, asset: AssetId, from: Address, to: Address, amount: u128) -> LoopResult<()> {
                self.inner.transfer(asset, from, to, amount)
            }

            fn transfer_from(
                &mut self,
                asset: AssetId,
                spender: Address,
                from: Address,
                to: Address,
                amount: u128,
            ) -> LoopResult<()> {
                self.inner.transfer_from(asset, spender, from, to, amount)
            }
        }

        impl<P: Checkpoint> Checkpoint for $adapter<P> {
            type Snapshot = P::Snapshot;

            fn checkpoint(&self) -> Self::Snapshot {
                self.inner.checkpoint()
            }

            fn restore(&mut self, snapshot: Self::Snapshot) {
                self.inner.restore(snapshot)
            }
        }

        impl<P> $adapter<P> {
            pub fn inner(&self) -> &P {
                &self.inner
            }

            pub fn inner_mut(&mut self) -> &mut P {
                &mut self.inner
            }

            pub fn into_inner(self) -> P {
                self.inner
            }
        }
    };
}

// ============ Beneficiary-Addressed ============

/// [`LendingMarket`] over a [`DelegatedPool`]
#[derive(Debug, Clone)]
pub struct BeneficiaryAddressed<P> {
    inner: P,
}

impl<P> BeneficiaryAddressed<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

impl<P: DelegatedPool> LendingMarket for BeneficiaryAddressed<P> {
    fn supply(&mut self, operator: Address, asset: AssetId, amount: u128, beneficiary: Address) -> LoopResult<()> {
        self.inner.deposit_for(asset, amount, operator, beneficiary)
    }

    fn borrow(&mut self, operator: Address, asset: AssetId, amount: u128, beneficiary: Address) -> LoopResult<()> {
        self.inner.borrow_for(asset, amount, beneficiary, operator)
    }

    fn withdraw(
        &mut self,
        _operator: Address,
        asset: AssetId,
        amount: u128,
        beneficiary: Address,
        recipient: Address,
    ) -> LoopResult<u128> {
        self.inner.withdraw_from(asset, amount, beneficiary, recipient)
    }

    fn repay(&mut self, operator: Address, asset: AssetId, amount: u128, beneficiary: Address) -> LoopResult<u128> {
        self.inner.repay_for(asset, amount, operator, beneficiary)
    }

    fn account_health(&self, account: Address) -> LoopResult<AccountHealth> {
        self.inner.user_health(account)
    }

    fn available_liquidity(&self, asset: AssetId) -> LoopResult<u128> {
        self.inner.reserve_liquidity(asset)
    }

    fn asset_config(&self, asset: AssetId) -> LoopResult<AssetConfig> {
        self.inner.reserve_config(asset)
    }

    fn collateral_balance(&self, asset: AssetId, account: Address) -> LoopResult<u128> {
        self.inner.supplied(asset, account)
    }

    fn debt_balance(&self, asset: AssetId, account: Address) -> LoopResult<u128> {
        self.inner.owed(asset, account)
    }
}

forward_host_capabilities!(BeneficiaryAddressed);

// ============ Caller-Addressed ============

/// [`LendingMarket`] over a [`SessionPool`], bound to one identity
///
/// The pool only knows the bound identity, so the adapter can act for that
/// beneficiary alone. Tokens are moved between the operator and the bound
/// identity around each pool call.
#[derive(Debug, Clone)]
pub struct CallerAddressed<P> {
    inner: P,
    bound: Address,
}

impl<P> CallerAddressed<P> {
    pub fn new(inner: P, bound: Address) -> Self {
        Self { inner, bound }
    }

    /// Identity every pool call is made as
    pub fn bound(&self) -> Address {
        self.bound
    }

    fn require_bound(&self, beneficiary: Address) -> LoopResult<()> {
        if beneficiary != self.bound {
            return Err(LoopError::AttributionMismatch {
                bound: self.bound,
                requested: beneficiary,
            });
        }
        Ok(())
    }
}

impl<P: SessionPool + TokenLedger> CallerAddressed<P> {
    fn hand_over(&mut self, asset: AssetId, from: Address, to: Address, amount: u128) -> LoopResult<()> {
        if from == to || amount == 0 {
            return Ok(());
        }
        self.inner.transfer(asset, from, to, amount)
    }
}

impl<P: SessionPool + TokenLedger> LendingMarket for CallerAddressed<P> {
    fn supply(&mut self, operator: Address, asset: AssetId, amount: u128, beneficiary: Address) -> LoopResult<()> {
        self.require_bound(beneficiary)?;
        let bound = self.bound;
        self.hand_over(asset, operator, bound, amount)?;
        self.inner.mint_as(bound, asset, amount)
    }

    fn borrow(&mut self, operator: Address, asset: AssetId, amount: u128, beneficiary: Address) -> LoopResult<()> {
        self.require_bound(beneficiary)?;
        let bound = self.bound;
        self.inner.borrow_as(bound, asset, amount)?;
        self.hand_over(asset, bound, operator, amount)
    }

    fn withdraw(
        &mut self,
        _operator: Address,
        asset: AssetId,
        amount: u128,
        beneficiary: Address,
        recipient: Address,
    ) -> LoopResult<u128> {
        self.require_bound(beneficiary)?;
        let bound = self.bound;
        let released = self.inner.redeem_as(bound, asset, amount)?;
        self.hand_over(asset, bound, recipient, released)?;
        Ok(released)
    }

    fn repay(&mut self, operator: Address, asset: AssetId, amount: u128, beneficiary: Address) -> LoopResult<u128> {
        self.require_bound(beneficiary)?;
        let bound = self.bound;
        let amount = amount.min(self.inner.borrow_balance(asset, bound)?);
        self.hand_over(asset, operator, bound, amount)?;
        self.inner.repay_as(bound, asset, amount)
    }

    fn account_health(&self, account: Address) -> LoopResult<AccountHealth> {
        self.inner.account_liquidity(account)
    }

    fn available_liquidity(&self, asset: AssetId) -> LoopResult<u128> {
        self.inner.cash(asset)
    }

    fn asset_config(&self, asset: AssetId) -> LoopResult<AssetConfig> {
        self.inner.market_config(asset)
    }

    fn collateral_balance(&self, asset: AssetId, account: Address) -> LoopResult<u128> {
        self.inner.supply_balance(asset, account)
    }

    fn debt_balance(&self, asset: AssetId, account: Address) -> LoopResult<u128> {
        self.inner.borrow_balance(asset, account)
    }
}

forward_host_capabilities!(CallerAddressed);
