//! Liquidity manager: custodial share ledger plus market routing
//!
//! Holds user deposits in custody, tracks proportional shares per
//! (user, token), and supplies pooled liquidity into registered markets.
//! Three numbers are kept consistent per token:
//! - total liquidity = idle + Σ market liquidity
//! - total shares = Σ user shares
//! - market liquidity, as booked when supplying / withdrawing
//!
//! Every entry point validates first, performs the external call (token pull
//! or market call), and only then commits. When a later step fails after an
//! external call succeeded, the call is compensated before the error returns.

mod service;
mod shares;

pub use service::LiquidityService;
pub use shares::{SharePlan, ShareBook, PRICE_SCALE};

use alloy_primitives::{Address, U256};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, error, info};

use crate::access::AccessPolicy;
use crate::bank::TokenBank;
use crate::errors::{add, mul_div, sub, RouterError, RouterResult};
use crate::events::{Event, EventLog};
use crate::markets::{MarketAdapter, MarketType, Venue};

/// Point-in-time view of one token's books
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerSnapshot {
    pub token: Address,
    pub total_liquidity: U256,
    pub idle: U256,
    pub market_sum: U256,
    pub total_shares: U256,
    pub share_sum: U256,
    pub holders: usize,
}

impl LedgerSnapshot {
    pub fn holds(&self) -> bool {
        self.idle.checked_add(self.market_sum) == Some(self.total_liquidity)
            && self.total_shares == self.share_sum
    }
}

pub struct LiquidityManager {
    /// Custody address (the contract's own address)
    address: Address,
    access: AccessPolicy,
    bank: TokenBank,
    shares: ShareBook,
    supported_tokens: HashMap<Address, bool>,
    supported_markets: HashMap<Address, bool>,
    markets: HashMap<Address, Venue>,
    idle: HashMap<Address, U256>,
    total_liquidity: HashMap<Address, U256>,
    /// (token, market) -> booked supply
    market_liquidity: HashMap<(Address, Address), U256>,
    events: EventLog,
}

impl LiquidityManager {
    pub fn new(owner: Address, address: Address) -> Self {
        Self {
            address,
            access: AccessPolicy::new(owner),
            bank: TokenBank::new(),
            shares: ShareBook::new(),
            supported_tokens: HashMap::new(),
            supported_markets: HashMap::new(),
            markets: HashMap::new(),
            idle: HashMap::new(),
            total_liquidity: HashMap::new(),
            market_liquidity: HashMap::new(),
            events: EventLog::new(),
        }
    }

    /// Start from an existing token bank (pre-funded wallets)
    pub fn with_bank(mut self, bank: TokenBank) -> Self {
        self.bank = bank;
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn access(&self) -> &AccessPolicy {
        &self.access
    }

    pub fn bank(&self) -> &TokenBank {
        &self.bank
    }

    pub fn bank_mut(&mut self) -> &mut TokenBank {
        &mut self.bank
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn transfer_ownership(&mut self, caller: Address, new_owner: Address) -> RouterResult<()> {
        let event = self.access.transfer_ownership(caller, new_owner)?;
        self.events.emit(event);
        Ok(())
    }

    // ============================================
    // ADMINISTRATION
    // ============================================

    pub fn update_supported_tokens(
        &mut self,
        caller: Address,
        token: Address,
        supported: bool,
    ) -> RouterResult<()> {
        self.access.require_owner(caller)?;
        if self.is_token_supported(token) == supported {
            return Err(RouterError::TokenSupportUnchanged);
        }
        self.supported_tokens.insert(token, supported);
        info!("🪙 Token {:?} supported = {}", token, supported);
        self.events.emit(Event::TokenSupportUpdated { token, supported });
        Ok(())
    }

    /// Register a venue; it starts unsupported
    pub fn register_market(&mut self, caller: Address, venue: impl Into<Venue>) -> RouterResult<()> {
        self.access.require_owner(caller)?;
        let venue = venue.into();
        let market = venue.market();
        if self.markets.contains_key(&market) {
            return Err(RouterError::MarketAlreadyRegistered(market));
        }
        info!("🏦 Registered {} market {:?}", venue.market_type(), market);
        self.markets.insert(market, venue);
        Ok(())
    }

    pub fn update_supported_markets(
        &mut self,
        caller: Address,
        market: Address,
        supported: bool,
    ) -> RouterResult<()> {
        self.access.require_owner(caller)?;
        let market_type = self.venue(market)?.market_type();
        if self.is_market_supported(market) == supported {
            return Err(RouterError::MarketSupportUnchanged);
        }
        self.supported_markets.insert(market, supported);
        info!("🏦 {} market {:?} supported = {}", market_type, market, supported);
        self.events.emit(Event::MarketSupportUpdated {
            market,
            market_type,
            supported,
        });
        Ok(())
    }

    pub fn update_supported_aave_pools(
        &mut self,
        caller: Address,
        pool: Address,
        supported: bool,
    ) -> RouterResult<()> {
        self.access.require_owner(caller)?;
        self.venue_of_type(pool, MarketType::Aave)?;
        self.update_supported_markets(caller, pool, supported)
    }

    pub fn update_supported_comet_markets(
        &mut self,
        caller: Address,
        comet: Address,
        supported: bool,
    ) -> RouterResult<()> {
        self.access.require_owner(caller)?;
        self.venue_of_type(comet, MarketType::Compound)?;
        self.update_supported_markets(caller, comet, supported)
    }

    // ============================================
    // USER ENTRY POINTS
    // ============================================

    /// Deposit `amount` of `token` and mint shares to `caller`
    pub fn deposit(&mut self, caller: Address, token: Address, amount: U256) -> RouterResult<U256> {
        if !self.is_token_supported(token) || amount.is_zero() {
            return Err(RouterError::InvalidTokenOrAmount);
        }
        let total = self.total_liquidity(token);
        let minted = self.shares.shares_for_deposit(token, amount, total)?;
        let plan = self.shares.plan_mint(caller, token, minted)?;
        let new_total = add(total, amount)?;
        let new_idle = add(self.idle_balance(token), amount)?;

        self.bank.transfer(token, caller, self.address, amount)?;

        self.shares.apply(plan);
        self.total_liquidity.insert(token, new_total);
        self.idle.insert(token, new_idle);

        info!(
            "💰 Deposit {} of {:?} by {:?} -> {} shares",
            amount, token, caller, minted
        );
        self.events.emit(Event::SharesMinted {
            user: caller,
            token,
            amount_deposited: amount,
            shares_minted: minted,
        });
        self.events.emit(Event::Deposit {
            user: caller,
            token,
            amount,
        });
        Ok(minted)
    }

    /// Redeem `shares` for their value out of the idle balance
    pub fn withdraw(&mut self, caller: Address, token: Address, shares: U256) -> RouterResult<U256> {
        let (plan, value) = self.plan_redemption(caller, token, shares)?;
        let idle = self.idle_balance(token);
        if idle < value {
            return Err(RouterError::InsufficientLiquidity {
                needed: value,
                available: idle,
            });
        }
        let new_total = sub(self.total_liquidity(token), value)?;

        self.bank.transfer(token, self.address, caller, value)?;

        self.shares.apply(plan);
        self.total_liquidity.insert(token, new_total);
        self.idle.insert(token, idle - value);

        info!(
            "💸 Withdraw {} shares of {:?} by {:?} -> {}",
            shares, token, caller, value
        );
        self.events.emit(Event::Withdraw {
            user: caller,
            token,
            amount: value,
        });
        Ok(value)
    }

    /// Redeem `shares`, pulling any idle shortfall out of `market` first
    pub fn redeem_from_market(
        &mut self,
        caller: Address,
        token: Address,
        market: Address,
        shares: U256,
        market_type: MarketType,
    ) -> RouterResult<U256> {
        let (_, value) = self.plan_redemption(caller, token, shares)?;
        self.venue_of_type(market, market_type)?;

        let idle = self.idle_balance(token);
        if idle >= value {
            return self.withdraw(caller, token, shares);
        }
        let shortfall = value - idle;
        let position = self
            .market_liquidity(token, market)
            .min(self.venue(market)?.balance(token));
        if position < shortfall {
            return Err(RouterError::InsufficientLiquidity {
                needed: value,
                available: add(idle, position)?,
            });
        }

        let received = self.venue_mut(market)?.withdraw(token, shortfall)?;
        if received < shortfall {
            self.compensate_withdrawal(token, market, received);
            return Err(RouterError::InsufficientLiquidity {
                needed: value,
                available: add(idle, received)?,
            });
        }

        match self.settle_redemption(caller, token, market, shares, shortfall, received) {
            Ok(paid) => Ok(paid),
            Err(e) => {
                self.compensate_withdrawal(token, market, received);
                Err(e)
            }
        }
    }

    // ============================================
    // MARKET ROUTING
    // ============================================

    /// Move `amount` of idle `token` into `market`
    pub fn supply(
        &mut self,
        caller: Address,
        token: Address,
        market: Address,
        amount: U256,
        market_type: MarketType,
    ) -> RouterResult<()> {
        self.access.require_owner(caller)?;
        if !self.is_token_supported(token) || amount.is_zero() {
            return Err(RouterError::InvalidTokenOrAmount);
        }
        self.venue_of_type(market, market_type)?;
        if !self.is_market_supported(market) {
            return Err(RouterError::UnsupportedMarket(market));
        }
        let idle = self.idle_balance(token);
        if idle < amount {
            return Err(RouterError::InsufficientLiquidity {
                needed: amount,
                available: idle,
            });
        }
        let custody = self.bank.balance_of(token, self.address);
        if custody < amount {
            return Err(RouterError::InsufficientBalance {
                needed: amount,
                available: custody,
            });
        }
        let booked = add(self.market_liquidity(token, market), amount)?;

        self.venue_mut(market)?.supply(token, amount)?;
        if let Err(e) = self.bank.debit(token, self.address, amount) {
            self.compensate_supply(token, market, amount);
            return Err(e);
        }
        let (booked, written_off) = self.capped_booking(token, market, booked)?;

        let total = sub(self.total_liquidity(token), written_off)?;

        self.idle.insert(token, idle - amount);
        self.total_liquidity.insert(token, total);
        self.set_booking(token, market, booked);

        info!("📤 Supplied {} of {:?} to {} {:?}", amount, token, market_type, market);
        self.events.emit(Event::LiquiditySupplied {
            token,
            market,
            amount,
        });
        Ok(())
    }

    pub fn supply_to_aave(
        &mut self,
        caller: Address,
        token: Address,
        pool: Address,
        amount: U256,
    ) -> RouterResult<()> {
        self.supply(caller, token, pool, amount, MarketType::Aave)
    }

    pub fn supply_to_compound(
        &mut self,
        caller: Address,
        token: Address,
        comet: Address,
        amount: U256,
    ) -> RouterResult<()> {
        self.supply(caller, token, comet, amount, MarketType::Compound)
    }

    /// Pull `amount` (or everything, with `U256::MAX`) back to idle.
    ///
    /// The market's returned amount is what gets booked; the difference from
    /// the booked reduction is recognised as yield or loss.
    pub fn withdraw_from_market(
        &mut self,
        caller: Address,
        token: Address,
        market: Address,
        amount: U256,
        market_type: MarketType,
    ) -> RouterResult<U256> {
        self.access.require_owner(caller)?;
        if amount.is_zero() {
            return Err(RouterError::InvalidTokenOrAmount);
        }
        self.venue_of_type(market, market_type)?;

        let received = self.venue_mut(market)?.withdraw(token, amount)?;
        if let Err(e) = self.settle_market_withdrawal(token, market, amount, received) {
            self.compensate_withdrawal(token, market, received);
            return Err(e);
        }

        info!(
            "📥 Withdrew {} of {:?} from {} {:?} (requested {})",
            received, token, market_type, market, amount
        );
        self.events.emit(Event::LiquidityWithdrawn {
            token,
            market,
            requested: amount,
            received,
        });
        Ok(received)
    }

    /// Mark the booked position to the market's reported value
    pub fn sync_market(&mut self, caller: Address, token: Address, market: Address) -> RouterResult<U256> {
        self.access.require_owner(caller)?;
        let reported = self.venue(market)?.balance(token);
        let booked = self.market_liquidity(token, market);
        let total = add(sub(self.total_liquidity(token), booked)?, reported)?;

        self.total_liquidity.insert(token, total);
        self.market_liquidity.insert((token, market), reported);

        if reported != booked {
            info!(
                "📈 Synced {:?} on {:?}: booked {} -> reported {}",
                token, market, booked, reported
            );
        }
        self.events.emit(Event::MarketSynced {
            token,
            market,
            booked,
            reported,
        });
        Ok(reported)
    }

    // ============================================
    // VIEWS
    // ============================================

    pub fn is_token_supported(&self, token: Address) -> bool {
        self.supported_tokens.get(&token).copied().unwrap_or(false)
    }

    pub fn is_market_supported(&self, market: Address) -> bool {
        self.supported_markets.get(&market).copied().unwrap_or(false)
    }

    pub fn is_market_registered(&self, market: Address) -> bool {
        self.markets.contains_key(&market)
    }

    pub fn user_shares(&self, user: Address, token: Address) -> U256 {
        self.shares.user_shares(user, token)
    }

    pub fn total_shares(&self, token: Address) -> U256 {
        self.shares.total_shares(token)
    }

    pub fn total_liquidity(&self, token: Address) -> U256 {
        self.total_liquidity.get(&token).copied().unwrap_or_default()
    }

    pub fn idle_balance(&self, token: Address) -> U256 {
        self.idle.get(&token).copied().unwrap_or_default()
    }

    pub fn market_liquidity(&self, token: Address, market: Address) -> U256 {
        self.market_liquidity
            .get(&(token, market))
            .copied()
            .unwrap_or_default()
    }

    /// Liquidity per share, 1e18 fixed point (1e18 before the first deposit)
    pub fn share_price(&self, token: Address) -> RouterResult<U256> {
        let total_shares = self.total_shares(token);
        if total_shares.is_zero() {
            return Ok(PRICE_SCALE);
        }
        mul_div(self.total_liquidity(token), PRICE_SCALE, total_shares)
    }

    pub fn preview_deposit(&self, token: Address, amount: U256) -> RouterResult<U256> {
        self.shares
            .shares_for_deposit(token, amount, self.total_liquidity(token))
    }

    pub fn preview_redeem(&self, token: Address, shares: U256) -> RouterResult<U256> {
        self.shares
            .value_of_shares(token, shares, self.total_liquidity(token))
    }

    pub fn snapshot(&self, token: Address) -> LedgerSnapshot {
        let market_sum = self
            .market_liquidity
            .iter()
            .filter(|((t, _), _)| *t == token)
            .fold(U256::ZERO, |acc, (_, v)| acc.saturating_add(*v));
        LedgerSnapshot {
            token,
            total_liquidity: self.total_liquidity(token),
            idle: self.idle_balance(token),
            market_sum,
            total_shares: self.total_shares(token),
            share_sum: self.shares.sum_of_records(token),
            holders: self.shares.holders(token),
        }
    }

    pub fn check_invariants(&self, token: Address) -> bool {
        let snapshot = self.snapshot(token);
        if !snapshot.holds() {
            error!("❌ Ledger invariant broken: {:?}", snapshot);
            return false;
        }
        true
    }

    pub fn venue(&self, market: Address) -> RouterResult<&Venue> {
        self.markets
            .get(&market)
            .ok_or(RouterError::UnknownMarket(market))
    }

    /// Direct handle on a registered venue (interest accrual, pausing)
    pub fn venue_mut(&mut self, market: Address) -> RouterResult<&mut Venue> {
        self.markets
            .get_mut(&market)
            .ok_or(RouterError::UnknownMarket(market))
    }

    // ============================================
    // INTERNALS
    // ============================================

    fn venue_of_type(&self, market: Address, expected: MarketType) -> RouterResult<&Venue> {
        let venue = self.venue(market)?;
        let actual = venue.market_type();
        if actual != expected {
            return Err(RouterError::MarketTypeMismatch {
                market,
                expected,
                actual,
            });
        }
        Ok(venue)
    }

    /// Validation shared by both redemption paths
    fn plan_redemption(
        &self,
        caller: Address,
        token: Address,
        shares: U256,
    ) -> RouterResult<(SharePlan, U256)> {
        if !self.is_token_supported(token) || shares.is_zero() {
            return Err(RouterError::InvalidTokenOrAmount);
        }
        let plan = self.shares.plan_burn(caller, token, shares)?;
        let value = self.preview_redeem(token, shares)?;
        Ok((plan, value))
    }

    fn settle_market_withdrawal(
        &mut self,
        token: Address,
        market: Address,
        requested: U256,
        received: U256,
    ) -> RouterResult<()> {
        let booked = self.market_liquidity(token, market);
        let reduction = requested.min(booked);
        let (remaining, written_off) = self.capped_booking(token, market, booked - reduction)?;
        let total = sub(
            add(sub(self.total_liquidity(token), reduction)?, received)?,
            written_off,
        )?;
        let idle = add(self.idle_balance(token), received)?;

        self.bank.mint(token, self.address, received)?;

        self.total_liquidity.insert(token, total);
        self.idle.insert(token, idle);
        self.set_booking(token, market, remaining);
        Ok(())
    }

    /// Book the market leg of a redemption, then pay out
    fn settle_redemption(
        &mut self,
        caller: Address,
        token: Address,
        market: Address,
        shares: U256,
        requested: U256,
        received: U256,
    ) -> RouterResult<U256> {
        let booked = sub(self.market_liquidity(token, market), requested)?;
        let (remaining, written_off) = self.capped_booking(token, market, booked)?;
        let total = sub(
            add(sub(self.total_liquidity(token), requested)?, received)?,
            written_off,
        )?;
        let idle = add(self.idle_balance(token), received)?;

        // Any surplus the market paid raises the value of every share
        let plan = self.shares.plan_burn(caller, token, shares)?;
        let value = mul_div(shares, total, self.total_shares(token))?;
        if idle < value {
            return Err(RouterError::InsufficientLiquidity {
                needed: value,
                available: idle,
            });
        }

        self.bank.mint(token, self.address, received)?;
        if let Err(e) = self.bank.transfer(token, self.address, caller, value) {
            // undo the custody credit; the market leg is compensated by the caller
            if let Err(undo) = self.bank.debit(token, self.address, received) {
                error!(
                    "❌ Could not reverse custody credit of {} {:?}: {}",
                    received, token, undo
                );
            }
            return Err(e);
        }

        self.shares.apply(plan);
        self.total_liquidity.insert(token, total - value);
        self.idle.insert(token, idle - value);
        self.set_booking(token, market, remaining);

        info!(
            "💸 Withdraw {} shares of {:?} by {:?} via {:?} -> {}",
            shares, token, caller, market, value
        );
        self.events.emit(Event::LiquidityWithdrawn {
            token,
            market,
            requested,
            received,
        });
        self.events.emit(Event::Withdraw {
            user: caller,
            token,
            amount: value,
        });
        Ok(value)
    }

    /// `booking` capped at the venue's reported position, plus the part that
    /// has to be written off as a loss (index rounding on supply / burn)
    fn capped_booking(
        &self,
        token: Address,
        market: Address,
        booking: U256,
    ) -> RouterResult<(U256, U256)> {
        let reported = self.venue(market)?.balance(token);
        if booking <= reported {
            return Ok((booking, U256::ZERO));
        }
        debug!(
            "Writing off {} of {:?} on {:?}: booked {} > reported {}",
            booking - reported,
            token,
            market,
            booking,
            reported
        );
        Ok((reported, booking - reported))
    }

    fn set_booking(&mut self, token: Address, market: Address, booking: U256) {
        if booking.is_zero() {
            self.market_liquidity.remove(&(token, market));
        } else {
            self.market_liquidity.insert((token, market), booking);
        }
    }

    /// Take back a supply whose custody debit failed
    fn compensate_supply(&mut self, token: Address, market: Address, amount: U256) {
        let result = match self.markets.get_mut(&market) {
            Some(venue) => venue.withdraw(token, amount),
            None => return,
        };
        if let Err(e) = result {
            error!(
                "❌ Could not take back {} of {:?} from {:?}: {}",
                amount, token, market, e
            );
        }
    }

    /// Put funds pulled from `market` back after a later step failed
    fn compensate_withdrawal(&mut self, token: Address, market: Address, received: U256) {
        if received.is_zero() {
            return;
        }
        let result = match self.markets.get_mut(&market) {
            Some(venue) => venue.supply(token, received),
            None => return,
        };
        match result {
            Ok(()) => debug!("↩️ Re-supplied {} of {:?} to {:?}", received, token, market),
            Err(e) => error!(
                "❌ Could not re-supply {} of {:?} to {:?}: {}",
                received, token, market, e
            ),
        }
    }
}
