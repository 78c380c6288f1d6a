// Auto-sell pipeline: price generated drops, accumulate per owner, deposit in batches.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::generator::GeneratorDrop;
use crate::domain::ports::{AutoSell, Economy};
use crate::domain::user::UserProfile;
use crate::domain::world::WorldRules;
use crate::use_cases::users::UserRepository;

#[derive(Clone, Copy, Debug, Default)]
pub struct SellCalculator {
    limit: Option<f64>,
}

impl SellCalculator {
    pub fn new(limit: Option<f64>) -> Self {
        Self { limit }
    }

    // Sum of the positive bonuses, capped by the configured limit.
    pub fn multiplier(&self, bonuses: &[f64]) -> f64 {
        let total: f64 = bonuses.iter().filter(|bonus| **bonus > 0.0).sum();
        match self.limit {
            Some(limit) => total.min(limit),
            None => total,
        }
    }

    // Multipliers below 1 act as a bonus on top of the base value.
    pub fn value(&self, unit_price: f64, quantity: u32, multiplier: f64) -> f64 {
        let base = unit_price * f64::from(quantity);
        if multiplier < 1.0 {
            base * (1.0 + multiplier)
        } else {
            base * multiplier
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PendingSale {
    pub value: f64,
    pub items: u64,
}

impl PendingSale {
    fn merge(&mut self, other: &PendingSale) {
        self.value += other.value;
        self.items += other.items;
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct DepositReport {
    pub owners: usize,
    pub value: f64,
    pub failed: usize,
}

pub struct AutoSellBatcher {
    users: Arc<UserRepository>,
    worlds: Arc<WorldRules>,
    economy: Arc<dyn Economy>,
    calculator: SellCalculator,
    flush_interval: u32,
    pending: Mutex<HashMap<Uuid, PendingSale>>,
}

impl AutoSellBatcher {
    pub fn new(
        users: Arc<UserRepository>,
        worlds: Arc<WorldRules>,
        economy: Arc<dyn Economy>,
        calculator: SellCalculator,
        flush_interval: u32,
    ) -> Self {
        Self {
            users,
            worlds,
            economy,
            calculator,
            flush_interval,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn pending_for(&self, owner: &Uuid) -> Option<PendingSale> {
        self.pending().get(owner).cloned()
    }

    // Called once per second. Advances each seller's interval counter and deposits
    // the accumulated value of those whose counter reached the flush interval.
    pub async fn tick(&self) -> DepositReport {
        let owners: Vec<Uuid> = self.pending().keys().copied().collect();
        let mut due = Vec::new();
        for owner in owners {
            let interval = self
                .users
                .update_cached(&owner, |profile| profile.interval += 1)
                .await
                .map(|profile| profile.interval);
            // Profiles evicted from the cache are settled immediately.
            if interval.is_none_or(|interval| interval >= self.flush_interval) {
                due.push(owner);
            }
        }
        self.deposit(due).await
    }

    // Deposits everything pending, e.g. on shutdown.
    pub async fn flush_all(&self) -> DepositReport {
        let owners: Vec<Uuid> = self.pending().keys().copied().collect();
        self.deposit(owners).await
    }

    async fn deposit(&self, owners: Vec<Uuid>) -> DepositReport {
        let mut report = DepositReport::default();
        for owner in owners {
            let Some(sale) = self.pending().remove(&owner) else {
                continue;
            };
            match self.economy.deposit(owner, sale.value).await {
                Ok(()) => {
                    self.users
                        .update_cached(&owner, |profile| profile.interval = 0)
                        .await;
                    report.owners += 1;
                    report.value += sale.value;
                    debug!(owner = %owner, value = sale.value, items = sale.items, "auto-sell deposited");
                }
                Err(err) => {
                    // Keep the value for the next attempt.
                    self.pending().entry(owner).or_default().merge(&sale);
                    report.failed += 1;
                    warn!(owner = %owner, error = %err, "auto-sell deposit failed");
                }
            }
        }
        report
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<Uuid, PendingSale>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AutoSell for AutoSellBatcher {
    fn sell(&self, profile: &UserProfile, world: &str, drop: &GeneratorDrop, quantity: u32) -> bool {
        let Some(price) = drop.sell_price.filter(|price| *price > 0.0) else {
            return false;
        };
        if quantity == 0 {
            return false;
        }
        let multiplier = self
            .calculator
            .multiplier(&[profile.multiplier, self.worlds.sell_multiplier(world)]);
        let value = self.calculator.value(price, quantity, multiplier);
        self.pending().entry(profile.id).or_default().merge(&PendingSale {
            value,
            items: u64::from(quantity),
        });
        true
    }
}
