//! Simulator tuning.

use salesim_core::{DomainError, DomainResult, Money};

pub const DEFAULT_WINDOW_DAYS: u32 = 90;
pub const DEFAULT_MAX_ITEMS_PER_SALE: u32 = 5;

/// Knobs for one [`Simulator`](crate::Simulator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatorConfig {
    /// Lookback for augment/cancel targets, ending at the start of the target day.
    pub window_days: u32,
    /// New sales get between 1 and this many lines (fewer if the catalog runs out).
    pub max_items_per_sale: u32,
    /// Augment/cancel only consider invoices with a total strictly above this.
    pub min_total: Money,
    /// Fixed RNG seed; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_WINDOW_DAYS,
            max_items_per_sale: DEFAULT_MAX_ITEMS_PER_SALE,
            min_total: Money::ZERO,
            seed: None,
        }
    }
}

impl SimulatorConfig {
    /// Defaults overridden by `SALESIM_WINDOW_DAYS`, `SALESIM_MAX_ITEMS`,
    /// `SALESIM_MIN_TOTAL` and `SALESIM_SEED`.
    pub fn from_env() -> DomainResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> DomainResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(v) = parse_var(&lookup, "SALESIM_WINDOW_DAYS")? {
            config.window_days = v;
        }
        if let Some(v) = parse_var(&lookup, "SALESIM_MAX_ITEMS")? {
            config.max_items_per_sale = v;
        }
        if let Some(v) = parse_var(&lookup, "SALESIM_MIN_TOTAL")? {
            config.min_total = v;
        }
        config.seed = parse_var(&lookup, "SALESIM_SEED")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.window_days == 0 {
            return Err(DomainError::validation("window_days must be at least 1"));
        }
        if self.max_items_per_sale == 0 {
            return Err(DomainError::validation("max_items_per_sale must be at least 1"));
        }
        if self.min_total < Money::ZERO {
            return Err(DomainError::validation("min_total must not be negative"));
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> DomainResult<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: core::str::FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| DomainError::validation(format!("invalid value for {key}: {raw:?}"))),
    }
}
