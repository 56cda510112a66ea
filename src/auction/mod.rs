//! The lordship auction.
//!
//! One stored record says who holds the title, what the next bid costs and
//! when the current term runs out. Expiry is never written back: a record
//! whose `lord_until` has passed simply reads as vacant.

pub mod countdown;

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use crate::config::ServiceConfig;
use crate::database::ShapiroDatabase;

pub use countdown::{time_left, TimeLeft};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuctionRecord {
    pub lord_id: Option<i64>,
    pub lord_username: Option<String>,
    pub price: i64,
    pub lord_until: Option<DateTime<Utc>>,
}

impl AuctionRecord {
    pub fn vacant(starting_price: i64) -> Self {
        Self {
            lord_id: None,
            lord_username: None,
            price: starting_price,
            lord_until: None,
        }
    }

    /// True when nobody holds an unexpired term at `now`. The term ends at
    /// `lord_until` inclusive.
    pub fn is_vacant(&self, now: DateTime<Utc>) -> bool {
        match (self.lord_id, self.lord_until) {
            (Some(_), Some(until)) => now >= until,
            _ => true,
        }
    }

    /// The lord at `now`, if the term is still running.
    pub fn active_lord(&self, now: DateTime<Utc>) -> Option<i64> {
        if self.is_vacant(now) {
            None
        } else {
            self.lord_id
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AuctionRules {
    pub starting_price: i64,
    pub increment: i64,
    pub term: Duration,
}

impl Default for AuctionRules {
    fn default() -> Self {
        Self {
            starting_price: 50,
            increment: 50,
            term: Duration::hours(24),
        }
    }
}

impl AuctionRules {
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            starting_price: config.starting_price,
            increment: config.bid_increment,
            term: Duration::hours(config.lord_term_hours),
        }
    }
}

/// Owner of the auction record for the lifetime of the process.
#[derive(Clone)]
pub struct AuctionHouse {
    db: Arc<ShapiroDatabase>,
    rules: AuctionRules,
}

impl AuctionHouse {
    pub fn new(db: Arc<ShapiroDatabase>, rules: AuctionRules) -> Result<Self> {
        db.seed_auction_state(rules.starting_price)?;
        Ok(Self { db, rules })
    }

    /// Current record, or a vacant one at the starting price if none is stored.
    pub fn read(&self) -> Result<AuctionRecord> {
        Ok(self
            .db
            .get_auction_state()?
            .unwrap_or_else(|| AuctionRecord::vacant(self.rules.starting_price)))
    }

    /// Give the title to `user_id` for one term starting at `now`. There is
    /// no rejection path: any caller may buy at the listed price, including
    /// the sitting lord.
    pub fn bid(&self, user_id: i64, username: &str, now: DateTime<Utc>) -> Result<AuctionRecord> {
        let record = self.db.apply_auction_bid(
            user_id,
            username,
            self.rules.increment,
            now + self.rules.term,
            self.rules.starting_price,
        )?;
        tracing::info!(
            "Lordship sold to {} (@{}); next price {}",
            user_id,
            username,
            record.price
        );
        Ok(record)
    }
}
