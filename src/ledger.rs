use chrono::NaiveDate;

use crate::{
    clock::{self, Clock},
    conf::ConfAllowance,
    data::{Deduction, Storage},
    error::{Error, Result},
    identity::Identity,
    types::{PaymentTier, TokenStatus},
};

/// What a deduction pays for, named in the exhaustion message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charge {
    Generation,
    Pregenerated,
}

impl std::fmt::Display for Charge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generation => write!(f, "brief generation"),
            Self::Pregenerated => write!(f, "pre-generated brief"),
        }
    }
}

/// Daily token balances, one row per identity per UTC day.
///
/// Nothing ever resets a balance. A new day is a new row, created with
/// the full allowance the first time that day is looked at, so rows of
/// past days stay as they were.
#[derive(Clone)]
pub struct Ledger {
    storage: Storage,
    clock: Clock,
    allowance: ConfAllowance,
}

impl Ledger {
    pub fn new(storage: Storage, clock: Clock, allowance: ConfAllowance) -> Self {
        Self {
            storage,
            clock,
            allowance,
        }
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Starting balance for a fresh day: by payment tier for users,
    /// anonymous allowance for devices.
    pub async fn allowance_for(&self, identity: &Identity) -> Result<i64> {
        let allowance = match identity {
            Identity::Device(_) => self.allowance.anonymous,
            Identity::User(uid) => {
                let tier = self
                    .storage
                    .profile(uid)
                    .await?
                    .map(|p| p.payment)
                    .unwrap_or_default();
                match tier {
                    PaymentTier::Paid => self.allowance.paid,
                    PaymentTier::Unpaid | PaymentTier::Free => {
                        self.allowance.unpaid
                    }
                }
            }
        };
        Ok(i64::from(allowance))
    }

    fn fallback_for(&self, identity: &Identity) -> i64 {
        i64::from(match identity {
            Identity::User(_) => self.allowance.paid,
            Identity::Device(_) => self.allowance.anonymous,
        })
    }

    pub async fn balance(&self, identity: &Identity, day: NaiveDate) -> Result<i64> {
        let allowance = self.allowance_for(identity).await?;
        let remaining = self
            .storage
            .tokens_remaining(identity, day, allowance)
            .await?;
        Ok(remaining)
    }

    /// For display only: a store failure is logged and answered with the
    /// identity's allowance.
    pub async fn balance_or_fallback(
        &self,
        identity: &Identity,
        day: NaiveDate,
    ) -> i64 {
        match self.balance(identity, day).await {
            Ok(remaining) => remaining,
            Err(error) => {
                let fallback = self.fallback_for(identity);
                tracing::error!(
                    %identity,
                    %day,
                    %error,
                    fallback,
                    "Failed to read token balance."
                );
                fallback
            }
        }
    }

    /// Takes `amount` off the balance of `day`, or fails with
    /// `TokenExhausted` and leaves the balance alone. Returns what is left.
    #[tracing::instrument(skip(self, identity), fields(%identity))]
    pub async fn deduct(
        &self,
        identity: &Identity,
        day: NaiveDate,
        charge: Charge,
        amount: u32,
    ) -> Result<i64> {
        let allowance = self.allowance_for(identity).await?;
        let deduction = self
            .storage
            .tokens_deduct(identity, day, allowance, i64::from(amount))
            .await?;
        match deduction {
            Deduction::Applied { remaining } => {
                tracing::info!(remaining, "Tokens deducted.");
                Ok(remaining)
            }
            Deduction::Insufficient { remaining } => {
                let now = self.clock.now().await;
                let time_until_reset = clock::until_next_reset(now);
                tracing::warn!(remaining, %time_until_reset, "Tokens exhausted.");
                Err(Error::TokenExhausted {
                    message: exhausted_message(charge, amount, remaining),
                    time_until_reset,
                })
            }
        }
    }

    /// Gives `amount` back without any upper bound. Never fails: errors
    /// are logged, since a refund runs while another error is reported.
    #[tracing::instrument(skip(self, identity), fields(%identity))]
    pub async fn refund(&self, identity: &Identity, day: NaiveDate, amount: u32) {
        let result = async {
            let allowance = self.allowance_for(identity).await?;
            let remaining = self
                .storage
                .tokens_refund(identity, day, allowance, i64::from(amount))
                .await?;
            Ok::<_, Error>(remaining)
        }
        .await;
        match result {
            Ok(remaining) => tracing::info!(remaining, "Tokens refunded."),
            Err(error) => tracing::error!(%error, "Failed to refund tokens."),
        }
    }

    /// Balance for the current server day and the time until it resets.
    pub async fn status(&self, identity: &Identity) -> TokenStatus {
        let now = self.clock.now().await;
        let tokens_remaining =
            self.balance_or_fallback(identity, now.date_naive()).await;
        TokenStatus {
            tokens_remaining,
            time_until_reset: clock::until_next_reset(now),
        }
    }
}

fn exhausted_message(charge: Charge, amount: u32, remaining: i64) -> String {
    let plural = |n: i64| if n == 1 { "token" } else { "tokens" };
    format!(
        "You have run out of tokens. New {charge} costs {amount} {}, \
        but you have {remaining} remaining. Please come back after \
        00:00 UTC to generate/get more briefs.",
        plural(i64::from(amount)),
    )
}
