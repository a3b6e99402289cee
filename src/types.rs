use std::str::FromStr;

use utoipa::ToSchema;

use crate::clock::Countdown;

#[derive(
    serde::Serialize,
    serde::Deserialize,
    ToSchema,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
)]
#[serde(rename_all = "lowercase")]
pub enum PaymentTier {
    Paid,
    #[default]
    Unpaid,
    Free,
}

impl PaymentTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paid => "paid",
            Self::Unpaid => "unpaid",
            Self::Free => "free",
        }
    }
}

impl FromStr for PaymentTier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paid" => Ok(Self::Paid),
            "unpaid" => Ok(Self::Unpaid),
            "free" => Ok(Self::Free),
            _ => Err(anyhow::anyhow!("Unknown payment tier: {s:?}")),
        }
    }
}

#[derive(
    serde::Serialize,
    serde::Deserialize,
    ToSchema,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Moderator,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Moderator => "moderator",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "moderator" => Ok(Self::Moderator),
            "admin" => Ok(Self::Admin),
            _ => Err(anyhow::anyhow!("Unknown role: {s:?}")),
        }
    }
}

/// Stored account data. Token balance lives in the ledger, not here.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq)]
pub struct Profile {
    pub id: String,
    pub display_name: String,
    pub payment: PaymentTier,
    pub role: Role,
}

impl Profile {
    /// Defaults for a user seen before any profile was stored.
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: id.to_string(),
            payment: PaymentTier::default(),
            role: Role::default(),
        }
    }
}

#[derive(serde::Serialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub payment: PaymentTier,
    pub role: Role,
    /// Today's balance.
    pub tokens: i64,
}

#[derive(serde::Serialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TokenStatus {
    pub tokens_remaining: i64,
    pub time_until_reset: Countdown,
}
