use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use rand::Rng;
use utoipa::ToSchema;

use crate::error::{Error, Result};

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
pub enum Visibility {
    #[default]
    Public,
    Unlisted,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Unlisted => "unlisted",
        }
    }
}

impl FromStr for Visibility {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "unlisted" => Ok(Self::Unlisted),
            _ => Err(anyhow::anyhow!("Unknown visibility: {s:?}")),
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Brief {
    pub id: String,
    pub category: String,
    pub niche: String,
    pub industry: String,
    pub keywords: Vec<String>,
    pub deadline: String,
    pub company_name: String,
    pub company_description: String,
    pub project_description: String,
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
    pub full_text: String,
}

#[derive(
    serde::Serialize, serde::Deserialize, ToSchema, Debug, Clone, Default,
)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorFormData {
    pub category: String,
    pub niche: String,
    pub industry: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub deadline: String,
}

impl GeneratorFormData {
    /// Trims every field and drops blank or repeated keywords, keeping
    /// first-seen order.
    pub fn normalized(self) -> Self {
        let mut keywords: Vec<String> = Vec::with_capacity(self.keywords.len());
        for kw in self.keywords {
            let kw = kw.trim();
            if !kw.is_empty() && !keywords.iter().any(|k| k == kw) {
                keywords.push(kw.to_string());
            }
        }
        Self {
            category: self.category.trim().to_string(),
            niche: self.niche.trim().to_string(),
            industry: self.industry.trim().to_string(),
            keywords,
            deadline: self.deadline.trim().to_string(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let blank = |s: &str| s.trim().is_empty();
        if blank(&self.category) || blank(&self.niche) || blank(&self.industry)
        {
            return Err(Error::validation(
                "Please fill out Category, Niche, and Industry.",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineUnit {
    Days,
    Weeks,
    Months,
}

impl fmt::Display for DeadlineUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Days => "days",
            Self::Weeks => "weeks",
            Self::Months => "months",
        };
        f.write_str(s)
    }
}

impl FromStr for DeadlineUnit {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "days" | "day" | "d" => Ok(Self::Days),
            "weeks" | "week" | "w" => Ok(Self::Weeks),
            "months" | "month" | "m" => Ok(Self::Months),
            _ => Err(anyhow::anyhow!("Unknown deadline unit: {s:?}")),
        }
    }
}

/// `7, Days` -> `"7 days"`. An absent value leaves the deadline to the model.
pub fn deadline(value: Option<u32>, unit: DeadlineUnit) -> String {
    match value {
        Some(n) if n > 0 => format!("{n} {unit}"),
        _ => String::new(),
    }
}

/// `BRF` + `YYYYMMDDHHMMSS` (UTC) + 3-digit random suffix.
///
/// Two briefs created within the same second collide with probability
/// 1/1000. Storage rejects the duplicate rather than overwriting.
pub fn new_id(now: DateTime<Utc>) -> String {
    let suffix: u16 = rand::thread_rng().gen_range(0..1000);
    format!("BRF{}{suffix:03}", now.format("%Y%m%d%H%M%S"))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn id_format() {
        let now = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let id = new_id(now);
        assert!(id.starts_with("BRF20250102030405"), "{id}");
        let re = regex::Regex::new(r"^BRF\d{17}$").unwrap();
        assert!(re.is_match(&id), "{id}");
    }

    #[test]
    fn missing_required_fields_fail_validation() {
        let form = GeneratorFormData {
            category: "Copywriting".into(),
            niche: "  ".into(),
            industry: "Food".into(),
            ..Default::default()
        };
        assert!(matches!(form.validate(), Err(Error::Validation(_))));

        let form = GeneratorFormData {
            niche: "Social Media".into(),
            ..form
        };
        assert!(form.validate().is_ok());
    }

    #[test]
    fn keywords_are_a_set() {
        let form = GeneratorFormData {
            category: " Game Development ".into(),
            niche: "MMO".into(),
            industry: "PC".into(),
            keywords: vec![
                "Easy".into(),
                "RPG".into(),
                " Easy".into(),
                "".into(),
            ],
            deadline: String::new(),
        }
        .normalized();
        assert_eq!(form.category, "Game Development");
        assert_eq!(form.keywords, vec!["Easy", "RPG"]);
    }

    #[test]
    fn deadline_assembly() {
        assert_eq!(deadline(Some(7), DeadlineUnit::Days), "7 days");
        assert_eq!(deadline(Some(2), "weeks".parse().unwrap()), "2 weeks");
        assert_eq!(deadline(None, DeadlineUnit::Months), "");
        assert_eq!(deadline(Some(0), DeadlineUnit::Months), "");
    }

    #[test]
    fn brief_json_is_camel_case() {
        let brief = Brief {
            id: "BRF20250102030405123".into(),
            category: "c".into(),
            niche: "n".into(),
            industry: "i".into(),
            keywords: vec![],
            deadline: "3 Weeks".into(),
            company_name: "Acme".into(),
            company_description: "d".into(),
            project_description: "p".into(),
            visibility: Visibility::Unlisted,
            created_at: Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
            full_text: "t".into(),
        };
        let v = serde_json::to_value(&brief).unwrap();
        assert_eq!(v["companyName"], "Acme");
        assert_eq!(v["visibility"], "unlisted");
        assert!(v.get("fullText").is_some());
    }
}
