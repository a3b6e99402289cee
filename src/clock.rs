use std::{fmt, time::Duration};

use chrono::{DateTime, Days, NaiveDate, Utc};

/// Time left until the next 00:00 UTC, when daily allowances reset.
#[derive(
    serde::Serialize,
    serde::Deserialize,
    utoipa::ToSchema,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
)]
pub struct Countdown {
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

impl Countdown {
    pub fn from_duration(d: Duration) -> Self {
        let total = d.as_secs();
        Self {
            hours: total / 3600,
            minutes: (total % 3600) / 60,
            seconds: total % 60,
        }
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.hours * 3600 + self.minutes * 60 + self.seconds)
    }
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}h {}m {}s", self.hours, self.minutes, self.seconds)
    }
}

pub fn next_reset(now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = now
        .date_naive()
        .checked_add_days(Days::new(1))
        .unwrap_or(NaiveDate::MAX);
    tomorrow.and_time(chrono::NaiveTime::MIN).and_utc()
}

pub fn until_next_reset(now: DateTime<Utc>) -> Countdown {
    let diff = (next_reset(now) - now).to_std().unwrap_or_default();
    Countdown::from_duration(diff)
}

/// Source of "now" for everything that depends on the UTC day.
///
/// Balances reset by date, so the date must not come from a clock the
/// caller can wind forward. `Trusted` asks an HTTP server for its `Date`
/// header and only falls back to the local clock, with a warning, when
/// that fails.
#[derive(Clone, Debug)]
pub enum Clock {
    System,
    Trusted { url: String, client: reqwest::Client },
    Fixed(DateTime<Utc>),
}

impl Clock {
    pub fn from_conf(trusted_clock: Option<&str>) -> Self {
        match trusted_clock {
            None => Self::System,
            Some(url) => Self::Trusted {
                url: url.to_string(),
                client: reqwest::Client::builder()
                    .timeout(Duration::from_secs(5))
                    .build()
                    .unwrap_or_default(),
            },
        }
    }

    pub async fn now(&self) -> DateTime<Utc> {
        match self {
            Self::System => Utc::now(),
            Self::Fixed(t) => *t,
            Self::Trusted { url, client } => {
                match fetch_date(client, url).await {
                    Ok(t) => t,
                    Err(error) => {
                        tracing::warn!(
                            ?error,
                            %url,
                            "Failed to get trusted time, \
                            falling back to local clock."
                        );
                        Utc::now()
                    }
                }
            }
        }
    }

    pub async fn today(&self) -> NaiveDate {
        self.now().await.date_naive()
    }
}

async fn fetch_date(
    client: &reqwest::Client,
    url: &str,
) -> anyhow::Result<DateTime<Utc>> {
    let resp = client.get(url).send().await?;
    let header = resp
        .headers()
        .get(reqwest::header::DATE)
        .ok_or_else(|| anyhow::anyhow!("Response carries no Date header"))?
        .to_str()?;
    let t = DateTime::parse_from_rfc2822(header)?;
    Ok(t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn countdown_to_midnight() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 21, 15, 30).unwrap();
        let c = until_next_reset(now);
        assert_eq!(
            c,
            Countdown {
                hours: 2,
                minutes: 44,
                seconds: 30
            }
        );
        assert_eq!(c.to_string(), "2h 44m 30s");
    }

    #[test]
    fn countdown_at_midnight_is_a_full_day() {
        let now = Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 0).unwrap();
        assert_eq!(
            next_reset(now),
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
        );
        let c = until_next_reset(now);
        assert_eq!(c.as_duration(), Duration::from_secs(24 * 3600));
    }

    #[test]
    fn countdown_never_exceeds_a_day() {
        let start = Utc.with_ymd_and_hms(2024, 2, 28, 0, 0, 0).unwrap();
        for minute in (0..(48 * 60)).step_by(37) {
            let now = start + chrono::Duration::minutes(minute);
            let d = until_next_reset(now).as_duration();
            assert!(d > Duration::ZERO);
            assert!(d <= Duration::from_secs(24 * 3600));
        }
    }

    #[tokio::test]
    async fn fixed_clock_pins_the_day() {
        let t = Utc.with_ymd_and_hms(2025, 6, 1, 23, 59, 59).unwrap();
        let clock = Clock::Fixed(t);
        assert_eq!(clock.now().await, t);
        assert_eq!(
            clock.today().await,
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
        );
    }

    #[tokio::test]
    async fn unreachable_trusted_clock_falls_back_to_local() {
        // Nothing listens on the discard port.
        let clock = Clock::from_conf(Some("http://127.0.0.1:9/"));
        let before = Utc::now();
        let now = clock.now().await;
        assert!(now >= before - chrono::Duration::seconds(1));
    }

    #[tokio::test]
    async fn trusted_clock_reads_date_header() {
        let app = axum::Router::new().route(
            "/",
            axum::routing::get(|| async {
                (
                    [(
                        axum::http::header::DATE,
                        "Tue, 05 Mar 2024 10:20:30 GMT",
                    )],
                    "",
                )
            }),
        );
        let listener =
            tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });

        let clock = Clock::from_conf(Some(&format!("http://{addr}/")));
        assert_eq!(
            clock.now().await,
            Utc.with_ymd_and_hms(2024, 3, 5, 10, 20, 30).unwrap()
        );
    }
}
