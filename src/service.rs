use rand::seq::SliceRandom;

use crate::{
    brief::{Brief, GeneratorFormData, Visibility},
    clock::Clock,
    conf::{Conf, ConfCost},
    data::Storage,
    error::{Error, Result},
    generate::Generator,
    identity::Identity,
    ledger::{Charge, Ledger},
    types::{Profile, TokenStatus, User},
};

/// Ties the ledger, the generator and the store together: every operation
/// a client can ask for, independent of how it asks.
#[derive(Clone)]
pub struct BriefService {
    storage: Storage,
    ledger: Ledger,
    generator: Generator,
    cost: ConfCost,
    history_limit: u32,
}

impl BriefService {
    pub fn new(
        storage: Storage,
        ledger: Ledger,
        generator: Generator,
        cost: ConfCost,
        history_limit: u32,
    ) -> Self {
        Self {
            storage,
            ledger,
            generator,
            cost,
            history_limit,
        }
    }

    pub async fn from_conf(conf: &Conf) -> anyhow::Result<Self> {
        let storage =
            Storage::connect(&conf.db_path(), conf.sqlite_busy_timeout())
                .await?;
        let clock = Clock::from_conf(conf.trusted_clock.as_deref());
        let ledger = Ledger::new(storage.clone(), clock, conf.allowance);
        let generator = Generator::from_conf(conf);
        Ok(Self::new(
            storage,
            ledger,
            generator,
            conf.cost,
            conf.history_limit,
        ))
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    #[tracing::instrument(skip(self, identity, form), fields(%identity))]
    pub async fn generate(
        &self,
        identity: &Identity,
        form: GeneratorFormData,
    ) -> Result<Brief> {
        let form = form.normalized();
        form.validate()?;
        let now = self.ledger.clock().now().await;
        let today = now.date_naive();
        self.ledger
            .deduct(identity, today, Charge::Generation, self.cost.generate)
            .await?;
        let brief = match self.generator.generate(&form, now).await {
            Ok(brief) => brief,
            Err(error) => {
                tracing::error!(%error, "Generation failed, refunding.");
                self.ledger.refund(identity, today, self.cost.generate).await;
                return Err(error);
            }
        };
        if let Err(error) =
            self.storage.brief_insert(&brief, identity.user_id()).await
        {
            tracing::error!(id = %brief.id, ?error, "Failed to save brief.");
        }
        tracing::info!(id = %brief.id, "Brief generated.");
        Ok(brief)
    }

    /// A random public brief matching the selection, sharing at least one
    /// keyword when any are given.
    #[tracing::instrument(skip(self, identity, form), fields(%identity))]
    pub async fn pregenerated(
        &self,
        identity: &Identity,
        form: GeneratorFormData,
    ) -> Result<Brief> {
        let form = form.normalized();
        form.validate()?;
        let today = self.ledger.clock().today().await;
        let cost = self.cost.pregenerated;
        self.ledger
            .deduct(identity, today, Charge::Pregenerated, cost)
            .await?;
        let picked = match self.pick_matching(&form).await {
            Ok(Some(brief)) => brief,
            Ok(None) => {
                self.ledger.refund(identity, today, cost).await;
                return Err(Error::NotFound(
                    "No pre-generated brief matches your selection. \
                    Please try different options."
                        .to_string(),
                ));
            }
            Err(error) => {
                self.ledger.refund(identity, today, cost).await;
                return Err(error);
            }
        };
        tracing::info!(id = %picked.id, "Pre-generated brief served.");
        Ok(picked)
    }

    async fn pick_matching(
        &self,
        form: &GeneratorFormData,
    ) -> Result<Option<Brief>> {
        let candidates = self
            .storage
            .briefs_matching(
                &form.category,
                &form.niche,
                &form.industry,
                Visibility::Public,
            )
            .await?;
        let matching: Vec<Brief> = candidates
            .into_iter()
            .filter(|b| {
                form.keywords.is_empty()
                    || b.keywords.iter().any(|k| form.keywords.contains(k))
            })
            .collect();
        tracing::debug!(candidates = matching.len(), "Matching briefs.");
        Ok(matching.choose(&mut rand::thread_rng()).cloned())
    }

    /// The user's own briefs, newest first. `limit` defaults to the
    /// configured history size.
    pub async fn history(
        &self,
        identity: &Identity,
        limit: Option<u32>,
        offset: u32,
    ) -> Result<Vec<Brief>> {
        let Some(uid) = identity.user_id() else {
            return Err(Error::Forbidden(
                "Sign in to keep a history of generated briefs.".to_string(),
            ));
        };
        let limit = limit.unwrap_or(self.history_limit);
        let briefs = self.storage.brief_history(uid, limit, offset).await?;
        Ok(briefs)
    }

    pub async fn get(&self, brief_id: &str) -> Result<Brief> {
        self.storage
            .brief(brief_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("brief {brief_id}")))
    }

    pub async fn token_status(&self, identity: &Identity) -> TokenStatus {
        self.ledger.status(identity).await
    }

    pub async fn profile(&self, identity: &Identity) -> Result<User> {
        let Some(uid) = identity.user_id() else {
            return Err(Error::Forbidden(
                "Devices have no profile.".to_string(),
            ));
        };
        let profile = self
            .storage
            .profile(uid)
            .await?
            .unwrap_or_else(|| Profile::new(uid));
        let tokens = self.token_status(identity).await.tokens_remaining;
        Ok(User {
            id: profile.id,
            display_name: profile.display_name,
            payment: profile.payment,
            role: profile.role,
            tokens,
        })
    }
}
