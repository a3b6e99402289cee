use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::{
    brief::{self, Brief, GeneratorFormData, Visibility},
    conf::Conf,
    error::{Error, Result},
    parse::{self, ParsedBrief},
    prompt,
    provider::Provider,
};

/// Stand-in answer used when no provider is configured.
pub const OFFLINE_SAMPLE: &str = "
Company Name: Quantum Weavers
Company Description: Quantum Weavers is a forward-thinking tech startup specializing in creating **immersive educational experiences** using augmented reality. They target young learners, making complex subjects like *quantum physics* and biology engaging and accessible through interactive storytelling.
Project Description: Design a complete brand identity for Quantum Weavers. This includes a modern, memorable logo, a versatile color palette, and typography guidelines. The brand should feel **innovative**, **friendly**, and **trustworthy**, appealing to both educators and students. The final deliverable should be a comprehensive brand style guide.
Deadline: 3 Weeks
";

#[derive(Clone, Debug)]
pub struct Generator {
    provider: Option<Provider>,
    models: Vec<String>,
    timeout: Duration,
    offline_delay: Duration,
    client: reqwest::Client,
}

impl Generator {
    pub fn new(
        provider: Option<Provider>,
        models: Vec<String>,
        timeout: Duration,
        offline_delay: Duration,
    ) -> Self {
        Self {
            provider,
            models,
            timeout,
            offline_delay,
            client: reqwest::Client::new(),
        }
    }

    /// Proxy if one is configured, else Gemini if a key is, else offline.
    pub fn from_conf(conf: &Conf) -> Self {
        let provider = match (&conf.generator.proxy_url, &conf.gemini) {
            (Some(url), _) => Some(Provider::Proxy {
                url: url.clone(),
                auth_token: conf.generator.proxy_auth_token.clone(),
            }),
            (None, Some(gemini)) if !gemini.api_key.is_empty() => {
                Some(Provider::Gemini {
                    base_url: gemini.base_url.clone(),
                    api_key: gemini.api_key.clone(),
                })
            }
            _ => None,
        };
        if provider.is_none() {
            tracing::warn!(
                "No generation provider configured. \
                Briefs will be the offline sample."
            );
        }
        Self::new(
            provider,
            conf.generator.models.clone(),
            conf.generator.timeout(),
            conf.generator.offline_delay(),
        )
    }

    pub fn is_offline(&self) -> bool {
        self.provider.is_none()
    }

    /// Raw text from the first model that answers.
    pub async fn complete(&self, prompt: &str) -> Result<String> {
        let Some(provider) = &self.provider else {
            tracing::info!(delay = ?self.offline_delay, "Offline, using sample.");
            tokio::time::sleep(self.offline_delay).await;
            return Ok(OFFLINE_SAMPLE.to_string());
        };
        let mut last_error: Option<String> = None;
        for model in &self.models {
            tracing::debug!(%model, "Attempting generation.");
            match provider
                .complete(&self.client, model, prompt, self.timeout)
                .await
            {
                Ok(text) => {
                    tracing::info!(%model, "Generated.");
                    return Ok(text);
                }
                Err(error) => {
                    tracing::warn!(%model, %error, "Model failed.");
                    last_error = Some(error.to_string());
                }
            }
        }
        Err(Error::Provider(format!(
            "All models failed to generate content. Last error: {}",
            last_error.as_deref().unwrap_or("Unknown error")
        )))
    }

    pub async fn generate(
        &self,
        form: &GeneratorFormData,
        now: DateTime<Utc>,
    ) -> Result<Brief> {
        form.validate()?;
        let text = self.complete(&prompt::build(form)).await?;
        let parsed = parse::parse_brief_text(&text);
        let missing = parsed.missing_required();
        if !missing.is_empty() {
            tracing::error!(?missing, %text, "Failed to parse generated brief.");
            return Err(Error::validation(format!(
                "Failed to parse the brief from AI response. It may be \
                incomplete or in an unexpected format. Missing: {}",
                missing.join(", ")
            )));
        }
        let deadline = self.pick_deadline(form, &parsed);
        Ok(assemble(form, parsed, deadline, text, now))
    }

    fn pick_deadline(
        &self,
        form: &GeneratorFormData,
        parsed: &ParsedBrief,
    ) -> String {
        let candidates = if self.is_offline() {
            [&form.deadline, &parsed.deadline]
        } else {
            [&parsed.deadline, &form.deadline]
        };
        candidates
            .into_iter()
            .find(|d| !d.is_empty())
            .cloned()
            .unwrap_or_else(|| "Not specified".to_string())
    }
}

fn assemble(
    form: &GeneratorFormData,
    parsed: ParsedBrief,
    deadline: String,
    full_text: String,
    now: DateTime<Utc>,
) -> Brief {
    Brief {
        id: brief::new_id(now),
        category: form.category.clone(),
        niche: form.niche.clone(),
        industry: form.industry.clone(),
        keywords: form.keywords.clone(),
        deadline,
        company_name: parsed.company_name,
        company_description: parsed.company_description,
        project_description: parsed.project_description,
        visibility: Visibility::Public,
        created_at: now,
        full_text,
    }
}
