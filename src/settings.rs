//! Effective configuration assembled from defaults, stored overrides and
//! the environment.

use std::time::Duration;

use crate::{
    chunking::ChunkingConfig,
    config_db::ConfigDb,
    context::ContextConfig,
    engine::http::{EngineBackend, EngineConfig},
    error::{Error, Result},
    index_writer::IndexingConfig,
    llm::ModelConfig,
    retriever::RetrievalConfig,
};

/// Prefix of the environment variables overriding settings, e.g.
/// `DOCSEEK_CHUNK_SIZE`.
pub const ENV_PREFIX: &str = "DOCSEEK_";

/// Every key `config set` accepts.
pub const KEYS: &[&str] = &[
    "chunk_size",
    "chunk_overlap",
    "flush_every",
    "batch_size",
    "max_attempts",
    "health_check_every",
    "initial_limit",
    "phrase_limit",
    "max_phrase_words",
    "result_cap",
    "token_budget",
    "engine_backend",
    "engine_url",
    "engine_api_key",
    "engine_timeout_secs",
    "model_url",
    "model_name",
    "model_timeout_secs",
];

/// Name of the environment variable overriding `key`.
pub fn env_var(key: &str) -> String {
    format!("{ENV_PREFIX}{}", key.to_ascii_uppercase())
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        Error::Config(format!("invalid value '{value}' for setting '{key}'"))
    })
}

/// Configuration of every component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub chunking: ChunkingConfig,
    pub indexing: IndexingConfig,
    pub retrieval: RetrievalConfig,
    pub context: ContextConfig,
    pub engine: EngineConfig,
    pub model: ModelConfig,
}

impl Settings {
    /// Settings from stored overrides and `DOCSEEK_*` environment
    /// variables. The environment wins over the database, which wins over
    /// the defaults.
    pub fn resolve(db: &ConfigDb) -> Result<Self> {
        Self::resolve_with(db, |name| std::env::var(name).ok())
    }

    /// [`Settings::resolve`] with an explicit environment lookup.
    pub fn resolve_with(
        db: &ConfigDb,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut settings = Self::default();
        for key in KEYS {
            let value = match env(&env_var(key)) {
                Some(value) => Some(value),
                None => db.get_setting(key)?,
            };
            if let Some(value) = value {
                settings.apply(key, &value)?;
            }
        }
        settings.validate()?;
        Ok(settings)
    }

    /// Set one key from its string form.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "chunk_size" => self.chunking.chunk_size = parse(key, value)?,
            "chunk_overlap" => self.chunking.overlap = parse(key, value)?,
            "flush_every" => self.chunking.flush_every = parse(key, value)?,
            "batch_size" => self.indexing.batch_size = parse(key, value)?,
            "max_attempts" => self.indexing.max_attempts = parse(key, value)?,
            "health_check_every" => {
                self.indexing.health_check_every = parse(key, value)?
            }
            "initial_limit" => {
                self.retrieval.initial_limit = parse(key, value)?
            }
            "phrase_limit" => self.retrieval.phrase_limit = parse(key, value)?,
            "max_phrase_words" => {
                self.retrieval.max_phrase_words = parse(key, value)?
            }
            "result_cap" => self.retrieval.cap = parse(key, value)?,
            "token_budget" => self.context.token_budget = parse(key, value)?,
            "engine_backend" => {
                self.engine.backend = value.parse::<EngineBackend>()?
            }
            "engine_url" => self.engine.url = value.trim().to_string(),
            "engine_api_key" => {
                let api_key = value.trim();
                self.engine.api_key =
                    (!api_key.is_empty()).then(|| api_key.to_string());
            }
            "engine_timeout_secs" => {
                self.engine.timeout = Duration::from_secs(parse(key, value)?)
            }
            "model_url" => self.model.url = value.trim().to_string(),
            "model_name" => self.model.model = value.trim().to_string(),
            "model_timeout_secs" => {
                self.model.timeout = Duration::from_secs(parse(key, value)?)
            }
            other => {
                return Err(Error::Config(format!(
                    "unknown setting '{other}'"
                )));
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        self.indexing.validate()?;
        self.retrieval.validate()?;
        self.context.validate()?;
        self.engine.validate()?;
        self.model.validate()?;
        Ok(())
    }

    /// Every key with its effective value, in [`KEYS`] order. The API key
    /// is masked.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        KEYS.iter()
            .map(|key| (*key, self.display_value(key)))
            .collect()
    }

    fn display_value(&self, key: &str) -> String {
        match key {
            "chunk_size" => self.chunking.chunk_size.to_string(),
            "chunk_overlap" => self.chunking.overlap.to_string(),
            "flush_every" => self.chunking.flush_every.to_string(),
            "batch_size" => self.indexing.batch_size.to_string(),
            "max_attempts" => self.indexing.max_attempts.to_string(),
            "health_check_every" => {
                self.indexing.health_check_every.to_string()
            }
            "initial_limit" => self.retrieval.initial_limit.to_string(),
            "phrase_limit" => self.retrieval.phrase_limit.to_string(),
            "max_phrase_words" => self.retrieval.max_phrase_words.to_string(),
            "result_cap" => self.retrieval.cap.to_string(),
            "token_budget" => self.context.token_budget.to_string(),
            "engine_backend" => self.engine.backend.to_string(),
            "engine_url" => self.engine.url.clone(),
            "engine_api_key" => match &self.engine.api_key {
                Some(_) => "********".to_string(),
                None => String::new(),
            },
            "engine_timeout_secs" => self.engine.timeout.as_secs().to_string(),
            "model_url" => self.model.url.clone(),
            "model_name" => self.model.model.clone(),
            "model_timeout_secs" => self.model.timeout.as_secs().to_string(),
            _ => String::new(),
        }
    }
}
