use std::path::Path;
use super::schema::RulesConfig;

#[derive(Debug)]
pub enum LoadError {
    Io(std::io::Error),
    Parse(serde_yaml::Error),
    Validation(String),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Parse(e) => write!(f, "parse: {e}"),
            Self::Validation(msg) => write!(f, "validation: {msg}"),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_yaml::Error> for LoadError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Parse(e)
    }
}

pub fn load_from_file(path: &Path) -> Result<RulesConfig, LoadError> {
    let contents = std::fs::read_to_string(path)?;
    load_from_str(&contents)
}

pub fn load_from_str(yaml: &str) -> Result<RulesConfig, LoadError> {
    let cfg: RulesConfig = serde_yaml::from_str(yaml)?;
    validate(&cfg)?;
    Ok(cfg)
}

fn validate(cfg: &RulesConfig) -> Result<(), LoadError> {
    if cfg.org_id.is_empty() {
        return Err(LoadError::Validation("org_id must not be empty".into()));
    }
    if cfg.rules_dir.is_empty() {
        return Err(LoadError::Validation("rules_dir must not be empty".into()));
    }
    if cfg.querier.url.is_empty() {
        return Err(LoadError::Validation("querier.url must not be empty".into()));
    }
    if cfg.manager.resend_delay_seconds == 0 {
        return Err(LoadError::Validation(
            "manager.resend_delay_seconds must be > 0".into(),
        ));
    }
    Ok(())
}
