use crate::config::types::{
    ApiConfig, Config, CrawlerConfig, EmbedderConfig, GeocoderConfig, OutputConfig, SeedConfig,
    SinkKind, UserAgentConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_api_config(&config.api)?;
    validate_seed_config(&config.seeds)?;
    validate_output_config(&config.output)?;
    if let Some(geocoder) = &config.geocoder {
        validate_geocoder_config(geocoder)?;
    }
    if let Some(embedder) = &config.embedder {
        validate_embedder_config(embedder)?;
    }
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_requests < 1 || config.max_concurrent_requests > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_requests must be between 1 and 100, got {}",
            config.max_concurrent_requests
        )));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be > 0".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates the marketplace endpoint
fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Validation(format!(
            "base_url '{}' must use http or https",
            config.base_url
        )));
    }

    Ok(())
}

/// Validates seed configuration
fn validate_seed_config(config: &SeedConfig) -> Result<(), ConfigError> {
    if config.path.is_empty() {
        return Err(ConfigError::Validation(
            "seeds.path cannot be empty".to_string(),
        ));
    }

    for region in &config.allowed_regions {
        if region.is_empty() || !region.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConfigError::Validation(format!(
                "allowed region '{}' must be a non-empty alphanumeric code",
                region
            )));
        }
    }

    Ok(())
}

/// Validates that the selected sink has somewhere to write
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    let destination = match config.sink {
        SinkKind::Ndjson | SinkKind::JsonArray => config.directory.as_deref(),
        SinkKind::DocumentStore => config.database_path.as_deref(),
    };

    match destination {
        Some(path) if !path.is_empty() => Ok(()),
        _ => Err(ConfigError::Validation(format!(
            "sink {:?} has no persistence destination configured",
            config.sink
        ))),
    }
}

fn validate_geocoder_config(config: &GeocoderConfig) -> Result<(), ConfigError> {
    Url::parse(&config.endpoint)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid geocoder endpoint: {}", e)))?;
    Ok(())
}

fn validate_embedder_config(config: &EmbedderConfig) -> Result<(), ConfigError> {
    Url::parse(&config.endpoint)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid embedder endpoint: {}", e)))?;

    if config.model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "embedder model cannot be empty".to_string(),
        ));
    }

    if config.batch_size == 0 {
        return Err(ConfigError::Validation(
            "embedder batch_size must be >= 1".to_string(),
        ));
    }

    if config.word_budget == 0 {
        return Err(ConfigError::Validation(
            "embedder word_budget must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(sink: SinkKind, directory: Option<&str>, database: Option<&str>) -> OutputConfig {
        OutputConfig {
            sink,
            directory: directory.map(str::to_string),
            database_path: database.map(str::to_string),
        }
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("admin@sub.example.com").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("invalid").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("user@domain").is_err());
    }

    #[test]
    fn test_output_requires_destination_for_selected_sink() {
        assert!(validate_output_config(&output(SinkKind::Ndjson, Some("./out"), None)).is_ok());
        assert!(
            validate_output_config(&output(SinkKind::DocumentStore, None, Some("./db"))).is_ok()
        );

        assert!(validate_output_config(&output(SinkKind::JsonArray, None, Some("./db"))).is_err());
        assert!(validate_output_config(&output(SinkKind::DocumentStore, Some("./out"), None)).is_err());
        assert!(validate_output_config(&output(SinkKind::Ndjson, Some(""), None)).is_err());
    }

    #[test]
    fn test_allowed_regions_must_be_codes() {
        let mut seeds = SeedConfig {
            path: "cities.json".to_string(),
            allowed_regions: vec!["ca".to_string(), "ny".to_string()],
        };
        assert!(validate_seed_config(&seeds).is_ok());

        seeds.allowed_regions.push("new york".to_string());
        assert!(validate_seed_config(&seeds).is_err());
    }
}
