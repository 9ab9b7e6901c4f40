//! Cache configuration
//!
//! Loaded from TOML. Every section and field has a default, so an empty
//! document yields a working configuration.

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub mutations: MutationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Type tags and field names used to address entities in the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Type tag of the entity carrying the thanks list
    #[serde(default = "default_comment_type")]
    pub comment_type: String,

    /// Type tag of a thanks relation record
    #[serde(default = "default_record_type")]
    pub record_type: String,

    /// Type tag of users referenced as authors
    #[serde(default = "default_user_type")]
    pub user_type: String,

    /// Relation list holding thanks records on a comment
    #[serde(default = "default_thanks_field")]
    pub thanks_field: String,

    /// Scalar field holding the comment text
    #[serde(default = "default_body_field")]
    pub body_field: String,

    /// Scalar field holding the comment author's id
    #[serde(default = "default_author_field")]
    pub author_field: String,

    /// Relation list on a parent entity holding its comments
    #[serde(default = "default_comments_field")]
    pub comments_field: String,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            comment_type: default_comment_type(),
            record_type: default_record_type(),
            user_type: default_user_type(),
            thanks_field: default_thanks_field(),
            body_field: default_body_field(),
            author_field: default_author_field(),
            comments_field: default_comments_field(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationConfig {
    /// Evict record entities once their delete is confirmed
    #[serde(default = "default_true")]
    pub evict_on_delete: bool,

    /// First temporary id handed out (must be negative)
    #[serde(default = "default_temp_id_start")]
    pub temp_id_start: i64,

    /// Send an info notification when a mutation is confirmed
    #[serde(default)]
    pub notify_on_success: bool,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            evict_on_delete: true,
            temp_id_start: default_temp_id_start(),
            notify_on_success: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directives, overridden by `RUST_LOG` when set
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

// Defaults
fn default_comment_type() -> String { "Comment".to_string() }
fn default_record_type() -> String { "CommentThanks".to_string() }
fn default_user_type() -> String { "User".to_string() }
fn default_thanks_field() -> String { "thanks".to_string() }
fn default_body_field() -> String { "body".to_string() }
fn default_author_field() -> String { "author".to_string() }
fn default_comments_field() -> String { "comments".to_string() }
fn default_true() -> bool { true }
fn default_temp_id_start() -> i64 { -1 }
fn default_filter() -> String { "info,optimistic_cache=debug".to_string() }

impl CacheConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: CacheConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.mutations.temp_id_start >= 0 {
            return Err(CacheError::Config(format!(
                "temp_id_start must be negative, got {}",
                self.mutations.temp_id_start
            )));
        }

        let names = [
            ("comment_type", &self.schema.comment_type),
            ("record_type", &self.schema.record_type),
            ("user_type", &self.schema.user_type),
            ("thanks_field", &self.schema.thanks_field),
            ("body_field", &self.schema.body_field),
            ("author_field", &self.schema.author_field),
            ("comments_field", &self.schema.comments_field),
        ];
        for (name, value) in names {
            if value.trim().is_empty() {
                return Err(CacheError::Config(format!("schema.{} must not be empty", name)));
            }
        }

        Ok(())
    }
}
