//! Topic name and filter validation
//!
//! Key rules:
//! - Topic names MUST NOT contain wildcards (+ or #)
//! - Topic filters MAY contain wildcards
//! - Multi-level wildcard (#) must occupy the last level
//! - Single-level wildcard (+) must occupy entire level

use super::error::{Result, TopicError};

const MAX_TOPIC_LEN: usize = 65535;

/// Validate a topic name (used in PUBLISH)
pub fn validate_topic_name(topic: &str) -> Result<()> {
    validate_topic_name_with_max_levels(topic, 0)
}

/// Validate a topic name with configurable max levels
///
/// Topic names:
/// - Must be at least 1 character
/// - Must not exceed 65535 bytes
/// - Must not contain null character
/// - Must not contain wildcards (+ or #)
/// - Must not exceed max_topic_levels if set (0 = unlimited)
pub fn validate_topic_name_with_max_levels(topic: &str, max_topic_levels: usize) -> Result<()> {
    if topic.is_empty() {
        return Err(TopicError::InvalidTopic("topic name cannot be empty"));
    }

    if topic.len() > MAX_TOPIC_LEN {
        return Err(TopicError::InvalidTopic(
            "topic name exceeds maximum length",
        ));
    }

    if topic.contains('\0') {
        return Err(TopicError::InvalidTopic(
            "topic name cannot contain null character",
        ));
    }

    if topic.contains('+') || topic.contains('#') {
        return Err(TopicError::InvalidTopic(
            "topic name cannot contain wildcards",
        ));
    }

    if max_topic_levels > 0 && topic.split('/').count() > max_topic_levels {
        return Err(TopicError::InvalidTopic(
            "topic exceeds maximum allowed levels",
        ));
    }

    Ok(())
}

/// Validate a topic filter (used in SUBSCRIBE/UNSUBSCRIBE)
pub fn validate_topic_filter(filter: &str) -> Result<()> {
    validate_topic_filter_with_max_levels(filter, 0)
}

/// Validate a topic filter with configurable max levels
///
/// Topic filters:
/// - Must be at least 1 character
/// - Must not exceed 65535 bytes
/// - Must not contain null character
/// - Multi-level wildcard (#) must be the entire last level
/// - Single-level wildcard (+) must occupy an entire level
/// - Must not exceed max_topic_levels if set (0 = unlimited)
pub fn validate_topic_filter_with_max_levels(filter: &str, max_topic_levels: usize) -> Result<()> {
    if filter.is_empty() {
        return Err(TopicError::InvalidFilter("topic filter cannot be empty"));
    }

    if filter.len() > MAX_TOPIC_LEN {
        return Err(TopicError::InvalidFilter(
            "topic filter exceeds maximum length",
        ));
    }

    if filter.contains('\0') {
        return Err(TopicError::InvalidFilter(
            "topic filter cannot contain null character",
        ));
    }

    let level_count = filter.split('/').count();

    if max_topic_levels > 0 && level_count > max_topic_levels {
        return Err(TopicError::InvalidFilter(
            "topic filter exceeds maximum allowed levels",
        ));
    }

    for (i, level) in filter.split('/').enumerate() {
        if level.contains('#') {
            if level != "#" {
                return Err(TopicError::InvalidFilter(
                    "multi-level wildcard must occupy entire level",
                ));
            }
            if i != level_count - 1 {
                return Err(TopicError::InvalidFilter(
                    "multi-level wildcard must be last level",
                ));
            }
        }

        if level.contains('+') && level != "+" {
            return Err(TopicError::InvalidFilter(
                "single-level wildcard must occupy entire level",
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_topic_name() {
        assert!(validate_topic_name("test").is_ok());
        assert!(validate_topic_name("test/topic").is_ok());
        assert!(validate_topic_name("/test/topic").is_ok());
        assert!(validate_topic_name("test/topic/").is_ok());
        assert!(validate_topic_name("/").is_ok());

        assert!(validate_topic_name("").is_err());
        assert!(validate_topic_name("test+topic").is_err());
        assert!(validate_topic_name("test#topic").is_err());
        assert!(validate_topic_name("test/+/topic").is_err());
        assert!(validate_topic_name("test/#").is_err());
        assert!(validate_topic_name("te\0st").is_err());
    }

    #[test]
    fn test_validate_topic_filter() {
        assert!(validate_topic_filter("test").is_ok());
        assert!(validate_topic_filter("test/topic").is_ok());
        assert!(validate_topic_filter("+").is_ok());
        assert!(validate_topic_filter("#").is_ok());
        assert!(validate_topic_filter("test/+").is_ok());
        assert!(validate_topic_filter("test/#").is_ok());
        assert!(validate_topic_filter("+/test").is_ok());
        assert!(validate_topic_filter("+/+/+").is_ok());
        assert!(validate_topic_filter("test/+/topic").is_ok());
        assert!(validate_topic_filter("/+/").is_ok());

        assert!(validate_topic_filter("").is_err());
        assert!(validate_topic_filter("test+").is_err());
        assert!(validate_topic_filter("test#").is_err());
        assert!(validate_topic_filter("test/#/more").is_err());
        assert!(validate_topic_filter("#/").is_err());
        assert!(validate_topic_filter("+test").is_err());
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            validate_topic_name(""),
            Err(TopicError::InvalidTopic("topic name cannot be empty"))
        );
        assert_eq!(
            validate_topic_filter("a/#/b"),
            Err(TopicError::InvalidFilter(
                "multi-level wildcard must be last level",
            ))
        );
    }

    #[test]
    fn test_validate_topic_name_max_levels() {
        // 0 = unlimited (no limit enforced)
        assert!(validate_topic_name_with_max_levels("a/b/c/d/e", 0).is_ok());

        // Within limit
        assert!(validate_topic_name_with_max_levels("a", 3).is_ok());
        assert!(validate_topic_name_with_max_levels("a/b/c", 3).is_ok());

        // Exceeds limit
        assert!(validate_topic_name_with_max_levels("a/b/c/d", 3).is_err());

        // Empty levels still count
        assert!(validate_topic_name_with_max_levels("/a/b", 3).is_ok());
        assert!(validate_topic_name_with_max_levels("/a/b/c", 3).is_err());
    }

    #[test]
    fn test_validate_topic_filter_max_levels() {
        assert!(validate_topic_filter_with_max_levels("a/+/c/#", 0).is_ok());
        assert!(validate_topic_filter_with_max_levels("a/b/#", 3).is_ok());
        assert!(validate_topic_filter_with_max_levels("#", 1).is_ok());

        // # counts as a level
        assert!(validate_topic_filter_with_max_levels("a/b/c/#", 3).is_err());
        assert!(validate_topic_filter_with_max_levels("a/#", 1).is_err());
    }
}
