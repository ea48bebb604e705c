//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest topic title accepted from clients.
pub const MAX_TOPIC_LEN: usize = 256;

/// Validates a topic title supplied by a client.
///
/// Titles must be non-blank, at most [`MAX_TOPIC_LEN`] characters and free of control characters.
/// Whether the topic exists is checked later against the link graph.
pub fn validate_topic(topic: &str) -> Result<(), ValidationError> {
    if topic.trim().is_empty() {
        let mut err = ValidationError::new("topic_blank");
        err.message = Some("Topic must not be blank".into());
        return Err(err);
    }

    let len = topic.chars().count();
    if len > MAX_TOPIC_LEN {
        let mut err = ValidationError::new("topic_length");
        err.message = Some(
            format!("Topic must be at most {MAX_TOPIC_LEN} characters (got {len})").into(),
        );
        return Err(err);
    }

    if topic.chars().any(char::is_control) {
        let mut err = ValidationError::new("topic_format");
        err.message = Some("Topic must not contain control characters".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_titles() {
        assert!(validate_topic("Tokyo").is_ok());
        assert!(validate_topic("Paris (France)").is_ok());
        assert!(validate_topic("Zürich").is_ok());
    }

    #[test]
    fn rejects_blank_titles() {
        assert!(validate_topic("").is_err());
        assert!(validate_topic("   ").is_err());
    }

    #[test]
    fn rejects_oversized_or_control_titles() {
        assert!(validate_topic(&"a".repeat(MAX_TOPIC_LEN + 1)).is_err());
        assert!(validate_topic(&"a".repeat(MAX_TOPIC_LEN)).is_ok());
        assert!(validate_topic("Tokyo\nParis").is_err());
    }
}
