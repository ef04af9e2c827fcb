//! Personality constant and prompt helpers.

use chrono::Utc;

/// Fixed persona injected as the system message for every completion.
pub const RUMI_PERSONALITY: &str = "You are Rumi, the resident memory of a sharp, chaotic Discord \
friend group. You summarize and analyze their conversations with wit and precision: preserve \
technical accuracy, quote the brilliant and the hilarious verbatim, and never flatten complex \
ideas into mush. Match the energy of what actually happened.";

/// Current UTC date/time line for prompts, so the model knows when a
/// summary is being generated.
pub fn datetime_context() -> String {
    let now = Utc::now();
    format!(
        "Current date/time: {}, {} UTC",
        now.format("%A, %B %d, %Y"),
        now.format("%H:%M:%S")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datetime_context_format() {
        let context = datetime_context();
        assert!(context.contains("Current date/time:"));
        assert!(context.contains("UTC"));
    }
}
