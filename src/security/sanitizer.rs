//! Data sanitization for logging
//!
//! Navigated URLs and prompt text are user data; they are trimmed down
//! before they reach the logs.

/// Sanitizer for user data
///
/// Provides static methods to shorten or strip values before logging.
pub struct Sanitizer;

impl Sanitizer {
    /// Sanitizes a URL by removing query parameters and fragments
    ///
    /// Chat URLs often carry conversation ids or share tokens in the query.
    ///
    /// # Examples
    ///
    /// ```
    /// use autoprompter_lib::security::Sanitizer;
    ///
    /// assert_eq!(
    ///     Sanitizer::sanitize_url("https://chat.example.com/c/123?share=secret"),
    ///     "https://chat.example.com/c/123"
    /// );
    /// ```
    pub fn sanitize_url(url: &str) -> String {
        let end = url.find(['?', '#']).unwrap_or(url.len());
        url[..end].to_string()
    }

    /// Shortens text to at most `max_chars` characters, marking the cut with `...`
    ///
    /// # Examples
    ///
    /// ```
    /// use autoprompter_lib::security::Sanitizer;
    ///
    /// assert_eq!(Sanitizer::truncate_for_log("continue", 20), "continue");
    /// assert_eq!(Sanitizer::truncate_for_log("please keep going", 6), "please...");
    /// ```
    pub fn truncate_for_log(text: &str, max_chars: usize) -> String {
        match text.char_indices().nth(max_chars) {
            Some((cut, _)) => format!("{}...", &text[..cut]),
            None => text.to_string(),
        }
    }
}
