use serde::{Deserialize, Serialize};

/// Site-specific locators and confirmation heuristics.
///
/// The target site's labels have drifted before ("Send" vs "Invite to
/// connect"), so everything the driver matches against lives here as plain
/// configuration rather than in driver code.  Defaults target the current
/// co-founder matching site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// CSS selector whose presence means "logged in".
    pub login_probe: String,
    /// CSS selector for the username/password login form fields and submit.
    pub login_user_field: String,
    pub login_pass_field: String,
    pub login_submit: String,
    /// CSS selector for a candidate profile card on the listing page.
    pub profile_card: String,
    /// Control that expands a collapsed card to its full text, when present.
    pub card_expand: String,
    /// Substrings matched (case-insensitive) against input placeholders to
    /// find the reply widget.
    pub reply_placeholder_hints: Vec<String>,
    /// Submit control labels, tried in order before generic fallbacks.
    pub submit_labels: Vec<String>,
    /// CSS selectors whose appearance after submit confirms the send.
    pub sent_markers: Vec<String>,
    /// Control that dismisses the current card and advances the listing.
    pub skip_control: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            login_probe: "[data-testid=\"nav-profile\"]".to_string(),
            login_user_field: "input[name=\"email\"]".to_string(),
            login_pass_field: "input[name=\"password\"]".to_string(),
            login_submit: "button[type=\"submit\"]".to_string(),
            profile_card: "[data-testid=\"profile-card\"]".to_string(),
            card_expand: "[data-testid=\"see-more\"]".to_string(),
            reply_placeholder_hints: vec![
                "excited about this profile".to_string(),
                "write a message".to_string(),
                "say hello".to_string(),
            ],
            submit_labels: vec![
                "Invite to connect".to_string(),
                "Send".to_string(),
                "Connect".to_string(),
            ],
            sent_markers: vec![
                "[data-testid=\"invite-sent\"]".to_string(),
                "[data-testid=\"toast-success\"]".to_string(),
            ],
            skip_control: "[data-testid=\"skip-profile\"]".to_string(),
        }
    }
}
