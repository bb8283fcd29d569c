//! Live-page driving: the operation contract, the Chrome (CDP)
//! implementation behind it, and the optional planner-executor mode.

mod chrome;
mod extract;
mod planner;

use async_trait::async_trait;

pub use chrome::{ChromeDriver, ChromeDriverConfig};
pub use extract::{extract_name, profile_text};
pub use planner::{
    ActionSurface, ComputerUsePlanner, LlmPlanner, PlannerLoop, PlannerOutcome, PlannerRequest,
    PlannerTurn,
};

/// Browser operation failures.  Locally retried once where the contract says
/// so; otherwise surfaced to the coordinator, which logs and moves on.
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("no element matched `{0}`")]
    SelectorNotFound(String),
    #[error("browser operation `{op}` timed out")]
    Timeout { op: &'static str },
    #[error("login required and no credentials configured")]
    LoginRequired,
    #[error("scripted login failed: {0}")]
    LoginFailed(String),
    #[error("browser session error: {0}")]
    Session(String),
    #[error("planner failure: {0}")]
    Planner(String),
}

impl From<chromiumoxide::error::CdpError> for BrowserError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        BrowserError::Session(err.to_string())
    }
}

/// How `open` ended up with a logged-in session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginPath {
    AlreadySignedIn,
    ScriptedLogin,
}

/// The nine operations the coordinator drives a page through.
///
/// Synchronous from the coordinator's viewpoint (each call resolves before
/// the pipeline advances); implementations may suspend internally.  Both the
/// fixed-selector mode and the planner-executor mode satisfy this same
/// contract — tests target the contract, not the implementation.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Navigate to the listing and ensure a logged-in session.
    async fn open(&self, url: &str) -> Result<LoginPath, BrowserError>;

    /// Advance to the next profile card.  `false` when the listing is
    /// exhausted.  Landing pages that already show a profile count as
    /// success.
    async fn open_next_profile(&self) -> Result<bool, BrowserError>;

    /// Full text of the current profile from the DOM, never the viewport.
    async fn read_profile_text(&self) -> Result<String, BrowserError>;

    /// Give keyboard focus to the reply widget.
    async fn focus_input(&self) -> Result<(), BrowserError>;

    /// Clear the focused widget, then type `text`.
    async fn fill(&self, text: &str) -> Result<(), BrowserError>;

    /// Activate the reply submit control.
    async fn submit(&self) -> Result<(), BrowserError>;

    /// Post-submit confirmation: marker element, button state, or URL change.
    async fn verify_sent(&self) -> Result<bool, BrowserError>;

    /// Dismiss the current card so `open_next_profile` advances.
    async fn skip(&self) -> Result<(), BrowserError>;

    /// Release browser resources.
    async fn close(&self) -> Result<(), BrowserError>;

    /// Label used in events (`"selector"` or `"planner"`).
    fn engine(&self) -> &'static str {
        "selector"
    }
}
