//! View-model of the blocking surface.
//!
//! Owns everything the surface displays (mode, texts, disabled state, the
//! custom duration) and answers focus queries, so the rendering
//! collaborator stays a dumb projection.

use crate::config::EngineConfig;

/// Which panel the surface shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayMode {
    /// Locked but no credential record exists; no bypass is offered.
    NoPassword,
    /// Password field and submit control.
    Password,
    /// Credentials verified; waiting for an unlock duration.
    ChoosingDuration,
}

/// Unlock duration picked after successful verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationChoice {
    /// Until the browser session ends or the host is re-locked.
    Session,
    /// Fixed number of minutes.
    Minutes(u32),
}

/// Interactive controls inside the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Password input.
    PasswordInput,
    /// Submit button.
    UnlockButton,
    /// One of the preset duration buttons.
    Duration(DurationChoice),
    /// Custom duration slider.
    CustomSlider,
    /// Button confirming the custom duration.
    CustomUnlock,
}

/// What a Tab keypress inside the surface should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabAction {
    /// Let the browser move focus normally.
    Default,
    /// Prevent default and focus this control (wrap-around).
    Focus(Control),
    /// Prevent default and focus the surface itself (nothing focusable).
    FocusOverlay,
}

/// Display state of the blocking surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayView {
    mode: OverlayMode,
    host: String,
    error: String,
    disabled: bool,
    presets: Vec<u32>,
    custom_minutes: u32,
    max_custom_minutes: u32,
    last_focus: Option<Control>,
}

impl OverlayView {
    /// Fresh view for a newly locked page.
    pub fn new(host: &str, password_configured: bool, config: &EngineConfig) -> Self {
        Self {
            mode: if password_configured {
                OverlayMode::Password
            } else {
                OverlayMode::NoPassword
            },
            host: host.to_string(),
            error: String::new(),
            disabled: false,
            presets: config.preset_minutes.to_vec(),
            custom_minutes: config.clamp_custom_minutes(config.default_custom_minutes),
            max_custom_minutes: config.max_custom_minutes,
            last_focus: None,
        }
    }

    /// Current panel.
    pub fn mode(&self) -> OverlayMode {
        self.mode
    }

    /// Whether the view was built for a configured credential.
    pub fn password_configured(&self) -> bool {
        self.mode != OverlayMode::NoPassword
    }

    /// Heading text.
    pub fn title(&self) -> &'static str {
        match self.mode {
            OverlayMode::NoPassword => "Password not set",
            OverlayMode::Password | OverlayMode::ChoosingDuration => "Locked",
        }
    }

    /// Explanatory text under the heading.
    pub fn subtitle(&self) -> String {
        match self.mode {
            OverlayMode::NoPassword => {
                "This site is locked but no password is set. Open settings to add one.".to_string()
            }
            OverlayMode::Password => format!("Enter your password to continue to {}.", self.host),
            OverlayMode::ChoosingDuration => "Choose how long to unlock this site.".to_string(),
        }
    }

    /// Inline error / countdown line (live region).
    pub fn error(&self) -> &str {
        &self.error
    }

    /// Replace the inline message.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = message.into();
    }

    /// Clear the inline message.
    pub fn clear_error(&mut self) {
        self.error.clear();
    }

    /// Whether credential input is disabled (cooldown).
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Enable or disable credential input.
    pub fn set_disabled(&mut self, disabled: bool) {
        if self.mode == OverlayMode::Password {
            self.disabled = disabled;
        }
    }

    /// Label of the submit control.
    pub fn unlock_label(&self) -> &'static str {
        if self.disabled {
            "Wait..."
        } else {
            "Unlock"
        }
    }

    /// Switch to the duration panel after successful verification.
    pub fn show_duration_options(&mut self) {
        if self.mode == OverlayMode::Password {
            self.mode = OverlayMode::ChoosingDuration;
            self.disabled = false;
            self.error.clear();
            self.last_focus = None;
        }
    }

    /// Preset choices with their button labels, session first.
    pub fn duration_choices(&self) -> Vec<(DurationChoice, String)> {
        std::iter::once((DurationChoice::Session, "This session".to_string()))
            .chain(
                self.presets
                    .iter()
                    .map(|minutes| (DurationChoice::Minutes(*minutes), duration_label(*minutes))),
            )
            .collect()
    }

    /// Current custom duration in minutes.
    pub fn custom_minutes(&self) -> u32 {
        self.custom_minutes
    }

    /// Largest selectable custom duration.
    pub fn max_custom_minutes(&self) -> u32 {
        self.max_custom_minutes
    }

    /// Move the custom slider, clamped to `1..=max`.
    pub fn set_custom_minutes(&mut self, minutes: u32) {
        self.custom_minutes = minutes.clamp(1, self.max_custom_minutes);
    }

    /// Enabled, visible controls in tab order.
    pub fn focusable(&self) -> Vec<Control> {
        match self.mode {
            OverlayMode::NoPassword => Vec::new(),
            OverlayMode::Password if self.disabled => Vec::new(),
            OverlayMode::Password => vec![Control::PasswordInput, Control::UnlockButton],
            OverlayMode::ChoosingDuration => self
                .duration_choices()
                .into_iter()
                .map(|(choice, _)| Control::Duration(choice))
                .chain([Control::CustomSlider, Control::CustomUnlock])
                .collect(),
        }
    }

    /// Record which control inside the surface holds focus.
    pub fn note_focus(&mut self, control: Control) {
        self.last_focus = Some(control);
    }

    /// Control that last held focus inside the surface.
    pub fn last_focus(&self) -> Option<Control> {
        self.last_focus
    }

    /// Modal focus cycling: wrap at the first/last focusable control.
    pub fn tab(&self, shift: bool) -> TabAction {
        let focusables = self.focusable();
        let (Some(first), Some(last)) = (focusables.first(), focusables.last()) else {
            return TabAction::FocusOverlay;
        };
        let current = self
            .last_focus
            .filter(|control| focusables.contains(control))
            .unwrap_or(*first);

        if shift && current == *first {
            TabAction::Focus(*last)
        } else if !shift && current == *last {
            TabAction::Focus(*first)
        } else {
            TabAction::Default
        }
    }
}

/// Inline message after a wrong password.
pub fn incorrect_password_message(attempts_left: u32) -> String {
    let plural = if attempts_left == 1 { "" } else { "s" };
    format!("Incorrect password. {attempts_left} attempt{plural} left.")
}

/// Inline countdown while cooling down.
pub fn cooldown_message(remaining_secs: u64) -> String {
    format!("Too many attempts. Try again in {remaining_secs}s.")
}

/// Inline message for an empty submission.
pub const EMPTY_PASSWORD_MESSAGE: &str = "Enter your password.";

fn duration_label(minutes: u32) -> String {
    match minutes {
        60 => "1 hour".to_string(),
        m if m % 60 == 0 => format!("{} hours", m / 60),
        m => format!("{m} min"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(configured: bool) -> OverlayView {
        OverlayView::new("example.com", configured, &EngineConfig::default())
    }

    #[test]
    fn test_no_password_view_offers_nothing() {
        let view = view(false);
        assert_eq!(view.mode(), OverlayMode::NoPassword);
        assert_eq!(view.title(), "Password not set");
        assert!(view.focusable().is_empty());
        assert_eq!(view.tab(false), TabAction::FocusOverlay);
    }

    #[test]
    fn test_password_view_texts() {
        let view = view(true);
        assert_eq!(view.title(), "Locked");
        assert_eq!(view.subtitle(), "Enter your password to continue to example.com.");
        assert_eq!(view.focusable(), vec![Control::PasswordInput, Control::UnlockButton]);
    }

    #[test]
    fn test_disabled_view_has_no_focusables() {
        let mut view = view(true);
        view.set_disabled(true);
        assert_eq!(view.unlock_label(), "Wait...");
        assert!(view.focusable().is_empty());
        view.set_disabled(false);
        assert_eq!(view.unlock_label(), "Unlock");
    }

    #[test]
    fn test_no_password_view_cannot_reach_duration_panel() {
        let mut view = view(false);
        view.show_duration_options();
        assert_eq!(view.mode(), OverlayMode::NoPassword);
    }

    #[test]
    fn test_duration_panel_controls() {
        let mut view = view(true);
        view.set_error("Incorrect password. 2 attempts left.");
        view.show_duration_options();
        assert!(view.error().is_empty());
        let labels: Vec<String> = view.duration_choices().into_iter().map(|(_, l)| l).collect();
        assert_eq!(labels, vec!["This session", "5 min", "15 min", "1 hour"]);
        assert_eq!(view.focusable().len(), 6);
        assert_eq!(view.focusable()[0], Control::Duration(DurationChoice::Session));
    }

    #[test]
    fn test_tab_wraps_forward_and_backward() {
        let mut view = view(true);
        assert_eq!(view.tab(true), TabAction::Focus(Control::UnlockButton));

        view.note_focus(Control::PasswordInput);
        assert_eq!(view.tab(false), TabAction::Default);

        view.note_focus(Control::UnlockButton);
        assert_eq!(view.tab(false), TabAction::Focus(Control::PasswordInput));
        assert_eq!(view.tab(true), TabAction::Default);
    }

    #[test]
    fn test_tab_ignores_stale_focus() {
        let mut view = view(true);
        view.note_focus(Control::CustomSlider);
        assert_eq!(view.tab(true), TabAction::Focus(Control::UnlockButton));
    }

    #[test]
    fn test_custom_minutes_are_clamped() {
        let mut view = view(true);
        assert_eq!(view.custom_minutes(), 30);
        view.set_custom_minutes(500);
        assert_eq!(view.custom_minutes(), 240);
        view.set_custom_minutes(0);
        assert_eq!(view.custom_minutes(), 1);
    }

    #[test]
    fn test_messages() {
        assert_eq!(incorrect_password_message(2), "Incorrect password. 2 attempts left.");
        assert_eq!(incorrect_password_message(1), "Incorrect password. 1 attempt left.");
        assert_eq!(cooldown_message(15), "Too many attempts. Try again in 15s.");
        assert_eq!(duration_label(120), "2 hours");
    }
}
