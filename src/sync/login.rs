//! Login form, post-login notices and menu navigation.

use anyhow::{Context, Result};
use secrecy::ExposeSecret;

use super::frames::{resolve_frame, settle, wait_for_element, wait_for_visible};
use crate::config::{LoginSelectors, ResolvedConfig};
use crate::credentials::PortalCredentials;
use crate::error::AutomationError;
use crate::portal::{Locator, PortalPage, Scope};

/// Log in through the form at `login_url` and wait for `ready` to appear.
pub async fn login(
    page: &dyn PortalPage,
    config: &ResolvedConfig,
    credentials: &PortalCredentials,
    login_url: &str,
    ready: &Locator,
) -> Result<()> {
    let timeouts = &config.timeouts;
    let form: &LoginSelectors = &config.selectors.login;

    tracing::info!(ruc = %credentials.ruc(), user = %credentials.username(), "Logging in");
    page.goto(login_url)
        .await
        .context("Failed to open login page")?;

    wait_for_element(
        page,
        &Scope::Page,
        &form.ruc,
        timeouts.element_wait,
        timeouts.poll_interval,
    )
    .await
    .context("Login form did not load")?;

    page.fill(&Scope::Page, &form.ruc, credentials.ruc()).await?;
    page.fill(&Scope::Page, &form.username, credentials.username()).await?;
    page.fill(
        &Scope::Page,
        &form.secret,
        credentials.secret().expose_secret(),
    )
    .await?;
    page.click(&Scope::Page, &form.submit).await?;

    if let Err(err) = wait_for_element(
        page,
        &Scope::Page,
        ready,
        timeouts.page_load,
        timeouts.poll_interval,
    )
    .await
    {
        return match AutomationError::find(&err) {
            Some(AutomationError::ElementTimeout { .. }) => Err(AutomationError::LoginFailed {
                reason: format!("{ready} did not appear after submitting the form"),
            }
            .into()),
            _ => Err(err),
        };
    }

    let url = page.current_url().await.unwrap_or_default();
    if !url.starts_with(&config.portal.menu_host) {
        tracing::warn!(
            url = %url,
            expected = %config.portal.menu_host,
            "Login landed outside the menu host"
        );
    }

    tracing::info!("Logged in");
    Ok(())
}

/// Click through the notices the portal may show in its notice frame after login.
///
/// Absence of the frame is the normal case. Failed clicks are logged and skipped.
pub async fn dismiss_notices(page: &dyn PortalPage, config: &ResolvedConfig) {
    let timeouts = &config.timeouts;
    let selectors = &config.selectors.payments;

    let scope = match resolve_frame(
        page,
        &selectors.notice_frame,
        timeouts.popup_wait,
        timeouts.poll_interval,
    )
    .await
    {
        Ok(scope) => scope,
        Err(_) => {
            tracing::debug!("No post-login notice");
            return;
        }
    };

    for caption in &selectors.notice_buttons {
        let button = Locator::with_text("button, input[type=\"button\"], a", caption.as_str());
        let shown = match page.count(&scope, &button).await {
            Ok(count) => count.visible,
            Err(e) => {
                tracing::debug!(error = %e, "Notice frame went away");
                return;
            }
        };

        // A dismissed notice hides its button, so each pass clicks the first one still visible.
        for _ in 0..shown {
            match page.count(&scope, &button).await {
                Ok(count) if count.visible > 0 => {}
                _ => break,
            }
            match page.click_nth(&scope, &button, 0, true).await {
                Ok(()) => {
                    tracing::info!(button = %caption, "Dismissed notice");
                    settle(timeouts.poll_interval).await;
                }
                Err(e) => tracing::warn!(button = %caption, error = %e, "Failed to dismiss notice"),
            }
        }
    }
}

/// Click each menu entry in turn once it is visible on the outer page.
pub async fn open_menu(
    page: &dyn PortalPage,
    config: &ResolvedConfig,
    entries: &[Locator],
) -> Result<()> {
    let timeouts = &config.timeouts;
    for entry in entries {
        wait_for_visible(
            page,
            &Scope::Page,
            entry,
            timeouts.element_wait,
            timeouts.poll_interval,
        )
        .await
        .with_context(|| format!("Menu entry {entry} not available"))?;
        page.click_nth(&Scope::Page, entry, 0, true).await?;
        tracing::debug!(entry = %entry, "Opened menu entry");
    }
    Ok(())
}
