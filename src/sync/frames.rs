//! Polling waits for frames and elements.
//!
//! The portal gives no completion signal for its nested frames, so every wait
//! here polls at a fixed interval and turns "never appeared" into a typed
//! [`AutomationError`] once its bound elapses.

use std::time::Duration;

use anyhow::Result;
use tokio::time::Instant;

use crate::error::AutomationError;
use crate::portal::{ElementCount, FrameTarget, Locator, PortalPage, Scope};

/// Resolve `target` to a frame scope, polling until it attaches.
///
/// The result must not be kept across a navigation of the frame or its parent.
pub async fn resolve_frame(
    page: &dyn PortalPage,
    target: &FrameTarget,
    timeout: Duration,
    interval: Duration,
) -> Result<Scope> {
    let started = Instant::now();
    loop {
        let frames = page.frames().await?;
        if let Some(frame) = frames.into_iter().find(|frame| target.matches(frame)) {
            tracing::debug!(
                target = %target,
                frame = %frame.name,
                url = %frame.url,
                "Resolved frame"
            );
            return Ok(Scope::Frame(frame));
        }

        if started.elapsed() >= timeout {
            return Err(AutomationError::FrameNotFound {
                target: target.to_string(),
                waited: started.elapsed(),
            }
            .into());
        }
        tokio::time::sleep(interval).await;
    }
}

/// Resolve an optional frame; `None` is the outer page.
pub async fn resolve_scope(
    page: &dyn PortalPage,
    target: Option<&FrameTarget>,
    timeout: Duration,
    interval: Duration,
) -> Result<Scope> {
    match target {
        Some(target) => resolve_frame(page, target, timeout, interval).await,
        None => Ok(Scope::Page),
    }
}

/// Wait until at least one element matches `locator`.
pub async fn wait_for_element(
    page: &dyn PortalPage,
    scope: &Scope,
    locator: &Locator,
    timeout: Duration,
    interval: Duration,
) -> Result<ElementCount> {
    let started = Instant::now();
    loop {
        let count = page.count(scope, locator).await?;
        if count.attached > 0 {
            return Ok(count);
        }

        if started.elapsed() >= timeout {
            return Err(AutomationError::ElementTimeout {
                locator: locator.to_string(),
                waited: started.elapsed(),
            }
            .into());
        }
        tokio::time::sleep(interval).await;
    }
}

/// Wait until at least one match of `locator` is rendered.
///
/// Fails with `ElementTimeout` when nothing ever attached and with
/// `ElementNotVisible` when elements attached but stayed hidden.
pub async fn wait_for_visible(
    page: &dyn PortalPage,
    scope: &Scope,
    locator: &Locator,
    timeout: Duration,
    interval: Duration,
) -> Result<ElementCount> {
    let started = Instant::now();
    loop {
        let count = page.count(scope, locator).await?;
        if count.visible > 0 {
            return Ok(count);
        }

        if started.elapsed() >= timeout {
            let err = if count.attached == 0 {
                AutomationError::ElementTimeout {
                    locator: locator.to_string(),
                    waited: started.elapsed(),
                }
            } else {
                AutomationError::ElementNotVisible {
                    locator: locator.to_string(),
                    attached: count.attached,
                }
            };
            return Err(err.into());
        }
        tokio::time::sleep(interval).await;
    }
}

/// Fixed delay for portal steps that expose no completion signal.
pub async fn settle(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
