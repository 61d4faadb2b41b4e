use crate::core::capabilities::Locator;
use crate::core::error::Result;
use crate::engine::EngineContext;
use std::time::Duration;

use super::retry::retry_transient;

/// Bounds for the pause between two keystrokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeystrokeDelay {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl KeystrokeDelay {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        if min_ms > max_ms {
            Self {
                min_ms: max_ms,
                max_ms: min_ms,
            }
        } else {
            Self { min_ms, max_ms }
        }
    }

    pub fn random_delay(&self) -> Duration {
        use rand::prelude::*;
        let mut rng = rand::rng();
        Duration::from_millis(rng.random_range(self.min_ms..=self.max_ms))
    }
}

/// Clear `locator`, then type `text` one character at a time with a random
/// pause between keystrokes.
pub async fn paced_type(ctx: &EngineContext, locator: &Locator, text: &str) -> Result<()> {
    let executor = &ctx.caps.executor;
    retry_transient(ctx, ctx.settings.activate_budget(), move || executor.clear(locator)).await?;

    let delay = KeystrokeDelay::new(
        ctx.settings.typing_delay_min_ms,
        ctx.settings.typing_delay_max_ms,
    );
    let mut buf = [0u8; 4];
    for ch in text.chars() {
        ctx.stop.check()?;
        executor.type_text(locator, ch.encode_utf8(&mut buf)).await?;
        ctx.pause(delay.random_delay()).await?;
    }
    Ok(())
}
