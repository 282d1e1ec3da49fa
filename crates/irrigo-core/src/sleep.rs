// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Irrigo.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Interruptible sleep for background workers.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Why `Sleeper::sleep_for` returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepOutcome {
    Elapsed,
    Woken,
    Stopped,
}

/// Stop token plus wake signal shared between a worker and its controllers.
///
/// A wake raised while nobody sleeps is kept as a single pending permit, so
/// the next `sleep_for` returns `Woken` at once.
#[derive(Debug, Clone)]
pub struct Sleeper {
    stop: CancellationToken,
    wake: Arc<Notify>,
}

impl Sleeper {
    #[must_use]
    pub fn new() -> Self {
        Self {
            stop: CancellationToken::new(),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Sleeper whose stop token is a child of `parent`
    #[must_use]
    pub fn child_of(parent: &CancellationToken) -> Self {
        Self {
            stop: parent.child_token(),
            wake: Arc::new(Notify::new()),
        }
    }

    pub async fn sleep_for(&self, duration: Duration) -> SleepOutcome {
        if self.stop.is_cancelled() {
            return SleepOutcome::Stopped;
        }

        tokio::select! {
            biased;
            () = self.stop.cancelled() => SleepOutcome::Stopped,
            () = self.wake.notified() => SleepOutcome::Woken,
            () = tokio::time::sleep(duration) => SleepOutcome::Elapsed,
        }
    }

    pub fn wake(&self) {
        self.wake.notify_one();
    }

    pub fn stop(&self) {
        self.stop.cancel();
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    #[must_use]
    pub fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }

    /// Handle that can only wake, handed to external signal sources
    #[must_use]
    pub fn wake_handle(&self) -> WakeHandle {
        WakeHandle {
            wake: Arc::clone(&self.wake),
        }
    }
}

impl Default for Sleeper {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct WakeHandle {
    wake: Arc<Notify>,
}

impl WakeHandle {
    pub fn wake(&self) {
        self.wake.notify_one();
    }
}

/// Registration with an external signal source, undone on drop.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
