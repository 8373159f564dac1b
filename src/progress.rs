// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Progress reporting as a side-channel: the core never touches a
//! terminal directly, it reports through this trait, and the CLI shell
//! supplies an `indicatif`-backed implementation.

use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};

pub trait Progress: Send + Sync {
    fn start(&self, label: &str);
    fn tick(&self, delta: u64);
    fn finish(&self);
}

/// Renders a single spinner/bar reused across calls, matching the style of
/// long-running downloads and archive walks.
pub struct IndicatifProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl IndicatifProgress {
    pub fn new() -> Self {
        Self { bar: Mutex::new(None) }
    }
}

impl Default for IndicatifProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress for IndicatifProgress {
    fn start(&self, label: &str) {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg} ({bytes})")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(label.to_string());
        *self.bar.lock().expect("progress bar mutex poisoned") = Some(bar);
    }

    fn tick(&self, delta: u64) {
        if let Some(bar) = self.bar.lock().expect("progress bar mutex poisoned").as_ref() {
            bar.inc(delta);
        }
    }

    fn finish(&self) {
        if let Some(bar) = self.bar.lock().expect("progress bar mutex poisoned").take() {
            bar.finish_and_clear();
        }
    }
}

/// A silent implementation, used by tests and non-interactive runs.
pub struct NoProgress;

impl Progress for NoProgress {
    fn start(&self, _label: &str) {}
    fn tick(&self, _delta: u64) {}
    fn finish(&self) {}
}
