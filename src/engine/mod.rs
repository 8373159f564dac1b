// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

pub mod install;
pub mod remove;

pub use install::{install, InstallReport};
pub use remove::{remove, RemoveReport};
