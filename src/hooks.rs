// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Declarative lifecycle hooks: a fixed YAML shape (`hooks.yml`) naming a
//! list of shell commands per lifecycle stage, run via
//! `std::process::Command`. Hook failures are logged and swallowed; they
//! never trigger a rollback.

use std::process::Command;

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    PreInst,
    PostInst,
    PreRm,
    PostRm,
}

impl Stage {
    fn label(self) -> &'static str {
        match self {
            Stage::PreInst => "preinst",
            Stage::PostInst => "postinst",
            Stage::PreRm => "prerm",
            Stage::PostRm => "postrm",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawHooks {
    #[serde(default)]
    preinst: Vec<String>,
    #[serde(default)]
    postinst: Vec<String>,
    #[serde(default)]
    prerm: Vec<String>,
    #[serde(default)]
    postrm: Vec<String>,
}

/// Parsed `hooks.yml`: one ordered list of shell commands per lifecycle stage.
#[derive(Debug, Default)]
pub struct Hooks {
    raw: RawHooks,
}

impl Hooks {
    pub fn parse(text: &str) -> Result<Self, serde_yaml::Error> {
        Ok(Self { raw: serde_yaml::from_str(text)? })
    }

    fn commands(&self, stage: Stage) -> &[String] {
        match stage {
            Stage::PreInst => &self.raw.preinst,
            Stage::PostInst => &self.raw.postinst,
            Stage::PreRm => &self.raw.prerm,
            Stage::PostRm => &self.raw.postrm,
        }
    }

    /// Runs every command for `stage` in order. Each command's failure
    /// (non-zero exit, or failure to even spawn) is logged at `warn!` and
    /// does not stop the remaining commands or propagate to the caller.
    pub fn run(&self, stage: Stage, pkg: &str) {
        for cmd in self.commands(stage) {
            log::debug!("{pkg}: running {} hook: {cmd}", stage.label());
            match Command::new("sh").arg("-c").arg(cmd).status() {
                Ok(status) if status.success() => {}
                Ok(status) => {
                    log::warn!("{pkg}: {} hook command '{cmd}' exited with {status}", stage.label());
                }
                Err(err) => {
                    log::warn!("{pkg}: {} hook command '{cmd}' failed to run: {err}", stage.label());
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_all_stages() {
        let yaml = "\
preinst:
  - echo pre
postinst:
  - echo post
prerm:
  - echo prerm
postrm:
  - echo postrm
";
        let hooks = Hooks::parse(yaml).unwrap();
        assert_eq!(hooks.commands(Stage::PreInst), &["echo pre".to_string()]);
        assert_eq!(hooks.commands(Stage::PostRm), &["echo postrm".to_string()]);
    }

    #[test]
    fn missing_stages_default_empty() {
        let hooks = Hooks::parse("preinst: [echo hi]").unwrap();
        assert!(hooks.commands(Stage::PostInst).is_empty());
    }

    #[test]
    fn failing_command_does_not_panic() {
        let hooks = Hooks::parse("preinst: [\"exit 1\"]").unwrap();
        hooks.run(Stage::PreInst, "testpkg");
    }
}
