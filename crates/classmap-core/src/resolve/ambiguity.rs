//! Choosing a target when the exact pass matches several files.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::workspace::same_file;

/// A question put to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt<'a> {
    /// The active document is among the matches: apply there only, or everywhere?
    ActiveOrEverywhere {
        active: &'a Path,
        candidates: &'a [PathBuf],
    },
    /// Pick one of the matching files, or apply everywhere.
    PickList { candidates: &'a [PathBuf] },
}

/// The user's answer to a `Prompt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Choice {
    OnlyActive,
    Everywhere,
    /// Index into the prompt's candidate list.
    Pick(usize),
    Dismissed,
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Choice::OnlyActive => f.write_str("only-active"),
            Choice::Everywhere => f.write_str("everywhere"),
            Choice::Pick(index) => write!(f, "{index}"),
            Choice::Dismissed => f.write_str("dismiss"),
        }
    }
}

impl FromStr for Choice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "only-active" | "active" => Ok(Choice::OnlyActive),
            "everywhere" | "all" => Ok(Choice::Everywhere),
            "dismiss" | "none" => Ok(Choice::Dismissed),
            other => other.parse().map(Choice::Pick).map_err(|_| {
                format!("expected only-active, everywhere, dismiss or an index, got {other:?}")
            }),
        }
    }
}

/// Asks the user to disambiguate.
pub trait Chooser {
    fn choose(&mut self, prompt: Prompt<'_>) -> impl Future<Output = Choice> + Send;
}

/// Answers every prompt the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedChoice(pub Choice);

impl Default for FixedChoice {
    fn default() -> Self {
        Self(Choice::Dismissed)
    }
}

impl Chooser for FixedChoice {
    fn choose(&mut self, prompt: Prompt<'_>) -> impl Future<Output = Choice> + Send {
        tracing::debug!(target: "classmap::resolve", ?prompt, choice = %self.0, "fixed choice");
        std::future::ready(self.0)
    }
}

/// Where an ambiguous exact match gets applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Single(PathBuf),
    Everywhere,
    Declined,
}

/// Prefers the active document; otherwise asks for an explicit pick.
#[derive(Debug, Clone, Copy, Default)]
pub struct AmbiguityResolver<'a> {
    active: Option<&'a Path>,
}

impl<'a> AmbiguityResolver<'a> {
    pub fn new(active: Option<&'a Path>) -> Self {
        Self { active }
    }

    pub async fn decide<C: Chooser>(&self, chooser: &mut C, candidates: &[PathBuf]) -> Decision {
        match candidates {
            [] => return Decision::Declined,
            [only] => return Decision::Single(only.clone()),
            _ => {}
        }

        let active = self
            .active
            .and_then(|active| candidates.iter().find(|c| same_file(c, active)));

        let decision = match active {
            Some(active) => {
                let prompt = Prompt::ActiveOrEverywhere {
                    active,
                    candidates,
                };
                match chooser.choose(prompt).await {
                    Choice::OnlyActive => Decision::Single(active.clone()),
                    choice => Self::from_list(choice, candidates),
                }
            }
            None => {
                let choice = chooser.choose(Prompt::PickList { candidates }).await;
                Self::from_list(choice, candidates)
            }
        };

        tracing::debug!(
            target: "classmap::resolve",
            candidates = candidates.len(),
            ?decision,
            "ambiguous exact match"
        );
        decision
    }

    fn from_list(choice: Choice, candidates: &[PathBuf]) -> Decision {
        match choice {
            Choice::Everywhere => Decision::Everywhere,
            Choice::Pick(index) => candidates
                .get(index)
                .cloned()
                .map(Decision::Single)
                .unwrap_or(Decision::Declined),
            Choice::OnlyActive | Choice::Dismissed => Decision::Declined,
        }
    }
}
