//! Forced-choice verdict extraction.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RagError;

/// A categorical answer to a yes/no/maybe question.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Yes,
    No,
    Maybe,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Yes => "yes",
            Verdict::No => "no",
            Verdict::Maybe => "maybe",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses an exact label (`yes`, `no`, `maybe`, any case), as found in
/// labeled datasets. Free text goes through [`interpret_forced_choice`].
impl FromStr for Verdict {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" => Ok(Verdict::Yes),
            "no" => Ok(Verdict::No),
            "maybe" => Ok(Verdict::Maybe),
            other => Err(RagError::Dataset(format!("unknown verdict label '{other}'"))),
        }
    }
}

/// Extract a verdict from a forced-choice response.
///
/// Only the first line is inspected, lower-cased: if it contains `"yes"` the
/// verdict is [`Verdict::Yes`]; otherwise if it contains `"no"` it is
/// [`Verdict::No`]; anything else is [`Verdict::Maybe`]. Matching is by
/// substring and `yes` is checked before `no`, so the rule is crude but
/// reproducible. Later lines never change the verdict.
pub fn interpret_forced_choice(raw_text: &str) -> Verdict {
    let first_line = raw_text.lines().next().unwrap_or_default().to_lowercase();
    if first_line.contains("yes") {
        Verdict::Yes
    } else if first_line.contains("no") {
        Verdict::No
    } else {
        Verdict::Maybe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_line_decides() {
        assert_eq!(interpret_forced_choice("Yes, based on the trials..."), Verdict::Yes);
        assert_eq!(interpret_forced_choice("No evidence supports this."), Verdict::No);
        assert_eq!(interpret_forced_choice("It is unclear from the abstracts."), Verdict::Maybe);
    }

    #[test]
    fn yes_wins_over_no_on_the_same_line() {
        assert_eq!(interpret_forced_choice("yes - no adverse events"), Verdict::Yes);
    }

    #[test]
    fn later_lines_are_ignored() {
        let text = "Maybe.\nNo information needed beyond the abstracts.";
        assert_eq!(interpret_forced_choice(text), Verdict::Maybe);
        assert_eq!(interpret_forced_choice("Yes\nno information needed"), Verdict::Yes);
    }

    #[test]
    fn empty_response_is_maybe() {
        assert_eq!(interpret_forced_choice(""), Verdict::Maybe);
    }

    #[test]
    fn labels_parse_case_insensitively() {
        assert_eq!("YES".parse::<Verdict>().unwrap(), Verdict::Yes);
        assert_eq!(" maybe ".parse::<Verdict>().unwrap(), Verdict::Maybe);
        assert!("perhaps".parse::<Verdict>().is_err());
    }
}
