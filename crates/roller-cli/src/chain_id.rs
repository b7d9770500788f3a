use std::{
    fmt,
    str::FromStr,
};

use once_cell::sync::Lazy;
use regex::Regex;

const MAX_ROLLAPP_ID_LEN: usize = 48;

static ROLLAPP_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-z]+)_([1-9][0-9]*)-([1-9][0-9]*)$")
        .expect("rollapp ID pattern is a valid regex")
});

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub(crate) enum RollappIdError {
    #[error("rollapp ID is empty")]
    Empty,
    #[error("rollapp ID must be at most {MAX_ROLLAPP_ID_LEN} characters long, got {0}")]
    TooLong(usize),
    #[error(
        "rollapp ID must have the form `<name>_<eip155 chain number>-<revision>`, e.g. \
         `mars_9000-1`"
    )]
    Format,
}

/// A validated RollApp chain ID of the form `<name>_<eip155>-<revision>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RollappId(String);

impl RollappId {
    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RollappId {
    type Err = RollappIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(RollappIdError::Empty);
        }
        if s.len() > MAX_ROLLAPP_ID_LEN {
            return Err(RollappIdError::TooLong(s.len()));
        }
        let captures = ROLLAPP_ID.captures(s).ok_or(RollappIdError::Format)?;
        // the eip155 chain number and the revision must fit the chain's integer types
        for number in [&captures[2], &captures[3]] {
            number
                .parse::<u64>()
                .map_err(|_| RollappIdError::Format)?;
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for RollappId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
