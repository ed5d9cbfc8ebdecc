//! Recipient list parsing and shuffling.

use crate::error::{Error, Result};
use rand::seq::SliceRandom;
use std::fmt;

/// One (email, display-name) target of a send.
///
/// Immutable once parsed; consumed exactly once by the dispatch engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    /// Email address.
    pub email: String,
    /// Display name, when the input line carried one.
    pub name: Option<String>,
}

impl Recipient {
    /// Returns the display name, falling back to the email address.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.email)
    }

    /// Parses one input line.
    ///
    /// Formats, in priority order:
    /// 1. `Name <email>`
    /// 2. `email<TAB>Name`
    /// 3. bare email (anything containing `@`)
    ///
    /// # Errors
    ///
    /// Returns [`Error::RecipientLine`] when no email is extractable.
    /// This is fatal: a line without an address means the input file is
    /// corrupt, not that one recipient is bad.
    pub fn parse_line(line: &str) -> Result<Self> {
        let line = line.trim();

        // Name <email>
        if let (Some(open), Some(close)) = (line.find('<'), line.rfind('>'))
            && open < close
        {
            let email = line[open + 1..close].trim();
            if email.contains('@') {
                let name = line[..open].trim().trim_matches('"').trim();
                return Ok(Self {
                    email: email.to_string(),
                    name: (!name.is_empty()).then(|| name.to_string()),
                });
            }
        }

        // email<TAB>Name
        if let Some((email, name)) = line.split_once('\t') {
            let email = email.trim();
            if email.contains('@') {
                let name = name.trim();
                return Ok(Self {
                    email: email.to_string(),
                    name: (!name.is_empty()).then(|| name.to_string()),
                });
            }
        }

        // Bare email
        if line.contains('@') {
            return Ok(Self {
                email: line.to_string(),
                name: None,
            });
        }

        Err(Error::RecipientLine(line.to_string()))
    }

    /// Parses a whole recipient list, one entry per line.
    ///
    /// Blank lines are skipped.
    ///
    /// # Errors
    ///
    /// Returns the first fatal line error encountered.
    pub fn parse_all(input: &str) -> Result<Vec<Self>> {
        input
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(Self::parse_line)
            .collect()
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} <{}>", self.email),
            None => write!(f, "{}", self.email),
        }
    }
}

/// Shuffles the recipient set with a uniform random permutation.
///
/// Batch-level: applied once before dispatch begins.
pub fn shuffle(recipients: &mut [Recipient]) {
    recipients.shuffle(&mut rand::thread_rng());
}
