//! Client command parsing.

use std::str::FromStr;

use crate::{ClientId, Envelope, ProtocolError};

/// A dice request in the notation users type after `/roll`.
///
/// Accepts `NdS` (`N` dice with `S` sides, e.g. `2d6`) or a bare `S`
/// (one die with `S` sides).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollRequest {
    /// Number of dice.
    pub rolls: u32,
    /// Sides per die.
    pub sides: u32,
}

impl RollRequest {
    /// Parses dice notation.
    ///
    /// # Errors
    /// `ProtocolError::InvalidMessage` for anything that is not `NdS` or
    /// `S` with positive integers.
    pub fn parse(input: &str) -> Result<Self, ProtocolError> {
        let input = input.trim();
        let invalid =
            || ProtocolError::InvalidMessage(format!("bad dice: {input:?}"));

        let (rolls, sides) = match input.split_once(['d', 'D']) {
            Some((rolls, sides)) => (
                rolls.parse::<u32>().map_err(|_| invalid())?,
                sides.parse::<u32>().map_err(|_| invalid())?,
            ),
            None => (1, input.parse::<u32>().map_err(|_| invalid())?),
        };
        if rolls == 0 || sides == 0 {
            return Err(invalid());
        }
        Ok(Self { rolls, sides })
    }

    /// The `ROLL` envelope a client sends for this request.
    pub fn into_envelope(self) -> Envelope {
        Envelope::Roll {
            id: ClientId::SERVER,
            text: String::new(),
            sides: self.sides,
            rolls: self.rolls,
            total: None,
        }
    }
}

impl FromStr for RollRequest {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
