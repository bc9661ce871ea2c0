//! Tokens exchanged between a controlling device and the server.
//!
//! Every datagram carries exactly one token as UTF-8 text with no newline.
//! The handshake reply may carry the server address after a colon.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use shared::error::{Error, Result};

const UP: &str = "astv_up";
const DOWN: &str = "astv_down";
const LEFT: &str = "astv_left";
const RIGHT: &str = "astv_right";
const DISCONNECT: &str = "astv_disconnect";
const DISCOVER: &str = "astv_discover";
const SHAKE: &str = "astv_shake";
const ACK: &str = "astv_ack";
const GREET: &str = "astv_greet";

/// A navigation input forwarded to the server's keyboard sink.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        };
        f.write_str(s)
    }
}

/// One application datagram.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Token {
    Direction(Direction),
    Disconnect,
    Discover,
    /// Handshake reply, optionally carrying the server's address.
    Shake(Option<Ipv4Addr>),
    Ack,
    Greet,
}

impl Token {
    pub fn as_direction(&self) -> Option<Direction> {
        match self {
            Token::Direction(direction) => Some(*direction),
            _ => None,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    /// Parses a received datagram. Trailing whitespace is ignored.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::ErrInvalidToken(String::from_utf8_lossy(data).into_owned()))?;
        text.trim_end().parse()
    }
}

impl From<Direction> for Token {
    fn from(direction: Direction) -> Self {
        Token::Direction(direction)
    }
}

impl FromStr for Token {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let token = match s {
            UP => Token::Direction(Direction::Up),
            DOWN => Token::Direction(Direction::Down),
            LEFT => Token::Direction(Direction::Left),
            RIGHT => Token::Direction(Direction::Right),
            DISCONNECT => Token::Disconnect,
            DISCOVER => Token::Discover,
            SHAKE => Token::Shake(None),
            ACK => Token::Ack,
            GREET => Token::Greet,
            _ => match s.strip_prefix(SHAKE).and_then(|rest| rest.strip_prefix(':')) {
                Some(addr) => Token::Shake(Some(
                    addr.parse()
                        .map_err(|_| Error::ErrInvalidToken(s.to_owned()))?,
                )),
                None => return Err(Error::ErrInvalidToken(s.to_owned())),
            },
        };
        Ok(token)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Direction(Direction::Up) => f.write_str(UP),
            Token::Direction(Direction::Down) => f.write_str(DOWN),
            Token::Direction(Direction::Left) => f.write_str(LEFT),
            Token::Direction(Direction::Right) => f.write_str(RIGHT),
            Token::Disconnect => f.write_str(DISCONNECT),
            Token::Discover => f.write_str(DISCOVER),
            Token::Shake(None) => f.write_str(SHAKE),
            Token::Shake(Some(addr)) => write!(f, "{SHAKE}:{addr}"),
            Token::Ack => f.write_str(ACK),
            Token::Greet => f.write_str(GREET),
        }
    }
}
