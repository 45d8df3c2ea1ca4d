// Command payloads
//
// Pure encode/decode of the ASCII payloads carried inside frames. Each
// `Request` knows how to render itself and how to interpret the matching
// response; nothing here performs I/O.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{Error, ProtocolError};
use crate::frame::{Frame, MAX_PAYLOAD};

/// Register bank a parameter lives in.
///
/// `Mp` registers hold measured values and can be fetched in bulk;
/// `Sp` registers hold settings and are read one at a time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display, strum::IntoStaticStr,
)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Bank {
    Sp,
    Mp,
}

impl Bank {
    /// Command word of the bank, as it appears on the wire.
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Address of a single device parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Register {
    pub bank: Bank,
    pub number: u16,
}

impl Register {
    pub const fn sp(number: u16) -> Self {
        Self {
            bank: Bank::Sp,
            number,
        }
    }

    pub const fn mp(number: u16) -> Self {
        Self {
            bank: Bank::Mp,
            number,
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},NR={}", self.bank, self.number)
    }
}

/// Date/time as reported by the device clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceClock {
    pub datetime: NaiveDateTime,
    /// Day of week, 1 = Monday .. 7 = Sunday.
    pub weekday: u32,
}

/// A request the session can send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Login,
    Logout,
    Read(Register),
    Write { register: Register, raw: i64 },
    BulkRead(Vec<u16>),
    ReadClock,
    SetClock(NaiveDateTime),
}

/// A decoded, successful response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ack,
    Value { register: Register, raw: i64 },
    Bulk(BTreeMap<u16, i64>),
    Clock(DeviceClock),
}

impl Request {
    /// Short operation name used in logs and timeout errors.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Logout => "logout",
            Self::Read(_) => "read",
            Self::Write { .. } => "write",
            Self::BulkRead(_) => "bulk read",
            Self::ReadClock => "read clock",
            Self::SetClock(_) => "set clock",
        }
    }

    /// Render the ASCII payload for this request.
    pub fn payload(&self) -> String {
        match self {
            Self::Login => "LIN;".to_owned(),
            Self::Logout => "LOUT;".to_owned(),
            Self::Read(register) => format!("{register};"),
            Self::Write { register, raw } => format!("{register},VAL={raw};"),
            Self::BulkRead(numbers) => {
                let mut out = String::from("MR");
                for n in numbers {
                    out.push(',');
                    out.push_str(&n.to_string());
                }
                out.push(';');
                out
            }
            Self::ReadClock => "CLK;".to_owned(),
            Self::SetClock(dt) => format!(
                "CLK,DA={},TI={},WD={};",
                dt.format("%d.%m.%y"),
                dt.format("%H:%M:%S"),
                dt.weekday().number_from_monday()
            ),
        }
    }

    /// Encode this request into a frame, failing if it is too long.
    pub fn encode(&self) -> Result<Frame, Error> {
        let payload = self.payload();
        if payload.len() > MAX_PAYLOAD {
            return Err(Error::PayloadTooLong {
                len: payload.len(),
                max: MAX_PAYLOAD,
            });
        }
        Ok(Frame::request(payload))
    }

    /// Interpret a response frame in the context of this request.
    pub fn decode_response(&self, frame: &Frame) -> Result<Response, Error> {
        let fields = Fields::parse(frame.text()?)?;

        if fields.command == "ERR" {
            let code = fields.positional(0).unwrap_or("?").to_owned();
            return Err(match self {
                Self::Login => Error::Authentication {
                    message: format!("device answered ERR (code {code})"),
                },
                _ => ProtocolError::DeviceFault { code }.into(),
            });
        }

        match self {
            Self::Login | Self::Logout => {
                fields.expect_command("OK")?;
                Ok(Response::Ack)
            }
            Self::Read(register) | Self::Write { register, .. } => {
                fields.expect_command(register.bank.as_str())?;
                let number: u16 = fields.parse_named("NR")?;
                if number != register.number {
                    return Err(ProtocolError::UnexpectedResponse {
                        expected: register.to_string(),
                        got: fields.raw.to_owned(),
                    }
                    .into());
                }
                let raw: i64 = fields.parse_named("VAL")?;
                Ok(Response::Value {
                    register: *register,
                    raw,
                })
            }
            Self::BulkRead(_) => {
                fields.expect_command("MA")?;
                let mut values = BTreeMap::new();
                for (key, value) in &fields.named {
                    let number = key.parse::<u16>().map_err(|_| malformed(key, fields.raw))?;
                    let raw = value.parse::<i64>().map_err(|_| malformed(value, fields.raw))?;
                    values.insert(number, raw);
                }
                Ok(Response::Bulk(values))
            }
            Self::ReadClock | Self::SetClock(_) => {
                fields.expect_command("CLK")?;
                Ok(Response::Clock(parse_clock(&fields)?))
            }
        }
    }
}

fn malformed(token: &str, payload: &str) -> Error {
    ProtocolError::Malformed {
        reason: format!("cannot parse '{token}' in '{payload}'"),
    }
    .into()
}

fn parse_clock(fields: &Fields<'_>) -> Result<DeviceClock, Error> {
    let date = fields.named("DA")?;
    let time = fields.named("TI")?;
    let date =
        NaiveDate::parse_from_str(date, "%d.%m.%y").map_err(|_| malformed(date, fields.raw))?;
    let time =
        NaiveTime::parse_from_str(time, "%H:%M:%S").map_err(|_| malformed(time, fields.raw))?;
    let weekday: u32 = fields.parse_named("WD")?;
    if !(1..=7).contains(&weekday) {
        return Err(malformed(&weekday.to_string(), fields.raw));
    }
    Ok(DeviceClock {
        datetime: date.and_time(time),
        weekday,
    })
}

/// Tokenised payload: `CMD,positional,...,KEY=VALUE,...;`
struct Fields<'a> {
    raw: &'a str,
    command: &'a str,
    positional: Vec<&'a str>,
    named: Vec<(&'a str, &'a str)>,
}

impl<'a> Fields<'a> {
    fn parse(raw: &'a str) -> Result<Self, Error> {
        let body = raw.strip_suffix(';').ok_or_else(|| ProtocolError::Malformed {
            reason: format!("missing terminator in '{raw}'"),
        })?;
        let mut tokens = body.split(',');
        let command = tokens.next().unwrap_or_default().trim();
        if command.is_empty() || !command.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ProtocolError::Malformed {
                reason: format!("no command word in '{raw}'"),
            }
            .into());
        }

        let mut positional = Vec::new();
        let mut named = Vec::new();
        for token in tokens {
            match token.split_once('=') {
                Some((k, v)) => named.push((k.trim(), v.trim())),
                None => positional.push(token.trim()),
            }
        }

        Ok(Self {
            raw,
            command,
            positional,
            named,
        })
    }

    fn expect_command(&self, expected: &str) -> Result<(), Error> {
        if self.command == expected {
            Ok(())
        } else {
            Err(ProtocolError::UnexpectedResponse {
                expected: expected.to_owned(),
                got: self.raw.to_owned(),
            }
            .into())
        }
    }

    fn positional(&self, idx: usize) -> Option<&'a str> {
        self.positional.get(idx).copied()
    }

    fn named(&self, key: &str) -> Result<&'a str, Error> {
        self.named
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
            .ok_or_else(|| {
                ProtocolError::Malformed {
                    reason: format!("missing field {key} in '{}'", self.raw),
                }
                .into()
            })
    }

    fn parse_named<T: std::str::FromStr>(&self, key: &str) -> Result<T, Error> {
        let value = self.named(key)?;
        value.parse().map_err(|_| malformed(value, self.raw))
    }
}
