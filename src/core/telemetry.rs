//! Telemetry record decoding.
//!
//! A record is a flat key/value object:
//! `{"bpm":72,"hrv":41.5,"temp":33.1,"acc_x":0.1,"acc_y":9.7,"acc_z":0.4,"bvp":12.0,"finger":1}`.
//! Firmware builds differ in quoting, so bare keys such as `{bpm:72,finger:1}`
//! are read the same way.
//! Individual fields are lenient: a missing or unparseable number becomes NaN
//! instead of rejecting the record. Only a message that is not a key/value
//! object at all is a decode error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Whether the band is in contact with skin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WearState {
    Worn,
    NotWorn,
}

/// Coarse movement classification derived from acceleration magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionLevel {
    Still,
    Moving,
    MovingFast,
    Unknown,
}

impl MotionLevel {
    pub fn from_magnitude(acc_mag: f64) -> Self {
        if acc_mag.is_nan() {
            MotionLevel::Unknown
        } else if acc_mag < 0.5 {
            MotionLevel::Still
        } else if acc_mag < 2.5 {
            MotionLevel::Moving
        } else {
            MotionLevel::MovingFast
        }
    }
}

/// One decoded telemetry record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Time the record was decoded on this side of the link
    pub timestamp: DateTime<Utc>,
    /// Heart rate (beats per minute)
    pub bpm: f64,
    /// Heart rate variability (ms)
    pub hrv: f64,
    /// Skin temperature (°C)
    pub temp: f64,
    pub acc_x: f64,
    pub acc_y: f64,
    pub acc_z: f64,
    /// Blood volume pulse amplitude, when the band reports it
    pub bvp: Option<f64>,
    pub wear: WearState,
    /// Euclidean norm of the three acceleration axes (not transmitted)
    pub acc_mag: f64,
}

impl TelemetrySample {
    pub fn is_worn(&self) -> bool {
        self.wear == WearState::Worn
    }

    pub fn motion(&self) -> MotionLevel {
        MotionLevel::from_magnitude(self.acc_mag)
    }
}

/// A message that could not be read as a key/value record.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeError {
    /// The message exactly as it was reassembled
    pub raw: String,
    pub reason: String,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Undecodable telemetry record ({}): {}", self.reason, self.raw)
    }
}

impl std::error::Error for DecodeError {}

/// Decode a message, stamping it with the current time.
pub fn decode(message: &str) -> Result<TelemetrySample, DecodeError> {
    decode_at(message, Utc::now())
}

/// Decode a message with an explicit timestamp.
pub fn decode_at(message: &str, timestamp: DateTime<Utc>) -> Result<TelemetrySample, DecodeError> {
    let fields = read_fields(message).map_err(|reason| DecodeError {
        raw: message.to_string(),
        reason,
    })?;

    let acc_x = number(&fields, "acc_x");
    let acc_y = number(&fields, "acc_y");
    let acc_z = number(&fields, "acc_z");
    let bvp = Some(number(&fields, "bvp")).filter(|v| !v.is_nan());

    Ok(TelemetrySample {
        timestamp,
        bpm: number(&fields, "bpm"),
        hrv: number(&fields, "hrv"),
        temp: number(&fields, "temp"),
        acc_x,
        acc_y,
        acc_z,
        bvp,
        wear: wear_state(fields.get("finger")),
        acc_mag: (acc_x * acc_x + acc_y * acc_y + acc_z * acc_z).sqrt(),
    })
}

/// A key or value as written in the record.
struct Token {
    text: String,
    quoted: bool,
}

/// Read a flat `{key: value, ...}` record.
///
/// Keys may be quoted or bare, pairs may be separated by `,` or `;` and keys
/// from values by `:`, `=` or `=>`. Quoted values stay strings; bare values
/// are read as JSON scalars when they parse and kept as text otherwise.
fn read_fields(message: &str) -> Result<Map<String, Value>, String> {
    let body = message
        .trim()
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .ok_or_else(|| "not a braced record".to_string())?;

    let mut fields = Map::new();
    let mut rest = body.trim_start();
    while !rest.is_empty() {
        let (key, after) = token(rest, |c| matches!(c, ':' | '=' | ',' | ';'))?;
        if key.text.is_empty() {
            return Err("empty key".to_string());
        }
        let Some(after) = after.trim_start().strip_prefix(|c: char| c == ':' || c == '=') else {
            return Err(format!("no value for key '{}'", key.text));
        };
        let after = after.strip_prefix('>').unwrap_or(after);

        let (value, after) = token(after, |c| c == ',' || c == ';')?;
        fields.insert(key.text, scalar(value));

        rest = after.trim_start();
        match rest.chars().next() {
            None => break,
            Some(',' | ';') => rest = rest[1..].trim_start(),
            Some(other) => return Err(format!("unexpected '{other}' after value")),
        }
    }

    Ok(fields)
}

/// Read one quoted string or bare run of text ending at `delimiter`.
fn token(input: &str, delimiter: impl Fn(char) -> bool) -> Result<(Token, &str), String> {
    let input = input.trim_start();
    match input.chars().next() {
        Some(quote @ ('"' | '\'')) => {
            let (text, rest) = quoted(input, quote)?;
            Ok((Token { text, quoted: true }, rest))
        }
        Some('{' | '[') => Err("nested values are not supported".to_string()),
        _ => {
            let end = input.find(|c: char| delimiter(c)).unwrap_or(input.len());
            let text = input[..end].trim_end().to_string();
            Ok((Token { text, quoted: false }, &input[end..]))
        }
    }
}

/// `input` starts at the opening quote.
fn quoted(input: &str, quote: char) -> Result<(String, &str), String> {
    let mut escaped = false;
    for (i, c) in input.char_indices().skip(1) {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            let literal = &input[..=i];
            let text = if quote == '"' {
                serde_json::from_str::<String>(literal).map_err(|e| e.to_string())?
            } else {
                literal[1..literal.len() - 1].to_string()
            };
            return Ok((text, &input[i + 1..]));
        }
    }
    Err("unterminated string".to_string())
}

fn scalar(token: Token) -> Value {
    if token.quoted {
        return Value::String(token.text);
    }
    serde_json::from_str::<Value>(&token.text)
        .ok()
        .filter(|v| !v.is_object() && !v.is_array())
        .unwrap_or_else(|| Value::String(token.text))
}

/// Read a numeric field, accepting numbers and numeric strings.
fn number(fields: &Map<String, Value>, key: &str) -> f64 {
    match fields.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

/// `finger == 1` means worn; anything else, including absence or a boolean,
/// is not worn.
fn wear_state(value: Option<&Value>) -> WearState {
    let worn = match value {
        Some(Value::Number(n)) => n.as_f64() == Some(1.0),
        Some(Value::String(s)) => s.trim().parse::<f64>() == Ok(1.0),
        _ => false,
    };

    if worn {
        WearState::Worn
    } else {
        WearState::NotWorn
    }
}
