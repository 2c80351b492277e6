//! ---
//! ps_section: "05-networking-external-interfaces"
//! ps_subsection: "protocol"
//! ps_type: "source"
//! ps_scope: "code"
//! ps_description: "Request and reply shapes exchanged with field-device transports."
//! ps_version: "v0.1.0"
//! ps_owner: "tbd"
//! ---
use std::fmt;

use indexmap::IndexMap;
use provsim_sim::{Kind, Value};

use crate::error::ProviderError;

pub const WRITE_SUCCESS: &str = "Success processing simulation write command";

const TRUE_TOKENS: [&str; 5] = ["True", "true", "1", "on", "yes"];
const FALSE_TOKENS: [&str; 5] = ["False", "false", "0", "off", "no"];

/// Operation requested by a field-device transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Query,
    Read { tag: String },
    /// Tag to textual value, applied in insertion order.
    Write { values: IndexMap<String, String> },
}

impl Request {
    pub fn read(tag: impl Into<String>) -> Self {
        Request::Read { tag: tag.into() }
    }

    pub fn write<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Request::Write {
            values: values
                .into_iter()
                .map(|(tag, value)| (tag.into(), value.into()))
                .collect(),
        }
    }

    /// Short operation name used for logs and metrics labels.
    pub fn op(&self) -> &'static str {
        match self {
            Request::Query => "query",
            Request::Read { .. } => "read",
            Request::Write { .. } => "write",
        }
    }
}

/// Textual outcome returned to the transport: `ACK=<body>` or `ERR=<body>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ack(String),
    Err(String),
}

impl Reply {
    pub fn is_ack(&self) -> bool {
        matches!(self, Reply::Ack(_))
    }

    pub fn body(&self) -> &str {
        match self {
            Reply::Ack(body) | Reply::Err(body) => body,
        }
    }
}

impl From<ProviderError> for Reply {
    fn from(err: ProviderError) -> Self {
        Reply::Err(err.to_string())
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ack(body) => write!(f, "ACK={body}"),
            Reply::Err(body) => write!(f, "ERR={body}"),
        }
    }
}

/// Convert the textual `token` written to `tag` into a value of `kind`.
pub fn parse_token(tag: &str, token: &str, kind: Kind) -> Result<Value, ProviderError> {
    let conversion = || ProviderError::Conversion {
        tag: tag.to_owned(),
        kind,
        value: token.to_owned(),
    };
    match kind {
        Kind::Binary => {
            if TRUE_TOKENS.contains(&token) {
                Ok(Value::Binary(true))
            } else if FALSE_TOKENS.contains(&token) {
                Ok(Value::Binary(false))
            } else {
                Err(conversion())
            }
        }
        Kind::Analog => match token.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(Value::Analog(value)),
            _ => Err(conversion()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_token_table() {
        for token in TRUE_TOKENS {
            assert_eq!(parse_token("on.status", token, Kind::Binary).unwrap(), Value::Binary(true));
        }
        for token in FALSE_TOKENS {
            assert_eq!(parse_token("on.status", token, Kind::Binary).unwrap(), Value::Binary(false));
        }
        for token in ["maybe", "TRUE", "Yes", "2", ""] {
            assert!(parse_token("on.status", token, Kind::Binary).is_err(), "{token}");
        }
    }

    #[test]
    fn analog_tokens_must_be_finite_numbers() {
        assert_eq!(
            parse_token("setpoint.value", "27", Kind::Analog).unwrap(),
            Value::Analog(27.0)
        );
        assert_eq!(
            parse_token("setpoint.value", " -3.5 ", Kind::Analog).unwrap(),
            Value::Analog(-3.5)
        );
        for token in ["warm", "NaN", "inf", ""] {
            let err = parse_token("setpoint.value", token, Kind::Analog).unwrap_err();
            assert!(err.to_string().contains("setpoint.value"));
        }
    }

    #[test]
    fn reply_display_prefixes() {
        assert_eq!(Reply::Ack("a.value:1.0".into()).to_string(), "ACK=a.value:1.0");
        let reply = Reply::from(ProviderError::NotWritable { tag: "x.value".into() });
        assert_eq!(
            reply.to_string(),
            "ERR=Provider failed to find writable tag x.value"
        );
        assert!(!reply.is_ack());
    }

    #[test]
    fn write_request_keeps_insertion_order() {
        let request = Request::write([("b.status", "on"), ("a.value", "1")]);
        let Request::Write { values } = &request else {
            panic!("expected write request");
        };
        assert_eq!(values.keys().collect::<Vec<_>>(), ["b.status", "a.value"]);
        assert_eq!(request.op(), "write");
    }
}
