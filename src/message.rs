//! The four-message protocol and its wire format.
//!
//! Each message is the concatenation, with `*` as separator, of a single
//! character type code, the sender id in decimal, and a body. The body is
//! empty for everything but `Advise`, whose body is the three comma
//! separated fields `sender_holder,sender_in_my_queue,sender_asked`, with
//! the two booleans spelled out as the literal words `True` / `False`. This
//! framing matches the reference broker exactly so a compatible transport
//! could be swapped in without touching `Node`.

use crate::error::CodecError;

pub type NodeId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    Request {
        from: NodeId,
    },
    Assign {
        from: NodeId,
    },
    Restart {
        from: NodeId,
    },
    Advise {
        from: NodeId,
        sender_holder: NodeId,
        sender_in_my_queue: bool,
        sender_asked: bool,
    },
}

impl Message {
    pub fn from(&self) -> NodeId {
        match *self {
            Message::Request { from }
            | Message::Assign { from }
            | Message::Restart { from }
            | Message::Advise { from, .. } => from,
        }
    }

    fn type_code(&self) -> char {
        match self {
            Message::Request { .. } => 'R',
            Message::Assign { .. } => 'A',
            Message::Restart { .. } => 'S',
            Message::Advise { .. } => 'D',
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let body = match self {
            Message::Advise {
                sender_holder,
                sender_in_my_queue,
                sender_asked,
                ..
            } => format!(
                "{},{},{}",
                sender_holder,
                bool_word(*sender_in_my_queue),
                bool_word(*sender_asked)
            ),
            _ => String::new(),
        };
        format!("{}*{}*{}", self.type_code(), self.from(), body).into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let text = String::from_utf8_lossy(bytes);
        let mut parts = text.splitn(3, '*');
        let type_code = parts.next().ok_or(CodecError::Truncated)?;
        let sender = parts.next().ok_or(CodecError::Truncated)?;
        let body = parts.next().ok_or(CodecError::Truncated)?;

        let mut chars = type_code.chars();
        let type_code = chars.next().ok_or(CodecError::Truncated)?;
        if chars.next().is_some() {
            return Err(CodecError::UnknownType(type_code));
        }

        let from: NodeId = sender
            .parse()
            .map_err(|_| CodecError::InvalidSenderId(sender.to_string()))?;

        match type_code {
            'R' => Ok(Message::Request { from }),
            'A' => Ok(Message::Assign { from }),
            'S' => Ok(Message::Restart { from }),
            'D' => {
                let mut fields = body.splitn(3, ',');
                let holder = fields
                    .next()
                    .ok_or_else(|| CodecError::MalformedAdviseBody(body.to_string()))?;
                let in_queue = fields
                    .next()
                    .ok_or_else(|| CodecError::MalformedAdviseBody(body.to_string()))?;
                let asked = fields
                    .next()
                    .ok_or_else(|| CodecError::MalformedAdviseBody(body.to_string()))?;

                let sender_holder: NodeId = holder
                    .parse()
                    .map_err(|_| CodecError::InvalidSenderId(holder.to_string()))?;
                Ok(Message::Advise {
                    from,
                    sender_holder,
                    sender_in_my_queue: parse_bool(in_queue)?,
                    sender_asked: parse_bool(asked)?,
                })
            },
            other => Err(CodecError::UnknownType(other)),
        }
    }
}

fn bool_word(b: bool) -> &'static str {
    if b { "True" } else { "False" }
}

fn parse_bool(s: &str) -> Result<bool, CodecError> {
    match s {
        "True" => Ok(true),
        "False" => Ok(false),
        other => Err(CodecError::InvalidBool(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips() {
        let msg = Message::Request { from: 7 };
        assert_eq!(msg.encode(), b"R*7*");
        assert_eq!(Message::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn assign_round_trips() {
        let msg = Message::Assign { from: 3 };
        assert_eq!(Message::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn restart_round_trips() {
        let msg = Message::Restart { from: 1 };
        assert_eq!(Message::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn advise_round_trips_with_exact_wire_layout() {
        let msg = Message::Advise {
            from: 4,
            sender_holder: 5,
            sender_in_my_queue: true,
            sender_asked: false,
        };
        assert_eq!(msg.encode(), b"D*4*5,True,False");
        assert_eq!(Message::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn decode_rejects_unknown_type() {
        assert_eq!(
            Message::decode(b"Z*1*"),
            Err(CodecError::UnknownType('Z'))
        );
    }

    #[test]
    fn decode_rejects_non_integer_sender() {
        assert!(matches!(
            Message::decode(b"R*x*"),
            Err(CodecError::InvalidSenderId(_))
        ));
    }

    #[test]
    fn decode_rejects_malformed_advise_body() {
        assert!(matches!(
            Message::decode(b"D*1*5,True"),
            Err(CodecError::MalformedAdviseBody(_))
        ));
    }

    #[test]
    fn decode_rejects_bad_boolean_word() {
        assert!(matches!(
            Message::decode(b"D*1*5,maybe,False"),
            Err(CodecError::InvalidBool(_))
        ));
    }
}
