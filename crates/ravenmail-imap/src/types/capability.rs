//! Tagged-response status and server capabilities.

/// Completion status of a tagged response or greeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Success.
    Ok,
    /// Operational failure.
    No,
    /// Protocol or syntax failure.
    Bad,
    /// Greeting for an already-authenticated connection.
    PreAuth,
    /// Server is closing the connection.
    Bye,
}

impl Status {
    /// Whether this status reports success.
    #[must_use]
    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok | Self::PreAuth)
    }
}

/// A capability advertised by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `IMAP4rev1` (RFC 3501)
    Imap4Rev1,
    /// `IMAP4rev2` (RFC 9051)
    Imap4Rev2,
    /// IDLE (RFC 2177)
    Idle,
    /// STARTTLS upgrade
    StartTls,
    /// LOGIN command refused until TLS
    LoginDisabled,
    /// LITERAL+ non-synchronizing literals (RFC 7888)
    LiteralPlus,
    /// UIDPLUS (RFC 4315)
    UidPlus,
    /// An AUTH= mechanism name
    Auth(String),
    /// Anything the engine does not model
    Unknown(String),
}

impl Capability {
    /// Parses a capability atom, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let upper = s.to_uppercase();
        match upper.as_str() {
            "IMAP4REV1" => Self::Imap4Rev1,
            "IMAP4REV2" => Self::Imap4Rev2,
            "IDLE" => Self::Idle,
            "STARTTLS" => Self::StartTls,
            "LOGINDISABLED" => Self::LoginDisabled,
            "LITERAL+" => Self::LiteralPlus,
            "UIDPLUS" => Self::UidPlus,
            _ => {
                if let Some(mech) = upper.strip_prefix("AUTH=") {
                    Self::Auth(mech.to_string())
                } else {
                    Self::Unknown(s.to_string())
                }
            }
        }
    }

    /// The mechanism name if this is an `AUTH=` capability.
    #[must_use]
    pub fn auth_mechanism(&self) -> Option<&str> {
        match self {
            Self::Auth(mech) => Some(mech),
            _ => None,
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Imap4Rev1 => write!(f, "IMAP4rev1"),
            Self::Imap4Rev2 => write!(f, "IMAP4rev2"),
            Self::Idle => write!(f, "IDLE"),
            Self::StartTls => write!(f, "STARTTLS"),
            Self::LoginDisabled => write!(f, "LOGINDISABLED"),
            Self::LiteralPlus => write!(f, "LITERAL+"),
            Self::UidPlus => write!(f, "UIDPLUS"),
            Self::Auth(mech) => write!(f, "AUTH={mech}"),
            Self::Unknown(s) => write!(f, "{s}"),
        }
    }
}
