use serde::Serialize;

/// Broad cause of a failed submission, used to pick the panel message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureClass {
    Server,
    Network,
    Validation,
    Other,
}

const SERVER_STATUSES: &[&str] = &["500", "502", "503", "504"];
const SERVER_MARKERS: &[&str] = &["internal server error"];
const NETWORK_MARKERS: &[&str] = &["fetch", "network", "connection", "connect", "timed out"];
const VALIDATION_STATUSES: &[&str] = &["400", "422"];
const VALIDATION_MARKERS: &[&str] = &["validation", "invalid", "required"];

impl FailureClass {
    pub fn classify(raw: &str) -> Self {
        let lowered = raw.to_lowercase();
        let has = |markers: &[&str]| markers.iter().any(|marker| lowered.contains(marker));
        // Status codes only count as standalone numbers, not inside ids or counts.
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|token| !token.is_empty())
            .collect();
        let has_status = |codes: &[&str]| tokens.iter().any(|token| codes.contains(token));

        if has_status(SERVER_STATUSES) || has(SERVER_MARKERS) {
            FailureClass::Server
        } else if has(NETWORK_MARKERS) {
            FailureClass::Network
        } else if has_status(VALIDATION_STATUSES) || has(VALIDATION_MARKERS) {
            FailureClass::Validation
        } else {
            FailureClass::Other
        }
    }

    /// Text shown on the failure panel.
    pub fn user_message(&self, raw: &str) -> String {
        match self {
            FailureClass::Server => {
                "Backend server error. Please check server logs and try again.".to_string()
            }
            FailureClass::Network => {
                "Cannot connect to the billing backend. Make sure it is running.".to_string()
            }
            FailureClass::Validation => format!("The entry was rejected: {raw}"),
            FailureClass::Other => raw.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_error_text() {
        assert_eq!(FailureClass::classify("HTTP 500 Internal Server Error"), FailureClass::Server);
        assert_eq!(FailureClass::classify("error trying to connect: refused"), FailureClass::Network);
        assert_eq!(FailureClass::classify("operation timed out"), FailureClass::Network);
        assert_eq!(FailureClass::classify("422: hours is required"), FailureClass::Validation);
        assert_eq!(FailureClass::classify("disk full"), FailureClass::Other);
    }

    #[test]
    fn status_codes_must_stand_alone() {
        assert_eq!(FailureClass::classify("status 503"), FailureClass::Server);
        assert_eq!(FailureClass::classify("(400) bad request"), FailureClass::Validation);
        assert_eq!(FailureClass::classify("note exceeds 1500 characters"), FailureClass::Other);
        assert_eq!(FailureClass::classify("entry 5004a already exists"), FailureClass::Other);
        assert_eq!(FailureClass::classify("matter 4001 is closed"), FailureClass::Other);
    }

    #[test]
    fn messages_keep_detail_where_useful() {
        assert_eq!(
            FailureClass::Validation.user_message("subject is invalid"),
            "The entry was rejected: subject is invalid"
        );
        assert_eq!(FailureClass::Other.user_message("disk full"), "disk full");
        assert!(FailureClass::Network
            .user_message("connection refused")
            .starts_with("Cannot connect"));
    }
}
