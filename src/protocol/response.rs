use crate::ClientError;

use super::SUCCESS_STATUSES;

/// Status line received from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: String,
    pub message: String,
    /// A data block follows the status line.
    pub has_output: bool,
}

impl Response {
    pub fn is_success(&self) -> bool {
        SUCCESS_STATUSES.contains(&self.status.as_str())
    }
}

impl TryFrom<&str> for Response {
    type Error = ClientError;

    fn try_from(line: &str) -> Result<Self, Self::Error> {
        let line = line.trim();
        let invalid = || {
            ClientError::protocol(format!(
                "response should begin with status string like `OK`. Found: `{line}`"
            ))
        };

        let status_len = line
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(line.len());
        if status_len == 0 {
            return Err(invalid());
        }

        let (status, rest) = line.split_at(status_len);
        let body = match rest.strip_prefix(['.', ':', '!']) {
            Some(body) => body,
            None => return Err(invalid()),
        };

        let has_output = body.ends_with(':');
        let message = body.strip_suffix(':').unwrap_or(body).trim();

        Ok(Self {
            status: status.to_string(),
            message: message.to_string(),
            has_output,
        })
    }
}
