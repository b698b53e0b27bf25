use std::collections::HashMap;

use thiserror::Error;
use uuid::Uuid;

const KIND: &str = "kind";
const EVENT_ID: &str = "event_id";
const CLUB_ID: &str = "club_id";
const USER_ID: &str = "user_id";

const KIND_EVENT_RSVP: &str = "event_rsvp";
const KIND_CLUB_MEMBERSHIP: &str = "club_membership";

/// Correlation ids attached to every checkout session so asynchronous
/// provider events can be matched back to local rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutMetadata {
    EventRsvp { event_id: Uuid, club_id: Uuid, user_id: Uuid },
    ClubMembership { club_id: Uuid, user_id: Uuid },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    #[error("metadata is missing `{0}`")]
    Missing(&'static str),
    #[error("metadata `{key}` is not a valid id: {value}")]
    Invalid { key: &'static str, value: String },
    #[error("unknown checkout kind `{0}`")]
    UnknownKind(String),
}

fn read_id(map: &HashMap<String, String>, key: &'static str) -> Result<Uuid, MetadataError> {
    let raw = map.get(key).ok_or(MetadataError::Missing(key))?;
    Uuid::parse_str(raw).map_err(|_| MetadataError::Invalid { key, value: raw.clone() })
}

impl CheckoutMetadata {
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        match self {
            CheckoutMetadata::EventRsvp { event_id, club_id, user_id } => vec![
                (KIND, KIND_EVENT_RSVP.to_string()),
                (EVENT_ID, event_id.to_string()),
                (CLUB_ID, club_id.to_string()),
                (USER_ID, user_id.to_string()),
            ],
            CheckoutMetadata::ClubMembership { club_id, user_id } => vec![
                (KIND, KIND_CLUB_MEMBERSHIP.to_string()),
                (CLUB_ID, club_id.to_string()),
                (USER_ID, user_id.to_string()),
            ],
        }
    }

    pub fn from_map(map: &HashMap<String, String>) -> Result<Self, MetadataError> {
        let kind = map.get(KIND).ok_or(MetadataError::Missing(KIND))?;
        match kind.as_str() {
            KIND_EVENT_RSVP => Ok(CheckoutMetadata::EventRsvp {
                event_id: read_id(map, EVENT_ID)?,
                club_id: read_id(map, CLUB_ID)?,
                user_id: read_id(map, USER_ID)?,
            }),
            KIND_CLUB_MEMBERSHIP => Ok(CheckoutMetadata::ClubMembership {
                club_id: read_id(map, CLUB_ID)?,
                user_id: read_id(map, USER_ID)?,
            }),
            other => Err(MetadataError::UnknownKind(other.to_string())),
        }
    }
}
