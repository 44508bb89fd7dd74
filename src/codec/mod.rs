//! Wire format for referral records and the referral index.
//!
//! Both are UTF-8 JSON. A record is stored without its id (the id lives in the
//! ledger key); the index is a plain array of ids.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::DecodeError;
use crate::referral::{Referral, ReferralId, ReferralStatus};

#[derive(Serialize, Deserialize)]
struct StoredRecord {
    data: String,
    timestamp: u64,
    referrer: String,
    position: String,
    // older records were written before status existed, or with a blank one
    #[serde(default, deserialize_with = "status_or_pending")]
    status: ReferralStatus,
}

fn status_or_pending<'de, D>(deserializer: D) -> Result<ReferralStatus, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Status(ReferralStatus),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(ReferralStatus::Pending),
        Some(Raw::Status(status)) => Ok(status),
        Some(Raw::Text(text)) if text.is_empty() => Ok(ReferralStatus::Pending),
        Some(Raw::Text(text)) => Err(serde::de::Error::unknown_variant(
            &text,
            &["pending", "matched", "rejected"],
        )),
    }
}

pub fn encode_referral(referral: &Referral) -> Vec<u8> {
    let record = StoredRecord {
        data: referral.encrypted_data.clone(),
        timestamp: referral.timestamp,
        referrer: referral.referrer.clone(),
        position: referral.position.clone(),
        status: referral.status,
    };
    to_json(&record)
}

pub fn decode_referral(id: &str, bytes: &[u8]) -> Result<Referral, DecodeError> {
    let text = std::str::from_utf8(bytes)?;
    let record: StoredRecord = serde_json::from_str(text)?;
    Ok(Referral {
        id: id.to_string(),
        encrypted_data: record.data,
        timestamp: record.timestamp,
        referrer: record.referrer,
        position: record.position,
        status: record.status,
    })
}

pub fn encode_index(ids: &[ReferralId]) -> Vec<u8> {
    to_json(&ids)
}

pub fn decode_index(bytes: &[u8]) -> Result<Vec<ReferralId>, DecodeError> {
    let text = std::str::from_utf8(bytes)?;
    Ok(serde_json::from_str(text)?)
}

fn to_json<T: Serialize>(value: &T) -> Vec<u8> {
    // strings and integers only; serialization cannot fail
    serde_json::to_vec(value).expect("record encode")
}
