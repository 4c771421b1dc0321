//! Link address: the JSON blob two peers exchange out-of-band to
//! bootstrap a link.
//!
//! The address names the two buckets, the first object id of each chain,
//! and the windowing/retry parameters. It is written from the creator's
//! outside-facing perspective: `fetchBucket` is where the *loader* fetches
//! from, so the creator flips the pairs before using an address itself.

use serde::{Deserialize, Serialize};

use crate::error::{LinkError, LinkResult};

fn default_open_objects() -> usize {
    1
}

fn default_max_tries() -> u32 {
    120
}

/// Addressing and tuning parameters for one link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkAddress {
    /// Storage-service region hosting both buckets.
    pub region: String,
    /// Bucket the addressee fetches inbound messages from.
    pub fetch_bucket: String,
    /// First object id of the fetch chain.
    pub initial_fetch_obj_uuid: String,
    /// Bucket the addressee posts outbound messages to.
    pub post_bucket: String,
    /// First object id of the post chain.
    pub initial_post_obj_uuid: String,
    /// Width of the pre-granted object windows beyond the active slot.
    #[serde(default = "default_open_objects")]
    pub open_objects: usize,
    /// Attempts per post before reporting failure.
    #[serde(default = "default_max_tries")]
    pub max_tries: u32,
}

impl LinkAddress {
    /// Parse and validate an address from its JSON wire form.
    pub fn from_json(json: &str) -> LinkResult<Self> {
        let address: LinkAddress = serde_json::from_str(json)?;
        address.validate()?;
        Ok(address)
    }

    /// Serialize to the JSON wire form.
    pub fn to_json(&self) -> String {
        // The struct serializes to a flat map of plain fields; this cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Check structural invariants.
    pub fn validate(&self) -> LinkResult<()> {
        if self.fetch_bucket.is_empty() || self.post_bucket.is_empty() {
            return Err(LinkError::InvalidAddress {
                reason: "bucket names must be non-empty".to_string(),
            });
        }
        if self.initial_fetch_obj_uuid.is_empty() || self.initial_post_obj_uuid.is_empty() {
            return Err(LinkError::InvalidAddress {
                reason: "initial object ids must be non-empty".to_string(),
            });
        }
        if self.max_tries == 0 {
            return Err(LinkError::InvalidAddress {
                reason: "maxTries must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// The creator's internal view of an advertised address: its fetch is
    /// the loader's post and vice versa, so the bucket and initial-id
    /// pairs swap.
    pub fn flipped(&self) -> Self {
        Self {
            region: self.region.clone(),
            fetch_bucket: self.post_bucket.clone(),
            initial_fetch_obj_uuid: self.initial_post_obj_uuid.clone(),
            post_bucket: self.fetch_bucket.clone(),
            initial_post_obj_uuid: self.initial_fetch_obj_uuid.clone(),
            open_objects: self.open_objects,
            max_tries: self.max_tries,
        }
    }

    /// Whether both directions share one physical bucket.
    pub fn single_bucket(&self) -> bool {
        self.fetch_bucket == self.post_bucket
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LinkAddress {
        LinkAddress {
            region: "us-east-1".to_string(),
            fetch_bucket: "drop-f".to_string(),
            initial_fetch_obj_uuid: "f0".to_string(),
            post_bucket: "drop-p".to_string(),
            initial_post_obj_uuid: "p0".to_string(),
            open_objects: 2,
            max_tries: 5,
        }
    }

    #[test]
    fn test_wire_field_names() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["region"], "us-east-1");
        assert_eq!(json["fetchBucket"], "drop-f");
        assert_eq!(json["initialFetchObjUuid"], "f0");
        assert_eq!(json["postBucket"], "drop-p");
        assert_eq!(json["initialPostObjUuid"], "p0");
        assert_eq!(json["openObjects"], 2);
        assert_eq!(json["maxTries"], 5);
    }

    #[test]
    fn test_optional_fields_default() {
        let address = LinkAddress::from_json(
            r#"{"region":"r","fetchBucket":"f","initialFetchObjUuid":"a",
                "postBucket":"p","initialPostObjUuid":"b"}"#,
        )
        .unwrap();
        assert_eq!(address.open_objects, 1);
        assert_eq!(address.max_tries, 120);
    }

    #[test]
    fn test_missing_required_field_rejected() {
        let err = LinkAddress::from_json(r#"{"region":"r"}"#).unwrap_err();
        assert!(matches!(err, LinkError::AddressJson(_)));
    }

    #[test]
    fn test_empty_bucket_rejected() {
        let mut address = sample();
        address.post_bucket.clear();
        assert!(matches!(
            address.validate(),
            Err(LinkError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_zero_max_tries_rejected() {
        let mut address = sample();
        address.max_tries = 0;
        assert!(matches!(
            address.validate(),
            Err(LinkError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_flip_is_involutive() {
        let address = sample();
        let flipped = address.flipped();
        assert_eq!(flipped.fetch_bucket, "drop-p");
        assert_eq!(flipped.initial_fetch_obj_uuid, "p0");
        assert_eq!(flipped.post_bucket, "drop-f");
        assert_eq!(flipped.initial_post_obj_uuid, "f0");
        assert_eq!(flipped.flipped(), address);
    }

    #[test]
    fn test_round_trip() {
        let address = sample();
        assert_eq!(LinkAddress::from_json(&address.to_json()).unwrap(), address);
    }
}
