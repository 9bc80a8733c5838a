//! Shareable comparison links.
//!
//! A comparison's inputs are serialised to compact JSON with short
//! field names and encoded as URL-safe base64 without padding, so the
//! token can be embedded in a URL path or query string as is.

use crate::comparison::{ComparisonRequest, Selection};
use crate::error::ShareError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Wire shape of a share token.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SharePayload {
    a1: String,
    l1: usize,
    p1: bool,
    a2: String,
    l2: usize,
    p2: bool,
    h: u32,
    m: u32,
}

/// Encodes the inputs of a comparison into a URL-safe token.
pub fn encode(request: &ComparisonRequest) -> String {
    let payload = SharePayload {
        a1: request.first.agreement_key.clone(),
        l1: request.first.level_index,
        p1: request.first.part_time,
        a2: request.second.agreement_key.clone(),
        l2: request.second.level_index,
        p2: request.second.part_time,
        h: request.headcount,
        m: request.months_per_year,
    };
    // Serialising a struct of strings and integers cannot fail.
    let json = serde_json::to_vec(&payload).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(json)
}

/// Decodes a token produced by [`encode`].
///
/// # Errors
///
/// Returns [`ShareError::InvalidLink`] when the token is not valid
/// base64 or does not hold a complete payload.
pub fn decode(token: &str) -> Result<ComparisonRequest, ShareError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token.trim())
        .map_err(|_| ShareError::InvalidLink)?;
    let payload: SharePayload = serde_json::from_slice(&bytes).map_err(|_| ShareError::InvalidLink)?;
    Ok(ComparisonRequest {
        first: Selection {
            agreement_key: payload.a1,
            level_index: payload.l1,
            part_time: payload.p1,
        },
        second: Selection {
            agreement_key: payload.a2,
            level_index: payload.l2,
            part_time: payload.p2,
        },
        headcount: payload.h,
        months_per_year: payload.m,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn request() -> ComparisonRequest {
        ComparisonRequest {
            first: Selection {
                agreement_key: "commercio-confcommercio".into(),
                level_index: 3,
                part_time: true,
            },
            second: Selection {
                agreement_key: "servizi-àèé/?&".into(),
                level_index: 0,
                part_time: false,
            },
            headcount: 25,
            months_per_year: 14,
        }
    }

    #[test]
    fn decoding_an_encoded_token_restores_inputs() {
        let token = encode(&request());
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_eq!(decode(&token).unwrap(), request());
    }

    fn selection_strategy() -> impl Strategy<Value = Selection> {
        (".*", 0usize..64, any::<bool>()).prop_map(|(agreement_key, level_index, part_time)| Selection {
            agreement_key,
            level_index,
            part_time,
        })
    }

    proptest! {
        #[test]
        fn any_request_survives_a_link(
            first in selection_strategy(),
            second in selection_strategy(),
            headcount in any::<u32>(),
            months_per_year in any::<u32>()
        ) {
            let request = ComparisonRequest { first, second, headcount, months_per_year };
            prop_assert_eq!(decode(&encode(&request)).unwrap(), request);
        }
    }

    #[test]
    fn garbage_is_an_invalid_link() {
        assert_eq!(decode("***").unwrap_err(), ShareError::InvalidLink);
        let not_a_payload = URL_SAFE_NO_PAD.encode(br#"{"a1":"x"}"#);
        assert_eq!(decode(&not_a_payload).unwrap_err(), ShareError::InvalidLink);
        assert_eq!(decode("").unwrap_err(), ShareError::InvalidLink);
    }
}
