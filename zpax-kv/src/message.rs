//! # Summary
//!
//! Wire message types exchanged between KV Engines (§6.3). Three JSON
//! request/reply forms travel over two channels: a request/reply channel
//! between client and server, and a fan-out channel between servers used
//! for catch-up. Both channels are external collaborators (the concrete
//! transport lives in `zpax-kv-cli`/`transport`); this module only defines
//! the message shapes, tagged exactly as the wire contract specifies.

use serde_derive::{Deserialize, Serialize};

/// Client-to-server request, tagged on `header_type` as the original
/// implementation's `header['header_type']` dispatch key.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "header_type", rename_all = "snake_case")]
pub enum ClientRequest {
    ProposeValue { key: String, value: String },
    QueryValue { key: String },
}

/// Server-to-client reply.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientReply {
    Proposed {
        proposed: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Value {
        value: Option<String>,
    },
    Denied {
        error: String,
    },
}

/// Server-to-peer catch-up request, sent over the fan-out channel.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "header_type", rename_all = "snake_case")]
pub enum PeerRequest {
    CatchupRequest { last_known_seq: i64 },
}

/// Peer-to-server catch-up reply: up to `catchup_num_items` triples,
/// ordered by seq ascending.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerReply {
    CatchupData {
        from_seq: i64,
        key_val_seq_list: Vec<(String, String, i64)>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn propose_value_round_trips_through_json() {
        let request = ClientRequest::ProposeValue {
            key: "x".into(),
            value: "1".into(),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(
            json,
            r#"{"header_type":"propose_value","key":"x","value":"1"}"#
        );
        let parsed: ClientRequest = serde_json::from_str(&json).unwrap();
        matches!(parsed, ClientRequest::ProposeValue { .. });
    }

    #[test]
    fn catchup_request_round_trips_through_json() {
        let request = PeerRequest::CatchupRequest { last_known_seq: 5 };
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"header_type":"catchup_request","last_known_seq":5}"#);
    }
}
