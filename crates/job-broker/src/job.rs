//! Job model and Redis Streams wire parsing.
//!
//! Each job travels as one stream entry with `job_id`, `job_name`, and
//! `payload` fields. The payload is JSON text.

use tracing::warn;

/// A job read from a queue stream.
#[derive(Debug, Clone)]
pub struct Job {
    /// The Redis message ID (e.g., "1234567890-0"), used for XACK.
    pub message_id: String,
    /// Broker-assigned job id.
    pub id: String,
    /// Job name, chosen by the producer.
    pub name: String,
    /// Decoded JSON payload.
    pub payload: serde_json::Value,
    /// Queue this job was read from.
    pub queue: String,
}

/// Stream key for a queue name.
pub fn stream_key(queue: &str) -> String {
    format!("jobs:{}", queue)
}

fn value_to_string(value: &redis::Value) -> Option<String> {
    match value {
        redis::Value::BulkString(s) => Some(String::from_utf8_lossy(s).to_string()),
        redis::Value::SimpleString(s) => Some(s.clone()),
        _ => None,
    }
}

/// Extract field name/value pairs from a flat XREADGROUP field array.
fn field_pairs(fields: &[redis::Value]) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut i = 0;
    while i + 1 < fields.len() {
        if let (Some(name), Some(value)) =
            (value_to_string(&fields[i]), value_to_string(&fields[i + 1]))
        {
            pairs.push((name, value));
        }
        i += 2;
    }
    pairs
}

fn parse_message(message: &redis::Value, queue: &str) -> Option<Job> {
    // Message format: [message_id, [field1, value1, field2, value2, ...]]
    let parts = match message {
        redis::Value::Array(parts) if parts.len() >= 2 => parts,
        _ => {
            warn!(queue = %queue, "Malformed stream message, skipping");
            return None;
        }
    };

    let message_id = value_to_string(&parts[0])?;

    let fields = match &parts[1] {
        redis::Value::Array(f) => field_pairs(f),
        _ => {
            warn!(queue = %queue, message_id = %message_id, "Message fields not an array, skipping");
            return None;
        }
    };

    let mut job_id = None;
    let mut job_name = None;
    let mut payload_raw = None;
    for (name, value) in fields {
        match name.as_str() {
            "job_id" => job_id = Some(value),
            "job_name" => job_name = Some(value),
            "payload" => payload_raw = Some(value),
            _ => {}
        }
    }

    let name = match job_name {
        Some(name) => name,
        None => {
            warn!(
                queue = %queue,
                message_id = %message_id,
                "Message missing job_name field, skipping"
            );
            return None;
        }
    };

    // A payload that isn't valid JSON is preserved as a string rather than
    // dropped.
    let payload = match payload_raw {
        Some(raw) => serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw)),
        None => serde_json::Value::Null,
    };

    Some(Job {
        // Old producers wrote entries without a job_id field
        id: job_id.unwrap_or_else(|| message_id.clone()),
        message_id,
        name,
        payload,
        queue: queue.to_string(),
    })
}

/// Parse an XREADGROUP reply into jobs.
///
/// Response format:
/// `[[stream_key, [[message_id, [field1, value1, ...]], ...]]]`
///
/// Malformed entries are logged and skipped; the broker degrades rather than
/// halting a consumer over one bad message.
pub(crate) fn parse_xreadgroup_reply(value: &redis::Value, queue: &str) -> Vec<Job> {
    let streams = match value {
        redis::Value::Array(streams) => streams,
        redis::Value::Nil => return Vec::new(),
        _ => {
            warn!(queue = %queue, "Unexpected XREADGROUP response type: {:?}", value);
            return Vec::new();
        }
    };

    let mut jobs = Vec::new();
    for stream in streams {
        let entry = match stream {
            redis::Value::Array(entry) if entry.len() >= 2 => entry,
            _ => continue,
        };

        let messages = match &entry[1] {
            redis::Value::Array(m) => m,
            _ => continue,
        };

        for message in messages {
            if let Some(job) = parse_message(message, queue) {
                jobs.push(job);
            }
        }
    }

    jobs
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bulk(s: &str) -> redis::Value {
        redis::Value::BulkString(s.as_bytes().to_vec())
    }

    fn message(id: &str, fields: &[(&str, &str)]) -> redis::Value {
        let mut flat = Vec::new();
        for (name, value) in fields {
            flat.push(bulk(name));
            flat.push(bulk(value));
        }
        redis::Value::Array(vec![bulk(id), redis::Value::Array(flat)])
    }

    fn reply(stream: &str, messages: Vec<redis::Value>) -> redis::Value {
        redis::Value::Array(vec![redis::Value::Array(vec![
            bulk(stream),
            redis::Value::Array(messages),
        ])])
    }

    #[test]
    fn test_stream_key() {
        assert_eq!(stream_key("webhooks"), "jobs:webhooks");
    }

    #[test]
    fn test_parse_single_job() {
        let value = reply(
            "jobs:webhooks",
            vec![message(
                "1700000000000-0",
                &[
                    ("job_id", "j-1"),
                    ("job_name", "deliver"),
                    ("payload", r#"{"url":"https://example.com"}"#),
                ],
            )],
        );

        let jobs = parse_xreadgroup_reply(&value, "webhooks");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].message_id, "1700000000000-0");
        assert_eq!(jobs[0].id, "j-1");
        assert_eq!(jobs[0].name, "deliver");
        assert_eq!(jobs[0].payload, json!({"url": "https://example.com"}));
        assert_eq!(jobs[0].queue, "webhooks");
    }

    #[test]
    fn test_parse_preserves_message_order() {
        let value = reply(
            "jobs:emails",
            vec![
                message("1-0", &[("job_name", "first"), ("payload", "{}")]),
                message("2-0", &[("job_name", "second"), ("payload", "{}")]),
            ],
        );

        let jobs = parse_xreadgroup_reply(&value, "emails");
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].name, "first");
        assert_eq!(jobs[1].name, "second");
    }

    #[test]
    fn test_parse_nil_reply() {
        assert!(parse_xreadgroup_reply(&redis::Value::Nil, "emails").is_empty());
    }

    #[test]
    fn test_parse_skips_message_without_job_name() {
        let value = reply(
            "jobs:emails",
            vec![
                message("1-0", &[("payload", "{}")]),
                message("2-0", &[("job_name", "ok"), ("payload", "{}")]),
            ],
        );

        let jobs = parse_xreadgroup_reply(&value, "emails");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].name, "ok");
    }

    #[test]
    fn test_parse_missing_job_id_falls_back_to_message_id() {
        let value = reply(
            "jobs:emails",
            vec![message("42-0", &[("job_name", "send"), ("payload", "{}")])],
        );

        let jobs = parse_xreadgroup_reply(&value, "emails");
        assert_eq!(jobs[0].id, "42-0");
    }

    #[test]
    fn test_parse_invalid_payload_kept_as_string() {
        let value = reply(
            "jobs:emails",
            vec![message(
                "1-0",
                &[("job_name", "send"), ("payload", "not json")],
            )],
        );

        let jobs = parse_xreadgroup_reply(&value, "emails");
        assert_eq!(jobs[0].payload, json!("not json"));
    }

    #[test]
    fn test_parse_missing_payload_is_null() {
        let value = reply("jobs:emails", vec![message("1-0", &[("job_name", "send")])]);

        let jobs = parse_xreadgroup_reply(&value, "emails");
        assert_eq!(jobs[0].payload, serde_json::Value::Null);
    }

    #[test]
    fn test_parse_tolerates_simple_strings() {
        let value = redis::Value::Array(vec![redis::Value::Array(vec![
            redis::Value::SimpleString("jobs:emails".to_string()),
            redis::Value::Array(vec![redis::Value::Array(vec![
                redis::Value::SimpleString("7-0".to_string()),
                redis::Value::Array(vec![
                    redis::Value::SimpleString("job_name".to_string()),
                    redis::Value::SimpleString("send".to_string()),
                ]),
            ])]),
        ])]);

        let jobs = parse_xreadgroup_reply(&value, "emails");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].message_id, "7-0");
    }
}
