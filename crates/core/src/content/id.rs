/// Record ID conventions.
///
/// Two writers mint ids and they are not reconciled:
/// - Client (local store): `{unix_millis}-{9 base36 chars}`
/// - Server (content API): `{unix_millis}`
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use rand::Rng;

const SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdOrigin {
    Client { millis: i64, suffix: String },
    Server { millis: i64 },
    /// Anything else (imported data, hand-edited storage).
    Foreign(String),
}

impl IdOrigin {
    /// Classify an id by the shape each writer produces.
    pub fn parse(id: &str) -> Self {
        if let Some((millis, suffix)) = id.split_once('-') {
            if let Ok(millis) = millis.parse::<i64>() {
                if suffix.len() == SUFFIX_LEN && suffix.bytes().all(|b| BASE36.contains(&b)) {
                    return IdOrigin::Client {
                        millis,
                        suffix: suffix.to_string(),
                    };
                }
            }
        } else if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(millis) = id.parse::<i64>() {
                return IdOrigin::Server { millis };
            }
        }
        IdOrigin::Foreign(id.to_string())
    }

    /// Creation instant encoded in the id, if any.
    pub fn timestamp_millis(&self) -> Option<i64> {
        match self {
            IdOrigin::Client { millis, .. } | IdOrigin::Server { millis } => Some(*millis),
            IdOrigin::Foreign(_) => None,
        }
    }

    pub fn is_client(&self) -> bool {
        matches!(self, IdOrigin::Client { .. })
    }

    pub fn is_server(&self) -> bool {
        matches!(self, IdOrigin::Server { .. })
    }
}

/// Mint a client-side id.
pub fn client_id(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{}-{}", now.timestamp_millis(), suffix)
}

/// Server-side id source. Ids are millisecond timestamps, bumped forward
/// when two creates land in the same millisecond.
#[derive(Debug, Default)]
pub struct ServerIdGenerator {
    last: AtomicI64,
}

impl ServerIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self, now: DateTime<Utc>) -> String {
        let candidate = now.timestamp_millis();
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let next = candidate.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next.to_string(),
                Err(actual) => last = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;

    #[test]
    fn parse_client_id() {
        let kind = IdOrigin::parse("1709283600000-k3j9x0a1b");
        assert_eq!(
            kind,
            IdOrigin::Client {
                millis: 1709283600000,
                suffix: "k3j9x0a1b".to_string(),
            }
        );
        assert!(kind.is_client());
        assert_eq!(kind.timestamp_millis(), Some(1709283600000));
    }

    #[test]
    fn parse_server_id() {
        let kind = IdOrigin::parse("1709283600000");
        assert_eq!(kind, IdOrigin::Server { millis: 1709283600000 });
        assert!(kind.is_server());
    }

    #[test]
    fn parse_foreign_id() {
        assert_eq!(IdOrigin::parse("easter-2024"), IdOrigin::Foreign("easter-2024".into()));
        assert_eq!(IdOrigin::parse(""), IdOrigin::Foreign(String::new()));
        assert_eq!(IdOrigin::parse("abc").timestamp_millis(), None);
    }

    #[test]
    fn client_ids_round_trip_and_differ() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let ids: HashSet<String> = (0..200).map(|_| client_id(now)).collect();
        assert_eq!(ids.len(), 200);
        for id in &ids {
            assert!(IdOrigin::parse(id).is_client(), "{id} should parse as client id");
        }
    }

    #[test]
    fn server_ids_never_repeat_within_a_millisecond() {
        let generator = ServerIdGenerator::new();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let first = generator.next_id(now);
        let second = generator.next_id(now);
        assert_eq!(first, now.timestamp_millis().to_string());
        assert_eq!(second, (now.timestamp_millis() + 1).to_string());
    }
}
